use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw bill text captured from a single request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedDocument {
    pub id: Uuid,
    pub url: String,
    pub text: String,
}

impl ScrapedDocument {
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            text: text.into(),
        }
    }
}

/// Result of summarizing one section, kept in section order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryOutcome {
    Summarized { text: String },
    Failed { reason: String },
}

impl SummaryOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SummaryOutcome::Failed { .. })
    }
}
