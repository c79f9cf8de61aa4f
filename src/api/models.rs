use serde::Deserialize;

/// Form posted by the index page.
#[derive(Debug, Default, Deserialize)]
pub struct SummaryForm {
    pub name: Option<String>,
}

impl SummaryForm {
    /// The submitted URL, or `None` when the field is missing or blank.
    pub fn target_url(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}
