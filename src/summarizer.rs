use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::CompletionSettings;
use crate::error::{AppError, Result};
use crate::models::SummaryOutcome;

const SECTION_PLACEHOLDER: &str = "{section}";

const DEFAULT_PROMPT: &str = "You're a consultant and have been provided the following legislation to provide a summary CFO. You need to highlight all of the financial information. If there is no financial information in the section then briefly identify the section as having no relevant financial information. The text of the bill is: {section}";

/// Prompt text with a `{section}` placeholder for the bill section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(SECTION_PLACEHOLDER) {
            return Err(AppError::ConfigError(format!(
                "Prompt template must contain {}",
                SECTION_PLACEHOLDER
            )));
        }
        Ok(Self { template })
    }

    pub fn render(&self, section: &str) -> String {
        let mut result = String::with_capacity(self.template.len() + section.len());
        let mut parts = self.template.splitn(2, SECTION_PLACEHOLDER);
        result.push_str(parts.next().unwrap_or_default());
        result.push_str(section);
        result.push_str(parts.next().unwrap_or_default());
        result
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT.to_string(),
        }
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize the financial content of one bill section
    async fn summarize(&self, section: &str) -> Result<String>;
}

/// Sampling parameters sent with every completion request.
#[derive(Clone, Debug, Serialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub stop: Vec<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 3090,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            // Literal backslash-n pairs, not newlines.
            stop: vec![r"\n\n".to_string()],
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    #[serde(flatten)]
    params: &'a SamplingParams,
}

/// Client for an OpenAI-compatible `/completions` endpoint.
pub struct CompletionClient {
    client: Client,
    settings: CompletionSettings,
    params: SamplingParams,
}

impl CompletionClient {
    pub fn new(settings: CompletionSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build completion client: {}", e)))?;

        Ok(Self {
            client,
            settings,
            params: SamplingParams::default(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/completions", self.settings.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl Summarizer for CompletionClient {
    async fn summarize(&self, section: &str) -> Result<String> {
        let body = CompletionRequest {
            model: &self.settings.model,
            prompt: self.settings.template.render(section),
            params: &self.params,
        };

        debug!(model = %self.settings.model, prompt_len = body.prompt.len(), "Calling completion API");

        let res = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::SummarizationError(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(AppError::SummarizationError(format!("{}: {}", status, text)));
        }

        let json: serde_json::Value = res
            .json()
            .await
            .map_err(|e| AppError::SummarizationError(e.to_string()))?;

        completion_text(&json)
    }
}

/// Extracts the trimmed text of the first choice.
pub fn completion_text(json: &serde_json::Value) -> Result<String> {
    json["choices"][0]["text"]
        .as_str()
        .map(|text| text.trim().to_string())
        .ok_or_else(|| {
            AppError::SummarizationError("Invalid response format from completion API".to_string())
        })
}

/// Summarizes every section with at most `concurrency` calls in flight.
///
/// Outcomes are returned in section order. A failed section becomes
/// [`SummaryOutcome::Failed`] and does not affect the others.
pub async fn summarize_chunks(
    summarizer: &dyn Summarizer,
    sections: &[&str],
    concurrency: usize,
) -> Vec<SummaryOutcome> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = sections.len();
    info!(total, concurrency, "Summarizing sections");

    let futures = sections.iter().enumerate().map(|(i, section)| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    return SummaryOutcome::Failed {
                        reason: e.to_string(),
                    };
                }
            };
            match summarizer.summarize(section).await {
                Ok(text) => {
                    debug!("Section {}/{} summarized", i + 1, total);
                    SummaryOutcome::Summarized { text }
                }
                Err(err) => {
                    warn!(section = i, error = %err, "Section summarization failed");
                    SummaryOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            }
        }
    });

    let outcomes = join_all(futures).await;
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    info!(total, failed, "Summaries collected");
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RequestLog, spawn_server};
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, Method, StatusCode, Uri};
    use axum::response::{IntoResponse, Response};
    use axum::{Json, Router};
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes the section back after a pseudo-random delay.
    struct JitterSummarizer {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl JitterSummarizer {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Summarizer for JitterSummarizer {
        async fn summarize(&self, section: &str) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let seed = section.bytes().fold(17u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            tokio::time::sleep(Duration::from_millis(seed % 15)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if section.contains("poison") {
                return Err(AppError::SummarizationError("rate limited".to_string()));
            }
            Ok(format!("summary of {}", section))
        }
    }

    #[tokio::test]
    async fn outcomes_follow_section_order_despite_jitter() {
        let sections: Vec<String> = (0..40).map(|i| format!("SEC. {}", i)).collect();
        let refs: Vec<&str> = sections.iter().map(String::as_str).collect();
        let summarizer = JitterSummarizer::new();

        let outcomes = summarize_chunks(&summarizer, &refs, 6).await;

        let expected: Vec<SummaryOutcome> = sections
            .iter()
            .map(|s| SummaryOutcome::Summarized {
                text: format!("summary of {}", s),
            })
            .collect();
        assert_eq!(outcomes, expected);
        assert!(summarizer.peak.load(Ordering::SeqCst) <= 6);
    }

    #[tokio::test]
    async fn failed_section_becomes_placeholder_without_touching_siblings() {
        let refs = ["SEC. 1", "SEC. 2 poison", "SEC. 3"];
        let outcomes = summarize_chunks(&JitterSummarizer::new(), &refs, 2).await;

        assert_eq!(
            outcomes[0],
            SummaryOutcome::Summarized {
                text: "summary of SEC. 1".to_string()
            }
        );
        assert!(outcomes[1].is_failed());
        assert_eq!(
            outcomes[2],
            SummaryOutcome::Summarized {
                text: "summary of SEC. 3".to_string()
            }
        );
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let summarizer = JitterSummarizer::new();
        let outcomes = summarize_chunks(&summarizer, &[], 4).await;
        assert!(outcomes.is_empty());
        assert_eq!(summarizer.peak.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn default_prompt_embeds_section_at_the_end() {
        let prompt = PromptTemplate::default().render("SEC. 2. $5,000,000 is appropriated.");
        assert!(prompt.starts_with("You're a consultant"));
        assert!(prompt.ends_with("The text of the bill is: SEC. 2. $5,000,000 is appropriated."));
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        assert!(matches!(
            PromptTemplate::new("Summarize this."),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn section_text_is_inserted_verbatim() {
        let template = PromptTemplate::new("Before {section} after").unwrap();
        assert_eq!(template.render("{section}"), "Before {section} after");
    }

    #[test]
    fn request_body_carries_fixed_sampling_parameters() {
        let params = SamplingParams::default();
        let body = CompletionRequest {
            model: "gpt-3.5-turbo-instruct",
            prompt: "p".to_string(),
            params: &params,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "gpt-3.5-turbo-instruct");
        assert_eq!(value["max_tokens"], 3090);
        assert_eq!(value["top_p"], 1.0);
        assert_eq!(value["stop"][0], "\\n\\n");
        assert!((value["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn completion_text_is_trimmed() {
        let json = serde_json::json!({ "choices": [{ "text": "\n\nNo relevant financial information.  " }] });
        assert_eq!(
            completion_text(&json).unwrap(),
            "No relevant financial information."
        );
    }

    #[test]
    fn missing_choices_is_a_summarization_error() {
        let json = serde_json::json!({ "error": { "message": "overloaded" } });
        assert!(matches!(
            completion_text(&json),
            Err(AppError::SummarizationError(_))
        ));
    }

    async fn fake_completions(
        State(log): State<RequestLog>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        log.record(&method, &uri, headers, &body);
        if method != Method::POST || uri.path() != "/v1/completions" {
            return StatusCode::NOT_FOUND.into_response();
        }
        Json(json!({
            "id": "cmpl-1",
            "object": "text_completion",
            "model": "gpt-3.5-turbo-instruct",
            "choices": [{
                "text": "\n\n  Appropriates $5,000,000 for fiscal year 2025.  ",
                "index": 0,
                "finish_reason": "stop",
            }],
        }))
        .into_response()
    }

    fn client_at(addr: SocketAddr) -> CompletionClient {
        CompletionClient::new(CompletionSettings {
            api_key: "sk-test".to_string(),
            api_base: format!("http://{}/v1/", addr),
            model: "gpt-3.5-turbo-instruct".to_string(),
            timeout: Duration::from_secs(5),
            template: PromptTemplate::default(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn completion_client_posts_prompt_and_trims_choice() {
        let log = RequestLog::default();
        let app = Router::new().fallback(fake_completions).with_state(log.clone());
        let client = client_at(spawn_server(app).await);

        let summary = client.summarize("SEC. 2. Appropriations.").await.unwrap();
        assert_eq!(summary, "Appropriates $5,000,000 for fiscal year 2025.");

        let requests = log.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/v1/completions");
        assert_eq!(request.header("authorization"), "Bearer sk-test");
        assert_eq!(request.header("content-type"), "application/json");

        let body = request.json();
        assert_eq!(body["model"], "gpt-3.5-turbo-instruct");
        assert_eq!(
            body["prompt"],
            PromptTemplate::default().render("SEC. 2. Appropriations.")
        );
        assert_eq!(body["max_tokens"], 3090);
        assert_eq!(body["stop"], json!([r"\n\n"]));
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(body["top_p"].as_f64(), Some(1.0));
    }

    #[tokio::test]
    async fn completion_client_reports_failed_status_with_body() {
        let app = Router::new().fallback(|| async {
            (StatusCode::TOO_MANY_REQUESTS, "Rate limit reached for requests")
        });
        let client = client_at(spawn_server(app).await);

        match client.summarize("SEC. 2. Appropriations.").await {
            Err(AppError::SummarizationError(msg)) => {
                assert!(msg.contains("429"), "{}", msg);
                assert!(msg.contains("Rate limit reached"), "{}", msg);
            }
            other => panic!("expected summarization error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn completion_client_rejects_response_without_choices() {
        let app = Router::new().fallback(|| async { Json(json!({ "error": "overloaded" })) });
        let client = client_at(spawn_server(app).await);

        assert!(matches!(
            client.summarize("SEC. 2. Appropriations.").await,
            Err(AppError::SummarizationError(_))
        ));
    }
}
