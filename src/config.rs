use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::chunking::ChunkWindow;
use crate::error::{AppError, Result};
use crate::summarizer::PromptTemplate;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36";
pub const DEFAULT_BILL_TEXT_SELECTOR: &str = "pre#billTextContainer";
pub const DEFAULT_PAGE_MARKER: &str = "[[Page";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub static_dir: PathBuf,
    pub request_timeout: Duration,
    pub browser: BrowserSettings,
    pub store: StoreSettings,
    pub completion: CompletionSettings,
    pub pipeline: PipelineSettings,
}

/// Headless browser session used by the text extractor.
#[derive(Clone, Debug)]
pub struct BrowserSettings {
    pub chrome_executable: Option<PathBuf>,
    pub user_agent: String,
    /// Headers sent with every navigation, in addition to the user agent.
    pub extra_headers: Vec<(String, String)>,
    pub selector: String,
    pub element_wait: Duration,
}

#[derive(Clone)]
pub struct StoreSettings {
    pub endpoint: String,
    pub account_key: String,
    pub database: String,
    pub container: String,
}

// Keeps the account key out of logs.
impl std::fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSettings")
            .field("endpoint", &self.endpoint)
            .field("account_key", &"<redacted>")
            .field("database", &self.database)
            .field("container", &self.container)
            .finish()
    }
}

#[derive(Clone)]
pub struct CompletionSettings {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
    pub template: PromptTemplate,
}

impl std::fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSettings")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub window: ChunkWindow,
    pub concurrency: usize,
    pub page_marker: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| AppError::ConfigError(format!("{} must be set", key)))
        };

        let store = StoreSettings {
            endpoint: required("ACCOUNT_HOST")?,
            account_key: required("ACCOUNT_KEY")?,
            database: required("DATABASE_NAME")?,
            container: required("CONTAINER_NAME")?,
        };
        let api_key = required("OPENAI_API_KEY")?;

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = parse_or(get("PORT"), "PORT", 3000)?;
        let ip = IpAddr::from_str(&host)
            .map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let template = match get("SUMMARY_PROMPT_TEMPLATE") {
            Some(raw) => PromptTemplate::new(raw)?,
            None => PromptTemplate::default(),
        };

        let completion = CompletionSettings {
            api_key,
            api_base: get("OPENAI_API_BASE")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-3.5-turbo-instruct".to_string()),
            timeout: Duration::from_secs(parse_or(
                get("COMPLETION_TIMEOUT_SECS"),
                "COMPLETION_TIMEOUT_SECS",
                120,
            )?),
            template,
        };

        let browser = BrowserSettings {
            chrome_executable: get("CHROME_EXECUTABLE").map(PathBuf::from),
            user_agent: get("BROWSER_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            extra_headers: vec![
                ("Accept-Language".to_string(), "en-US,en;q=0.8".to_string()),
                ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
                ("Sec-Fetch-Dest".to_string(), "document".to_string()),
                ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
                ("Sec-Fetch-Site".to_string(), "same-origin".to_string()),
            ],
            selector: get("BILL_TEXT_SELECTOR")
                .unwrap_or_else(|| DEFAULT_BILL_TEXT_SELECTOR.to_string()),
            element_wait: Duration::from_secs(parse_or(
                get("ELEMENT_WAIT_SECS"),
                "ELEMENT_WAIT_SECS",
                10,
            )?),
        };

        let window = ChunkWindow::new(
            parse_or(get("CHUNK_WINDOW_START"), "CHUNK_WINDOW_START", 400)?,
            parse_or(get("CHUNK_WINDOW_END"), "CHUNK_WINDOW_END", 500)?,
        )?;
        let concurrency: usize = parse_or(get("SUMMARY_CONCURRENCY"), "SUMMARY_CONCURRENCY", 8)?;
        if concurrency == 0 {
            return Err(AppError::ConfigError(
                "SUMMARY_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        let pipeline = PipelineSettings {
            window,
            concurrency,
            page_marker: get("PAGE_MARKER").unwrap_or_else(|| DEFAULT_PAGE_MARKER.to_string()),
        };

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            static_dir: PathBuf::from(get("STATIC_DIR").unwrap_or_else(|| "static".to_string())),
            request_timeout: Duration::from_secs(parse_or(
                get("REQUEST_TIMEOUT_SECS"),
                "REQUEST_TIMEOUT_SECS",
                300,
            )?),
            browser,
            store,
            completion,
            pipeline,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
