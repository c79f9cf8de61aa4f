pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod models;
pub mod scraper;
pub mod store;
pub mod summarizer;
pub mod templates;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::config::Config;
use crate::scraper::TextExtractor;
use crate::store::DocumentStore;
use crate::summarizer::Summarizer;
use crate::templates::Templates;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub extractor: Arc<dyn TextExtractor>,
    pub store: Arc<dyn DocumentStore>,
    pub summarizer: Arc<dyn Summarizer>,
    pub templates: Arc<Templates>,
}
