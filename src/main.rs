use std::sync::Arc;

use bill_summarizer::{
    AppState,
    api::routes::create_router,
    config::Config,
    scraper::BrowserExtractor,
    store::CosmosStore,
    summarizer::CompletionClient,
    templates::Templates,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bill_summarizer=info,tower_http=info")),
        )
        .init();

    // Missing required settings stop the process here
    let config = Config::load()?;
    let server_addr = config.server_addr;

    let store = CosmosStore::new(config.store.clone())?;
    if let Err(err) = store.ensure_container().await {
        warn!(error = %err, "Document container could not be prepared; stored copies may fail");
    }

    let app_state = AppState {
        extractor: Arc::new(BrowserExtractor::new(config.browser.clone())?),
        store: Arc::new(store),
        summarizer: Arc::new(CompletionClient::new(config.completion.clone())?),
        templates: Arc::new(Templates::new()?),
        config: Arc::new(config),
    };

    let app = create_router(app_state);

    let listener = TcpListener::bind(server_addr).await?;
    info!("Listening on {}", server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
