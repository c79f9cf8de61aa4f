use axum::{
    extract::{Form, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::AppState;
use crate::api::models::SummaryForm;
use crate::api::response;
use crate::chunking::split_sections;
use crate::error::Result;
use crate::models::{ScrapedDocument, SummaryOutcome};
use crate::store::DocumentStore;
use crate::summarizer::summarize_chunks;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/favicon.ico", get(favicon_handler))
        .route("/summary", post(summary_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn index_handler(State(state): State<AppState>) -> Response {
    info!("Request for index page received");
    response::page(state.templates.render_index())
}

async fn favicon_handler(State(state): State<AppState>) -> Response {
    let path = state.config.static_dir.join("favicon.ico");
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "image/vnd.microsoft.icon")],
            bytes,
        )
            .into_response(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Favicon not available");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn summary_handler(
    State(state): State<AppState>,
    Form(form): Form<SummaryForm>,
) -> Response {
    let Some(url) = form.target_url() else {
        info!("Request for summary page received with no url or blank url -- redirecting");
        return Redirect::to("/").into_response();
    };
    info!(%url, "Request for summary page received");
    let start_time = Instant::now();

    // Bound the whole pipeline; dropping it releases the browser session.
    let result =
        tokio::time::timeout(state.config.request_timeout, process_summary_request(&state, url))
            .await;

    let elapsed = start_time.elapsed();
    info!(%url, ?elapsed, "Request processing finished");

    match result {
        Ok(Ok(summaries)) => response::page(state.templates.render_summary(url, &summaries)),
        Ok(Err(err)) => {
            warn!(%url, error = %err, "Summary request failed");
            response::app_error(&state.templates, &err)
        }
        Err(_) => {
            warn!(%url, ?elapsed, "Request timed out");
            response::error(
                &state.templates,
                StatusCode::REQUEST_TIMEOUT,
                "Request processing timed out".to_string(),
            )
        }
    }
}

/// Extract, store and summarize one bill.
///
/// Extraction failures abort the request before anything is stored or summarized.
/// Storage runs alongside summarization and its failure is only logged.
pub async fn process_summary_request(state: &AppState, url: &str) -> Result<Vec<SummaryOutcome>> {
    let text = state.extractor.extract(url).await?;
    let document = ScrapedDocument::new(url, text);

    let pipeline = &state.config.pipeline;
    let sections = split_sections(&document.text, &pipeline.page_marker);
    let window = pipeline.window.select(&sections);
    info!(
        total_sections = sections.len(),
        selected = window.len(),
        start = pipeline.window.start,
        end = pipeline.window.end,
        "Bill text split into sections"
    );

    let ((), summaries) = tokio::join!(
        store_document(state.store.as_ref(), &document),
        summarize_chunks(state.summarizer.as_ref(), window, pipeline.concurrency),
    );

    Ok(summaries)
}

async fn store_document(store: &dyn DocumentStore, document: &ScrapedDocument) {
    if let Err(err) = store.create_document(document).await {
        warn!(id = %document.id, url = %document.url, error = %err, "Continuing without stored copy");
    }
}
