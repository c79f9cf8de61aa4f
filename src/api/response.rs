use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

use crate::error::{AppError, Result};
use crate::templates::Templates;

pub fn page(rendered: Result<String>) -> Response {
    match rendered {
        Ok(html) => (StatusCode::OK, Html(html)).into_response(),
        Err(err) => {
            error!(error = %err, "Failed to render page");
            err.into_response()
        }
    }
}

pub fn error(templates: &Templates, status: StatusCode, message: String) -> Response {
    match templates.render_error(&message) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => {
            error!(error = %err, "Failed to render error page");
            (status, message).into_response()
        }
    }
}

pub fn app_error(templates: &Templates, err: &AppError) -> Response {
    error(templates, err.status_code(), err.to_string())
}
