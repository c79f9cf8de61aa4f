use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to load page: {0}")]
    NavigationError(String),

    #[error("Could not find bill text container `{selector}` within {wait_secs}s")]
    ElementNotFound { selector: String, wait_secs: u64 },

    #[error("Failed to store document: {0}")]
    StoreWriteError(String),

    #[error("Summarization error: {0}")]
    SummarizationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Template error: {0}")]
    TemplateError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NavigationError(_) => StatusCode::BAD_GATEWAY,
            AppError::ElementNotFound { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::StoreWriteError(_) => StatusCode::BAD_GATEWAY,
            AppError::SummarizationError(_) => StatusCode::BAD_GATEWAY,
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::TemplateError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::NavigationError(err.to_string())
    }
}

impl From<minijinja::Error> for AppError {
    fn from(err: minijinja::Error) -> Self {
        AppError::TemplateError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
