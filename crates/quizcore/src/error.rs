use thiserror::Error;

/// Centralized error type for the quiz core.
///
/// Store, HTTP and Telegram failures are all funneled into this enum so that
/// handlers can log them uniformly and degrade to a user-facing message.
///
/// # Example
///
/// ```no_run
/// use quizcore::error::AppError;
///
/// fn handle_error(err: AppError) {
///     log::error!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Transport-level failure talking to the data API
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Data API answered with a non-success status
    #[error("Store request to {table} failed with status {status}: {body}")]
    StoreStatus {
        table: String,
        status: reqwest::StatusCode,
        body: String,
    },

    /// Response body could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic store failure (used by in-memory and test stores)
    #[error("Store error: {0}")]
    Store(String),

    /// Telegram API errors
    #[cfg(feature = "telegram")]
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Config(format!("invalid URL: {}", err))
    }
}
