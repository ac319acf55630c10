use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Transient transport or HTTP status failure; retried by the fetch driver.
    #[error("Network error: {0}")]
    Network(String),

    /// Indexer answered with a shape we cannot read (or a GraphQL `errors` array).
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single transfer record that cannot be normalized.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Only network failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Network(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AppError::MalformedResponse(e.to_string())
        } else {
            AppError::Network(e.to_string())
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
