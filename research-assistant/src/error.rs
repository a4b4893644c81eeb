use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned an error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
