use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(
        "API error ({status}): {status_text}{}",
        .detail.as_deref().map(|d| format!(" - {}", d)).unwrap_or_default()
    )]
    Status {
        status: u16,
        status_text: String,
        /// `detail` field of the error body, when the backend sent one.
        detail: Option<String>,
    },

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Validation(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;
