use thiserror::Error;

pub use shared::error::{normalize_error_body, FeedParseError, RequestError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("network request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("failed to decode response body: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl TransportError {
    /// Message shown to the user. Server-provided detail wins; failures
    /// without one collapse to the operation's fallback text.
    pub fn display_message(&self, fallback: &str) -> String {
        match self {
            Self::Request(err) => err.message.clone(),
            Self::Network(_) | Self::Decode(_) | Self::InvalidUrl(_) => fallback.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request(err) => Some(err.status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedConnectionError {
    #[error("failed to open live feed {url}: {reason}")]
    Open { url: String, reason: String },
    #[error("live feed socket error: {0}")]
    Socket(String),
    #[error("live feed closed by peer")]
    Closed,
}
