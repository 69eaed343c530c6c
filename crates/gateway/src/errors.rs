use thiserror::Error;

/// Failures talking to an object store.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Network(String),

    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gateway response invalid: {0}")]
    InvalidResponse(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    #[error("gateway misconfigured: {0}")]
    Config(String),

    #[error("local store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::InvalidResponse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
