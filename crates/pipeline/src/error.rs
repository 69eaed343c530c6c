use cvault_files::PolicyError;
use cvault_gateway::GatewayError;
use cvault_registry::RegistryError;
use thiserror::Error;

/// Why a submission failed. A digest that is already registered is not an
/// error; it is reported as [`crate::SubmitOutcome::Conflict`].
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("payload rejected: {0}")]
    Rejected(#[from] PolicyError),

    #[error("reading local file failed: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("transfer to object store failed: {0}")]
    Transfer(#[from] GatewayError),

    #[error("registry write failed: {0}")]
    Registry(#[from] RegistryError),
}

impl SubmitError {
    /// Whether resubmitting the same payload may succeed. Resubmitting is
    /// always safe because the digest does not change.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmitError::Registry(e) => e.is_retryable(),
            SubmitError::Transfer(GatewayError::Timeout | GatewayError::Network(_)) => true,
            _ => false,
        }
    }
}
