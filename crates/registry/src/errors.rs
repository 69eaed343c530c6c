//! Error types for the registry

use cvault_files::Digest;
use cvault_storage::MemberRole;
use cvault_types::OwnerId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("File already registered: {digest}")]
    AlreadyExists { digest: Digest },

    #[error("File does not exist: {digest}")]
    NotFound { digest: Digest },

    #[error("Caller {caller} is not the owner")]
    NotOwner { caller: OwnerId },

    #[error("Expiration {expires_at} is not after {now}")]
    InvalidExpiration { expires_at: u64, now: u64 },

    #[error("No existing access for {grantee}")]
    NoExistingAccess { grantee: OwnerId },

    #[error("Cannot transfer to self")]
    CannotTransferToSelf,

    #[error("Owner already has access")]
    CannotGrantToOwner,

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Token not found: {token_id}")]
    TokenNotFound { token_id: u64 },

    #[error("Caller {caller} is not a registered {required:?}")]
    RoleRequired { caller: OwnerId, required: MemberRole },

    #[error("Owner cannot adopt their own pet")]
    OwnerCannotAdopt,

    #[error("Token {token_id} already has a pending adoption request")]
    RequestPending { token_id: u64 },

    #[error("Token {token_id} has no pending adoption request")]
    NoPendingRequest { token_id: u64 },

    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl RegistryError {
    /// Only transport-level unavailability is worth retrying; every other
    /// variant is a rule violation that an identical retry would repeat.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
