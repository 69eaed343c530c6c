//! Registry of content digests.
//!
//! The registry is the single authority on whether a digest is registered.
//! Uniqueness is enforced here through an atomic insert-if-absent in
//! storage, never by callers checking `exists` first. The traits are the
//! boundary a chain-backed registry would implement; [`LedgerRegistry`] is
//! the local implementation.

pub mod access;
pub mod adoption;
pub mod confirmation;
pub mod errors;
pub mod ledger;

pub use access::{
    expiration_from_now, validate_hours, GrantPolicy, DEFAULT_GRANT_MARGIN_SECS, MAX_GRANT_HOURS,
    MIN_GRANT_HOURS,
};
pub use adoption::AdoptionRegistry;
pub use confirmation::Confirmation;
pub use errors::*;
pub use ledger::LedgerRegistry;

use async_trait::async_trait;
use cvault_files::{AccessGrant, Digest, Locator, RegistrationRecord};
use cvault_types::OwnerId;
use serde::{Deserialize, Serialize};

/// Everything needed to create a registration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub digest: Digest,
    pub locator: Locator,
    pub owner: OwnerId,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl RegistrationRequest {
    pub fn into_record(self, registered_at: u64) -> RegistrationRecord {
        RegistrationRecord {
            digest: self.digest,
            locator: self.locator,
            owner: self.owner,
            registered_at,
            size_bytes: self.size_bytes,
            mime_type: self.mime_type,
            file_name: self.file_name,
        }
    }
}

/// Minimal registry boundary used by the submission workflow.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn exists(&self, digest: &Digest) -> Result<bool>;

    /// Create the record for `request.digest`. Fails with
    /// [`RegistryError::AlreadyExists`] if another writer got there first.
    async fn register(&self, request: RegistrationRequest) -> Result<Confirmation>;

    async fn get(&self, digest: &Digest) -> Result<Option<RegistrationRecord>>;
}

/// Owner-side file management and access control.
#[async_trait]
pub trait VaultRegistry: Registry {
    /// Records owned by `owner`, newest first.
    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<RegistrationRecord>>;

    async fn remove(&self, caller: &OwnerId, digest: &Digest) -> Result<Confirmation>;

    async fn transfer(&self, caller: &OwnerId, digest: &Digest, to: &OwnerId)
        -> Result<Confirmation>;

    /// Grant or extend read access until `expires_at` (unix seconds).
    async fn grant_access(
        &self,
        caller: &OwnerId,
        digest: &Digest,
        grantee: &OwnerId,
        expires_at: u64,
    ) -> Result<Confirmation>;

    async fn revoke_access(
        &self,
        caller: &OwnerId,
        digest: &Digest,
        grantee: &OwnerId,
    ) -> Result<Confirmation>;

    /// The owner always has access; grantees until their grant expires.
    async fn has_access(&self, digest: &Digest, who: &OwnerId) -> Result<bool>;

    /// Grants that have not expired yet.
    async fn list_grants(&self, digest: &Digest) -> Result<Vec<AccessGrant>>;
}
