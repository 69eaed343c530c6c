//! Storage-backed registry.

use crate::confirmation::{confirm, Confirmation};
use crate::errors::*;
use crate::{RegistrationRequest, Registry, VaultRegistry};
use async_trait::async_trait;
use cvault_files::{AccessGrant, Digest, RegistrationRecord};
use cvault_storage::Storage;
use cvault_types::{Clock, OwnerId, SystemClock};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry enforcing the vault rules over a [`Storage`] backend.
pub struct LedgerRegistry<S: ?Sized = dyn Storage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Storage + ?Sized> LedgerRegistry<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn now(&self) -> u64 {
        self.clock.now_secs()
    }

    pub fn record_count(&self) -> Result<u64> {
        Ok(self.storage.record_count()?)
    }

    /// Load a record and check that `caller` owns it.
    fn owned_record(&self, caller: &OwnerId, digest: &Digest) -> Result<RegistrationRecord> {
        let record = self
            .storage
            .get_record(digest)?
            .ok_or(RegistryError::NotFound { digest: *digest })?;
        if &record.owner != caller {
            return Err(RegistryError::NotOwner {
                caller: caller.clone(),
            });
        }
        Ok(record)
    }
}

#[async_trait]
impl<S: Storage + ?Sized> Registry for LedgerRegistry<S> {
    async fn exists(&self, digest: &Digest) -> Result<bool> {
        Ok(self.storage.get_record(digest)?.is_some())
    }

    async fn register(&self, request: RegistrationRequest) -> Result<Confirmation> {
        let now = self.now();
        let record = request.into_record(now);
        record.validate().map_err(RegistryError::InvalidInput)?;

        if !self.storage.insert_record(&record)? {
            debug!(digest = %record.digest.short(), "registration lost to an existing record");
            return Err(RegistryError::AlreadyExists {
                digest: record.digest,
            });
        }

        let owner = record.owner.to_string();
        let confirmation = confirm(
            self.storage.as_ref(),
            now,
            "register",
            &[
                record.digest.as_bytes(),
                record.locator.as_str().as_bytes(),
                owner.as_bytes(),
            ],
        )?;
        info!(
            digest = %record.digest.short(),
            locator = %record.locator.prefix(12),
            owner = %record.owner,
            tx = %confirmation.tx_id,
            "file registered"
        );
        Ok(confirmation)
    }

    async fn get(&self, digest: &Digest) -> Result<Option<RegistrationRecord>> {
        Ok(self.storage.get_record(digest)?)
    }
}

#[async_trait]
impl<S: Storage + ?Sized> VaultRegistry for LedgerRegistry<S> {
    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<RegistrationRecord>> {
        Ok(self.storage.list_records_by_owner(owner)?)
    }

    async fn remove(&self, caller: &OwnerId, digest: &Digest) -> Result<Confirmation> {
        self.owned_record(caller, digest)?;
        self.storage.remove_record(digest)?;
        let confirmation = confirm(
            self.storage.as_ref(),
            self.now(),
            "remove",
            &[digest.as_bytes()],
        )?;
        info!(digest = %digest.short(), "file removed");
        Ok(confirmation)
    }

    async fn transfer(
        &self,
        caller: &OwnerId,
        digest: &Digest,
        to: &OwnerId,
    ) -> Result<Confirmation> {
        if to == caller {
            return Err(RegistryError::CannotTransferToSelf);
        }
        // A concurrent remove or transfer makes the swap fail; reloading
        // turns that into NotFound or NotOwner.
        loop {
            let current = self.owned_record(caller, digest)?;
            let moved = RegistrationRecord {
                owner: to.clone(),
                ..current.clone()
            };
            if self.storage.replace_record(&current, &moved)? {
                break;
            }
            debug!(digest = %digest.short(), "record changed during transfer, reloading");
        }

        let to_text = to.to_string();
        let confirmation = confirm(
            self.storage.as_ref(),
            self.now(),
            "transfer",
            &[digest.as_bytes(), to_text.as_bytes()],
        )?;
        info!(digest = %digest.short(), from = %caller, to = %to, "file transferred");
        Ok(confirmation)
    }

    async fn grant_access(
        &self,
        caller: &OwnerId,
        digest: &Digest,
        grantee: &OwnerId,
        expires_at: u64,
    ) -> Result<Confirmation> {
        self.owned_record(caller, digest)?;
        if grantee == caller {
            return Err(RegistryError::CannotGrantToOwner);
        }
        let now = self.now();
        if expires_at <= now {
            return Err(RegistryError::InvalidExpiration { expires_at, now });
        }

        self.storage.put_grant(&AccessGrant {
            digest: *digest,
            grantee: grantee.clone(),
            expires_at,
            granted_at: now,
        })?;

        let grantee_text = grantee.to_string();
        let confirmation = confirm(
            self.storage.as_ref(),
            now,
            "grant_access",
            &[
                digest.as_bytes(),
                grantee_text.as_bytes(),
                &expires_at.to_be_bytes(),
            ],
        )?;
        info!(digest = %digest.short(), grantee = %grantee, expires_at, "access granted");
        Ok(confirmation)
    }

    async fn revoke_access(
        &self,
        caller: &OwnerId,
        digest: &Digest,
        grantee: &OwnerId,
    ) -> Result<Confirmation> {
        self.owned_record(caller, digest)?;
        if !self.storage.remove_grant(digest, grantee)? {
            return Err(RegistryError::NoExistingAccess {
                grantee: grantee.clone(),
            });
        }

        let grantee_text = grantee.to_string();
        let confirmation = confirm(
            self.storage.as_ref(),
            self.now(),
            "revoke_access",
            &[digest.as_bytes(), grantee_text.as_bytes()],
        )?;
        info!(digest = %digest.short(), grantee = %grantee, "access revoked");
        Ok(confirmation)
    }

    async fn has_access(&self, digest: &Digest, who: &OwnerId) -> Result<bool> {
        let record = self
            .storage
            .get_record(digest)?
            .ok_or(RegistryError::NotFound { digest: *digest })?;
        if &record.owner == who {
            return Ok(true);
        }
        let now = self.now();
        Ok(self
            .storage
            .get_grant(digest, who)?
            .map(|g| g.is_active(now))
            .unwrap_or(false))
    }

    async fn list_grants(&self, digest: &Digest) -> Result<Vec<AccessGrant>> {
        if self.storage.get_record(digest)?.is_none() {
            return Err(RegistryError::NotFound { digest: *digest });
        }
        let now = self.now();
        Ok(self
            .storage
            .list_grants(digest)?
            .into_iter()
            .filter(|g| g.is_active(now))
            .collect())
    }
}
