//! Sled-backed storage.
//!
//! Every logical table is its own tree. Writes that must stay consistent
//! across trees (record + owner index, account + unique indexes, token +
//! supply counter) run as multi-tree transactions. Updates to an existing
//! record or token are compare-and-swap transactions.

use crate::{
    normalize_email, MemberRole, NewUpload, NewUser, PetToken, Storage, StorageError, UploadEntry,
    UserAccount,
};
use anyhow::{Context, Result};
use cvault_files::{AccessGrant, Digest, RegistrationRecord};
use cvault_types::OwnerId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{abort, ConflictableTransactionResult, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::debug;

const REGISTRY_SEQUENCE: &[u8] = b"registry_sequence";
const USER_SEQUENCE: &[u8] = b"user_sequence";
const UPLOAD_SEQUENCE: &[u8] = b"upload_sequence";
const PET_SUPPLY: &[u8] = b"pet_supply";

/// Sled-backed implementation
pub struct SledStorage {
    db: Db,
    records: Tree,
    records_by_owner: Tree,
    grants: Tree,
    users: Tree,
    users_by_email: Tree,
    users_by_enrollment: Tree,
    uploads: Tree,
    members: Tree,
    pets: Tree,
    metadata: Tree,
}

impl SledStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("opening sled database at {}", path.display()))?;
        debug!(path = %path.display(), recovered = db.was_recovered(), "opened sled database");
        Ok(Self {
            records: db.open_tree("records")?,
            records_by_owner: db.open_tree("records_by_owner")?,
            grants: db.open_tree("grants")?,
            users: db.open_tree("users")?,
            users_by_email: db.open_tree("users_by_email")?,
            users_by_enrollment: db.open_tree("users_by_enrollment")?,
            uploads: db.open_tree("uploads")?,
            members: db.open_tree("members")?,
            pets: db.open_tree("pets")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    pub fn flush(&self) -> Result<()> {
        let bytes = self.db.flush()?;
        debug!(bytes, "flushed sled database");
        Ok(())
    }

    fn bump(&self, key: &[u8]) -> Result<u64> {
        let value = self
            .metadata
            .update_and_fetch(key, increment)?
            .ok_or_else(|| StorageError::Corrupt(String::from_utf8_lossy(key).into_owned()))?;
        Ok(read_u64(&value))
    }

    fn read_counter(&self, key: &[u8]) -> Result<u64> {
        Ok(self.metadata.get(key)?.map(|v| read_u64(&v)).unwrap_or(0))
    }
}

fn increment(old: Option<&[u8]>) -> Option<Vec<u8>> {
    let next = old.map(read_u64).unwrap_or(0) + 1;
    Some(next.to_be_bytes().to_vec())
}

fn read_u64(bytes: &[u8]) -> u64 {
    bytes
        .try_into()
        .map(u64::from_be_bytes)
        .unwrap_or_default()
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e).into())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e).into())
}

/// `owner_key || registered_at (be) || digest`, so a prefix scan walks one
/// owner's records in registration order.
fn owner_index_key(record: &RegistrationRecord) -> Vec<u8> {
    let mut key = record.owner.to_key_bytes();
    key.extend_from_slice(&record.registered_at.to_be_bytes());
    key.extend_from_slice(record.digest.as_bytes());
    key
}

fn grant_key(digest: &Digest, grantee: &OwnerId) -> Vec<u8> {
    let mut key = digest.as_bytes().to_vec();
    key.extend_from_slice(&grantee.to_key_bytes());
    key
}

fn upload_key(user_id: u64, id: u64) -> Vec<u8> {
    let mut key = user_id.to_be_bytes().to_vec();
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn tx_counter(
    tree: &TransactionalTree,
    key: &[u8],
) -> ConflictableTransactionResult<u64, StorageError> {
    let next = tree.get(key)?.map(|v| read_u64(&v)).unwrap_or(0) + 1;
    tree.insert(key, &next.to_be_bytes()[..])?;
    Ok(next)
}

impl Storage for SledStorage {
    fn insert_record(&self, record: &RegistrationRecord) -> Result<bool> {
        let value = encode(record)?;
        let index_key = owner_index_key(record);
        let inserted = (&self.records, &self.records_by_owner).transaction(
            |(records, by_owner)| -> ConflictableTransactionResult<bool, StorageError> {
                if records.get(record.digest.as_bytes())?.is_some() {
                    return Ok(false);
                }
                records.insert(&record.digest.as_bytes()[..], value.clone())?;
                by_owner.insert(index_key.clone(), &record.digest.as_bytes()[..])?;
                Ok(true)
            },
        )?;
        Ok(inserted)
    }

    fn replace_record(
        &self,
        expected: &RegistrationRecord,
        record: &RegistrationRecord,
    ) -> Result<bool> {
        if record.digest != expected.digest {
            return Ok(false);
        }
        let value = encode(record)?;
        let index_key = owner_index_key(record);
        let replaced = (&self.records, &self.records_by_owner).transaction(
            |(records, by_owner)| -> ConflictableTransactionResult<bool, StorageError> {
                let Some(current) = records.get(expected.digest.as_bytes())? else {
                    return Ok(false);
                };
                let current: RegistrationRecord = match serde_json::from_slice(&current) {
                    Ok(current) => current,
                    Err(e) => return abort(StorageError::Serialization(e)),
                };
                if &current != expected {
                    return Ok(false);
                }
                by_owner.remove(owner_index_key(&current))?;
                records.insert(&record.digest.as_bytes()[..], value.clone())?;
                by_owner.insert(index_key.clone(), &record.digest.as_bytes()[..])?;
                Ok(true)
            },
        )?;
        Ok(replaced)
    }

    fn get_record(&self, digest: &Digest) -> Result<Option<RegistrationRecord>> {
        self.records
            .get(digest.as_bytes())?
            .map(|v| decode(&v))
            .transpose()
    }

    fn remove_record(&self, digest: &Digest) -> Result<Option<RegistrationRecord>> {
        let removed = (&self.records, &self.records_by_owner).transaction(
            |(records, by_owner)| -> ConflictableTransactionResult<Option<RegistrationRecord>, StorageError> {
                let Some(old) = records.remove(digest.as_bytes())? else {
                    return Ok(None);
                };
                let old: RegistrationRecord = match serde_json::from_slice(&old) {
                    Ok(old) => old,
                    Err(e) => return abort(StorageError::Serialization(e)),
                };
                by_owner.remove(owner_index_key(&old))?;
                Ok(Some(old))
            },
        )?;

        if removed.is_some() {
            let mut batch = sled::Batch::default();
            for item in self.grants.scan_prefix(digest.as_bytes()) {
                let (key, _) = item?;
                batch.remove(key);
            }
            self.grants.apply_batch(batch)?;
        }
        Ok(removed)
    }

    fn list_records_by_owner(&self, owner: &OwnerId) -> Result<Vec<RegistrationRecord>> {
        let mut out = Vec::new();
        for item in self.records_by_owner.scan_prefix(owner.to_key_bytes()).rev() {
            let (_, digest) = item?;
            if let Some(value) = self.records.get(&digest)? {
                out.push(decode(&value)?);
            }
        }
        Ok(out)
    }

    fn record_count(&self) -> Result<u64> {
        Ok(self.records.len() as u64)
    }

    fn put_grant(&self, grant: &AccessGrant) -> Result<()> {
        self.grants
            .insert(grant_key(&grant.digest, &grant.grantee), encode(grant)?)?;
        Ok(())
    }

    fn get_grant(&self, digest: &Digest, grantee: &OwnerId) -> Result<Option<AccessGrant>> {
        self.grants
            .get(grant_key(digest, grantee))?
            .map(|v| decode(&v))
            .transpose()
    }

    fn remove_grant(&self, digest: &Digest, grantee: &OwnerId) -> Result<bool> {
        Ok(self.grants.remove(grant_key(digest, grantee))?.is_some())
    }

    fn list_grants(&self, digest: &Digest) -> Result<Vec<AccessGrant>> {
        self.grants
            .scan_prefix(digest.as_bytes())
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    fn next_sequence(&self) -> Result<u64> {
        self.bump(REGISTRY_SEQUENCE)
    }

    fn create_user(&self, user: NewUser) -> Result<Option<UserAccount>> {
        let email = normalize_email(&user.email);
        let created = (
            &self.users,
            &self.users_by_email,
            &self.users_by_enrollment,
            &self.metadata,
        )
            .transaction(
                |(users, by_email, by_enrollment, metadata)| -> ConflictableTransactionResult<Option<UserAccount>, StorageError> {
                    if by_email.get(email.as_bytes())?.is_some()
                        || by_enrollment.get(user.enrollment.as_bytes())?.is_some()
                    {
                        return Ok(None);
                    }
                    let id = tx_counter(metadata, USER_SEQUENCE)?;
                    let account = user.clone().into_account(id);
                    let value = match serde_json::to_vec(&account) {
                        Ok(v) => v,
                        Err(e) => return abort(StorageError::Serialization(e)),
                    };
                    users.insert(&id.to_be_bytes()[..], value)?;
                    by_email.insert(email.as_bytes(), &id.to_be_bytes()[..])?;
                    by_enrollment.insert(user.enrollment.as_bytes(), &id.to_be_bytes()[..])?;
                    Ok(Some(account))
                },
            )?;
        Ok(created)
    }

    fn get_user(&self, id: u64) -> Result<Option<UserAccount>> {
        self.users
            .get(id.to_be_bytes())?
            .map(|v| decode(&v))
            .transpose()
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
        match self.users_by_email.get(normalize_email(email).as_bytes())? {
            Some(id) => self.get_user(read_u64(&id)),
            None => Ok(None),
        }
    }

    fn append_upload(&self, upload: NewUpload) -> Result<UploadEntry> {
        let id = self.bump(UPLOAD_SEQUENCE)?;
        let entry = upload.into_entry(id);
        self.uploads
            .insert(upload_key(entry.user_id, id), encode(&entry)?)?;
        Ok(entry)
    }

    fn list_uploads(&self, user_id: u64) -> Result<Vec<UploadEntry>> {
        self.uploads
            .scan_prefix(user_id.to_be_bytes())
            .rev()
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    fn put_member(&self, member: &OwnerId, role: MemberRole) -> Result<()> {
        self.members.insert(member.to_key_bytes(), &[role.code()][..])?;
        Ok(())
    }

    fn get_member(&self, member: &OwnerId) -> Result<Option<MemberRole>> {
        Ok(self
            .members
            .get(member.to_key_bytes())?
            .and_then(|v| v.first().copied())
            .and_then(MemberRole::from_code))
    }

    fn mint_pet(&self, owner: &OwnerId, token_uri: &str, minted_at: u64) -> Result<PetToken> {
        let pet = (&self.pets, &self.metadata).transaction(
            |(pets, metadata)| -> ConflictableTransactionResult<PetToken, StorageError> {
                let token_id = tx_counter(metadata, PET_SUPPLY)?;
                let pet = PetToken {
                    token_id,
                    owner: owner.clone(),
                    token_uri: token_uri.to_string(),
                    requester: None,
                    minted_at,
                };
                let value = match serde_json::to_vec(&pet) {
                    Ok(v) => v,
                    Err(e) => return abort(StorageError::Serialization(e)),
                };
                pets.insert(&token_id.to_be_bytes()[..], value)?;
                Ok(pet)
            },
        )?;
        Ok(pet)
    }

    fn replace_pet(&self, expected: &PetToken, pet: &PetToken) -> Result<bool> {
        if pet.token_id != expected.token_id {
            return Ok(false);
        }
        let key = expected.token_id.to_be_bytes();
        let value = encode(pet)?;
        let replaced = self.pets.transaction(
            |pets| -> ConflictableTransactionResult<bool, StorageError> {
                let Some(current) = pets.get(key)? else {
                    return Ok(false);
                };
                let current: PetToken = match serde_json::from_slice(&current) {
                    Ok(current) => current,
                    Err(e) => return abort(StorageError::Serialization(e)),
                };
                if &current != expected {
                    return Ok(false);
                }
                pets.insert(&key[..], value.clone())?;
                Ok(true)
            },
        )?;
        Ok(replaced)
    }

    fn get_pet(&self, token_id: u64) -> Result<Option<PetToken>> {
        self.pets
            .get(token_id.to_be_bytes())?
            .map(|v| decode(&v))
            .transpose()
    }

    fn pet_supply(&self) -> Result<u64> {
        self.read_counter(PET_SUPPLY)
    }
}
