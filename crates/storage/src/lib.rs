use anyhow::Result;
use cvault_files::{AccessGrant, Digest, RegistrationRecord};
use cvault_types::OwnerId;
use serde::{Deserialize, Serialize};

mod memory;
mod sled_storage;

pub use memory::MemoryStorage;
pub use sled_storage::SledStorage;

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt value under key {0}")]
    Corrupt(String),
}

/// Ledger account (login identity for the upload backend)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: u64,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    /// University enrollment number; unique like the e-mail.
    pub enrollment: String,
    pub course: String,
    pub role: String,
}

impl UserAccount {
    pub fn owner_id(&self) -> OwnerId {
        OwnerId::Account(self.id)
    }
}

/// Account fields supplied at registration; the id is assigned by storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub enrollment: String,
    pub course: String,
    pub role: String,
}

impl NewUser {
    fn into_account(self, id: u64) -> UserAccount {
        UserAccount {
            id,
            email: normalize_email(&self.email),
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            enrollment: self.enrollment,
            course: self.course,
            role: self.role,
        }
    }
}

/// Upload history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEntry {
    pub id: u64,
    pub user_id: u64,
    pub file_name: String,
    pub size_bytes: u64,
    pub digest: Digest,
    pub category: String,
    pub local_locator: Option<String>,
    pub gateway_locator: Option<String>,
    pub gateway_ok: bool,
    /// Unix seconds.
    pub uploaded_at: u64,
}

/// Upload fields supplied by the caller; the id is assigned by storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUpload {
    pub user_id: u64,
    pub file_name: String,
    pub size_bytes: u64,
    pub digest: Digest,
    pub category: String,
    pub local_locator: Option<String>,
    pub gateway_locator: Option<String>,
    pub gateway_ok: bool,
    pub uploaded_at: u64,
}

impl NewUpload {
    fn into_entry(self, id: u64) -> UploadEntry {
        UploadEntry {
            id,
            user_id: self.user_id,
            file_name: self.file_name,
            size_bytes: self.size_bytes,
            digest: self.digest,
            category: self.category,
            local_locator: self.local_locator,
            gateway_locator: self.gateway_locator,
            gateway_ok: self.gateway_ok,
            uploaded_at: self.uploaded_at,
        }
    }
}

/// Role of a participant in the adoption registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// May list pets for adoption.
    Donor,
    /// May request adoptions.
    Adopter,
}

impl MemberRole {
    /// Numeric code used by the registration form (1 = donor, 2 = adopter).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(MemberRole::Donor),
            2 => Some(MemberRole::Adopter),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            MemberRole::Donor => 1,
            MemberRole::Adopter => 2,
        }
    }
}

/// Adoptable pet token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetToken {
    pub token_id: u64,
    pub owner: OwnerId,
    pub token_uri: String,
    /// Pending adoption request, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<OwnerId>,
    pub minted_at: u64,
}

/// Abstract storage trait
pub trait Storage: Send + Sync {
    /// Insert a record unless one exists for its digest. Returns `false` when
    /// the digest is already taken; the check and the write are atomic.
    fn insert_record(&self, record: &RegistrationRecord) -> Result<bool>;
    /// Swap `expected` for `record`, keeping the owner index in sync. Returns
    /// `false` without writing when the stored record is missing or differs
    /// from `expected`.
    fn replace_record(
        &self,
        expected: &RegistrationRecord,
        record: &RegistrationRecord,
    ) -> Result<bool>;
    fn get_record(&self, digest: &Digest) -> Result<Option<RegistrationRecord>>;
    /// Remove a record together with its grants.
    fn remove_record(&self, digest: &Digest) -> Result<Option<RegistrationRecord>>;
    /// Records owned by `owner`, newest first.
    fn list_records_by_owner(&self, owner: &OwnerId) -> Result<Vec<RegistrationRecord>>;
    fn record_count(&self) -> Result<u64>;

    fn put_grant(&self, grant: &AccessGrant) -> Result<()>;
    fn get_grant(&self, digest: &Digest, grantee: &OwnerId) -> Result<Option<AccessGrant>>;
    fn remove_grant(&self, digest: &Digest, grantee: &OwnerId) -> Result<bool>;
    fn list_grants(&self, digest: &Digest) -> Result<Vec<AccessGrant>>;

    /// Monotonic counter for write confirmations, starting at 1.
    fn next_sequence(&self) -> Result<u64>;

    /// Create an account. Returns `None` if the e-mail or enrollment number is
    /// already registered.
    fn create_user(&self, user: NewUser) -> Result<Option<UserAccount>>;
    fn get_user(&self, id: u64) -> Result<Option<UserAccount>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<UserAccount>>;

    fn append_upload(&self, upload: NewUpload) -> Result<UploadEntry>;
    /// Uploads of one account, newest first.
    fn list_uploads(&self, user_id: u64) -> Result<Vec<UploadEntry>>;

    fn put_member(&self, member: &OwnerId, role: MemberRole) -> Result<()>;
    fn get_member(&self, member: &OwnerId) -> Result<Option<MemberRole>>;

    /// Allocate the next token id (supply + 1) and store the token.
    fn mint_pet(&self, owner: &OwnerId, token_uri: &str, minted_at: u64) -> Result<PetToken>;
    /// Compare-and-swap on one token: writes `pet` only while the stored token
    /// still equals `expected`.
    fn replace_pet(&self, expected: &PetToken, pet: &PetToken) -> Result<bool>;
    fn get_pet(&self, token_id: u64) -> Result<Option<PetToken>>;
    fn pet_supply(&self) -> Result<u64>;
}

/// E-mails compare case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
