//! Record data model for content-addressed files.

use cvault_types::OwnerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors produced when parsing a digest from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    #[error("digest hex must be 64 characters, got {0}")]
    InvalidLength(usize),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// Content fingerprint (32 bytes) used as the registry's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// `0x`-prefixed form, as a `bytes32` contract argument.
    pub fn to_bytes32(&self) -> String {
        format!("0x{}", self.to_hex())
    }

    /// Parse from hex string; an optional `0x` prefix is accepted.
    pub fn from_hex(hex_str: &str) -> Result<Self, DigestError> {
        let trimmed = hex_str.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if body.len() != 64 {
            return Err(DigestError::InvalidLength(body.len()));
        }
        let mut arr = [0u8; 32];
        hex::decode_to_slice(body, &mut arr).map_err(|e| DigestError::InvalidHex(e.to_string()))?;
        Ok(Self(arr))
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bytes32())
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.to_bytes32()
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

/// Errors produced when building a locator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocatorError {
    #[error("locator cannot be empty")]
    Empty,
    #[error("locator too long ({0} bytes, max 512)")]
    TooLong(usize),
}

/// Opaque identifier an object store returns for stored bytes.
///
/// The vault never interprets the value; it only carries it between the
/// store and the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator(String);

impl Locator {
    pub const MAX_LEN: usize = 512;

    pub fn new(value: impl Into<String>) -> Result<Self, LocatorError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(LocatorError::Empty);
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(LocatorError::TooLong(trimmed.len()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `n` characters, for short display.
    pub fn prefix(&self, n: usize) -> &str {
        match self.0.char_indices().nth(n) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Locator> for String {
    fn from(value: Locator) -> Self {
        value.0
    }
}

impl TryFrom<String> for Locator {
    type Error = LocatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Registration record: one per digest, owned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    /// Content digest (primary key).
    pub digest: Digest,

    /// Where the bytes live in the object store.
    pub locator: Locator,

    /// Current owner.
    pub owner: OwnerId,

    /// Registration time (unix seconds).
    pub registered_at: u64,

    /// File size in bytes.
    pub size_bytes: u64,

    /// Optional MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Optional original file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl RegistrationRecord {
    /// Validate the record fields.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(mime) = &self.mime_type {
            if mime.len() > 128 {
                return Err("MIME type too long (max 128 chars)".to_string());
            }
        }

        if let Some(name) = &self.file_name {
            if name.is_empty() || name.len() > 255 {
                return Err("File name must be 1-255 characters".to_string());
            }
        }

        Ok(())
    }
}

/// Time-limited read access to a record for a grantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub digest: Digest,
    pub grantee: OwnerId,
    /// Unix seconds after which the grant no longer applies.
    pub expires_at: u64,
    pub granted_at: u64,
}

impl AccessGrant {
    pub fn is_active(&self, now: u64) -> bool {
        self.expires_at > now
    }
}
