use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors that can occur when parsing an owner identity string.
#[derive(Debug, thiserror::Error)]
pub enum OwnerError {
    #[error("owner must start with '0x' or 'acct:'")]
    InvalidPrefix,
    #[error("wallet address must be {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("wallet address payload is not valid hexadecimal")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("account id is not a valid number: {0}")]
    InvalidAccountId(String),
}

/// Number of raw bytes contained in a wallet address.
pub const WALLET_ADDRESS_BYTES: usize = 20;
/// Expected string length of an encoded wallet address (`0x` + 40 hex chars).
pub const WALLET_ADDRESS_STRING_LENGTH: usize = 2 + WALLET_ADDRESS_BYTES * 2;

const ACCOUNT_PREFIX: &str = "acct:";

/// Encode a 20-byte wallet address as lowercase `0x`-prefixed hex.
pub fn encode_wallet_address(bytes: &[u8; WALLET_ADDRESS_BYTES]) -> String {
    let mut encoded = String::with_capacity(WALLET_ADDRESS_STRING_LENGTH);
    encoded.push_str("0x");
    encoded.push_str(&hex::encode(bytes));
    encoded
}

/// Decode a `0x`-prefixed wallet address. Hex digits are accepted in any case.
pub fn decode_wallet_address(address: &str) -> Result<[u8; WALLET_ADDRESS_BYTES], OwnerError> {
    let payload = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or(OwnerError::InvalidPrefix)?;

    if address.len() != WALLET_ADDRESS_STRING_LENGTH {
        return Err(OwnerError::InvalidLength {
            expected: WALLET_ADDRESS_STRING_LENGTH,
            actual: address.len(),
        });
    }

    let mut bytes = [0u8; WALLET_ADDRESS_BYTES];
    hex::decode_to_slice(payload, &mut bytes)?;
    Ok(bytes)
}

/// Check whether the provided string is a valid wallet address.
pub fn is_valid_wallet_address(address: &str) -> bool {
    decode_wallet_address(address).is_ok()
}

/// Identity that owns registry records.
///
/// Wallet identities come from a signing key; account identities come from an
/// authenticated ledger session. Both serialise as strings in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OwnerId {
    Wallet([u8; WALLET_ADDRESS_BYTES]),
    Account(u64),
}

impl OwnerId {
    /// Stable byte encoding used for storage keys and hashing.
    pub fn to_key_bytes(&self) -> Vec<u8> {
        match self {
            OwnerId::Wallet(bytes) => {
                let mut key = Vec::with_capacity(1 + WALLET_ADDRESS_BYTES);
                key.push(0x01);
                key.extend_from_slice(bytes);
                key
            }
            OwnerId::Account(id) => {
                let mut key = Vec::with_capacity(9);
                key.push(0x02);
                key.extend_from_slice(&id.to_be_bytes());
                key
            }
        }
    }

    pub fn is_wallet(&self) -> bool {
        matches!(self, OwnerId::Wallet(_))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerId::Wallet(bytes) => f.write_str(&encode_wallet_address(bytes)),
            OwnerId::Account(id) => write!(f, "{ACCOUNT_PREFIX}{id}"),
        }
    }
}

impl FromStr for OwnerId {
    type Err = OwnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(id) = s.strip_prefix(ACCOUNT_PREFIX) {
            return id
                .parse::<u64>()
                .map(OwnerId::Account)
                .map_err(|_| OwnerError::InvalidAccountId(id.to_string()));
        }
        decode_wallet_address(s).map(OwnerId::Wallet)
    }
}

impl From<OwnerId> for String {
    fn from(value: OwnerId) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for OwnerId {
    type Error = OwnerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
