//! Hash functions for cvault
//!
//! Every digest in the vault is 32 bytes. SHA-256 is the default because the
//! upstream registries key records by it; BLAKE3 and Keccak-256 are available
//! for stores that address content differently.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/// Size of the read buffer used when hashing streams.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Trait for hash functions
pub trait HashFunction {
    /// Hash input data and return a fixed-size array
    fn hash_fixed(&self, data: &[u8]) -> [u8; 32];

    /// Get the name of the hash function
    fn name(&self) -> &'static str;
}

/// Blake3 hash implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3;

impl HashFunction for Blake3 {
    fn hash_fixed(&self, data: &[u8]) -> [u8; 32] {
        *blake3::hash(data).as_bytes()
    }

    fn name(&self) -> &'static str {
        "blake3"
    }
}

/// SHA256 hash implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SHA256;

impl HashFunction for SHA256 {
    fn hash_fixed(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = sha2::Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    fn name(&self) -> &'static str {
        "sha256"
    }
}

/// Keccak256 hash implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak256;

impl HashFunction for Keccak256 {
    fn hash_fixed(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = sha3::Keccak256::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    fn name(&self) -> &'static str {
        "keccak256"
    }
}

/// Hash function type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    #[default]
    Sha256,
    Blake3,
    Keccak256,
}

impl HashType {
    /// Create a hash function instance
    pub fn create_instance(&self) -> Box<dyn HashFunction + Send + Sync> {
        match self {
            HashType::Sha256 => Box::new(SHA256),
            HashType::Blake3 => Box::new(Blake3),
            HashType::Keccak256 => Box::new(Keccak256),
        }
    }

    /// One-shot digest of an in-memory buffer.
    pub fn digest(&self, data: &[u8]) -> [u8; 32] {
        match self {
            HashType::Sha256 => SHA256.hash_fixed(data),
            HashType::Blake3 => Blake3.hash_fixed(data),
            HashType::Keccak256 => Keccak256.hash_fixed(data),
        }
    }

    /// Digest everything a reader yields, in fixed-size chunks.
    pub fn digest_reader<R: Read>(&self, mut reader: R) -> std::io::Result<[u8; 32]> {
        let mut hasher = IncrementalHasher::new(*self);
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(hasher.finalize())
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashType::Sha256 => "sha256",
            HashType::Blake3 => "blake3",
            HashType::Keccak256 => "keccak256",
        }
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashType {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashType::Sha256),
            "blake3" => Ok(HashType::Blake3),
            "keccak256" | "keccak-256" => Ok(HashType::Keccak256),
            _ => Err(anyhow::anyhow!("Unknown hash function: {}", name)),
        }
    }
}

/// Hasher that accepts input in pieces.
pub struct IncrementalHasher {
    state: IncrementalState,
}

enum IncrementalState {
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
    Keccak256(sha3::Keccak256),
}

impl IncrementalHasher {
    pub fn new(hash_type: HashType) -> Self {
        let state = match hash_type {
            HashType::Sha256 => IncrementalState::Sha256(sha2::Sha256::new()),
            HashType::Blake3 => IncrementalState::Blake3(Box::new(blake3::Hasher::new())),
            HashType::Keccak256 => IncrementalState::Keccak256(sha3::Keccak256::new()),
        };
        Self { state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            IncrementalState::Sha256(h) => h.update(data),
            IncrementalState::Blake3(h) => {
                h.update(data);
            }
            IncrementalState::Keccak256(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> [u8; 32] {
        match self.state {
            IncrementalState::Sha256(h) => h.finalize().into(),
            IncrementalState::Blake3(h) => *h.finalize().as_bytes(),
            IncrementalState::Keccak256(h) => h.finalize().into(),
        }
    }
}
