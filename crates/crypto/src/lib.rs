//! Cryptographic primitives for cvault.
//!
//! Content digests, password hashing for ledger accounts, and MAC-signed
//! session tokens.

pub mod hash_functions;
pub mod password;
pub mod session;

pub use hash_functions::{Blake3, HashFunction, HashType, IncrementalHasher, Keccak256, SHA256};
pub use password::PasswordHasher;
pub use session::{SessionClaims, SessionSigner, TokenError};
