//! Write confirmations.

use crate::errors::Result;
use cvault_storage::Storage;
use serde::{Deserialize, Serialize};

/// Proof that a registry write was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    /// `0x` + BLAKE3 over the operation, its arguments and the sequence.
    pub tx_id: String,
    pub sequence: u64,
    /// Unix seconds.
    pub recorded_at: u64,
}

impl Confirmation {
    pub fn derive(operation: &str, args: &[&[u8]], sequence: u64, recorded_at: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(operation.as_bytes());
        for arg in args {
            // Length-prefix each argument so boundaries are unambiguous.
            hasher.update(&(arg.len() as u64).to_le_bytes());
            hasher.update(arg);
        }
        hasher.update(&sequence.to_be_bytes());
        Self {
            tx_id: format!("0x{}", hasher.finalize().to_hex()),
            sequence,
            recorded_at,
        }
    }
}

/// Allocate the next sequence number and derive the confirmation for it.
pub(crate) fn confirm<S: Storage + ?Sized>(
    storage: &S,
    now: u64,
    operation: &str,
    args: &[&[u8]],
) -> Result<Confirmation> {
    let sequence = storage.next_sequence()?;
    Ok(Confirmation::derive(operation, args, sequence, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_id_depends_on_every_input() {
        let base = Confirmation::derive("register", &[b"a", b"b"], 1, 10);
        assert!(base.tx_id.starts_with("0x"));
        assert_eq!(base.tx_id.len(), 66);
        assert_eq!(base, Confirmation::derive("register", &[b"a", b"b"], 1, 10));
        assert_ne!(base.tx_id, Confirmation::derive("remove", &[b"a", b"b"], 1, 10).tx_id);
        assert_ne!(base.tx_id, Confirmation::derive("register", &[b"ab"], 1, 10).tx_id);
        assert_ne!(base.tx_id, Confirmation::derive("register", &[b"a", b"b"], 2, 10).tx_id);
    }
}
