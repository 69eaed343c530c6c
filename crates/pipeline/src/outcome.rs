use crate::stage::Stage;
use cvault_files::{Digest, Locator};
use cvault_registry::Confirmation;
use cvault_types::OwnerId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of asking the registry whether a digest is already registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum DuplicateCheck {
    Absent,
    Present,
    /// The registry could not be read. The submission continues and the
    /// registration step has the final word.
    Unknown(String),
}

/// A successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub digest: Digest,
    pub locator: Locator,
    pub owner: OwnerId,
    pub confirmation: Confirmation,
    pub duplicate_check: DuplicateCheck,
}

impl Receipt {
    pub fn with_duplicate_check(mut self, check: DuplicateCheck) -> Self {
        self.duplicate_check = check;
        self
    }
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "digest={} locator={} tx={}",
            self.digest, self.locator, self.confirmation.tx_id
        )
    }
}

/// Build the caller-facing receipt.
pub fn present(
    digest: Digest,
    locator: Locator,
    confirmation: Confirmation,
    owner: OwnerId,
) -> Receipt {
    Receipt {
        digest,
        locator,
        owner,
        confirmation,
        duplicate_check: DuplicateCheck::Absent,
    }
}

/// The digest was already registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub digest: Digest,
    /// `Checking` when the pre-check saw the record, `Registering` when
    /// another writer won the race after our upload.
    pub detected_at: Stage,
    /// Bytes uploaded by this submission that no record points to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphaned_locator: Option<Locator>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "digest={} already registered", self.digest)?;
        if let Some(locator) = &self.orphaned_locator {
            write!(f, " (orphaned upload {locator})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubmitOutcome {
    Registered(Receipt),
    Conflict(Conflict),
}

impl SubmitOutcome {
    pub fn digest(&self) -> Digest {
        match self {
            SubmitOutcome::Registered(r) => r.digest,
            SubmitOutcome::Conflict(c) => c.digest,
        }
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        match self {
            SubmitOutcome::Registered(r) => Some(r),
            SubmitOutcome::Conflict(_) => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SubmitOutcome::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_display() {
        let confirmation = Confirmation::derive("register", &[b"x"], 1, 0);
        let receipt = present(
            Digest::from_bytes([0xab; 32]),
            Locator::new("fid42").unwrap(),
            confirmation.clone(),
            OwnerId::Account(1),
        );
        assert_eq!(
            receipt.to_string(),
            format!(
                "digest=0x{} locator=fid42 tx={}",
                "ab".repeat(32),
                confirmation.tx_id
            )
        );
        assert_eq!(receipt.duplicate_check, DuplicateCheck::Absent);
    }

    #[test]
    fn outcome_json_is_tagged() {
        let conflict = SubmitOutcome::Conflict(Conflict {
            digest: Digest::from_bytes([1; 32]),
            detected_at: Stage::Checking,
            orphaned_locator: None,
        });
        let value = serde_json::to_value(&conflict).unwrap();
        assert_eq!(value["status"], "conflict");
        assert_eq!(value["detected_at"], "checking");

        let unknown = serde_json::to_value(DuplicateCheck::Unknown("timeout".into())).unwrap();
        assert_eq!(unknown["state"], "unknown");
        assert_eq!(unknown["reason"], "timeout");
    }
}
