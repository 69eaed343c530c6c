//! Grant expiry arithmetic.

use crate::errors::{RegistryError, Result};
use serde::{Deserialize, Serialize};

/// Extra seconds added to every expiry so a grant issued "for N hours" is
/// still in the future when it reaches the registry.
pub const DEFAULT_GRANT_MARGIN_SECS: u64 = 300;
pub const MIN_GRANT_HOURS: u64 = 1;
pub const MAX_GRANT_HOURS: u64 = 720;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantPolicy {
    pub margin_secs: u64,
}

impl Default for GrantPolicy {
    fn default() -> Self {
        Self {
            margin_secs: DEFAULT_GRANT_MARGIN_SECS,
        }
    }
}

impl GrantPolicy {
    pub fn new(margin_secs: u64) -> Self {
        Self { margin_secs }
    }

    /// Expiry for a grant of `hours` starting at `now`.
    pub fn expiration(&self, now: u64, hours: u64) -> Result<u64> {
        validate_hours(hours)?;
        Ok(expiration_from_now(now, hours, self.margin_secs))
    }
}

pub fn validate_hours(hours: u64) -> Result<()> {
    if !(MIN_GRANT_HOURS..=MAX_GRANT_HOURS).contains(&hours) {
        return Err(RegistryError::InvalidInput(format!(
            "duration must be between {MIN_GRANT_HOURS} and {MAX_GRANT_HOURS} hours, got {hours}"
        )));
    }
    Ok(())
}

/// `now + hours * 3600 + margin`, saturating.
pub fn expiration_from_now(now: u64, hours: u64, margin_secs: u64) -> u64 {
    now.saturating_add(hours.saturating_mul(3600))
        .saturating_add(margin_secs)
}
