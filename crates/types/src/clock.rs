use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in unix seconds.
///
/// Registries and session tokens read time through this trait so tests can
/// pin it.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        unix_now_secs()
    }
}

/// Manually driven clock for tests and replay.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<RwLock<u64>>,
}

impl ManualClock {
    pub fn new(start_secs: u64) -> Self {
        Self {
            now: Arc::new(RwLock::new(start_secs)),
        }
    }

    pub fn set(&self, secs: u64) {
        *self.now.write() = secs;
    }

    pub fn advance(&self, secs: u64) {
        let mut now = self.now.write();
        *now = now.saturating_add(secs);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        *self.now.read()
    }
}

/// Current unix time in seconds; zero if the system clock is before the epoch.
pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_secs())
        .unwrap_or_default()
}

/// Render unix seconds as an RFC 3339 UTC timestamp.
pub fn format_unix_secs(secs: u64) -> String {
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
