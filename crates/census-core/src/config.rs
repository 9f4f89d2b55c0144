use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of the registration pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on a single proof verification.
    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,
    /// Upper bound on a single ledger write.
    #[serde(default = "default_ledger_timeout_ms")]
    pub ledger_timeout_ms: u64,
    /// Accepted distance between the proof timestamp and the server clock.
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: i64,
    /// Require an Ed25519 signature over each submission.
    #[serde(default = "default_true")]
    pub verify_signatures: bool,
}

/// When the accumulator root is written back to the census record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationPolicy {
    /// Publish once this many accepted registrations are unpublished.
    #[serde(default = "default_max_pending_registrations")]
    pub max_pending_registrations: u64,
    /// Publish once the oldest unpublished registration is this old.
    #[serde(default = "default_max_staleness_secs")]
    pub max_staleness_secs: u64,
}

fn default_verify_timeout_ms() -> u64 {
    60_000
}
fn default_ledger_timeout_ms() -> u64 {
    5_000
}
fn default_max_clock_skew_secs() -> i64 {
    300
}
fn default_true() -> bool {
    true
}
fn default_max_pending_registrations() -> u64 {
    16
}
fn default_max_staleness_secs() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verify_timeout_ms: default_verify_timeout_ms(),
            ledger_timeout_ms: default_ledger_timeout_ms(),
            max_clock_skew_secs: default_max_clock_skew_secs(),
            verify_signatures: true,
        }
    }
}

impl PipelineConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }
}

impl Default for PublicationPolicy {
    fn default() -> Self {
        Self {
            max_pending_registrations: default_max_pending_registrations(),
            max_staleness_secs: default_max_staleness_secs(),
        }
    }
}

impl PublicationPolicy {
    pub fn max_staleness(&self) -> Duration {
        Duration::from_secs(self.max_staleness_secs)
    }

    /// Whether a census with `pending` unpublished leaves, the oldest of which
    /// has waited `oldest_age`, is due for publication.
    pub fn is_due(&self, pending: u64, oldest_age: Duration) -> bool {
        if pending == 0 {
            return false;
        }
        pending >= self.max_pending_registrations.max(1) || oldest_age >= self.max_staleness()
    }
}
