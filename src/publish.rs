//! Process-wide published timeout defaults.
//!
//! Some cooperating client libraries read global defaults from the
//! environment at call time instead of accepting an injected policy. This
//! module is the one intentional piece of process-wide mutable state in
//! the layer: two named slots carrying the effective total timeout in
//! whole seconds. Set once at startup; last writer wins; values persist
//! for the process lifetime or until re-published.

use crate::policy::TimeoutPolicy;
use std::env;
use std::time::Duration;

/// Primary slot consulted by cooperating HTTP layers.
pub const HTTP_TIMEOUT_ENV: &str = "API_HTTP_TIMEOUT_SECS";

/// Coarser fallback slot, checked when the primary is unset.
pub const TIMEOUT_ENV: &str = "API_TIMEOUT_SECS";

/// Publisher for the environment-visible timeout default.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentPublisher;

impl EnvironmentPublisher {
    pub fn new() -> Self {
        Self
    }

    /// Write the policy's total timeout (seconds, rounded, minimum 1) into
    /// both slots. Idempotent; re-publishing overwrites.
    pub fn publish(&self, timeouts: &TimeoutPolicy) {
        let secs = timeouts.total_secs_rounded().to_string();
        env::set_var(HTTP_TIMEOUT_ENV, &secs);
        env::set_var(TIMEOUT_ENV, &secs);
        tracing::debug!(
            timeout_secs = %secs,
            primary = HTTP_TIMEOUT_ENV,
            fallback = TIMEOUT_ENV,
            "published process-wide timeout default"
        );
    }

    /// Read back the published default, primary slot first.
    ///
    /// Returns `None` when neither slot holds a positive integer.
    pub fn published_timeout(&self) -> Option<Duration> {
        [HTTP_TIMEOUT_ENV, TIMEOUT_ENV]
            .iter()
            .filter_map(|slot| env::var(slot).ok())
            .filter_map(|s| s.trim().parse::<u64>().ok())
            .find(|&secs| secs > 0)
            .map(Duration::from_secs)
    }
}

/// Serializes tests that touch the process environment. The slots are
/// process-global, so concurrent test threads would otherwise interleave.
#[cfg(test)]
pub(crate) static ENV_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
