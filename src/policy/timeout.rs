use crate::{Error, ErrorContext, Result};
use std::time::Duration;

/// Connect/read/total timeout triple for outbound calls.
///
/// Immutable once constructed. `total` bounds the whole request including
/// retries and backoff sleeps; `connect` and `read` bound each individual
/// attempt on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    connect: Duration,
    read: Duration,
    total: Duration,
}

impl TimeoutPolicy {
    /// Build a policy from millisecond values.
    ///
    /// All values must be positive and `total_ms` must be at least
    /// `max(connect_ms, read_ms)`.
    pub fn from_millis(connect_ms: u64, read_ms: u64, total_ms: u64) -> Result<Self> {
        if connect_ms == 0 || read_ms == 0 || total_ms == 0 {
            return Err(Error::configuration_with_context(
                "timeout values must be positive",
                ErrorContext::new().with_details(format!(
                    "connect={}, read={}, total={}",
                    connect_ms, read_ms, total_ms
                )),
            ));
        }
        if total_ms < connect_ms.max(read_ms) {
            return Err(Error::configuration_with_context(
                "total timeout must not be smaller than connect or read timeout",
                ErrorContext::new()
                    .with_field_path("timeouts.total_timeout_ms")
                    .with_details(format!(
                        "total={}, connect={}, read={}",
                        total_ms, connect_ms, read_ms
                    )),
            ));
        }
        Ok(Self {
            connect: Duration::from_millis(connect_ms),
            read: Duration::from_millis(read_ms),
            total: Duration::from_millis(total_ms),
        })
    }

    pub fn connect(&self) -> Duration {
        self.connect
    }

    pub fn read(&self) -> Duration {
        self.read
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Total timeout rounded to whole seconds, at least 1.
    ///
    /// This is the value published to the process environment for
    /// cooperating libraries that only understand second granularity.
    pub fn total_secs_rounded(&self) -> u64 {
        let ms = self.total.as_millis() as u64;
        ((ms + 500) / 1000).max(1)
    }
}

impl Default for TimeoutPolicy {
    /// 60 s connect, 60 s read, 120 s total.
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(60),
            read: Duration::from_secs(60),
            total: Duration::from_secs(120),
        }
    }
}
