//! Recognized configuration inputs.
//!
//! Hosts usually carry these values in their own config files, so the
//! struct is serde-deserializable; field defaults match what the layer
//! ships with when nothing is configured.

use crate::policy::{retry::DEFAULT_RETRYABLE_STATUS, RetryPolicy, TimeoutPolicy};
use crate::{Error, ErrorContext, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};

/// Default bound on concurrently leased connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// All recognized resilience options with their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceOptions {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub total_timeout_ms: u64,
    /// Signed on purpose so negative or oversized config values are
    /// rejected with a configuration error instead of silently wrapping.
    pub max_attempts: i64,
    pub backoff_factor: f64,
    pub retryable_status: Vec<u16>,
    /// Method names, case-insensitive. Defaults to every standard verb.
    pub retryable_methods: Vec<String>,
    pub max_connections: usize,
    pub respect_retry_after: bool,
}

impl Default for ResilienceOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 60_000,
            read_timeout_ms: 60_000,
            total_timeout_ms: 120_000,
            max_attempts: 10,
            backoff_factor: 2.0,
            retryable_status: DEFAULT_RETRYABLE_STATUS.to_vec(),
            retryable_methods: [
                "HEAD", "GET", "PUT", "DELETE", "OPTIONS", "TRACE", "POST", "PATCH",
            ]
            .map(String::from)
            .to_vec(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            respect_retry_after: true,
        }
    }
}

impl ResilienceOptions {
    /// Validate and build the timeout policy.
    pub fn timeout_policy(&self) -> Result<TimeoutPolicy> {
        TimeoutPolicy::from_millis(
            self.connect_timeout_ms,
            self.read_timeout_ms,
            self.total_timeout_ms,
        )
    }

    /// Validate and build the retry policy.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let max_attempts = u32::try_from(self.max_attempts).map_err(|_| {
            Error::configuration_with_context(
                "max_attempts must be a non-negative value that fits in 32 bits",
                ErrorContext::new()
                    .with_field_path("retry.max_attempts")
                    .with_details(format!("got {}", self.max_attempts)),
            )
        })?;
        let mut methods = Vec::with_capacity(self.retryable_methods.len());
        for name in &self.retryable_methods {
            let method = Method::from_bytes(name.to_uppercase().as_bytes()).map_err(|_| {
                Error::configuration_with_context(
                    "unrecognized HTTP method",
                    ErrorContext::new()
                        .with_field_path("retry.retryable_methods")
                        .with_details(name.clone()),
                )
            })?;
            methods.push(method);
        }
        Ok(RetryPolicy::new(max_attempts, self.backoff_factor)?
            .with_retryable_status(self.retryable_status.iter().copied())
            .with_retryable_methods(methods)
            .with_respect_retry_after(self.respect_retry_after))
    }
}
