use crate::{Error, ErrorContext, Result};
use reqwest::{Method, StatusCode};
use std::collections::HashSet;
use std::time::Duration;

/// Ceiling on any single backoff sleep, matching the cap upstream HTTP
/// libraries apply so a high backoff factor cannot produce unbounded waits.
pub const BACKOFF_CEILING: Duration = Duration::from_secs(120);

/// Status codes retried by default: rate limiting and transient 5xx.
pub const DEFAULT_RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Retry behavior for requests issued through the pool.
///
/// A response is retried only when its status code and its request method
/// are both retryable and attempts remain. The default method set contains
/// every standard verb, including POST and PATCH; the canonical upstream
/// (a code-hosting API) deduplicates mutating calls on its side. Callers
/// talking to stricter services should use
/// [`RetryPolicy::idempotent_methods_only`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_factor: f64,
    retryable_status: HashSet<u16>,
    retryable_methods: HashSet<Method>,
    respect_retry_after: bool,
}

fn all_standard_methods() -> HashSet<Method> {
    [
        Method::HEAD,
        Method::GET,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
        Method::TRACE,
        Method::POST,
        Method::PATCH,
    ]
    .into_iter()
    .collect()
}

impl RetryPolicy {
    /// Build a policy with the given retry budget.
    ///
    /// `max_attempts` counts retries only: a permanently failing request is
    /// attempted `max_attempts + 1` times in total. `backoff_factor` must be
    /// finite and non-negative; the sleep before retry *k* (1-indexed) is
    /// `backoff_factor * 2^(k-1)` seconds, capped at [`BACKOFF_CEILING`].
    pub fn new(max_attempts: u32, backoff_factor: f64) -> Result<Self> {
        if !backoff_factor.is_finite() || backoff_factor < 0.0 {
            return Err(Error::configuration_with_context(
                "backoff factor must be finite and non-negative",
                ErrorContext::new()
                    .with_field_path("retry.backoff_factor")
                    .with_details(format!("got {}", backoff_factor)),
            ));
        }
        Ok(Self {
            max_attempts,
            backoff_factor,
            retryable_status: DEFAULT_RETRYABLE_STATUS.into_iter().collect(),
            retryable_methods: all_standard_methods(),
            respect_retry_after: true,
        })
    }

    /// Replace the retryable status code set.
    pub fn with_retryable_status(mut self, status: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status = status.into_iter().collect();
        self
    }

    /// Replace the retryable method set.
    pub fn with_retryable_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.retryable_methods = methods.into_iter().collect();
        self
    }

    /// Restrict retries to idempotent verbs (HEAD, GET, PUT, DELETE,
    /// OPTIONS, TRACE).
    pub fn idempotent_methods_only(mut self) -> Self {
        self.retryable_methods = [
            Method::HEAD,
            Method::GET,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::TRACE,
        ]
        .into_iter()
        .collect();
        self
    }

    /// Whether a server-provided `Retry-After` overrides the computed
    /// backoff (on by default).
    pub fn with_respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.retryable_status.contains(&status.as_u16())
    }

    pub fn is_retryable_method(&self, method: &Method) -> bool {
        self.retryable_methods.contains(method)
    }

    /// Retry decision for a status-driven failure.
    pub fn should_retry(&self, method: &Method, status: StatusCode, attempts_made: u32) -> bool {
        attempts_made <= self.max_attempts
            && self.is_retryable_status(status)
            && self.is_retryable_method(method)
    }

    /// Sleep before retry `retry_index` (1-indexed).
    ///
    /// A `Retry-After` hint from the server takes precedence when the
    /// policy respects it; both paths are capped at [`BACKOFF_CEILING`].
    pub fn backoff_delay(&self, retry_index: u32, retry_after: Option<Duration>) -> Duration {
        if self.respect_retry_after {
            if let Some(hint) = retry_after {
                return hint.min(BACKOFF_CEILING);
            }
        }
        let exponent = retry_index.saturating_sub(1).min(63) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);
        let capped = secs.min(BACKOFF_CEILING.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

impl Default for RetryPolicy {
    /// 10 retries with backoff factor 2 against the default status set.
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_factor: 2.0,
            retryable_status: DEFAULT_RETRYABLE_STATUS.into_iter().collect(),
            retryable_methods: all_standard_methods(),
            respect_retry_after: true,
        }
    }
}
