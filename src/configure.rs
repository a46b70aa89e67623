//! The "enable resilience" entry point.
//!
//! Builds both policies from [`ResilienceOptions`], constructs the
//! connection pool, publishes the process-wide timeout defaults, and hands
//! back a [`Resilience`] handle through which client-type patches are
//! installed. Intended to run once at process start; the global variant
//! guards against repeat initialization.

use crate::options::ResilienceOptions;
use crate::patch::{ClientConstructor, ClientPatcher};
use crate::policy::{RetryPolicy, TimeoutPolicy};
use crate::pool::ConnectionPool;
use crate::publish::EnvironmentPublisher;
use crate::Result;
use once_cell::sync::OnceCell;

/// What happened to a patch-install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Installed,
    /// The patch was already in place; the request was a warned no-op.
    AlreadyInstalled,
    /// The collaborator library is absent; patching was skipped with a
    /// warning and the process continues unaffected.
    SkippedMissingDependency,
}

/// Configured resilience layer: validated policies plus the live pool.
#[derive(Clone)]
pub struct Resilience {
    timeouts: TimeoutPolicy,
    retry: RetryPolicy,
    pool: ConnectionPool,
}

static GLOBAL: OnceCell<Resilience> = OnceCell::new();

impl Resilience {
    /// Build the layer from validated options and publish the environment
    /// defaults.
    pub fn enable(options: &ResilienceOptions) -> Result<Self> {
        let timeouts = options.timeout_policy()?;
        let retry = options.retry_policy()?;
        let pool = ConnectionPool::build(timeouts.clone(), retry.clone(), options.max_connections)?;
        EnvironmentPublisher::new().publish(&timeouts);
        tracing::debug!(
            total_timeout_ms = timeouts.total().as_millis() as u64,
            max_attempts = retry.max_attempts(),
            max_connections = options.max_connections,
            "resilience layer enabled"
        );
        Ok(Self {
            timeouts,
            retry,
            pool,
        })
    }

    /// Like [`Resilience::enable`] with default options.
    pub fn enable_default() -> Result<Self> {
        Self::enable(&ResilienceOptions::default())
    }

    /// Process-global variant: the first call configures the layer, later
    /// calls get the existing instance back regardless of their options.
    pub fn enable_global(options: &ResilienceOptions) -> Result<&'static Self> {
        GLOBAL.get_or_try_init(|| Self::enable(options))
    }

    /// The globally enabled layer, if [`Resilience::enable_global`] ran.
    pub fn global() -> Option<&'static Self> {
        GLOBAL.get()
    }

    /// Install the timeout patch for client type `C`.
    ///
    /// The recoverable missing-collaborator condition is absorbed into a
    /// warning per the propagation policy; genuine failures (none are
    /// produced by installation today) would propagate.
    pub fn patch_client<C: ClientConstructor>(&self) -> Result<PatchOutcome> {
        // freshness is decided by install under its registry lock, so two
        // racing callers cannot both report Installed
        match ClientPatcher::install::<C>(&self.timeouts) {
            Ok(install) if install.is_fresh() => Ok(PatchOutcome::Installed),
            Ok(_) => Ok(PatchOutcome::AlreadyInstalled),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(library = C::LIBRARY, error = %e, "client patching skipped");
                Ok(PatchOutcome::SkippedMissingDependency)
            }
            Err(e) => Err(e),
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Shut the pool down; the policies and published defaults remain.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}
