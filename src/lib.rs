//! # api-resilience
//!
//! Resilient outbound-HTTP configuration layer for third-party API
//! clients (canonically a code-hosting service's API): per-call timeouts,
//! bounded retries with exponential backoff, a bounded connection pool,
//! process-wide published timeout defaults, and a patching mechanism that
//! retrofits the timeout policy onto an already-designed client type
//! without modifying its source.
//!
//! ## Overview
//!
//! Enable the layer once at process start. This validates and builds the
//! timeout and retry policies, constructs the connection pool, publishes
//! the effective total timeout into the process environment for
//! cooperating libraries, and hands back the handle through which
//! client-type patches are installed:
//!
//! ```rust
//! use api_resilience::{Resilience, ResilienceOptions};
//!
//! # fn main() -> api_resilience::Result<()> {
//! let layer = Resilience::enable(&ResilienceOptions::default())?;
//! assert_eq!(layer.pool().max_connections(), 10);
//! # Ok(())
//! # }
//! ```
//!
//! Requests issued through the pool are retried per policy under one
//! total-timeout budget:
//!
//! ```rust,no_run
//! use api_resilience::Resilience;
//!
//! # async fn run() -> api_resilience::Result<()> {
//! let layer = Resilience::enable_default()?;
//! let client = reqwest::Client::new();
//! let request = client.get("https://api.example.com/repos").build()?;
//! let response = layer.pool().execute(request).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`policy`] | Timeout and retry policies (validated value objects) |
//! | [`pool`] | Bounded connection pool with per-request retry |
//! | [`publish`] | Process-wide published timeout defaults |
//! | [`patch`] | Timeout patching for third-party client types |
//! | [`options`] | Recognized configuration inputs with defaults |
//! | [`configure`] | The one-shot "enable resilience" entry point |

pub mod configure;
pub mod options;
pub mod patch;
pub mod policy;
pub mod pool;
pub mod publish;

// Re-export main types for convenience
pub use configure::{PatchOutcome, Resilience};
pub use options::ResilienceOptions;
pub use patch::{
    ClientConstructor, ClientPatcher, HostAdapter, PatchInstall, PatchPhase, TimeoutOptions,
};
pub use policy::{RetryPolicy, TimeoutPolicy};
pub use pool::{Connection, ConnectionPool};
pub use publish::EnvironmentPublisher;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
