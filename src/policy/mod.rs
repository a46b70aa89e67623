//! Resilience policies: per-call timeouts and retry behavior.
//!
//! Both policies are pure, validated value objects. They carry no live
//! resources; [`crate::pool::ConnectionPool`] and [`crate::patch`] consume
//! them read-only.

pub mod retry;
pub mod timeout;

pub use retry::RetryPolicy;
pub use timeout::TimeoutPolicy;
