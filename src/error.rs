use thiserror::Error;

/// Structured error context for configuration failures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Configuration key that caused the error (e.g., "timeouts.total_timeout_ms")
    pub field_path: Option<String>,
    /// Additional context (e.g., expected range, actual value)
    pub details: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Unified error type for the resilience layer.
///
/// Only `Configuration`, exhausted `TransientNetwork`/`DeadlineExceeded`,
/// and `PoolExhausted`/`PoolClosed` propagate as failures; the two
/// recoverable conditions ([`Error::DependencyMissing`] and
/// [`Error::AdapterShapeMismatch`]) are absorbed and logged by the
/// high-level entry points.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("transient failure after {attempts} attempt(s): {message}")]
    TransientNetwork {
        message: String,
        attempts: u32,
        /// Last HTTP status observed, if the failure was status-driven.
        status: Option<u16>,
    },

    #[error("total request deadline of {total_ms} ms exceeded after {attempts} attempt(s)")]
    DeadlineExceeded { total_ms: u64, attempts: u32 },

    #[error("connection pool exhausted: no connection became available within {waited_ms} ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("connection pool has been shut down")]
    PoolClosed,

    #[error("collaborator client library not available: {library}")]
    DependencyMissing { library: String },

    #[error("client adapter shape mismatch: {details}")]
    AdapterShapeMismatch { details: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error without extra context
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// True for the conditions that are reported as warnings and absorbed
    /// rather than surfaced to callers.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::DependencyMissing { .. } | Error::AdapterShapeMismatch { .. }
        )
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }
}
