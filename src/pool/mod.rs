//! Bounded connection pool with per-request retry.
//!
//! The pool owns one shared transport configured from a
//! [`TimeoutPolicy`] and bounds concurrent leases with a semaphore. A
//! [`Connection`] is a lease guard; dropping it (including when the
//! caller's future is cancelled) returns the slot promptly. Retry backoff
//! sleeps happen on the caller's own task while holding only the caller's
//! own lease, so other callers keep acquiring and using the pool.

use crate::policy::{RetryPolicy, TimeoutPolicy};
use crate::{Error, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{Request, Response};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
struct PoolInner {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    timeouts: TimeoutPolicy,
    retry: RetryPolicy,
    max_connections: usize,
    closed: AtomicBool,
}

/// Bounded pool of reusable connections.
///
/// Built once from a policy pair; changing capacity means discarding the
/// pool and building a new one.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

/// A leased connection slot. Released back to the pool on drop.
#[derive(Debug)]
pub struct Connection {
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionPool {
    /// Build a pool enforcing `timeouts` and `retry` on every request.
    ///
    /// `max_connections` must be at least 1.
    pub fn build(
        timeouts: TimeoutPolicy,
        retry: RetryPolicy,
        max_connections: usize,
    ) -> Result<Self> {
        if max_connections == 0 {
            return Err(Error::configuration_with_context(
                "max_connections must be at least 1",
                crate::ErrorContext::new().with_field_path("pool.max_connections"),
            ));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect())
            .pool_max_idle_per_host(max_connections)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                client,
                permits: Arc::new(Semaphore::new(max_connections)),
                timeouts,
                retry,
                max_connections,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Lease a connection slot.
    ///
    /// Blocks until a slot frees up or the policy's total timeout elapses,
    /// then fails with [`Error::PoolExhausted`] rather than hanging.
    pub async fn acquire(&self) -> Result<Connection> {
        self.acquire_until(Instant::now() + self.inner.timeouts.total())
            .await
    }

    async fn acquire_until(&self, deadline: Instant) -> Result<Connection> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::PoolClosed);
        }
        let started = Instant::now();
        let wait = deadline.saturating_duration_since(started);
        match tokio::time::timeout(wait, Arc::clone(&self.inner.permits).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(Connection {
                pool: Arc::clone(&self.inner),
                _permit: permit,
            }),
            Ok(Err(_)) => Err(Error::PoolClosed),
            Err(_) => Err(Error::PoolExhausted {
                waited_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    /// Acquire a slot and issue `request` with retry, under one shared
    /// total-timeout budget covering the wait for the slot as well.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let deadline = Instant::now() + self.inner.timeouts.total();
        let conn = self.acquire_until(deadline).await?;
        conn.execute_until(request, deadline).await
    }

    /// Explicit release; equivalent to dropping the guard.
    pub fn release(&self, conn: Connection) {
        drop(conn);
    }

    /// Refuse further leases and wake all waiters with [`Error::PoolClosed`].
    ///
    /// Outstanding leases stay valid until their guards drop; idle
    /// transport connections close when the last pool handle drops.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.permits.close();
        tracing::debug!(max_connections = self.inner.max_connections, "connection pool shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn max_connections(&self) -> usize {
        self.inner.max_connections
    }

    /// Currently free slots.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.inner.timeouts
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.inner.retry
    }
}

impl Connection {
    /// Issue `request` with retry per the pool's policy.
    ///
    /// The lease is held across attempts. Per-attempt read timeout is the
    /// policy's read timeout clipped to the remaining total budget; a sleep
    /// that would cross the total deadline is never started.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.execute_until(request, Instant::now() + self.pool.timeouts.total())
            .await
    }

    async fn execute_until(&self, request: Request, deadline: Instant) -> Result<Response> {
        let total_ms = self.pool.timeouts.total().as_millis() as u64;
        let method = request.method().clone();
        let url = request.url().clone();

        // Requests with streaming bodies cannot be cloned and get exactly
        // one attempt.
        let mut template = Some(request);
        let mut attempts: u32 = 0;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::DeadlineExceeded { total_ms, attempts });
            }
            let remaining = deadline - now;

            let (mut attempt_req, body_reusable) =
                match template.as_ref().and_then(Request::try_clone) {
                    Some(clone) => (clone, true),
                    None => match template.take() {
                        Some(original) => (original, false),
                        // only reachable if a non-clonable request failed
                        // and the loop continued, which it never does
                        None => {
                            return Err(Error::TransientNetwork {
                                message: "request body consumed and not clonable".into(),
                                attempts,
                                status: None,
                            })
                        }
                    },
                };
            *attempt_req.timeout_mut() = Some(self.pool.timeouts.read().min(remaining));

            attempts += 1;
            let retry_after = match self.pool.client.execute(attempt_req).await {
                Ok(resp) => {
                    let status = resp.status();
                    // responses the policy will never retry (non-retryable
                    // status like 404, non-retryable method, or a body that
                    // cannot be replayed) go back to the caller as-is; only
                    // an exhausted retry budget is surfaced as a failure
                    if !self.pool.retry.is_retryable_status(status)
                        || !self.pool.retry.is_retryable_method(&method)
                        || !body_reusable
                    {
                        return Ok(resp);
                    }
                    if attempts > self.pool.retry.max_attempts() {
                        return Err(Error::TransientNetwork {
                            message: format!("{} {} returned {}", method, url, status),
                            attempts,
                            status: Some(status.as_u16()),
                        });
                    }
                    parse_retry_after(&resp)
                }
                Err(e) if is_transient(&e) => {
                    if !body_reusable || attempts > self.pool.retry.max_attempts() {
                        return Err(Error::TransientNetwork {
                            message: e.to_string(),
                            attempts,
                            status: None,
                        });
                    }
                    None
                }
                Err(e) => return Err(Error::Http(e)),
            };

            let delay = self.pool.retry.backoff_delay(attempts, retry_after);
            if Instant::now() + delay >= deadline {
                return Err(Error::DeadlineExceeded { total_ms, attempts });
            }
            tracing::debug!(
                %method,
                %url,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying after transient failure"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Network-level errors worth another attempt: connect failures, per-attempt
/// timeouts, and bodies cut off mid-transfer.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body()
}

/// `Retry-After` in seconds form; HTTP-date form is ignored.
fn parse_retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
