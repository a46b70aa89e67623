//! HTTP-level retry behavior against a mock server.
//!
//! Policies use zero or tiny backoff factors so the suite stays fast;
//! the backoff formula itself is covered by the policy unit tests.

use api_resilience::{ConnectionPool, Error, RetryPolicy, TimeoutPolicy};
use mockito::Server;
use reqwest::{Method, Request, Url};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn pool_with(retry: RetryPolicy) -> ConnectionPool {
    init_tracing();
    let timeouts = TimeoutPolicy::from_millis(2_000, 2_000, 10_000).unwrap();
    ConnectionPool::build(timeouts, retry, 4).unwrap()
}

fn get(url: &str) -> Request {
    Request::new(Method::GET, Url::parse(url).unwrap())
}

/// Serves the given raw HTTP responses one connection at a time, closing
/// each connection so every retry reconnects. Returns how many requests it
/// actually served. Used where a path must answer differently across
/// successive attempts, which a recorded mock cannot express.
async fn scripted_server(responses: Vec<&'static str>) -> (SocketAddr, JoinHandle<usize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut served = 0usize;
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            if socket.write_all(response.as_bytes()).await.is_err() {
                break;
            }
            served += 1;
        }
        served
    });
    (addr, handle)
}

const BUSY_503: &str =
    "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
const LIMITED_429: &str =
    "HTTP/1.1 429 Too Many Requests\r\nretry-after: 0\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
const OK_200: &str =
    "HTTP/1.1 200 OK\r\ncontent-length: 9\r\nconnection: close\r\n\r\nrecovered";

#[tokio::test]
async fn permanently_failing_request_attempted_exactly_n_plus_one_times() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/rate-limited")
        .with_status(503)
        .expect(4) // initial attempt + 3 retries
        .create_async()
        .await;

    let pool = pool_with(RetryPolicy::new(3, 0.0).unwrap());
    let err = pool
        .execute(get(&format!("{}/rate-limited", server.url())))
        .await
        .unwrap_err();

    match err {
        Error::TransientNetwork {
            attempts, status, ..
        } => {
            assert_eq!(attempts, 4);
            assert_eq!(status, Some(503));
        }
        other => panic!("expected TransientNetwork, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn non_retryable_status_returned_to_caller_unretried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/missing")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let pool = pool_with(RetryPolicy::new(5, 0.0).unwrap());
    let response = pool
        .execute(get(&format!("{}/missing", server.url())))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 404);
    mock.assert_async().await;
}

#[tokio::test]
async fn transient_failures_recover_within_budget() {
    let (addr, served) = scripted_server(vec![BUSY_503, BUSY_503, OK_200]).await;

    let pool = pool_with(RetryPolicy::new(5, 0.0).unwrap());
    let response = pool
        .execute(get(&format!("http://{addr}/flaky")))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "recovered");
    assert_eq!(served.await.unwrap(), 3);
}

#[tokio::test]
async fn excluded_method_gets_response_back_without_retry() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/mutate")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    // POST is outside the retryable set here, so even a 503 is handed
    // back to the caller after a single attempt rather than surfaced
    // as a retry failure
    let pool = pool_with(RetryPolicy::new(5, 0.0).unwrap().idempotent_methods_only());
    let response = pool
        .execute(Request::new(
            Method::POST,
            Url::parse(&format!("{}/mutate", server.url())).unwrap(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 503);
    mock.assert_async().await;
}

#[tokio::test]
async fn backoff_delays_observed_between_attempts() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/slow-recovery")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    // factor 0.05 -> sleeps of 50 ms and 100 ms before the two retries
    let pool = pool_with(RetryPolicy::new(2, 0.05).unwrap());
    let started = Instant::now();
    let _ = pool
        .execute(get(&format!("{}/slow-recovery", server.url())))
        .await;
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn retry_after_hint_overrides_computed_backoff() {
    let (addr, served) = scripted_server(vec![LIMITED_429, OK_200]).await;

    // huge factor: without the Retry-After hint the first sleep alone
    // would be 10 s
    let pool = pool_with(RetryPolicy::new(2, 10.0).unwrap());
    let started = Instant::now();
    let response = pool
        .execute(get(&format!("http://{addr}/limited")))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(served.await.unwrap(), 2);
}

#[tokio::test]
async fn deadline_aborts_before_attempts_are_exhausted() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/always-busy")
        .with_status(503)
        .create_async()
        .await;

    // ten retries allowed, but the first backoff sleep (10 s) would cross
    // the 500 ms total deadline: abort with a timeout instead
    init_tracing();
    let timeouts = TimeoutPolicy::from_millis(500, 500, 500).unwrap();
    let pool =
        ConnectionPool::build(timeouts, RetryPolicy::new(10, 10.0).unwrap(), 2).unwrap();

    let started = Instant::now();
    let err = pool
        .execute(get(&format!("{}/always-busy", server.url())))
        .await
        .unwrap_err();

    match err {
        Error::DeadlineExceeded { attempts, total_ms } => {
            assert_eq!(attempts, 1);
            assert_eq!(total_ms, 500);
        }
        other => panic!("expected DeadlineExceeded, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn connection_refused_is_retried_then_surfaced() {
    // bind then drop a listener to get a port with nothing behind it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let pool = pool_with(RetryPolicy::new(2, 0.0).unwrap());
    let err = pool
        .execute(get(&format!("http://127.0.0.1:{port}/unreachable")))
        .await
        .unwrap_err();

    match err {
        Error::TransientNetwork {
            attempts, status, ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(status, None);
        }
        other => panic!("expected TransientNetwork, got {other:?}"),
    }
}
