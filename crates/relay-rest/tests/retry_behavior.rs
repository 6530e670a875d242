//! Retry and signing behavior against an in-process HTTP stub.
//!
//! The stub counts attempts so the retry bound is observable:
//! - a permanently failing endpoint is attempted exactly `max_retries` times
//! - a 4xx endpoint is attempted exactly once
//! - 429 is retried like a 5xx

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use relay_core::Credentials;
use relay_rest::{RestConfig, RestError, SignedRequestExecutor};
use reqwest::Method;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct StubState {
    hits: AtomicU32,
}

async fn start_stub(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn executor_for(addr: SocketAddr) -> SignedRequestExecutor {
    let config = RestConfig {
        base_url: format!("http://{addr}"),
        timeout_ms: 2_000,
        max_retries: 3,
        // Millisecond backoff keeps the schedule observable without slowing
        // the suite down.
        retry_delay_ms: 10,
        backoff_multiplier: 2,
    };
    SignedRequestExecutor::new(config, Credentials::new("test-key", "test-secret")).unwrap()
}

#[tokio::test]
async fn test_always_503_is_attempted_exactly_max_retries_times() {
    let state = Arc::new(StubState::default());

    async fn handler(State(state): State<Arc<StubState>>) -> (StatusCode, &'static str) {
        state.hits.fetch_add(1, Ordering::SeqCst);
        (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance")
    }

    let app = Router::new()
        .route("/api/v1/time", get(handler))
        .with_state(state.clone());
    let addr = start_stub(app).await;

    let executor = executor_for(addr);
    let result = executor
        .execute(Method::GET, "/api/v1/time", None, false)
        .await;

    match result {
        Err(RestError::RequestFailed {
            status,
            retriable,
            ..
        }) => {
            assert_eq!(status, Some(503));
            assert!(retriable, "exhausted 5xx failure keeps its retryable class");
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
    assert_eq!(state.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_bad_request_is_attempted_exactly_once() {
    let state = Arc::new(StubState::default());

    async fn handler(State(state): State<Arc<StubState>>) -> (StatusCode, Json<serde_json::Value>) {
        state.hits.fetch_add(1, Ordering::SeqCst);
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"code": -1121, "msg": "Invalid symbol."})),
        )
    }

    let app = Router::new()
        .route("/api/v1/ticker", get(handler))
        .with_state(state.clone());
    let addr = start_stub(app).await;

    let executor = executor_for(addr);
    let result = executor
        .execute(Method::GET, "/api/v1/ticker", None, false)
        .await;

    match result {
        Err(RestError::RequestFailed {
            status,
            message,
            retriable,
        }) => {
            assert_eq!(status, Some(400));
            assert_eq!(message, "Invalid symbol.");
            assert!(!retriable);
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
    assert_eq!(state.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_429_is_retried_then_succeeds() {
    let state = Arc::new(StubState::default());

    async fn handler(
        State(state): State<Arc<StubState>>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        let hit = state.hits.fetch_add(1, Ordering::SeqCst);
        if hit == 0 {
            (StatusCode::TOO_MANY_REQUESTS, Json(json!({"msg": "slow down"})))
        } else {
            (StatusCode::OK, Json(json!({"serverTime": 1700000000000_i64})))
        }
    }

    let app = Router::new()
        .route("/api/v1/time", get(handler))
        .with_state(state.clone());
    let addr = start_stub(app).await;

    let executor = executor_for(addr);
    let time = executor.server_time().await.unwrap();

    assert_eq!(time, 1700000000000);
    assert_eq!(state.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_signed_call_carries_auth_headers() {
    async fn handler(headers: HeaderMap) -> (StatusCode, Json<serde_json::Value>) {
        let key_ok = headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "test-key")
            .unwrap_or(false);
        let sig_ok = headers
            .get("x-signature")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.len() == 64 && v.chars().all(|c| c.is_ascii_hexdigit()))
            .unwrap_or(false);
        let ts_ok = headers
            .get("x-timestamp")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .map(|v| v > 0)
            .unwrap_or(false);

        if key_ok && sig_ok && ts_ok {
            (StatusCode::OK, Json(json!({"balances": []})))
        } else {
            (StatusCode::UNAUTHORIZED, Json(json!({"msg": "bad auth"})))
        }
    }

    let app = Router::new().route("/api/v1/account", get(handler));
    let addr = start_stub(app).await;

    let executor = executor_for(addr);
    let account = executor.account().await.unwrap();
    assert_eq!(account, json!({"balances": []}));
}

#[tokio::test]
async fn test_public_call_omits_auth_headers() {
    async fn handler(headers: HeaderMap) -> (StatusCode, Json<serde_json::Value>) {
        if headers.contains_key("x-api-key")
            || headers.contains_key("x-signature")
            || headers.contains_key("x-timestamp")
        {
            (StatusCode::BAD_REQUEST, Json(json!({"msg": "unexpected auth"})))
        } else {
            (StatusCode::OK, Json(json!({"symbol": "BTCUSDT", "price": "42000.00"})))
        }
    }

    let app = Router::new().route("/api/v1/ticker", get(handler));
    let addr = start_stub(app).await;

    let executor = executor_for(addr);
    let ticker = executor.ticker("BTCUSDT").await.unwrap();
    assert_eq!(ticker["symbol"], "BTCUSDT");
}

#[tokio::test]
async fn test_network_failure_is_retried_and_marked_network_only() {
    // Nothing listens on this port; connection is refused on every attempt.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let executor = executor_for(addr);
    let result = executor
        .execute(Method::GET, "/api/v1/time", None, false)
        .await;

    match result {
        Err(err @ RestError::RequestFailed { .. }) => {
            assert!(err.is_network_only());
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
}
