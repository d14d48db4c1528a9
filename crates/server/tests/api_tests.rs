use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use ottoengine_core::{EngineLog, Result, ServiceCall, SystemClock};
use ottoengine_executor::ServiceSender;
use ottoengine_gateway::Engine;
use ottoengine_rules::RuleStore;
use ottoengine_server::{router, AppState};
use ottoengine_state::spawn_store;
use tokio::sync::{Mutex, Notify};
use tower::ServiceExt;

struct NullSender;

#[async_trait]
impl ServiceSender for NullSender {
    async fn call_service(&self, _call: ServiceCall) -> Result<()> {
        Ok(())
    }
}

fn rules_dir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("ottoengine-server-test-{}", uuid_like()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn uuid_like() -> u64 {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64)
        .wrapping_add(COUNTER.fetch_add(1, Ordering::SeqCst) as u64)
}

fn build_app() -> axum::Router {
    let (store, _join) = spawn_store();
    let rule_store = RuleStore::new(rules_dir());
    let log = Arc::new(Mutex::new(EngineLog::new(100)));
    let clock = Arc::new(SystemClock);
    let engine = Arc::new(Mutex::new(Engine::new(
        store,
        rule_store,
        Arc::new(NullSender),
        log,
        clock,
        "UTC",
    )));
    router(AppState {
        engine,
        shutdown: Arc::new(Notify::new()),
    })
}

#[tokio::test]
async fn ping_returns_success() {
    let app = build_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/rest/ping")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn rules_list_starts_empty() {
    let app = build_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/rest/rules")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn get_rule_missing_reports_failure() {
    let app = build_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/rest/rule/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn put_rule_then_reload_makes_it_visible() {
    let app = build_app();
    let rule = serde_json::json!({
        "id": "morning-lights",
        "triggers": [],
        "actions": [],
    });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/rest/rule")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&rule).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/rest/reload")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/rest/rule/morning-lights")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["id"], "morning-lights");
}

#[tokio::test]
async fn check_clock_rejects_bad_timezone() {
    let app = build_app();
    let spec = serde_json::json!({
        "minute": "*",
        "hour": "*",
        "day_of_month": "*",
        "month": "*",
        "weekdays": "*",
        "tz": "Not/AZone",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/rest/clock/check")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&spec).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
}
