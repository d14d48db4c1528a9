use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, put};
use axum::Router;
use ottoengine_core::{AutomationRule, TimeSpec};
use ottoengine_gateway::Engine;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state behind every handler: the engine core and the shutdown
/// signal the `/shutdown` route trips.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<Engine>>,
    pub shutdown: Arc<tokio::sync::Notify>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rest/ping", get(ping))
        .route("/rest/reload", get(reload))
        .route("/rest/rules", get(list_rules))
        .route(
            "/rest/rule/{id}",
            get(get_rule).put(put_rule_with_id).delete(delete_rule),
        )
        .route("/rest/rule", put(put_rule))
        .route("/rest/entities", get(list_entities))
        .route("/rest/services", get(list_services))
        .route("/rest/logs", get(get_logs))
        .route("/rest/clock/check", put(check_clock))
        .route("/shutdown", get(shutdown))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn ok(data: impl Serialize) -> impl IntoResponse {
    Json(json!({ "success": true, "data": data }))
}

fn fail(message: impl std::fmt::Display) -> impl IntoResponse {
    Json(json!({ "success": false, "message": message.to_string() }))
}

async fn ping() -> impl IntoResponse {
    Json(json!({ "success": true }))
}

async fn reload(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.lock().await.reload().await {
        Ok(()) => ok(Value::Null).into_response(),
        Err(e) => fail(e).into_response(),
    }
}

async fn list_rules(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    let rules: Vec<&AutomationRule> = engine.rules().collect();
    ok(rules).into_response()
}

async fn get_rule(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    match engine.rule(&id) {
        Some(rule) => ok(rule).into_response(),
        None => fail(format!("rule '{id}' not found")).into_response(),
    }
}

async fn delete_rule(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    match engine.rule_store().delete(&id).await {
        Ok(()) => ok(Value::Null).into_response(),
        Err(e) => fail(e).into_response(),
    }
}

async fn put_rule(state: State<AppState>, body: Json<AutomationRule>) -> impl IntoResponse {
    save_rule(state, body.0).await
}

async fn put_rule_with_id(
    state: State<AppState>,
    Path(id): Path<String>,
    body: Json<AutomationRule>,
) -> impl IntoResponse {
    let mut rule = body.0;
    // The descriptor's own id wins over the path when both are present.
    if rule.id.is_empty() {
        rule.id = id;
    }
    save_rule(state, rule).await
}

async fn save_rule(State(state): State<AppState>, mut rule: AutomationRule) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    rule.apply_default_tz(engine.default_tz());
    for trigger in &rule.triggers {
        if let ottoengine_core::Trigger::Time(t) = trigger {
            if let Err(e) = t.spec.validate() {
                return fail(e).into_response();
            }
        }
    }
    match engine.rule_store().save(&rule).await {
        Ok(()) => ok(Value::Null).into_response(),
        Err(e) => fail(e).into_response(),
    }
}

async fn list_entities(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    match engine.store.all_states().await {
        Ok(states) => {
            let summaries: Vec<Value> = states
                .into_iter()
                .map(|s| {
                    json!({
                        "entity_id": s.entity_id,
                        "friendly_name": s.friendly_name,
                        "hidden": s.hidden,
                    })
                })
                .collect();
            ok(summaries).into_response()
        }
        Err(e) => fail(e).into_response(),
    }
}

async fn list_services(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    ok(engine.services()).into_response()
}

async fn get_logs(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    let log = engine.log.lock().await;
    let entries: Vec<_> = log.entries().collect();
    ok(entries).into_response()
}

async fn check_clock(Json(spec): Json<TimeSpec>) -> impl IntoResponse {
    match spec.next_time_from(chrono::Utc::now()) {
        Ok(next) => ok(json!({ "next": next })).into_response(),
        Err(e) => fail(e).into_response(),
    }
}

async fn shutdown(State(state): State<AppState>) -> impl IntoResponse {
    state.shutdown.notify_one();
    Json(json!({ "success": true }))
}
