use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ottoengine_core::{
    EntityState, HassEvent, Service, ServiceField, ServiceRegistration, StateChangedEvent,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Monotonically increasing request-id counter shared by every outbound
/// frame on one connection. The `auth` frame is sent before the counter is
/// consulted and never carries an id of its own.
#[derive(Debug, Default)]
pub struct RequestIds {
    next: AtomicU64,
}

impl RequestIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    #[serde(rename = "auth")]
    Auth { access_token: String },
    #[serde(rename = "ping")]
    Ping { id: u64 },
    #[serde(rename = "subscribe_events")]
    SubscribeEvents {
        id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<String>,
    },
    #[serde(rename = "get_states")]
    GetStates { id: u64 },
    #[serde(rename = "get_services")]
    GetServices { id: u64 },
    #[serde(rename = "call_service")]
    CallService {
        id: u64,
        domain: String,
        service: String,
        service_data: HashMap<String, Value>,
    },
}

/// A decoded inbound frame. `Unknown` covers any `type` this client does not
/// recognize, or a frame that failed to decode into a recognized shape — it
/// is logged by the caller and otherwise ignored.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    AuthOk,
    Pong,
    ResultSnapshot(Vec<EntityState>),
    ResultServices(Vec<ServiceRegistration>),
    ResultFailure { message: Option<String> },
    StateChanged(StateChangedEvent),
    Event(HassEvent),
    Unknown,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    event: Option<Value>,
}

pub fn decode_inbound(raw: &str) -> InboundFrame {
    let Ok(frame) = serde_json::from_str::<RawFrame>(raw) else {
        return InboundFrame::Unknown;
    };
    match frame.kind.as_str() {
        "auth_ok" => InboundFrame::AuthOk,
        "pong" => InboundFrame::Pong,
        "result" => decode_result(frame),
        "event" => decode_event(frame.event),
        _ => InboundFrame::Unknown,
    }
}

fn decode_result(frame: RawFrame) -> InboundFrame {
    if frame.success != Some(true) {
        return InboundFrame::ResultFailure {
            message: frame.message,
        };
    }
    match frame.result {
        Some(Value::Array(_)) => {
            let entities: Vec<EntityState> = frame
                .result
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            InboundFrame::ResultSnapshot(entities)
        }
        Some(Value::Object(domains)) => {
            InboundFrame::ResultServices(decode_service_registry(domains))
        }
        _ => InboundFrame::Unknown,
    }
}

#[derive(Deserialize)]
struct RawServiceField {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    example: Option<Value>,
}

#[derive(Deserialize)]
struct RawService {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    fields: HashMap<String, RawServiceField>,
}

/// Decodes a `get_services` result payload: an object keyed by domain, each
/// value an object keyed by service name.
fn decode_service_registry(domains: serde_json::Map<String, Value>) -> Vec<ServiceRegistration> {
    domains
        .into_iter()
        .map(|(domain, services_value)| {
            let raw: HashMap<String, RawService> =
                serde_json::from_value(services_value).unwrap_or_default();
            let services = raw
                .into_iter()
                .map(|(name, raw)| Service {
                    name,
                    description: raw.description,
                    fields: raw
                        .fields
                        .into_iter()
                        .map(|(name, f)| ServiceField {
                            name,
                            description: f.description,
                            example: f.example,
                        })
                        .collect(),
                })
                .collect();
            ServiceRegistration { domain, services }
        })
        .collect()
}

fn decode_event(event: Option<Value>) -> InboundFrame {
    let Some(event) = event else {
        return InboundFrame::Unknown;
    };
    let event_type = event
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if event_type == "state_changed" {
        let Some(entity_id) = event.get("entity_id").and_then(Value::as_str) else {
            return InboundFrame::Unknown;
        };
        let Some(old_state) = event
            .get("old_state")
            .and_then(|v| serde_json::from_value::<EntityState>(v.clone()).ok())
        else {
            return InboundFrame::Unknown;
        };
        let Some(new_state) = event
            .get("new_state")
            .and_then(|v| serde_json::from_value::<EntityState>(v.clone()).ok())
        else {
            return InboundFrame::Unknown;
        };
        let time_fired = event
            .get("time_fired")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_else(chrono::Utc::now);
        InboundFrame::StateChanged(StateChangedEvent {
            entity_id: entity_id.to_string(),
            old_state,
            new_state,
            time_fired,
        })
    } else {
        serde_json::from_value::<HassEvent>(event).map_or(InboundFrame::Unknown, InboundFrame::Event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_start_at_one_and_increase() {
        let ids = RequestIds::new();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.next(), 3);
    }

    #[test]
    fn auth_frame_serializes_without_id() {
        let frame = OutboundFrame::Auth {
            access_token: "tok".into(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["type"], "auth");
    }

    #[test]
    fn decode_unknown_frame_does_not_panic() {
        assert!(matches!(decode_inbound("not json"), InboundFrame::Unknown));
        assert!(matches!(
            decode_inbound(r#"{"type":"something_else"}"#),
            InboundFrame::Unknown
        ));
    }

    #[test]
    fn decode_auth_ok() {
        assert!(matches!(
            decode_inbound(r#"{"type":"auth_ok"}"#),
            InboundFrame::AuthOk
        ));
    }
}
