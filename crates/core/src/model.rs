use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A mirrored entity state, as reported by the remote instance.
///
/// Equality is defined over `entity_id`, `state`, and `last_changed` only —
/// attribute drift alone is never a change. See `EntityState::is_equal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    pub last_changed: DateTime<Utc>,
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

impl EntityState {
    pub fn is_equal(&self, other: &EntityState) -> bool {
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.last_changed == other.last_changed
    }

    /// Parses `state` as a floating-point number, for numeric triggers and conditions.
    pub fn numeric_state(&self) -> Option<f64> {
        self.state.parse::<f64>().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceField {
    pub name: String,
    pub description: Option<String>,
    pub example: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<ServiceField>,
}

/// All services registered under one domain, e.g. `light`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub domain: String,
    #[serde(default)]
    pub services: Vec<Service>,
}

/// A request to invoke one remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    #[serde(default)]
    pub service_data: HashMap<String, Value>,
}

/// A generic event received over the remote link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HassEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    pub time_fired: DateTime<Utc>,
}

/// The `state_changed` event refinement.
#[derive(Debug, Clone)]
pub struct StateChangedEvent {
    pub entity_id: String,
    pub old_state: EntityState,
    pub new_state: EntityState,
    pub time_fired: DateTime<Utc>,
}

impl StateChangedEvent {
    pub fn into_hass_event(self) -> HassEvent {
        HassEvent {
            event_type: "state_changed".to_string(),
            data: HashMap::new(),
            time_fired: self.time_fired,
        }
    }
}

/// An inbound event as routed by the engine: either a typed state change or
/// a generic Home-Assistant-style event.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    StateChanged(StateChangedEvent),
    Generic(HassEvent),
}

impl InboundEvent {
    pub fn event_type(&self) -> &str {
        match self {
            InboundEvent::StateChanged(_) => "state_changed",
            InboundEvent::Generic(e) => &e.event_type,
        }
    }
}
