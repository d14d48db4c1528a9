use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{InboundEvent, StateChangedEvent};
use crate::timespec::TimeSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTrigger {
    pub entity_id: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericStateTrigger {
    pub entity_id: String,
    #[serde(default)]
    pub above: Option<f64>,
    #[serde(default)]
    pub below: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTrigger {
    pub event_type: String,
    #[serde(default)]
    pub event_data: std::collections::HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeTrigger {
    pub id: String,
    pub spec: TimeSpec,
}

/// A single trigger predicate, discriminated by the platform it carries when
/// persisted (`state`, `numeric_state`, `event`, `time`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum Trigger {
    State(StateTrigger),
    NumericState(NumericStateTrigger),
    Event(EventTrigger),
    Time(TimeTrigger),
}

impl Trigger {
    /// The key this trigger is indexed under in the listener map: an
    /// `entity_id` for state variants, an `event_type` for event triggers,
    /// `None` for time triggers (scheduler-dispatched only).
    pub fn index_key(&self) -> Option<&str> {
        match self {
            Trigger::State(t) => Some(&t.entity_id),
            Trigger::NumericState(t) => Some(&t.entity_id),
            Trigger::Event(t) => Some(&t.event_type),
            Trigger::Time(_) => None,
        }
    }

    /// Evaluates this trigger's predicate against an inbound event.
    /// `TimeTrigger` never matches an event — it is dispatched only by the
    /// scheduler.
    pub fn matches_event(&self, event: &InboundEvent) -> bool {
        match (self, event) {
            (Trigger::State(t), InboundEvent::StateChanged(sc)) => t.matches(sc),
            (Trigger::NumericState(t), InboundEvent::StateChanged(sc)) => t.matches(sc),
            (Trigger::Event(t), InboundEvent::Generic(e)) => t.matches(e),
            _ => false,
        }
    }
}

impl StateTrigger {
    fn matches(&self, event: &StateChangedEvent) -> bool {
        if event.entity_id != self.entity_id {
            return false;
        }
        if event.old_state.state == event.new_state.state {
            return false;
        }
        if let Some(to) = &self.to {
            if &event.new_state.state != to {
                return false;
            }
        }
        if let Some(from) = &self.from {
            if &event.old_state.state != from {
                return false;
            }
        }
        true
    }
}

impl NumericStateTrigger {
    fn matches(&self, event: &StateChangedEvent) -> bool {
        if event.entity_id != self.entity_id {
            return false;
        }
        if self.above.is_none() && self.below.is_none() {
            return false;
        }
        let Some(value) = event.new_state.numeric_state() else {
            return false;
        };
        if let Some(above) = self.above {
            if !(value > above) {
                return false;
            }
        }
        if let Some(below) = self.below {
            if !(value < below) {
                return false;
            }
        }
        true
    }
}

impl EventTrigger {
    fn matches(&self, event: &crate::model::HassEvent) -> bool {
        if event.event_type != self.event_type {
            return false;
        }
        self.event_data
            .iter()
            .all(|(k, v)| event.data.get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityState;
    use chrono::Utc;
    use std::collections::HashMap;

    fn entity(state: &str) -> EntityState {
        EntityState {
            entity_id: "x".into(),
            state: state.into(),
            attributes: HashMap::new(),
            last_changed: Utc::now(),
            friendly_name: None,
            hidden: false,
        }
    }

    #[test]
    fn state_trigger_requires_state_change() {
        let trig = StateTrigger {
            entity_id: "x".into(),
            to: Some("on".into()),
            from: Some("off".into()),
        };
        let mut old = entity("off");
        let mut new = entity("off");
        new.attributes.insert("brightness".into(), Value::from(5));
        assert!(!trig.matches(&StateChangedEvent {
            entity_id: "x".into(),
            old_state: old.clone(),
            new_state: new,
            time_fired: Utc::now(),
        }));

        let new_on = entity("on");
        old.state = "off".into();
        assert!(trig.matches(&StateChangedEvent {
            entity_id: "x".into(),
            old_state: old,
            new_state: new_on,
            time_fired: Utc::now(),
        }));
    }

    #[test]
    fn numeric_state_trigger_requires_strict_bound() {
        let trig = NumericStateTrigger {
            entity_id: "sensor.temp".into(),
            above: Some(20.0),
            below: None,
        };
        let old = EntityState {
            entity_id: "sensor.temp".into(),
            ..entity("19.0")
        };
        let sc = StateChangedEvent {
            entity_id: "sensor.temp".into(),
            old_state: old,
            new_state: EntityState {
                entity_id: "sensor.temp".into(),
                ..entity("20.0")
            },
            time_fired: Utc::now(),
        };
        assert!(!trig.matches(&sc)); // not strictly above
    }

    #[test]
    fn event_trigger_subset_match() {
        let mut data = HashMap::new();
        data.insert("domain".to_string(), Value::from("light"));
        let trig = EventTrigger {
            event_type: "call_service".into(),
            event_data: data,
        };
        let mut event_data = HashMap::new();
        event_data.insert("domain".to_string(), Value::from("light"));
        event_data.insert("service".to_string(), Value::from("turn_on"));
        let event = crate::model::HassEvent {
            event_type: "call_service".into(),
            data: event_data,
            time_fired: Utc::now(),
        };
        assert!(trig.matches(&event));
    }
}
