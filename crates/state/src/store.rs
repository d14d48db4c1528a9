use std::collections::HashMap;

use ottoengine_core::{EntityState, StateView};

/// One rule's registration against a listener-index key (an `entity_id` for
/// state/numeric_state triggers, an `event_type` for event triggers).
/// `trigger_index` identifies which of the rule's triggers this registration
/// corresponds to, so the dispatcher can re-check the exact trigger predicate
/// rather than firing on key membership alone.
#[derive(Debug, Clone)]
pub struct Listener {
    pub rule_id: String,
    pub trigger_index: usize,
}

/// The engine's mirrored entity state plus the listener index used to route
/// inbound events to the rules that might care about them. Both live behind
/// one shared key space deliberately: the trigger re-check at dispatch time
/// makes a state-entity key colliding with an event-type key harmless.
#[derive(Debug, Default)]
pub struct EngineStore {
    entities: HashMap<String, EntityState>,
    listeners: HashMap<String, Vec<Listener>>,
}

impl EngineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.entities.get(entity_id).cloned()
    }

    /// Replaces the mirrored state for `entity_id`, returning the previous
    /// value (if any) so the caller can decide whether this is a real change
    /// per `EntityState::is_equal`.
    pub fn upsert(&mut self, state: EntityState) -> Option<EntityState> {
        self.entities.insert(state.entity_id.clone(), state)
    }

    pub fn remove(&mut self, entity_id: &str) -> Option<EntityState> {
        self.entities.remove(entity_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &EntityState> {
        self.entities.values()
    }

    pub fn register_listener(&mut self, key: impl Into<String>, listener: Listener) {
        self.listeners.entry(key.into()).or_default().push(listener);
    }

    /// Removes every listener registration belonging to `rule_id`, pruning
    /// any key left with no listeners.
    pub fn deregister_rule(&mut self, rule_id: &str) {
        for listeners in self.listeners.values_mut() {
            listeners.retain(|l| l.rule_id != rule_id);
        }
        self.listeners.retain(|_, v| !v.is_empty());
    }

    pub fn listeners_for(&self, key: &str) -> &[Listener] {
        self.listeners.get(key).map_or(&[], Vec::as_slice)
    }

    /// Rebuilds the listener index from the empty mapping, part of the
    /// clear-then-load rule reload cycle.
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }
}

impl StateView for EngineStore {
    fn entity_state(&self, entity_id: &str) -> Option<EntityState> {
        self.get(entity_id)
    }
}

/// A deep-copy, point-in-time snapshot of mirrored entity state. Used by
/// rule invocations to evaluate conditions synchronously without holding
/// the store task's channel open for the duration of evaluation.
#[derive(Debug, Default, Clone)]
pub struct StateSnapshot(HashMap<String, EntityState>);

impl StateSnapshot {
    pub fn from_iter(states: impl IntoIterator<Item = EntityState>) -> Self {
        Self(states.into_iter().map(|s| (s.entity_id.clone(), s)).collect())
    }
}

impl StateView for StateSnapshot {
    fn entity_state(&self, entity_id: &str) -> Option<EntityState> {
        self.0.get(entity_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as Map;

    fn entity(id: &str, state: &str) -> EntityState {
        EntityState {
            entity_id: id.into(),
            state: state.into(),
            attributes: Map::new(),
            last_changed: Utc::now(),
            friendly_name: None,
            hidden: false,
        }
    }

    #[test]
    fn upsert_returns_previous_value() {
        let mut store = EngineStore::new();
        assert!(store.upsert(entity("light.x", "off")).is_none());
        let prev = store.upsert(entity("light.x", "on"));
        assert_eq!(prev.unwrap().state, "off");
    }

    #[test]
    fn deregister_rule_prunes_empty_keys() {
        let mut store = EngineStore::new();
        store.register_listener(
            "light.x",
            Listener {
                rule_id: "r1".into(),
                trigger_index: 0,
            },
        );
        store.deregister_rule("r1");
        assert!(store.listeners_for("light.x").is_empty());
    }
}
