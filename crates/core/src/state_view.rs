use crate::model::EntityState;

/// Read-only access to the mirrored entity state, as required by condition
/// evaluation. Implemented by the engine's state store; kept as a trait here
/// so condition evaluation stays free of a dependency on the store crate.
pub trait StateView {
    fn entity_state(&self, entity_id: &str) -> Option<EntityState>;
}
