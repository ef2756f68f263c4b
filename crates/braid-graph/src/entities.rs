use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use braid_core::traits::EntityMutation;
use braid_core::value::Vec2;

/// Entity positions held in a hash map, keyed by entity id.
#[derive(Debug, Default)]
pub struct InMemoryEntities {
    positions: RwLock<HashMap<String, Vec2>>,
}

impl InMemoryEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(self, entity_id: impl Into<String>, position: Vec2) -> Self {
        self.insert(entity_id, position);
        self
    }

    pub fn insert(&self, entity_id: impl Into<String>, position: Vec2) {
        self.positions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entity_id.into(), position);
    }

    pub fn remove(&self, entity_id: &str) -> Option<Vec2> {
        self.positions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(entity_id)
    }

    /// All positions, ordered by entity id.
    pub fn positions(&self) -> BTreeMap<String, Vec2> {
        self.positions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

impl EntityMutation for InMemoryEntities {
    fn get_position(&self, entity_id: &str) -> Option<Vec2> {
        self.positions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(entity_id)
            .copied()
    }

    fn set_position(&self, entity_id: &str, position: Vec2) {
        self.insert(entity_id, position);
    }

    fn translate(&self, entity_id: &str, dx: f64, dy: f64) {
        let mut positions = self.positions.write().unwrap_or_else(|e| e.into_inner());
        let pos = positions.entry(entity_id.to_string()).or_default();
        *pos = pos.add(Vec2::new(dx, dy));
    }
}
