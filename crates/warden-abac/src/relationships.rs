//! Social-graph lookups consumed by friends-only visibility.

use std::collections::HashSet;
use std::sync::RwLock;

use warden_types::EntityId;

use crate::error::RelationshipError;

/// Answers whether two entities are related closely enough to see
/// friends-only resources.
pub trait RelationshipResolver: Send + Sync {
    fn are_friends(&self, a: &EntityId, b: &EntityId) -> Result<bool, RelationshipError>;
}

/// A resolver under which nobody is anybody's friend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRelationships;

impl RelationshipResolver for NoRelationships {
    fn are_friends(&self, _a: &EntityId, _b: &EntityId) -> Result<bool, RelationshipError> {
        Ok(false)
    }
}

/// Symmetric in-memory friendship set.
#[derive(Debug, Default)]
pub struct MemoryRelationships {
    pairs: RwLock<HashSet<(EntityId, EntityId)>>,
}

impl MemoryRelationships {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_friendship(&self, a: impl Into<EntityId>, b: impl Into<EntityId>) {
        let pair = ordered(a.into(), b.into());
        let mut pairs = self
            .pairs
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pairs.insert(pair);
    }

    pub fn remove_friendship(&self, a: impl Into<EntityId>, b: impl Into<EntityId>) {
        let pair = ordered(a.into(), b.into());
        let mut pairs = self
            .pairs
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pairs.remove(&pair);
    }
}

fn ordered(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
    if a <= b { (a, b) } else { (b, a) }
}

impl RelationshipResolver for MemoryRelationships {
    fn are_friends(&self, a: &EntityId, b: &EntityId) -> Result<bool, RelationshipError> {
        let pairs = self
            .pairs
            .read()
            .map_err(|_| RelationshipError("relationship lock poisoned".to_string()))?;
        Ok(pairs.contains(&ordered(a.clone(), b.clone())))
    }
}
