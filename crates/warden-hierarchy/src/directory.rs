//! Identity-store interfaces consumed by the resolver, and an in-memory directory.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_types::EntityId;

use crate::{HierarchyError, Result};

/// The only slice of an entity the hierarchy needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub line_manager_id: Option<EntityId>,
}

/// Read access to the reporting graph.
pub trait EntityResolver: Send + Sync {
    /// Returns the entity's record, or `None` if it does not exist.
    fn lookup(&self, entity_id: &EntityId) -> Result<Option<EntityRecord>>;

    /// Returns every entity whose `line_manager_id` is `manager_id`.
    fn direct_reports(&self, manager_id: &EntityId) -> Result<Vec<EntityId>>;
}

/// A recorded change of line manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerChange {
    pub subject: EntityId,
    pub previous_manager: Option<EntityId>,
    pub new_manager: Option<EntityId>,
    pub changed_by: Option<EntityId>,
    pub changed_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Write access to the reporting graph.
pub trait ReportingLineStore: EntityResolver {
    /// Sets `change.subject`'s manager to `change.new_manager` and appends
    /// `change` to the history, atomically.
    ///
    /// The cycle check belongs to the same atomic unit: implementations run
    /// [`ensure_acyclic`] against the rows they are about to write, and record
    /// the subject's current manager as `previous_manager`.
    ///
    /// Fails with [`HierarchyError::EntityNotFound`] if the subject is unknown
    /// and [`HierarchyError::Cycle`] if the change would close a loop.
    fn apply_manager_change(&self, change: ManagerChange) -> Result<ManagerChange>;

    /// Returns recorded changes for `subject` in append order.
    fn manager_history(&self, subject: &EntityId) -> Result<Vec<ManagerChange>>;
}

/// Rejects making `proposed` the manager of `subject` if `subject` is
/// `proposed` or sits anywhere above it.
///
/// Walks up from `proposed` until a root or an already-seen node. There is no
/// depth bound: a write must never be accepted because the chain was long.
pub fn ensure_acyclic<F>(subject: &EntityId, proposed: &EntityId, mut manager_of: F) -> Result<()>
where
    F: FnMut(&EntityId) -> Result<Option<EntityId>>,
{
    let mut visited: HashSet<EntityId> = HashSet::new();
    let mut current = Some(proposed.clone());

    while let Some(id) = current {
        if id == *subject {
            return Err(HierarchyError::Cycle {
                subject: subject.clone(),
                proposed: proposed.clone(),
            });
        }
        // A pre-existing loop above `proposed` does not pass through `subject`
        if !visited.insert(id.clone()) {
            break;
        }
        current = manager_of(&id)?;
    }
    Ok(())
}

// ============================================================================
// In-memory directory
// ============================================================================

#[derive(Debug, Default)]
struct DirectoryState {
    entities: HashMap<EntityId, EntityRecord>,
    changes: Vec<ManagerChange>,
}

/// Thread-safe in-memory reporting graph.
///
/// [`insert_entity`](Self::insert_entity) writes raw rows without the cycle
/// guard, which lets tests reproduce a corrupted graph.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites an entity row.
    pub fn insert_entity(
        &self,
        entity_id: impl Into<EntityId>,
        line_manager_id: Option<EntityId>,
    ) -> Result<()> {
        self.write()?
            .entities
            .insert(entity_id.into(), EntityRecord { line_manager_id });
        Ok(())
    }

    /// Builder form of [`insert_entity`](Self::insert_entity) for fixtures.
    pub fn with_entity(self, entity_id: &str, line_manager_id: Option<&str>) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.entities.insert(
                EntityId::new(entity_id),
                EntityRecord {
                    line_manager_id: line_manager_id.map(EntityId::new),
                },
            );
        }
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, DirectoryState>> {
        self.state
            .read()
            .map_err(|_| HierarchyError::Store("directory lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, DirectoryState>> {
        self.state
            .write()
            .map_err(|_| HierarchyError::Store("directory lock poisoned".to_string()))
    }
}

impl EntityResolver for MemoryDirectory {
    fn lookup(&self, entity_id: &EntityId) -> Result<Option<EntityRecord>> {
        Ok(self.read()?.entities.get(entity_id).cloned())
    }

    fn direct_reports(&self, manager_id: &EntityId) -> Result<Vec<EntityId>> {
        let state = self.read()?;
        let mut reports: Vec<EntityId> = state
            .entities
            .iter()
            .filter(|(_, record)| record.line_manager_id.as_ref() == Some(manager_id))
            .map(|(id, _)| id.clone())
            .collect();
        reports.sort();
        Ok(reports)
    }
}

impl ReportingLineStore for MemoryDirectory {
    fn apply_manager_change(&self, mut change: ManagerChange) -> Result<ManagerChange> {
        let mut state = self.write()?;
        let current = state
            .entities
            .get(&change.subject)
            .ok_or_else(|| HierarchyError::EntityNotFound(change.subject.clone()))?
            .line_manager_id
            .clone();

        if let Some(proposed) = &change.new_manager {
            let entities = &state.entities;
            ensure_acyclic(&change.subject, proposed, |id| {
                Ok(entities.get(id).and_then(|r| r.line_manager_id.clone()))
            })?;
        }

        change.previous_manager = current;
        if let Some(record) = state.entities.get_mut(&change.subject) {
            record.line_manager_id = change.new_manager.clone();
        }
        state.changes.push(change.clone());
        Ok(change)
    }

    fn manager_history(&self, subject: &EntityId) -> Result<Vec<ManagerChange>> {
        Ok(self
            .read()?
            .changes
            .iter()
            .filter(|c| c.subject == *subject)
            .cloned()
            .collect())
    }
}
