//! Backing-store interface for facets, and an in-memory implementation.
//!
//! The store never talks to a database directly. Production deployments
//! implement [`FacetRepository`] over their storage engine; tests and
//! simulations use [`MemoryFacetRepository`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use warden_types::{EntityRef, FacetKey};

use crate::error::{FacetError, Result};
use crate::model::{FacetAssignment, FacetDefinition, FacetId, HistoryEntry};

/// Storage operations required by [`FacetStore`](crate::FacetStore).
///
/// Implementations must be safe to call concurrently.
pub trait FacetRepository: Send + Sync {
    /// Stores a new definition.
    ///
    /// Fails with [`FacetError::DuplicateFacet`] if the identity tuple is taken.
    fn insert_definition(&self, definition: FacetDefinition) -> Result<FacetDefinition>;

    fn find_definition(&self, key: &FacetKey) -> Result<Option<FacetDefinition>>;

    /// Returns the single assignment row for `(facet_id, entity)`, active or not.
    fn find_assignment(
        &self,
        facet_id: FacetId,
        entity: &EntityRef,
    ) -> Result<Option<FacetAssignment>>;

    /// Returns every `is_active` assignment held by `entity`, joined with its definition.
    fn assignments_for(&self, entity: &EntityRef)
    -> Result<Vec<(FacetDefinition, FacetAssignment)>>;

    /// Returns every `is_active` assignment in the store.
    fn active_assignments(&self) -> Result<Vec<FacetAssignment>>;

    /// Upserts `assignment` keyed by `(facet_id, entity)` and appends `entry`.
    ///
    /// `expected` is the row the caller read (`None` if there was none). If
    /// the stored row differs, nothing is written and the call fails with
    /// [`FacetError::Conflict`]. Both writes must become visible together or
    /// not at all.
    fn commit(
        &self,
        expected: Option<&FacetAssignment>,
        assignment: FacetAssignment,
        entry: HistoryEntry,
    ) -> Result<FacetAssignment>;

    /// Returns the ledger rows for `entity` in append order.
    fn history_for(&self, entity: &EntityRef) -> Result<Vec<HistoryEntry>>;
}

// ============================================================================
// In-memory repository
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    definitions: HashMap<FacetId, FacetDefinition>,
    by_key: HashMap<FacetKey, FacetId>,
    assignments: HashMap<(FacetId, EntityRef), FacetAssignment>,
    history: Vec<HistoryEntry>,
}

/// Thread-safe in-memory [`FacetRepository`].
///
/// Each `commit` applies the assignment upsert and the history append under
/// a single write lock, so readers never observe one without the other.
#[derive(Debug, Default)]
pub struct MemoryFacetRepository {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryFacetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a backing-store outage: every call fails with [`FacetError::Store`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FacetError::Store("facet repository unavailable".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.check_available()?;
        self.state
            .read()
            .map_err(|_| FacetError::Store("facet repository lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.check_available()?;
        self.state
            .write()
            .map_err(|_| FacetError::Store("facet repository lock poisoned".to_string()))
    }
}

impl FacetRepository for MemoryFacetRepository {
    fn insert_definition(&self, definition: FacetDefinition) -> Result<FacetDefinition> {
        let mut state = self.write()?;
        if state.by_key.contains_key(&definition.key) {
            return Err(FacetError::DuplicateFacet(definition.key));
        }
        state.by_key.insert(definition.key.clone(), definition.id);
        state.definitions.insert(definition.id, definition.clone());
        Ok(definition)
    }

    fn find_definition(&self, key: &FacetKey) -> Result<Option<FacetDefinition>> {
        let state = self.read()?;
        Ok(state
            .by_key
            .get(key)
            .and_then(|id| state.definitions.get(id))
            .cloned())
    }

    fn find_assignment(
        &self,
        facet_id: FacetId,
        entity: &EntityRef,
    ) -> Result<Option<FacetAssignment>> {
        let state = self.read()?;
        Ok(state.assignments.get(&(facet_id, entity.clone())).cloned())
    }

    fn assignments_for(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<(FacetDefinition, FacetAssignment)>> {
        let state = self.read()?;
        let mut joined: Vec<(FacetDefinition, FacetAssignment)> = state
            .assignments
            .values()
            .filter(|a| a.is_active && a.entity == *entity)
            .filter_map(|a| {
                state
                    .definitions
                    .get(&a.facet_id)
                    .map(|d| (d.clone(), a.clone()))
            })
            .collect();
        // HashMap iteration order is arbitrary
        joined.sort_by(|(a, _), (b, _)| a.key.cmp(&b.key));
        Ok(joined)
    }

    fn active_assignments(&self) -> Result<Vec<FacetAssignment>> {
        let state = self.read()?;
        Ok(state
            .assignments
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect())
    }

    fn commit(
        &self,
        expected: Option<&FacetAssignment>,
        assignment: FacetAssignment,
        entry: HistoryEntry,
    ) -> Result<FacetAssignment> {
        let mut state = self.write()?;
        if !state.definitions.contains_key(&assignment.facet_id) {
            return Err(FacetError::Store(format!(
                "assignment references unknown facet {}",
                assignment.facet_id
            )));
        }
        let slot = (assignment.facet_id, assignment.entity.clone());
        if state.assignments.get(&slot) != expected {
            return Err(FacetError::Conflict {
                facet_id: assignment.facet_id,
                entity: assignment.entity,
            });
        }
        state.assignments.insert(slot, assignment.clone());
        state.history.push(entry);
        Ok(assignment)
    }

    fn history_for(&self, entity: &EntityRef) -> Result<Vec<HistoryEntry>> {
        let state = self.read()?;
        Ok(state
            .history
            .iter()
            .filter(|h| h.entity == *entity)
            .cloned()
            .collect())
    }
}
