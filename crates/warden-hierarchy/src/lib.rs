//! warden-hierarchy: Line-management resolution for `Warden`
//!
//! Each principal carries at most one `line_manager_id`. Everything else
//! (direct reports, transitive reports, "does A manage B") is derived from
//! that single edge.
//!
//! The graph is kept acyclic at write time: every [`ReportingLineStore`]
//! runs [`ensure_acyclic`] inside the same atomic unit as the write. Reads do
//! not trust that invariant: every traversal is iterative, keeps a visited
//! set, and stops after a fixed number of hops, so a corrupted graph yields
//! an answer instead of a hang.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use warden_hierarchy::{HierarchyResolver, MemoryDirectory};
//! use warden_types::EntityId;
//!
//! let directory = MemoryDirectory::new()
//!     .with_entity("ceo", None)
//!     .with_entity("vp", Some("ceo"))
//!     .with_entity("eng", Some("vp"));
//!
//! let resolver = HierarchyResolver::new(Arc::new(directory));
//! let ceo = EntityId::new("ceo");
//! let eng = EntityId::new("eng");
//!
//! assert!(resolver.is_administrator_for(&ceo, &eng, true).unwrap());
//! assert!(!resolver.is_administrator_for(&ceo, &eng, false).unwrap());
//! ```

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};
use warden_types::{Clock, EntityId, SystemClock};

mod directory;

pub use directory::{
    EntityRecord, EntityResolver, ManagerChange, MemoryDirectory, ReportingLineStore,
    ensure_acyclic,
};

/// Default bound on the number of manager hops any traversal follows.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Answers reporting-line questions over an [`EntityResolver`].
///
/// # Thread Safety
///
/// The resolver holds no mutable state and is safe to share across threads.
#[derive(Clone)]
pub struct HierarchyResolver {
    entities: Arc<dyn EntityResolver>,
    max_depth: usize,
}

impl HierarchyResolver {
    pub fn new(entities: Arc<dyn EntityResolver>) -> Self {
        Self {
            entities,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Sets the traversal bound. Values below 1 are raised to 1.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns every entity whose line manager is `manager_id`.
    pub fn get_direct_reports(&self, manager_id: &EntityId) -> Result<BTreeSet<EntityId>> {
        Ok(self.entities.direct_reports(manager_id)?.into_iter().collect())
    }

    /// Returns everyone below `manager_id`, up to `max_depth` levels down.
    ///
    /// The manager is never part of the result, even if a corrupted graph
    /// leads back to them.
    pub fn get_all_reports(&self, manager_id: &EntityId) -> Result<BTreeSet<EntityId>> {
        let mut visited: HashSet<EntityId> = HashSet::from([manager_id.clone()]);
        let mut reports = BTreeSet::new();
        let mut frontier = vec![manager_id.clone()];

        for _ in 0..self.max_depth {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for manager in &frontier {
                for report in self.entities.direct_reports(manager)? {
                    if visited.insert(report.clone()) {
                        reports.insert(report.clone());
                        next.push(report);
                    }
                }
            }
            frontier = next;
        }

        if !frontier.is_empty() {
            debug!(
                manager = %manager_id,
                max_depth = self.max_depth,
                "Report traversal stopped at depth bound"
            );
        }
        Ok(reports)
    }

    /// Returns true if `candidate_manager_id` manages `subject_id`.
    ///
    /// With `include_indirect`, the subject's management chain is walked
    /// upward. The walk stops with `false` on a revisited node (cycle) or
    /// after `max_depth` hops. An entity never manages itself.
    pub fn is_administrator_for(
        &self,
        candidate_manager_id: &EntityId,
        subject_id: &EntityId,
        include_indirect: bool,
    ) -> Result<bool> {
        if candidate_manager_id == subject_id {
            return Ok(false);
        }

        let Some(subject) = self.entities.lookup(subject_id)? else {
            return Ok(false);
        };
        if subject.line_manager_id.as_ref() == Some(candidate_manager_id) {
            return Ok(true);
        }
        if !include_indirect {
            return Ok(false);
        }

        let mut visited: HashSet<EntityId> = HashSet::new();
        let mut current = subject.line_manager_id;

        for _ in 0..self.max_depth {
            let Some(id) = current else {
                return Ok(false);
            };
            if id == *candidate_manager_id {
                return Ok(true);
            }
            if !visited.insert(id.clone()) {
                warn!(
                    subject = %subject_id,
                    revisited = %id,
                    "Cycle detected in management chain"
                );
                return Ok(false);
            }
            current = self
                .entities
                .lookup(&id)?
                .and_then(|record| record.line_manager_id);
        }

        debug!(
            subject = %subject_id,
            max_depth = self.max_depth,
            "Management chain walk stopped at depth bound"
        );
        Ok(false)
    }
}

// ============================================================================
// Reporting-line writes
// ============================================================================

/// Cycle-guarded writes to the reporting graph.
pub struct ReportingLines {
    store: Arc<dyn ReportingLineStore>,
    resolver: HierarchyResolver,
    clock: Arc<dyn Clock>,
}

impl ReportingLines {
    /// Builds the writer and a resolver over the same store.
    pub fn new(store: Arc<dyn ReportingLineStore>, max_depth: usize) -> Self {
        let entities: Arc<dyn EntityResolver> = store.clone();
        Self {
            resolver: HierarchyResolver::new(entities).with_max_depth(max_depth),
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn resolver(&self) -> &HierarchyResolver {
        &self.resolver
    }

    /// Sets `subject_id`'s line manager to `proposed_id`, or clears it.
    ///
    /// The store re-checks for cycles under its own write lock, so two
    /// concurrent reassignments cannot both close a loop.
    ///
    /// # Errors
    ///
    /// - [`HierarchyError::Cycle`] if the subject already manages the
    ///   proposed manager (directly or transitively, at any depth), or
    ///   proposes itself.
    /// - [`HierarchyError::EntityNotFound`] if the subject does not exist.
    pub fn reassign_manager(
        &self,
        subject_id: &EntityId,
        proposed_id: Option<&EntityId>,
        actor: Option<&EntityId>,
        reason: Option<&str>,
    ) -> Result<()> {
        let subject = self
            .store
            .lookup(subject_id)?
            .ok_or_else(|| HierarchyError::EntityNotFound(subject_id.clone()))?;

        let change = ManagerChange {
            subject: subject_id.clone(),
            previous_manager: subject.line_manager_id,
            new_manager: proposed_id.cloned(),
            changed_by: actor.cloned(),
            changed_at: self.clock.now(),
            reason: reason.map(str::to_string),
        };

        match self.store.apply_manager_change(change) {
            Ok(applied) => {
                info!(
                    subject = %subject_id,
                    previous = ?applied.previous_manager,
                    manager = ?proposed_id,
                    "Line manager reassigned"
                );
                Ok(())
            }
            Err(e @ HierarchyError::Cycle { .. }) => {
                warn!(subject = %subject_id, proposed = ?proposed_id, "Manager reassignment rejected: cycle");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub fn manager_history(&self, subject_id: &EntityId) -> Result<Vec<ManagerChange>> {
        self.store.manager_history(subject_id)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during hierarchy reads and writes.
#[derive(thiserror::Error, Debug)]
pub enum HierarchyError {
    /// The entity does not exist in the identity store.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// The reassignment would make the reporting graph cyclic.
    #[error("assigning {proposed} as manager of {subject} would create a cycle")]
    Cycle { subject: EntityId, proposed: EntityId },

    /// Backing store failure.
    #[error("identity store error: {0}")]
    Store(String),
}

/// Result type for hierarchy operations.
pub type Result<T> = std::result::Result<T, HierarchyError>;
