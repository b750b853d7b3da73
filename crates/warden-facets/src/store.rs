//! Facet store: reads with lazy expiry, and atomic lifecycle writes.
//!
//! Reads never mutate state. Liveness is computed from the injected clock on
//! every call, so an assignment stops counting the moment it expires even if
//! no reconciliation has run yet.
//!
//! Every write produces exactly one history row, committed together with the
//! assignment change through [`FacetRepository::commit`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use warden_types::{Clock, EntityId, EntityRef, FacetKey};

use crate::error::{FacetError, Result};
use crate::model::{
    AssignmentId, FacetAssignment, FacetDefinition, FacetWithAssignment, HistoryAction,
    HistoryEntry, Metadata,
};
use crate::repository::FacetRepository;

/// A request to assign a facet to an entity.
#[derive(Debug, Clone)]
pub struct AssignRequest {
    pub facet: FacetKey,
    pub entity: EntityRef,
    /// `None` records the assignment as system-made.
    pub actor: Option<EntityId>,
    pub reason: Option<String>,
    /// Overrides the definition's `expiry_days`.
    pub expiry_days: Option<u32>,
    pub metadata: Option<Metadata>,
}

impl AssignRequest {
    pub fn new(facet: FacetKey, entity: EntityRef) -> Self {
        Self {
            facet,
            entity,
            actor: None,
            reason: None,
            expiry_days: None,
            metadata: None,
        }
    }

    pub fn by(mut self, actor: impl Into<EntityId>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_expiry_days(mut self, days: u32) -> Self {
        self.expiry_days = Some(days);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Owns facet vocabulary and per-entity assignments.
///
/// Contains no policy logic: it answers "does this entity hold this facet"
/// and records lifecycle transitions.
pub struct FacetStore {
    repository: Arc<dyn FacetRepository>,
    clock: Arc<dyn Clock>,
    review_warning: Duration,
}

impl FacetStore {
    pub fn new(repository: Arc<dyn FacetRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            clock,
            review_warning: Duration::zero(),
        }
    }

    /// Reports `needs_review` this many days before `review_at`.
    pub fn with_review_warning_days(mut self, days: u32) -> Self {
        self.review_warning = Duration::days(i64::from(days));
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ========================================================================
    // Vocabulary
    // ========================================================================

    /// Declares a new facet.
    pub fn define_facet(&self, definition: FacetDefinition) -> Result<FacetDefinition> {
        let definition = self.repository.insert_definition(definition)?;
        info!(facet = %definition.key, level = definition.hierarchy_level, "Facet defined");
        Ok(definition)
    }

    pub fn definition(&self, facet: &FacetKey) -> Result<Option<FacetDefinition>> {
        self.repository.find_definition(facet)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns true iff `entity` holds a live assignment of `facet`.
    pub fn has_facet(&self, entity: &EntityRef, facet: &FacetKey) -> Result<bool> {
        Ok(self.live_assignment(entity, facet)?.is_some())
    }

    /// Like [`has_facet`](Self::has_facet), but also requires the definition's
    /// `hierarchy_level` to be at least `minimum_level`.
    pub fn has_facet_at_level(
        &self,
        entity: &EntityRef,
        facet: &FacetKey,
        minimum_level: i32,
    ) -> Result<bool> {
        Ok(self
            .live_assignment(entity, facet)?
            .is_some_and(|(definition, _)| definition.hierarchy_level >= minimum_level))
    }

    /// Returns true if `entity` holds any live facet in `scope` ranked at
    /// least `minimum_level`.
    pub fn has_any_facet_at_level(
        &self,
        entity: &EntityRef,
        scope: &str,
        minimum_level: i32,
    ) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .repository
            .assignments_for(entity)?
            .iter()
            .any(|(definition, assignment)| {
                definition.is_active
                    && definition.key.scope() == scope
                    && definition.hierarchy_level >= minimum_level
                    && assignment.is_live_at(now)
            }))
    }

    /// Returns the entity's active assignments, optionally limited to one scope.
    ///
    /// Expired-but-unrevoked assignments are included with `is_expired` set,
    /// so callers can show them; they do not count for [`has_facet`](Self::has_facet).
    pub fn get_facets(
        &self,
        entity: &EntityRef,
        scope: Option<&str>,
    ) -> Result<Vec<FacetWithAssignment>> {
        let now = self.clock.now();
        Ok(self
            .repository
            .assignments_for(entity)?
            .into_iter()
            .filter(|(definition, _)| definition.is_active)
            .filter(|(definition, _)| scope.is_none_or(|s| definition.key.scope() == s))
            .map(|(definition, assignment)| FacetWithAssignment {
                is_expired: assignment.is_expired_at(now),
                needs_review: assignment.needs_review_at(now, self.review_warning),
                definition,
                assignment,
            })
            .collect())
    }

    /// Returns what the entity's `scope:name` facet stands for.
    ///
    /// Yields the facet's value when it has one, otherwise its name. When
    /// several values are held, the most senior (then most recent) wins.
    pub fn get_facet_value(
        &self,
        entity: &EntityRef,
        scope: &str,
        name: &str,
    ) -> Result<Option<String>> {
        let now = self.clock.now();
        let best = self
            .repository
            .assignments_for(entity)?
            .into_iter()
            .filter(|(definition, assignment)| {
                definition.is_active
                    && definition.key.matches(scope, name)
                    && assignment.is_live_at(now)
            })
            .max_by(|(da, aa), (db, ab)| {
                da.hierarchy_level
                    .cmp(&db.hierarchy_level)
                    .then(aa.assigned_at.cmp(&ab.assigned_at))
            });

        Ok(best.map(|(definition, _)| {
            definition
                .key
                .value()
                .unwrap_or(definition.key.name())
                .to_string()
        }))
    }

    /// Returns the ledger for `entity` in append order.
    pub fn history(&self, entity: &EntityRef) -> Result<Vec<HistoryEntry>> {
        self.repository.history_for(entity)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Assigns a declared facet to an entity.
    ///
    /// Re-assigning updates the existing row and re-activates it; it never
    /// creates a second row.
    ///
    /// # Errors
    ///
    /// Returns [`FacetError::FacetNotFound`] if the facet was never declared.
    pub fn assign_facet(&self, request: AssignRequest) -> Result<FacetAssignment> {
        let definition = self.require_definition(&request.facet)?;
        let now = self.clock.now();

        let existing = self
            .repository
            .find_assignment(definition.id, &request.entity)?;

        let expiry_days = request.expiry_days.or(definition.expiry_days);
        let assignment = FacetAssignment {
            id: existing.as_ref().map_or_else(AssignmentId::generate, |a| a.id),
            facet_id: definition.id,
            entity: request.entity,
            assigned_by: request.actor.clone(),
            assigned_at: now,
            expires_at: expiry_days.map(|days| now + Duration::days(i64::from(days))),
            review_at: definition
                .review_days
                .map(|days| now + Duration::days(i64::from(days))),
            reason: request.reason.clone(),
            metadata: request.metadata.unwrap_or_default(),
            is_active: true,
        };

        let entry = HistoryEntry::for_assignment(
            &assignment,
            HistoryAction::Assigned,
            request.actor,
            now,
            request.reason,
        );
        let assignment = self
            .repository
            .commit(existing.as_ref(), assignment, entry)?;

        info!(
            facet = %definition.key,
            entity = %assignment.entity,
            expires_at = ?assignment.expires_at,
            "Facet assigned"
        );
        Ok(assignment)
    }

    /// Revokes an active assignment.
    ///
    /// Revoking a facet that is undeclared or not held is a no-op.
    pub fn revoke_facet(
        &self,
        facet: &FacetKey,
        entity: &EntityRef,
        actor: Option<&EntityId>,
        reason: Option<&str>,
    ) -> Result<()> {
        let Some(definition) = self.repository.find_definition(facet)? else {
            debug!(facet = %facet, entity = %entity, "Revoke of undeclared facet ignored");
            return Ok(());
        };
        let Some(current) = self
            .repository
            .find_assignment(definition.id, entity)?
            .filter(|a| a.is_active)
        else {
            debug!(facet = %facet, entity = %entity, "Revoke of unheld facet ignored");
            return Ok(());
        };

        let mut assignment = current.clone();
        assignment.is_active = false;
        let entry = HistoryEntry::for_assignment(
            &assignment,
            HistoryAction::Revoked,
            actor.cloned(),
            self.clock.now(),
            reason.map(str::to_string),
        );
        self.repository.commit(Some(&current), assignment, entry)?;

        info!(facet = %facet, entity = %entity, "Facet revoked");
        Ok(())
    }

    /// Pushes an assignment's expiry forward by `additional_days`.
    ///
    /// The extension starts from the later of now and the current expiry,
    /// so extending an already-expired assignment revives it for the full
    /// period.
    pub fn extend_facet(
        &self,
        facet: &FacetKey,
        entity: &EntityRef,
        actor: Option<&EntityId>,
        additional_days: u32,
        reason: Option<&str>,
    ) -> Result<FacetAssignment> {
        let (_, current) = self.require_active(facet, entity)?;
        let now = self.clock.now();

        let Some(previous) = current.expires_at else {
            return Err(FacetError::Validation(format!(
                "{facet} on {entity} has no expiry to extend"
            )));
        };

        let mut assignment = current.clone();
        assignment.expires_at = Some(previous.max(now) + Duration::days(i64::from(additional_days)));
        let entry = HistoryEntry::for_assignment(
            &assignment,
            HistoryAction::Extended,
            actor.cloned(),
            now,
            reason.map(str::to_string),
        )
        .with_previous_expiry(Some(previous));
        let assignment = self.repository.commit(Some(&current), assignment, entry)?;

        info!(
            facet = %facet,
            entity = %entity,
            expires_at = ?assignment.expires_at,
            "Facet extended"
        );
        Ok(assignment)
    }

    /// Records a review and schedules the next one from the definition's
    /// `review_days`.
    pub fn review_facet(
        &self,
        facet: &FacetKey,
        entity: &EntityRef,
        actor: Option<&EntityId>,
        reason: Option<&str>,
    ) -> Result<FacetAssignment> {
        let (definition, current) = self.require_active(facet, entity)?;
        let now = self.clock.now();

        let mut assignment = current.clone();
        assignment.review_at = definition
            .review_days
            .map(|days| now + Duration::days(i64::from(days)));
        let entry = HistoryEntry::for_assignment(
            &assignment,
            HistoryAction::Reviewed,
            actor.cloned(),
            now,
            reason.map(str::to_string),
        );
        let assignment = self.repository.commit(Some(&current), assignment, entry)?;

        info!(facet = %facet, entity = %entity, next_review = ?assignment.review_at, "Facet reviewed");
        Ok(assignment)
    }

    /// Replaces an assignment's metadata.
    pub fn update_metadata(
        &self,
        facet: &FacetKey,
        entity: &EntityRef,
        actor: Option<&EntityId>,
        metadata: Metadata,
        reason: Option<&str>,
    ) -> Result<FacetAssignment> {
        let (_, current) = self.require_active(facet, entity)?;

        let mut assignment = current.clone();
        assignment.metadata = metadata;
        let entry = HistoryEntry::for_assignment(
            &assignment,
            HistoryAction::Modified,
            actor.cloned(),
            self.clock.now(),
            reason.map(str::to_string),
        );
        self.repository.commit(Some(&current), assignment, entry)
    }

    /// Deactivates every active assignment whose expiry has passed.
    ///
    /// Reconciliation job: each deactivation is committed with its own
    /// `EXPIRED` row, performed by the system. A row that changed since the
    /// sweep read it is left alone. Returns how many were expired.
    pub fn expire_stale_assignments(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut expired = 0;

        for current in self.repository.active_assignments()? {
            if !current.is_expired_at(now) {
                continue;
            }
            let mut assignment = current.clone();
            assignment.is_active = false;
            let entry = HistoryEntry::for_assignment(
                &assignment,
                HistoryAction::Expired,
                None,
                now,
                Some("expiry reached".to_string()),
            );
            match self.repository.commit(Some(&current), assignment, entry) {
                Ok(_) => expired += 1,
                Err(FacetError::Conflict { facet_id, entity }) => {
                    debug!(facet_id = %facet_id, entity = %entity, "Assignment changed during sweep; skipped");
                }
                Err(e) => return Err(e),
            }
        }

        if expired > 0 {
            info!(count = expired, "Expired stale facet assignments");
        }
        Ok(expired)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn require_definition(&self, facet: &FacetKey) -> Result<FacetDefinition> {
        self.repository
            .find_definition(facet)?
            .ok_or_else(|| FacetError::FacetNotFound(facet.clone()))
    }

    fn require_active(
        &self,
        facet: &FacetKey,
        entity: &EntityRef,
    ) -> Result<(FacetDefinition, FacetAssignment)> {
        let definition = self.require_definition(facet)?;
        let assignment = self
            .repository
            .find_assignment(definition.id, entity)?
            .filter(|a| a.is_active)
            .ok_or_else(|| FacetError::AssignmentNotFound {
                facet: facet.clone(),
                entity: entity.clone(),
            })?;
        Ok((definition, assignment))
    }

    fn live_assignment(
        &self,
        entity: &EntityRef,
        facet: &FacetKey,
    ) -> Result<Option<(FacetDefinition, FacetAssignment)>> {
        let Some(definition) = self.repository.find_definition(facet)? else {
            return Ok(None);
        };
        if !definition.is_active {
            return Ok(None);
        }
        let now = self.clock.now();
        Ok(self
            .repository
            .find_assignment(definition.id, entity)?
            .filter(|a| a.is_live_at(now))
            .map(|a| (definition, a)))
    }
}

// ============================================================================
// Tests
// ============================================================================
