//! Facet data model.
//!
//! Three record kinds make up the facet subsystem:
//! - **Definitions**: the vocabulary of grantable facets and their lifecycle defaults
//! - **Assignments**: the binding of one definition to one entity
//! - **History**: an append-only ledger of every assignment transition

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;
use warden_types::{EntityId, EntityRef, FacetKey};

/// Free-form JSON object attached to assignments.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier of a [`FacetDefinition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FacetId(Uuid);

impl FacetId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for FacetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a [`FacetAssignment`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssignmentId(Uuid);

impl AssignmentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for AssignmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Facet Definition
// ============================================================================

/// A declared facet that may be assigned to entities.
///
/// The identity tuple ([`FacetKey`]) is immutable. Facets must be declared
/// before they can be assigned; assignment never creates a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetDefinition {
    pub id: FacetId,
    pub key: FacetKey,
    pub description: Option<String>,
    /// Decisions involving this facet should be forwarded to the audit sink.
    pub requires_audit: bool,
    /// Default grant lifetime in days. `None` means assignments never expire.
    pub expiry_days: Option<u32>,
    pub requires_review: bool,
    /// Days between assignment (or last review) and the next review.
    pub review_days: Option<u32>,
    /// Parent in the hierarchy of facet kinds (not the org chart).
    pub parent_facet_id: Option<FacetId>,
    /// Seniority rank. Higher is more senior.
    pub hierarchy_level: i32,
    pub is_active: bool,
}

impl FacetDefinition {
    /// Creates an active definition with no expiry, no review and level 0.
    pub fn new(key: FacetKey) -> Self {
        Self {
            id: FacetId::generate(),
            key,
            description: None,
            requires_audit: false,
            expiry_days: None,
            requires_review: false,
            review_days: None,
            parent_facet_id: None,
            hierarchy_level: 0,
            is_active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_expiry_days(mut self, days: u32) -> Self {
        self.expiry_days = Some(days);
        self
    }

    /// Marks the facet as requiring review every `days` days.
    pub fn with_review_days(mut self, days: u32) -> Self {
        self.requires_review = true;
        self.review_days = Some(days);
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.hierarchy_level = level;
        self
    }

    pub fn with_parent(mut self, parent: FacetId) -> Self {
        self.parent_facet_id = Some(parent);
        self
    }

    pub fn audited(mut self) -> Self {
        self.requires_audit = true;
        self
    }
}

// ============================================================================
// Facet Assignment
// ============================================================================

/// The binding of one facet definition to one entity.
///
/// At most one row exists per `(facet_id, entity)`; re-assignment updates
/// that row in place. Expiry is computed at read time, so an expired row may
/// still carry `is_active == true` until revoked or reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetAssignment {
    pub id: AssignmentId,
    pub facet_id: FacetId,
    pub entity: EntityRef,
    /// `None` means the assignment was made by the system.
    pub assigned_by: Option<EntityId>,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub review_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub metadata: Metadata,
    pub is_active: bool,
}

impl FacetAssignment {
    /// Returns true once `now` has reached `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Active and not expired.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    /// Returns true if a review is due within `warning` of `now`.
    pub fn needs_review_at(&self, now: DateTime<Utc>, warning: Duration) -> bool {
        self.review_at
            .is_some_and(|review_at| review_at - warning <= now)
    }
}

/// An assignment joined with its definition and computed lifecycle flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetWithAssignment {
    pub definition: FacetDefinition,
    pub assignment: FacetAssignment,
    pub is_expired: bool,
    pub needs_review: bool,
}

// ============================================================================
// Assignment History
// ============================================================================

/// The kind of transition recorded in the assignment ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Assigned,
    Revoked,
    Expired,
    Reviewed,
    Extended,
    Modified,
}

/// One immutable row of the assignment ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub assignment_id: AssignmentId,
    pub facet_id: FacetId,
    pub entity: EntityRef,
    pub action: HistoryAction,
    pub performed_by: Option<EntityId>,
    pub performed_at: DateTime<Utc>,
    pub reason: Option<String>,
    /// Expiry after the transition.
    pub expires_at: Option<DateTime<Utc>>,
    /// Expiry before the transition. Only set for `Extended`.
    pub previous_expires_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    /// Creates a ledger row describing `action` applied to `assignment`.
    pub fn for_assignment(
        assignment: &FacetAssignment,
        action: HistoryAction,
        performed_by: Option<EntityId>,
        performed_at: DateTime<Utc>,
        reason: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            assignment_id: assignment.id,
            facet_id: assignment.facet_id,
            entity: assignment.entity.clone(),
            action,
            performed_by,
            performed_at,
            reason,
            expires_at: assignment.expires_at,
            previous_expires_at: None,
        }
    }

    pub fn with_previous_expiry(mut self, previous: Option<DateTime<Utc>>) -> Self {
        self.previous_expires_at = previous;
        self
    }
}
