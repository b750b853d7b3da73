//! Error types for facet operations.

use thiserror::Error;
use warden_types::{EntityRef, FacetKey, FacetKeyError};

use crate::model::FacetId;

/// Error type for facet store and repository operations.
#[derive(Debug, Error)]
pub enum FacetError {
    /// Malformed facet identifier.
    #[error(transparent)]
    InvalidKey(#[from] FacetKeyError),

    /// Request violates an assignment invariant.
    #[error("Invalid facet operation: {0}")]
    Validation(String),

    /// Facet was never declared.
    #[error("Facet not found: {0}")]
    FacetNotFound(FacetKey),

    /// A definition with the same identity tuple already exists.
    #[error("Facet already defined: {0}")]
    DuplicateFacet(FacetKey),

    /// The entity holds no active assignment of the facet.
    #[error("No active assignment of {facet} for {entity}")]
    AssignmentNotFound { facet: FacetKey, entity: EntityRef },

    /// The assignment row changed between read and commit.
    #[error("Assignment of facet {facet_id} for {entity} changed concurrently")]
    Conflict { facet_id: FacetId, entity: EntityRef },

    /// Backing store failure.
    #[error("Facet store error: {0}")]
    Store(String),
}

/// Result type for facet operations.
pub type Result<T> = std::result::Result<T, FacetError>;
