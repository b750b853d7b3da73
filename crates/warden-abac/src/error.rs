//! Error types for policy evaluation.

use warden_facets::FacetError;
use warden_hierarchy::HierarchyError;

/// Failure answering a relationship question.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("relationship lookup failed: {0}")]
pub struct RelationshipError(pub String);

/// Errors raised inside a rule.
///
/// These never reach callers of [`ResourcePolicy::evaluate`](crate::ResourcePolicy::evaluate);
/// they are converted to a denial at the fail-closed boundary.
#[derive(thiserror::Error, Debug)]
pub enum PolicyError {
    #[error(transparent)]
    Facet(#[from] FacetError),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Relationship(#[from] RelationshipError),
}

/// Errors building the permission engine.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("filter concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("failed to build filter pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for rule evaluation.
pub type Result<T> = std::result::Result<T, PolicyError>;
