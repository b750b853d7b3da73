//! Error types for the Warden facade.

use thiserror::Error;
use warden_abac::EngineError;
use warden_audit::AuditError;
use warden_config::ConfigError;
use warden_types::FacetKeyError;

/// Result type for Warden construction.
pub type Result<T> = std::result::Result<T, WardenError>;

/// Errors raised while wiring Warden together.
///
/// Permission checks never return these; they always produce a decision.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid facet in policy configuration: {0}")]
    InvalidFacet(#[from] FacetKeyError),

    #[error("permission engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("missing component: {0}")]
    MissingComponent(&'static str),
}
