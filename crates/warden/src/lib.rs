//! # Warden
//!
//! Fail-closed, attribute-based access control.
//!
//! Warden decides whether an identity may perform an operation on a
//! resource by combining:
//!
//! - **Facets** - attribute grants with expiry and review lifecycles
//! - **Line management** - managers see their reports' resources
//! - **Resource policies** - ordered rule chains ending in a default deny
//!
//! Any internal failure during a check yields a denial, never a grant.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                            Warden                             │
//! │  ┌────────────┐   ┌─────────────┐   ┌──────────┐   ┌───────┐ │
//! │  │ FacetStore │ → │             │   │          │   │       │ │
//! │  └────────────┘   │   Policy    │ → │ Decision │ → │ Audit │ │
//! │  ┌────────────┐   │ (safe_check)│   │          │   │       │ │
//! │  │ Hierarchy  │ → │             │   │          │   │       │ │
//! │  └────────────┘   └─────────────┘   └──────────┘   └───────┘ │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - **Facade**: [`Warden`], [`WardenBuilder`]
//! - **Data**: [`warden_facets`], [`warden_hierarchy`]
//! - **Decisions**: [`warden_abac`], [`warden_audit`]

mod error;
mod warden;

pub use error::{Result, WardenError};
pub use warden::{Warden, WardenBuilder};

pub use warden_config::{ConfigLoader, WardenConfig};
pub use warden_types::{Clock, EntityId, EntityRef, FacetKey, ManualClock, SystemClock};

pub use warden_abac::{
    Authentication, ContentPolicy, Decision, ReasonCode, Resource, ResourceAttributes,
    ResourcePolicy, Visibility, deny, grant, require_all, require_any, safe_check,
};
pub use warden_audit::{AuditEvent, AuditSink, MemoryAuditSink};
pub use warden_facets::{AssignRequest, FacetDefinition, FacetStore};
pub use warden_hierarchy::{HierarchyResolver, ReportingLines};

pub use warden_abac;
pub use warden_audit;
pub use warden_facets;
pub use warden_hierarchy;
