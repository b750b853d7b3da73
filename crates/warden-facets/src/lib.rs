//! # warden-facets: Facet grants with expiry and review lifecycles
//!
//! A facet is a named, optionally valued attribute grant (a role, a division,
//! a feature flag) assignable to any entity.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  FacetStore                                  │
//! │  ├─ has_facet / has_facet_at_level           │
//! │  ├─ get_facets / get_facet_value             │
//! │  └─ assign / revoke / extend / review        │
//! └─────────────────┬───────────────────────────┘
//!                   │  commit(assignment, history)
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  FacetRepository (injected)                  │
//! │  - Definitions (vocabulary)                  │
//! │  - Assignments (one row per facet+entity)    │
//! │  - History (append-only ledger)              │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Examples
//!
//! ```
//! use std::sync::Arc;
//! use warden_facets::{AssignRequest, FacetDefinition, FacetStore, MemoryFacetRepository};
//! use warden_types::{EntityRef, FacetKey, SystemClock};
//!
//! let store = FacetStore::new(Arc::new(MemoryFacetRepository::new()), Arc::new(SystemClock));
//! let sales: FacetKey = "org-division:sales".parse().unwrap();
//!
//! store.define_facet(FacetDefinition::new(sales.clone()).with_expiry_days(30)).unwrap();
//! store
//!     .assign_facet(AssignRequest::new(sales.clone(), EntityRef::user("x")).by("admin"))
//!     .unwrap();
//!
//! assert!(store.has_facet(&EntityRef::user("x"), &sales).unwrap());
//! ```

pub mod error;
pub mod model;
pub mod repository;
pub mod store;

pub use error::{FacetError, Result};
pub use model::{
    AssignmentId, FacetAssignment, FacetDefinition, FacetId, FacetWithAssignment, HistoryAction,
    HistoryEntry, Metadata,
};
pub use repository::{FacetRepository, MemoryFacetRepository};
pub use store::{AssignRequest, FacetStore};
