//! # warden-abac: Attribute-Based Access Control
//!
//! Turns a requester, a resource snapshot and an operation into an explicit
//! [`Decision`]. Every failure path ends in a denial.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Access Request                              │
//! │  (Authentication + Resource + Operation)     │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  ResourcePolicy (inside safe_check)          │
//! │  ├─ Visibility, identity, ownership          │
//! │  ├─ Facets (global / divisional)             │
//! │  ├─ Line management                          │
//! │  └─ DEFAULT_DENY when every rule abstains    │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Decision                                    │
//! │  - granted / reason / reason_code            │
//! │  - facetsChecked metadata                    │
//! │  - decision_id (audit idempotency key)       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Examples
//!
//! ```
//! use warden_abac::{
//!     Authentication, OwnerRule, PublicVisibilityRule, ReasonCode, RequireAuthenticationRule,
//!     ResourceAttributes, ResourcePolicy, Visibility,
//! };
//!
//! let policy = ResourcePolicy::new("notes-read", "read")
//!     .with_rule(PublicVisibilityRule)
//!     .with_rule(RequireAuthenticationRule)
//!     .with_rule(OwnerRule);
//!
//! let note = ResourceAttributes::new("note-1").owned_by("alice");
//!
//! let decision = policy.evaluate(&Authentication::user("alice"), &note);
//! assert!(decision.granted);
//! assert!(decision.has_code(&ReasonCode::OWNER));
//!
//! let decision = policy.evaluate(&Authentication::user("bob"), &note);
//! assert!(!decision.granted);
//! assert!(decision.has_code(&ReasonCode::DEFAULT_DENY));
//!
//! let public = note.with_visibility(Visibility::Public);
//! assert!(policy.evaluate(&Authentication::anonymous(), &public).granted);
//! ```

pub mod attributes;
pub mod decision;
pub mod engine;
pub mod error;
pub mod policy;
pub mod relationships;
pub mod rules;

pub use attributes::{Authentication, Resource, ResourceAttributes, Visibility};
pub use decision::{
    Decision, Metadata, ReasonCode, deny, grant, require_all, require_any, safe_check,
};
pub use engine::PermissionEngine;
pub use error::{EngineError, PolicyError, RelationshipError};
pub use policy::{ContentPolicy, ElevatedFacets, FACETS_CHECKED, PolicyContext, ResourcePolicy};
pub use relationships::{MemoryRelationships, NoRelationships, RelationshipResolver};
pub use rules::{
    DivisionSelector, DivisionalFacetRule, FriendsRule, GlobalFacetRule, ManagerRule, OwnerRule,
    PublicVisibilityRule, RequireAuthenticationRule, Request, Rule, RuleOutcome, Trace,
};
