//! Decisions and the primitives that build and combine them.
//!
//! Every check produces a fresh [`Decision`]. Decisions are plain values:
//! [`grant`] and [`deny`] construct them, [`require_all`] and
//! [`require_any`] pick a representative from several, and [`safe_check`]
//! turns any failure inside a check into an explicit denial.

use std::borrow::Cow;
use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;
use warden_types::EntityId;

/// Free-form JSON object attached to decisions.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Reason Code
// ============================================================================

/// Stable, machine-readable tag naming the rule that produced a decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReasonCode(Cow<'static, str>);

impl ReasonCode {
    pub const PUBLIC_VISIBILITY: Self = Self(Cow::Borrowed("PUBLIC_VISIBILITY"));
    pub const PUBLIC_UNLISTED: Self = Self(Cow::Borrowed("PUBLIC_UNLISTED"));
    pub const NOT_AUTHENTICATED: Self = Self(Cow::Borrowed("NOT_AUTHENTICATED"));
    pub const OWNER: Self = Self(Cow::Borrowed("OWNER"));
    pub const FRIENDS: Self = Self(Cow::Borrowed("FRIENDS"));
    pub const GLOBAL_ADMIN: Self = Self(Cow::Borrowed("GLOBAL_ADMIN"));
    pub const DIVISIONAL_ADMIN: Self = Self(Cow::Borrowed("DIVISIONAL_ADMIN"));
    pub const MANAGER: Self = Self(Cow::Borrowed("MANAGER"));
    pub const DEFAULT_DENY: Self = Self(Cow::Borrowed("DEFAULT_DENY"));
    pub const PERMISSION_CHECK_ERROR: Self = Self(Cow::Borrowed("PERMISSION_CHECK_ERROR"));
    pub const NO_DECISIONS: Self = Self(Cow::Borrowed("NO_DECISIONS"));

    /// Creates an application-specific code.
    pub fn custom(code: impl Into<String>) -> Self {
        Self(Cow::Owned(code.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Decision
// ============================================================================

/// The outcome of one permission check.
///
/// `decision_id` is generated at construction and doubles as the
/// idempotency key when the decision is delivered to an audit sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: Uuid,
    pub granted: bool,
    pub user_id: Option<EntityId>,
    pub resource_id: Option<String>,
    pub operation: String,
    pub reason: String,
    pub reason_code: Option<ReasonCode>,
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    fn new(
        granted: bool,
        user_id: Option<&EntityId>,
        resource_id: Option<&str>,
        operation: &str,
        reason: String,
    ) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            granted,
            user_id: user_id.cloned(),
            resource_id: resource_id.map(str::to_string),
            operation: operation.to_string(),
            reason,
            reason_code: None,
            metadata: Metadata::new(),
            timestamp: Utc::now(),
        }
    }

    /// Restamps the decision, for callers deciding on an injected clock.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_code(mut self, code: ReasonCode) -> Self {
        self.reason_code = Some(code);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metadata_map(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Returns true if the decision carries `code`.
    pub fn has_code(&self, code: &ReasonCode) -> bool {
        self.reason_code.as_ref() == Some(code)
    }
}

/// Constructs a granting decision.
pub fn grant(
    user_id: Option<&EntityId>,
    resource_id: Option<&str>,
    operation: &str,
    reason: impl Into<String>,
) -> Decision {
    Decision::new(true, user_id, resource_id, operation, reason.into())
}

/// Constructs a denying decision.
pub fn deny(
    user_id: Option<&EntityId>,
    resource_id: Option<&str>,
    operation: &str,
    reason: impl Into<String>,
) -> Decision {
    Decision::new(false, user_id, resource_id, operation, reason.into())
}

fn no_decisions(combinator: &str) -> Decision {
    deny(
        None,
        None,
        combinator,
        format!("{combinator} received no decisions"),
    )
    .with_code(ReasonCode::NO_DECISIONS)
}

// ============================================================================
// Combinators
// ============================================================================

/// Returns the first denial, or the first decision if all granted.
///
/// Empty input is denied.
pub fn require_all(decisions: impl IntoIterator<Item = Decision>) -> Decision {
    let mut first = None;
    for decision in decisions {
        if !decision.granted {
            return decision;
        }
        first.get_or_insert(decision);
    }
    first.unwrap_or_else(|| no_decisions("require_all"))
}

/// Returns the first grant, or the first denial if none granted.
///
/// Only one representative denial is surfaced. Empty input is denied.
pub fn require_any(decisions: impl IntoIterator<Item = Decision>) -> Decision {
    let mut first_denial = None;
    for decision in decisions {
        if decision.granted {
            return decision;
        }
        first_denial.get_or_insert(decision);
    }
    first_denial.unwrap_or_else(|| no_decisions("require_any"))
}

// ============================================================================
// Fail-closed boundary
// ============================================================================

/// Runs `check`, converting an error or a panic into an explicit denial.
///
/// This is the fail-closed boundary: a failure inside policy logic always
/// yields `granted == false` with [`ReasonCode::PERMISSION_CHECK_ERROR`].
pub fn safe_check<F, E>(check: F, fallback_operation: &str) -> Decision
where
    F: FnOnce() -> Result<Decision, E>,
    E: Display,
{
    let error = match catch_unwind(AssertUnwindSafe(check)) {
        Ok(Ok(decision)) => return decision,
        Ok(Err(error)) => error.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };

    warn!(operation = %fallback_operation, error = %error, "Permission check failed; denying");
    deny(
        None,
        None,
        fallback_operation,
        "Permission check failed due to internal error",
    )
    .with_code(ReasonCode::PERMISSION_CHECK_ERROR)
    .with_metadata("error", error)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during permission check".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
