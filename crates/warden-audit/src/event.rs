//! Audit events and queries over them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_abac::{Authentication, Decision, FACETS_CHECKED, ReasonCode};

/// Request context captured alongside a decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    /// Facet identifiers consulted while deciding.
    pub facets_checked: Vec<String>,
}

impl AuditContext {
    /// Collects the context from the request and the decision's metadata.
    pub fn capture(auth: &Authentication, decision: &Decision) -> Self {
        let facets_checked = decision
            .metadata
            .get(FACETS_CHECKED)
            .and_then(serde_json::Value::as_array)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            ip_address: auth.ip_address.clone(),
            user_agent: auth.user_agent.clone(),
            request_id: auth.request_id.clone(),
            facets_checked,
        }
    }
}

/// One audited decision.
///
/// `event_id` always equals the decision's `decision_id`, so redelivery of
/// the same decision can be recognised by any sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub decision: Decision,
    pub context: AuditContext,
}

impl AuditEvent {
    pub fn new(decision: Decision, context: AuditContext) -> Self {
        Self {
            event_id: decision.decision_id,
            recorded_at: Utc::now(),
            decision,
            context,
        }
    }

    /// Overrides the wall-clock `recorded_at`.
    pub fn recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.recorded_at = at;
        self
    }

    pub fn from_check(auth: &Authentication, decision: Decision) -> Self {
        let context = AuditContext::capture(auth, &decision);
        Self::new(decision, context)
    }
}

/// Query filter for recorded events.
///
/// All fields are optional and combined with AND logic.
#[derive(Debug, Default, Clone)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    pub resource_id: Option<String>,
    pub granted: Option<bool>,
    pub reason_code: Option<ReasonCode>,
    pub time_from: Option<DateTime<Utc>>,
    pub time_to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn with_resource(mut self, resource_id: &str) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    /// Only grants (`true`) or only denials (`false`).
    pub fn with_outcome(mut self, granted: bool) -> Self {
        self.granted = Some(granted);
        self
    }

    pub fn with_reason_code(mut self, code: ReasonCode) -> Self {
        self.reason_code = Some(code);
        self
    }

    /// Filter to decisions within a time range (inclusive).
    pub fn with_time_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.time_from = Some(from);
        self.time_to = Some(to);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn matches(&self, event: &AuditEvent) -> bool {
        let decision = &event.decision;
        if let Some(ref user_id) = self.user_id {
            if decision.user_id.as_ref().map(|u| u.as_str()) != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(ref resource_id) = self.resource_id {
            if decision.resource_id.as_ref() != Some(resource_id) {
                return false;
            }
        }
        if self.granted.is_some_and(|granted| decision.granted != granted) {
            return false;
        }
        if let Some(ref code) = self.reason_code {
            if !decision.has_code(code) {
                return false;
            }
        }
        if self.time_from.is_some_and(|from| decision.timestamp < from) {
            return false;
        }
        if self.time_to.is_some_and(|to| decision.timestamp > to) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use test_case::test_case;
    use warden_abac::{deny, grant};
    use warden_types::EntityId;

    #[test]
    fn test_event_id_is_decision_id() {
        let decision = grant(None, Some("r"), "read", "ok");
        let id = decision.decision_id;
        let event = AuditEvent::new(decision, AuditContext::default());
        assert_eq!(event.event_id, id);
    }

    #[test]
    fn test_capture_reads_facets_checked() {
        let auth = Authentication::user("u")
            .with_ip("10.1.1.1")
            .with_request_id("req-1");
        let decision = grant(auth.user_id.as_ref(), Some("r"), "read", "admin")
            .with_metadata(FACETS_CHECKED, vec!["role:admin", "org-division:sales"]);

        let event = AuditEvent::from_check(&auth, decision);
        assert_eq!(event.context.ip_address.as_deref(), Some("10.1.1.1"));
        assert_eq!(event.context.request_id.as_deref(), Some("req-1"));
        assert_eq!(
            event.context.facets_checked,
            vec!["role:admin", "org-division:sales"]
        );
    }

    #[test]
    fn test_query_matches() {
        let alice = EntityId::new("alice");
        let event = AuditEvent::new(
            deny(Some(&alice), Some("doc"), "read", "no").with_code(ReasonCode::DEFAULT_DENY),
            AuditContext::default(),
        );

        assert!(AuditQuery::default().matches(&event));
        assert!(AuditQuery::default().with_user("alice").matches(&event));
        assert!(!AuditQuery::default().with_user("bob").matches(&event));
        assert!(AuditQuery::default().with_outcome(false).matches(&event));
        assert!(!AuditQuery::default().with_outcome(true).matches(&event));
        assert!(
            AuditQuery::default()
                .with_reason_code(ReasonCode::DEFAULT_DENY)
                .with_resource("doc")
                .matches(&event)
        );
        assert!(
            !AuditQuery::default()
                .with_reason_code(ReasonCode::MANAGER)
                .matches(&event)
        );
    }

    #[test_case(-5, 5, true ; "surrounding")]
    #[test_case(0, 0, true ; "exact bounds are inclusive")]
    #[test_case(1, 5, false ; "starts after")]
    #[test_case(-5, -1, false ; "ends before")]
    fn test_query_time_range(from_minutes: i64, to_minutes: i64, expected: bool) {
        let event = AuditEvent::new(grant(None, Some("doc"), "read", "ok"), AuditContext::default());
        let at = event.decision.timestamp;
        let query = AuditQuery::default().with_time_range(
            at + Duration::minutes(from_minutes),
            at + Duration::minutes(to_minutes),
        );
        assert_eq!(query.matches(&event), expected);
    }
}
