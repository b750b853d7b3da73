//! Audit sinks: where decisions end up.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::event::{AuditEvent, AuditQuery};
use crate::{AuditError, Result};

/// Destination for audit events.
///
/// Delivery is at least once: the same event may arrive more than once and
/// implementations should treat `event_id` as an idempotency key.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent) -> Result<()>;
}

// ============================================================================
// Memory sink
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    events: Vec<AuditEvent>,
    seen: HashSet<Uuid>,
}

/// Append-only in-memory audit log.
///
/// Events are stored in arrival order and deduplicated on `event_id`. The
/// API exposes no way to modify or remove a stored event.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    state: RwLock<MemoryState>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `emit` fail, to simulate an unreachable sink.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of distinct events recorded.
    pub fn count(&self) -> usize {
        self.read().map(|s| s.events.len()).unwrap_or(0)
    }

    pub fn get_event(&self, event_id: Uuid) -> Option<AuditEvent> {
        self.read()
            .ok()?
            .events
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned()
    }

    /// Events matching `filter`, in arrival order.
    pub fn query(&self, filter: &AuditQuery) -> Vec<AuditEvent> {
        let Ok(state) = self.read() else {
            return Vec::new();
        };
        let matching = state.events.iter().filter(|e| filter.matches(e)).cloned();
        match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// Events whose decision was made at or after `since`.
    pub fn events_since(&self, since: DateTime<Utc>) -> Vec<AuditEvent> {
        self.query(&AuditQuery {
            time_from: Some(since),
            ..AuditQuery::default()
        })
    }

    /// Exports matching events as a JSON array.
    pub fn export_json(&self, filter: &AuditQuery) -> Result<String> {
        serde_json::to_string_pretty(&self.query(filter)).map_err(AuditError::from)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| AuditError::SinkUnavailable("audit log lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| AuditError::SinkUnavailable("audit log lock poisoned".to_string()))
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, event: &AuditEvent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::SinkUnavailable(
                "memory sink set to fail".to_string(),
            ));
        }
        let mut state = self.write()?;
        if state.seen.insert(event.event_id) {
            state.events.push(event.clone());
        }
        Ok(())
    }
}

// ============================================================================
// Tracing sink
// ============================================================================

/// Writes each event as a structured `tracing` record.
///
/// Useful as a fallback: it cannot fail and needs no storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: &AuditEvent) -> Result<()> {
        let decision = &event.decision;
        info!(
            target: "warden::audit",
            event_id = %event.event_id,
            granted = decision.granted,
            user = ?decision.user_id,
            resource = ?decision.resource_id,
            operation = %decision.operation,
            code = ?decision.reason_code,
            request_id = ?event.context.request_id,
            ip = ?event.context.ip_address,
            facets_checked = ?event.context.facets_checked,
            "Permission decision"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditContext;
    use warden_abac::{ReasonCode, deny, grant};
    use warden_types::EntityId;

    fn event(granted: bool, user: &str) -> AuditEvent {
        let user = EntityId::new(user);
        let decision = if granted {
            grant(Some(&user), Some("doc"), "read", "ok").with_code(ReasonCode::OWNER)
        } else {
            deny(Some(&user), Some("doc"), "read", "no").with_code(ReasonCode::DEFAULT_DENY)
        };
        AuditEvent::new(decision, AuditContext::default())
    }

    #[test]
    fn test_memory_sink_deduplicates() {
        let sink = MemoryAuditSink::new();
        let e = event(true, "alice");

        sink.emit(&e).unwrap();
        sink.emit(&e).unwrap();
        sink.emit(&event(false, "bob")).unwrap();

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.get_event(e.event_id).unwrap(), e);
    }

    #[test]
    fn test_memory_sink_query_and_limit() {
        let sink = MemoryAuditSink::new();
        for _ in 0..3 {
            sink.emit(&event(false, "bob")).unwrap();
        }
        sink.emit(&event(true, "alice")).unwrap();

        let denials = sink.query(&AuditQuery::default().with_outcome(false));
        assert_eq!(denials.len(), 3);
        let limited = sink.query(&AuditQuery::default().with_user("bob").with_limit(2));
        assert_eq!(limited.len(), 2);
        assert_eq!(sink.events_since(Utc::now() - chrono::Duration::hours(1)).len(), 4);
    }

    #[test]
    fn test_memory_sink_failing() {
        let sink = MemoryAuditSink::new();
        sink.set_failing(true);
        assert!(matches!(
            sink.emit(&event(true, "alice")),
            Err(AuditError::SinkUnavailable(_))
        ));
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_export_json() {
        let sink = MemoryAuditSink::new();
        sink.emit(&event(true, "alice")).unwrap();

        let json = sink.export_json(&AuditQuery::default()).unwrap();
        let parsed: Vec<AuditEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].decision.reason_code, Some(ReasonCode::OWNER));
    }

    #[test]
    fn test_tracing_sink_never_fails() {
        assert!(TracingAuditSink.emit(&event(false, "bob")).is_ok());
    }
}
