//! warden-audit: Decision audit trail for `Warden`
//!
//! Every permission decision can be turned into an [`AuditEvent`] and handed
//! to an [`AuditSink`]. The [`AuditDispatcher`] keeps the decision path free
//! of audit latency: events go onto a bounded lock-free queue and a
//! background worker delivers them.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use warden_abac::{Authentication, grant};
//! use warden_audit::{AuditDispatcher, AuditEvent, DispatcherConfig, MemoryAuditSink};
//!
//! let log = Arc::new(MemoryAuditSink::new());
//! let dispatcher = AuditDispatcher::start(log.clone(), None, DispatcherConfig::default()).unwrap();
//!
//! let auth = Authentication::user("alice").with_request_id("req-1");
//! let decision = grant(auth.user_id.as_ref(), Some("doc-1"), "read", "owner");
//! dispatcher.dispatch(AuditEvent::from_check(&auth, decision));
//!
//! assert!(dispatcher.flush(Duration::from_secs(1)));
//! assert_eq!(log.count(), 1);
//! ```

use thiserror::Error;

pub mod dispatcher;
pub mod event;
pub mod queue;
pub mod sink;

pub use dispatcher::{AuditDispatcher, DispatchOutcome, DispatchStats, DispatcherConfig};
pub use event::{AuditContext, AuditEvent, AuditQuery};
pub use sink::{AuditSink, MemoryAuditSink, TracingAuditSink};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Failed to start audit worker: {0}")]
    Worker(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
