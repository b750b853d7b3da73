//! Non-blocking delivery of audit events.
//!
//! [`AuditDispatcher::dispatch`] only ever pushes onto a bounded queue. A
//! background worker drains the queue in batches into the primary sink.
//! When the queue is full, or the primary sink rejects an event, the event
//! goes to the fallback sink synchronously; without a fallback it is logged
//! and dropped. The caller is never blocked and never sees an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::event::AuditEvent;
use crate::queue::{BoundedQueue, PushResult};
use crate::sink::AuditSink;
use crate::{AuditError, Result};

/// How long the idle worker sleeps before polling the queue again.
const IDLE_PARK: Duration = Duration::from_millis(10);

/// Queue and batching limits for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            batch_size: 64,
        }
    }
}

/// Where a dispatched event went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Queued for the background worker.
    Queued,
    /// Queue was full; written to the fallback sink.
    Fallback,
    /// Queue was full and there was no usable fallback.
    Dropped,
}

/// Counters describing what happened to dispatched events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub queued: u64,
    pub delivered: u64,
    pub fallback: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    delivered: AtomicU64,
    fallback: AtomicU64,
    dropped: AtomicU64,
    /// Queued events the worker has finished with, whatever the outcome.
    settled: AtomicU64,
}

struct Shared {
    queue: BoundedQueue<AuditEvent>,
    primary: Arc<dyn AuditSink>,
    fallback: Option<Arc<dyn AuditSink>>,
    counters: Counters,
    shutdown: AtomicBool,
}

impl Shared {
    /// Delivers an event the primary path could not take.
    fn divert(&self, event: &AuditEvent, cause: &str) -> DispatchOutcome {
        if let Some(fallback) = &self.fallback {
            match fallback.emit(event) {
                Ok(()) => {
                    self.counters.fallback.fetch_add(1, Ordering::Relaxed);
                    warn!(event_id = %event.event_id, cause, "Audit event written to fallback sink");
                    return DispatchOutcome::Fallback;
                }
                Err(e) => {
                    warn!(event_id = %event.event_id, error = %e, "Fallback audit sink failed");
                }
            }
        }
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(
            event_id = %event.event_id,
            granted = event.decision.granted,
            operation = %event.decision.operation,
            cause,
            "Audit event dropped"
        );
        DispatchOutcome::Dropped
    }

    fn drain(&self, batch_size: usize) -> usize {
        let batch = self.queue.pop_batch(batch_size);
        let n = batch.len();
        for event in batch {
            match self.primary.emit(&event) {
                Ok(()) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    debug!(event_id = %event.event_id, error = %e, "Primary audit sink rejected event");
                    self.divert(&event, "primary sink failed");
                }
            }
            self.counters.settled.fetch_add(1, Ordering::Release);
        }
        n
    }
}

/// Background audit delivery.
///
/// Dropping the dispatcher drains whatever is still queued, then stops the
/// worker.
pub struct AuditDispatcher {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl AuditDispatcher {
    /// Starts the worker thread.
    pub fn start(
        primary: Arc<dyn AuditSink>,
        fallback: Option<Arc<dyn AuditSink>>,
        config: DispatcherConfig,
    ) -> Result<Self> {
        let batch_size = config.batch_size.max(1);
        let shared = Arc::new(Shared {
            queue: BoundedQueue::new(config.queue_capacity),
            primary,
            fallback,
            counters: Counters::default(),
            shutdown: AtomicBool::new(false),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("warden-audit".to_string())
            .spawn(move || run_worker(&worker_shared, batch_size))
            .map_err(|e| AuditError::Worker(e.to_string()))?;

        debug!(
            capacity = config.queue_capacity,
            batch_size, "Audit dispatcher started"
        );
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Hands an event to the audit pipeline without blocking.
    pub fn dispatch(&self, event: AuditEvent) -> DispatchOutcome {
        match self.shared.queue.try_push(event) {
            PushResult::Ok => {
                self.shared.counters.queued.fetch_add(1, Ordering::Relaxed);
                if let Some(worker) = &self.worker {
                    worker.thread().unpark();
                }
                DispatchOutcome::Queued
            }
            PushResult::Full(event) => self.shared.divert(&event, "audit queue full"),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        let c = &self.shared.counters;
        DispatchStats {
            queued: c.queued.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            fallback: c.fallback.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Waits until every queued event has been settled, or `timeout` passes.
    ///
    /// Returns true if the pipeline is idle.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let queued = self.shared.counters.queued.load(Ordering::Relaxed);
            let settled = self.shared.counters.settled.load(Ordering::Acquire);
            if settled >= queued {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            if let Some(worker) = &self.worker {
                worker.thread().unpark();
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

fn run_worker(shared: &Shared, batch_size: usize) {
    loop {
        if shared.drain(batch_size) > 0 {
            continue;
        }
        if shared.shutdown.load(Ordering::Acquire) {
            // Final drain: producers may have raced the flag
            while shared.drain(batch_size) > 0 {}
            break;
        }
        thread::park_timeout(IDLE_PARK);
    }
    debug!("Audit worker stopped");
}

impl Drop for AuditDispatcher {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            worker.thread().unpark();
            if worker.join().is_err() {
                warn!("Audit worker panicked during shutdown");
            }
        }
    }
}

impl std::fmt::Debug for AuditDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditDispatcher")
            .field("pending", &self.pending())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditContext;
    use crate::sink::MemoryAuditSink;
    use std::sync::Mutex;
    use warden_abac::grant;

    fn event() -> AuditEvent {
        AuditEvent::new(grant(None, Some("doc"), "read", "ok"), AuditContext::default())
    }

    /// Sink that blocks until released, so the queue can be filled.
    struct GatedSink {
        gate: Mutex<()>,
        inner: MemoryAuditSink,
    }

    impl AuditSink for GatedSink {
        fn emit(&self, event: &AuditEvent) -> Result<()> {
            let _open = self.gate.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            self.inner.emit(event)
        }
    }

    #[test]
    fn test_delivers_to_primary() {
        let primary = Arc::new(MemoryAuditSink::new());
        let dispatcher =
            AuditDispatcher::start(primary.clone(), None, DispatcherConfig::default()).unwrap();

        let e = event();
        let id = e.event_id;
        assert_eq!(dispatcher.dispatch(e), DispatchOutcome::Queued);
        assert!(dispatcher.flush(Duration::from_secs(5)));

        assert!(primary.get_event(id).is_some());
        assert_eq!(dispatcher.stats().delivered, 1);
    }

    #[test]
    fn test_failing_primary_uses_fallback() {
        let primary = Arc::new(MemoryAuditSink::new());
        primary.set_failing(true);
        let fallback = Arc::new(MemoryAuditSink::new());
        let dispatcher = AuditDispatcher::start(
            primary.clone(),
            Some(fallback.clone()),
            DispatcherConfig::default(),
        )
        .unwrap();

        let e = event();
        let id = e.event_id;
        dispatcher.dispatch(e);
        assert!(dispatcher.flush(Duration::from_secs(5)));

        assert_eq!(primary.count(), 0);
        assert_eq!(fallback.get_event(id).unwrap().event_id, id);
        assert_eq!(dispatcher.stats().fallback, 1);
    }

    #[test]
    fn test_failing_primary_without_fallback_drops() {
        let primary = Arc::new(MemoryAuditSink::new());
        primary.set_failing(true);
        let dispatcher =
            AuditDispatcher::start(primary, None, DispatcherConfig::default()).unwrap();

        dispatcher.dispatch(event());
        assert!(dispatcher.flush(Duration::from_secs(5)));
        assert_eq!(dispatcher.stats().dropped, 1);
    }

    #[test]
    fn test_full_queue_diverts_synchronously() {
        let gated = Arc::new(GatedSink {
            gate: Mutex::new(()),
            inner: MemoryAuditSink::new(),
        });
        let fallback = Arc::new(MemoryAuditSink::new());
        let config = DispatcherConfig {
            queue_capacity: 2,
            batch_size: 1,
        };

        let hold = gated.gate.lock().unwrap();
        let dispatcher =
            AuditDispatcher::start(gated.clone(), Some(fallback.clone()), config).unwrap();

        // The worker takes at most one event and blocks on the gate; after
        // that the queue fills up and further events are diverted
        let mut outcomes = Vec::new();
        for _ in 0..8 {
            outcomes.push(dispatcher.dispatch(event()));
        }
        assert!(outcomes.contains(&DispatchOutcome::Fallback));
        assert!(outcomes.iter().filter(|o| **o == DispatchOutcome::Queued).count() <= 3);

        drop(hold);
        assert!(dispatcher.flush(Duration::from_secs(5)));

        let stats = dispatcher.stats();
        assert_eq!(stats.delivered + stats.fallback, 8);
        assert_eq!(gated.inner.count() + fallback.count(), 8);
    }

    #[test]
    fn test_drop_drains_queue() {
        let primary = Arc::new(MemoryAuditSink::new());
        {
            let dispatcher =
                AuditDispatcher::start(primary.clone(), None, DispatcherConfig::default())
                    .unwrap();
            for _ in 0..20 {
                dispatcher.dispatch(event());
            }
        }
        assert_eq!(primary.count(), 20);
    }
}
