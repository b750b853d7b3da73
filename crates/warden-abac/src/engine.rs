//! Batch permission filtering on a bounded worker pool.

use std::fmt::Display;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::attributes::Authentication;
use crate::decision::{Decision, safe_check};
use crate::error::EngineError;

/// Operation name recorded on denials produced inside a filter.
pub const FILTER_OPERATION: &str = "filter_by_permission";

/// Evaluates many checks at once without unbounded fan-out.
///
/// # Thread Safety
///
/// The engine owns a dedicated rayon pool of `concurrency` threads and is
/// safe to share across threads.
pub struct PermissionEngine {
    pool: ThreadPool,
    concurrency: usize,
}

impl PermissionEngine {
    pub fn new(concurrency: usize) -> Result<Self, EngineError> {
        if concurrency == 0 {
            return Err(EngineError::ZeroConcurrency);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|i| format!("warden-filter-{i}"))
            .build()?;
        Ok(Self { pool, concurrency })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the items `check` grants, in their original relative order.
    ///
    /// Each item is checked inside [`safe_check`], so an item whose check
    /// fails or panics is excluded without affecting the others.
    pub fn filter_by_permission<T, F, E>(
        &self,
        items: Vec<T>,
        auth: &Authentication,
        check: F,
    ) -> Vec<T>
    where
        T: Sync,
        F: Fn(&T, &Authentication) -> Result<Decision, E> + Sync,
        E: Display,
    {
        let total = items.len();
        let granted: Vec<bool> = self.pool.install(|| {
            items
                .par_iter()
                .map(|item| safe_check(|| check(item, auth), FILTER_OPERATION).granted)
                .collect()
        });

        let kept: Vec<T> = items
            .into_iter()
            .zip(granted)
            .filter_map(|(item, ok)| ok.then_some(item))
            .collect();
        debug!(total, kept = kept.len(), "Filtered items by permission");
        kept
    }

    /// Like [`filter_by_permission`](Self::filter_by_permission) for checks
    /// that cannot fail, such as a policy's `evaluate`.
    pub fn filter_by_decision<T, F>(&self, items: Vec<T>, auth: &Authentication, check: F) -> Vec<T>
    where
        T: Sync,
        F: Fn(&T, &Authentication) -> Decision + Sync,
    {
        self.filter_by_permission(items, auth, |item, auth| {
            Ok::<_, std::convert::Infallible>(check(item, auth))
        })
    }
}

impl std::fmt::Debug for PermissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionEngine")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}
