//! Upstream node selection
//!
//! A [`NodeSelector`] picks one [`Node`] out of a pool by running the pool
//! through the configured [`Filter`]s (policy: drop dead nodes) and handing
//! the survivors to a [`Strategy`] (distribution: round-robin, random,
//! FIFO). Filters and strategies compose orthogonally and must tolerate
//! concurrent callers.

pub mod filter;
pub mod strategy;

pub use filter::{FailFilter, Filter};
pub use strategy::{strategy_from_name, FifoStrategy, RandomStrategy, RoundStrategy, Strategy};

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::SelectError;

/// Failure bookkeeping shared by every clone of a node.
///
/// External collaborators bump these atomically when a dial through the
/// node fails; [`FailFilter`] reads them during selection.
#[derive(Debug, Default)]
pub struct NodeMarker {
    fail_count: AtomicU32,
    /// Unix seconds of the most recent failure
    fail_time: AtomicI64,
}

impl NodeMarker {
    pub fn fail_count(&self) -> u32 {
        self.fail_count.load(Ordering::Relaxed)
    }

    pub fn fail_time(&self) -> i64 {
        self.fail_time.load(Ordering::Relaxed)
    }

    /// Record one failure at time `now` (unix seconds).
    pub fn mark_fail(&self, now: i64) {
        self.fail_count.fetch_add(1, Ordering::Relaxed);
        self.fail_time.store(now, Ordering::Relaxed);
    }

    /// Clear the failure state after a successful dial.
    pub fn reset(&self) {
        self.fail_count.store(0, Ordering::Relaxed);
        self.fail_time.store(0, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn set(&self, count: u32, time: i64) {
        self.fail_count.store(count, Ordering::Relaxed);
        self.fail_time.store(time, Ordering::Relaxed);
    }
}

/// One upstream endpoint candidate.
///
/// Cloning a node detaches it from the slice it came from while keeping
/// the failure marker shared, so filter output stays in sync with the
/// pool's bookkeeping.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    pub addr: String,
    marker: Arc<NodeMarker>,
}

impl Node {
    pub fn new(id: usize, addr: impl Into<String>) -> Self {
        Self {
            id,
            addr: addr.into(),
            marker: Arc::new(NodeMarker::default()),
        }
    }

    /// The shared failure marker.
    pub fn marker(&self) -> &NodeMarker {
        &self.marker
    }
}

/// Options for a selection: filters applied in order, then one strategy.
pub struct SelectOptions {
    pub filters: Vec<Arc<dyn Filter>>,
    pub strategy: Arc<dyn Strategy>,
}

impl SelectOptions {
    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategy = strategy;
        self
    }
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            strategy: Arc::new(RoundStrategy::default()),
        }
    }
}

/// Applies filters and a strategy over node pools.
#[derive(Default)]
pub struct NodeSelector {
    options: SelectOptions,
}

impl NodeSelector {
    pub fn new(options: SelectOptions) -> Self {
        Self { options }
    }

    /// Pick one node from `nodes`.
    ///
    /// # Errors
    ///
    /// Returns [`SelectError::NoneAvailable`] when the pool is empty or
    /// every node was filtered out.
    pub fn select(&self, nodes: &[Node]) -> Result<Node, SelectError> {
        let mut pool: Vec<Node> = nodes.to_vec();
        for filter in &self.options.filters {
            pool = filter.filter(&pool);
        }
        self.options
            .strategy
            .apply(&pool)
            .ok_or(SelectError::NoneAvailable)
    }
}
