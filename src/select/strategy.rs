//! Selection strategies
//!
//! Strategies decide how load spreads over the filtered pool. All of them
//! are safe to call from many tasks at once: round-robin uses an atomic
//! counter, the random strategy guards one lazily-seeded generator with a
//! mutex, and FIFO is stateless.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Node;

/// A node distribution strategy.
pub trait Strategy: Send + Sync {
    /// Pick a node from `nodes`; `None` when the slice is empty.
    fn apply(&self, nodes: &[Node]) -> Option<Node>;

    /// Strategy name as it appears in configuration.
    fn name(&self) -> &'static str;
}

/// Resolve a strategy by its configuration name; unknown names fall back
/// to round-robin.
pub fn strategy_from_name(name: &str) -> Arc<dyn Strategy> {
    match name {
        "random" => Arc::new(RandomStrategy::default()),
        "fifo" => Arc::new(FifoStrategy),
        _ => Arc::new(RoundStrategy::default()),
    }
}

/// Round-robin: a monotonically increasing counter indexes the pool.
///
/// The counter is read-then-incremented in one atomic step; two concurrent
/// picks may land on adjacent slots out of order, which is acceptable.
#[derive(Debug, Default)]
pub struct RoundStrategy {
    count: AtomicU64,
}

impl Strategy for RoundStrategy {
    fn apply(&self, nodes: &[Node]) -> Option<Node> {
        if nodes.is_empty() {
            return None;
        }
        let old = self.count.fetch_add(1, Ordering::Relaxed);
        Some(nodes[(old % nodes.len() as u64) as usize].clone())
    }

    fn name(&self) -> &'static str {
        "round"
    }
}

/// Uniform random selection.
///
/// The generator is created on first use, from `seed` when non-zero or
/// from entropy otherwise, and stays behind a mutex afterwards.
#[derive(Debug, Default)]
pub struct RandomStrategy {
    pub seed: u64,
    rng: Mutex<Option<StdRng>>,
}

impl RandomStrategy {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: Mutex::new(None),
        }
    }
}

impl Strategy for RandomStrategy {
    fn apply(&self, nodes: &[Node]) -> Option<Node> {
        if nodes.is_empty() {
            return None;
        }
        let mut guard = self.rng.lock();
        let rng = guard.get_or_insert_with(|| {
            if self.seed == 0 {
                StdRng::from_entropy()
            } else {
                StdRng::seed_from_u64(self.seed)
            }
        });
        Some(nodes[rng.gen_range(0..nodes.len())].clone())
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// First in, first out: always the head of the pool, so traffic sticks to
/// the first node until a filter removes it.
#[derive(Debug, Default, Clone, Copy)]
pub struct FifoStrategy;

impl Strategy for FifoStrategy {
    fn apply(&self, nodes: &[Node]) -> Option<Node> {
        nodes.first().cloned()
    }

    fn name(&self) -> &'static str {
        "fifo"
    }
}
