//! Selection filters
//!
//! Filters prune the node pool before the strategy runs. Each filter
//! returns a fresh slice; the input is never mutated.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::Node;

/// A node pool filter.
pub trait Filter: Send + Sync {
    /// Return the nodes that survive this filter.
    fn filter(&self, nodes: &[Node]) -> Vec<Node>;

    /// Filter name as it appears in configuration.
    fn name(&self) -> &'static str;
}

/// Drops nodes that are currently considered dead.
///
/// A node is dead when its failure count has reached `max_fails` and the
/// most recent failure is younger than `fail_timeout`. Once the timeout
/// elapses the node is re-admitted for another try. Pools of one node and
/// a `max_fails` of zero disable the filter entirely.
#[derive(Debug, Clone)]
pub struct FailFilter {
    pub max_fails: u32,
    pub fail_timeout: Duration,
}

impl FailFilter {
    pub fn new(max_fails: u32, fail_timeout: Duration) -> Self {
        Self {
            max_fails,
            fail_timeout,
        }
    }

    fn is_alive(&self, node: &Node, now: i64) -> bool {
        node.marker().fail_count() < self.max_fails
            || now.saturating_sub(node.marker().fail_time()) >= self.fail_timeout.as_secs() as i64
    }
}

impl Filter for FailFilter {
    fn filter(&self, nodes: &[Node]) -> Vec<Node> {
        if nodes.len() <= 1 || self.max_fails == 0 {
            return nodes.to_vec();
        }
        let now = unix_now();
        nodes
            .iter()
            .filter(|n| self.is_alive(n, now))
            .cloned()
            .collect()
    }

    fn name(&self) -> &'static str {
        "fail"
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> Vec<Node> {
        (0..n).map(|i| Node::new(i, format!("node-{i}:1"))).collect()
    }

    #[test]
    fn test_excludes_recently_failed() {
        let filter = FailFilter::new(3, Duration::from_secs(30));
        let nodes = pool(3);
        nodes[1].marker().set(3, unix_now());

        let alive = filter.filter(&nodes);
        assert_eq!(alive.len(), 2);
        assert!(alive.iter().all(|n| n.id != 1));
    }

    #[test]
    fn test_readmits_after_timeout() {
        let filter = FailFilter::new(3, Duration::from_secs(30));
        let nodes = pool(3);
        nodes[1].marker().set(5, unix_now() - 31);

        let alive = filter.filter(&nodes);
        assert_eq!(alive.len(), 3);
    }

    #[test]
    fn test_below_max_fails_kept() {
        let filter = FailFilter::new(3, Duration::from_secs(30));
        let nodes = pool(2);
        nodes[0].marker().set(2, unix_now());

        assert_eq!(filter.filter(&nodes).len(), 2);
    }

    #[test]
    fn test_single_node_never_filtered() {
        let filter = FailFilter::new(1, Duration::from_secs(30));
        let nodes = pool(1);
        nodes[0].marker().set(99, unix_now());

        assert_eq!(filter.filter(&nodes).len(), 1);
    }

    #[test]
    fn test_zero_max_fails_disables() {
        let filter = FailFilter::new(0, Duration::from_secs(30));
        let nodes = pool(3);
        for node in &nodes {
            node.marker().set(99, unix_now());
        }

        assert_eq!(filter.filter(&nodes).len(), 3);
    }
}
