//! Smooth weighted round-robin load balancing algorithm.

use super::Balancer;
use crate::selector::weighted::PickClock;
use crate::selector::{DoneFunc, Node, SelectError, WeightedNode, WeightedNodeBuilder, noop_done};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Runtime node for smooth weighted round-robin.
#[derive(Debug)]
pub struct WrrNode {
    node: Node,
    effective_weight: i64,
    current_weight: AtomicI64,
    clock: PickClock,
}

impl WrrNode {
    /// Wrap a node. The effective weight is the declared weight, at least 1.
    pub fn new(node: Node) -> Self {
        let effective_weight = node.weight_or_default().clamp(1, i64::MAX as u64) as i64;
        Self {
            node,
            effective_weight,
            current_weight: AtomicI64::new(0),
            clock: PickClock::new(),
        }
    }

    /// Effective weight used for scheduling.
    pub fn effective_weight(&self) -> i64 {
        self.effective_weight
    }

    /// Current round-robin weight.
    pub fn current_weight(&self) -> i64 {
        self.current_weight.load(Ordering::Relaxed)
    }
}

impl WeightedNode for WrrNode {
    fn raw(&self) -> &Node {
        &self.node
    }

    fn weight(&self) -> f64 {
        self.effective_weight as f64
    }

    fn pick(&self) -> DoneFunc {
        self.clock.touch();
        noop_done()
    }

    fn pick_elapsed(&self) -> Duration {
        self.clock.elapsed()
    }
}

/// Builder for [`WrrNode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WrrBuilder;

impl WeightedNodeBuilder for WrrBuilder {
    type Output = WrrNode;

    fn build(&self, node: Node) -> WrrNode {
        WrrNode::new(node)
    }
}

/// Smooth weighted round-robin load balancer.
///
/// Every pick adds each candidate's effective weight to its current weight,
/// selects the highest current weight (first in list order on ties) and
/// subtracts the total weight from the winner. Picks are proportional to
/// weight without bursts on the heaviest node.
#[derive(Default)]
pub struct Wrr {
    /// Serializes the read-modify-write over all candidates.
    lock: Mutex<()>,
}

impl Wrr {
    /// Create a new smooth weighted round-robin load balancer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Balancer for Wrr {
    type Node = WrrNode;

    fn pick(&self, candidates: &[Arc<WrrNode>]) -> Result<(Arc<WrrNode>, DoneFunc), SelectError> {
        if candidates.is_empty() {
            return Err(SelectError::NoAvailableNode);
        }

        let selected = {
            let _guard = self.lock.lock();

            let mut total = 0i64;
            let mut best: Option<(usize, i64)> = None;
            for (i, node) in candidates.iter().enumerate() {
                total = total.saturating_add(node.effective_weight);
                let current = node
                    .current_weight
                    .fetch_add(node.effective_weight, Ordering::Relaxed)
                    + node.effective_weight;
                if best.is_none_or(|(_, max)| current > max) {
                    best = Some((i, current));
                }
            }

            // Non-empty candidates always yield a best entry.
            let (idx, _) = best.ok_or(SelectError::NoAvailableNode)?;
            let selected = &candidates[idx];
            selected.current_weight.fetch_sub(total, Ordering::Relaxed);
            Arc::clone(selected)
        };

        let done = selected.pick();
        Ok((selected, done))
    }
}
