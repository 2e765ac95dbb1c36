//! Pass-through weighted node used by stateless balancers.

use super::weighted::PickClock;
use super::{DoneFunc, Node, WeightedNode, WeightedNodeBuilder, noop_done};
use std::time::Duration;

/// A node whose weight is its declared weight and never adapts.
#[derive(Debug)]
pub struct DirectNode {
    node: Node,
    weight: f64,
    clock: PickClock,
}

impl DirectNode {
    /// Wrap a node.
    pub fn new(node: Node) -> Self {
        Self {
            weight: node.weight_or_default() as f64,
            node,
            clock: PickClock::new(),
        }
    }
}

impl WeightedNode for DirectNode {
    fn raw(&self) -> &Node {
        &self.node
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn pick(&self) -> DoneFunc {
        self.clock.touch();
        noop_done()
    }

    fn pick_elapsed(&self) -> Duration {
        self.clock.elapsed()
    }
}

/// Builder for [`DirectNode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectBuilder;

impl WeightedNodeBuilder for DirectBuilder {
    type Output = DirectNode;

    fn build(&self, node: Node) -> DirectNode {
        DirectNode::new(node)
    }
}
