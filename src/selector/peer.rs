//! Request affinity.

use super::Node;

/// Request-scoped affinity token.
///
/// A peer holding a node forces selection to that node, bypassing filters and
/// the balancer. An empty peer is filled in with whatever node the balancer
/// picked, so the caller can read back where the request went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Peer {
    node: Option<Node>,
}

impl Peer {
    /// An empty peer that records the next selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// A peer pinned to `node`.
    pub fn bound(node: Node) -> Self {
        Self { node: Some(node) }
    }

    /// The pinned or recorded node.
    pub fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    /// Whether a node is set.
    pub fn is_bound(&self) -> bool {
        self.node.is_some()
    }

    /// Set the node.
    pub fn bind(&mut self, node: Node) {
        self.node = Some(node);
    }

    /// Clear the node, turning this into an empty peer.
    pub fn clear(&mut self) -> Option<Node> {
        self.node.take()
    }
}
