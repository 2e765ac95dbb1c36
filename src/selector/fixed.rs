//! Static single-node routing.

use super::{
    DirectBuilder, DirectNode, Node, Rebalancer, Scope, SelectError, Selected, Selector,
    WeightedNode, WeightedNodeBuilder, noop_done,
};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::{debug, info};

/// Selector that always routes to one fixed node.
///
/// `apply` keeps only the first node of the list it is given; filters are
/// ignored. A node pinned through the scope still takes precedence.
#[derive(Default)]
pub struct StaticSelector {
    node: ArcSwapOption<DirectNode>,
}

impl StaticSelector {
    /// Create a static selector with no node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a static selector routing to `node`.
    pub fn with_node(node: Node) -> Self {
        let selector = Self::new();
        selector.apply(vec![node]);
        selector
    }
}

impl Rebalancer for StaticSelector {
    fn apply(&self, nodes: Vec<Node>) {
        let discarded = nodes.len().saturating_sub(1);
        let node = nodes.into_iter().next().map(|n| Arc::new(DirectBuilder.build(n)));

        match &node {
            Some(n) => info!(node = n.raw().address(), discarded, "applied static node"),
            None => info!("cleared static node"),
        }
        self.node.store(node);
    }
}

impl Selector for StaticSelector {
    fn select(&self, scope: &mut Scope) -> Result<Selected, SelectError> {
        if let Some(node) = scope.pinned_node() {
            return Ok(Selected::new(node.clone(), noop_done()));
        }

        let guard = self.node.load();
        let Some(node) = &*guard else {
            return Err(SelectError::NoAvailableNode);
        };
        node.pick()(Default::default());

        let raw = node.raw().clone();
        scope.record(&raw);
        debug!(node = raw.address(), "selected static node");
        Ok(Selected::new(raw, noop_done()))
    }

    fn nodes(&self) -> Vec<Node> {
        self.node
            .load_full()
            .map(|n| vec![n.raw().clone()])
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::filter;

    #[test]
    fn test_static_keeps_first_node() {
        let selector = StaticSelector::new();
        let a = Node::new("http", "127.0.0.1:8001");
        let b = Node::new("http", "127.0.0.1:8002");
        selector.apply(vec![a.clone(), b]);

        for _ in 0..10 {
            assert_eq!(selector.select(&mut Scope::new()).unwrap().node, a);
        }
    }

    #[test]
    fn test_static_reapply_switches() {
        let a = Node::new("http", "127.0.0.1:8001");
        let c = Node::new("http", "127.0.0.1:8003");
        let selector = StaticSelector::with_node(a.clone());
        assert_eq!(selector.select(&mut Scope::new()).unwrap().node, a);

        selector.apply(vec![c.clone()]);
        assert_eq!(selector.select(&mut Scope::new()).unwrap().node, c);
    }

    #[test]
    fn test_static_empty_apply_clears() {
        let selector = StaticSelector::with_node(Node::new("http", "127.0.0.1:8001"));
        selector.apply(Vec::new());
        assert_eq!(
            selector.select(&mut Scope::new()).unwrap_err(),
            SelectError::NoAvailableNode
        );
        assert!(selector.nodes().is_empty());
    }

    #[test]
    fn test_static_pinned_and_ignores_filters() {
        let a = Node::new("http", "127.0.0.1:8001");
        let pinned = Node::new("http", "10.0.0.1:80");
        let selector = StaticSelector::with_node(a.clone());

        let mut scope = Scope::pinned(pinned.clone());
        assert_eq!(selector.select(&mut scope).unwrap().node, pinned);

        let mut scope = Scope::new().with_filter(filter::version("v9"));
        assert_eq!(selector.select(&mut scope).unwrap().node, a);
    }

    #[test]
    fn test_static_records_into_peer() {
        let a = Node::new("http", "127.0.0.1:8001");
        let selector = StaticSelector::with_node(a.clone());

        let mut scope = Scope::new().with_peer(crate::selector::Peer::new());
        selector.select(&mut scope).unwrap();
        assert_eq!(scope.pinned_node(), Some(&a));
    }
}
