//! Selector over an atomically swapped node set.

use super::{
    Balancer, Node, Rebalancer, Scope, SelectError, Selected, Selector, WeightedNode,
    WeightedNodeBuilder, noop_done,
};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How [`Rebalancer::apply`] treats nodes that survive a membership change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    /// Keep the runtime node (and its adaptive state) of every address whose
    /// descriptor did not change; build only new or changed nodes.
    #[default]
    Merge,
    /// Rebuild every runtime node, discarding adaptive state.
    Replace,
}

/// One generation of runtime nodes.
struct NodeSet<T> {
    generation: u64,
    nodes: Vec<Arc<T>>,
}

/// Selector that delegates to a [`Balancer`] over runtime nodes built by
/// its matched [`WeightedNodeBuilder`].
///
/// Readers load the active set without locking; `apply` builds the next set
/// off to the side and swaps it in, so a selection sees either the previous
/// or the next set in full.
pub struct DefaultSelector<B, N>
where
    B: Balancer,
    N: WeightedNodeBuilder<Output = B::Node>,
{
    builder: N,
    balancer: B,
    mode: ApplyMode,
    nodes: ArcSwap<NodeSet<B::Node>>,
}

impl<B, N> DefaultSelector<B, N>
where
    B: Balancer,
    N: WeightedNodeBuilder<Output = B::Node>,
{
    /// Create a selector with no nodes.
    pub fn new(balancer: B, builder: N) -> Self {
        Self {
            builder,
            balancer,
            mode: ApplyMode::default(),
            nodes: ArcSwap::from_pointee(NodeSet {
                generation: 0,
                nodes: Vec::new(),
            }),
        }
    }

    /// Set the apply mode.
    pub fn with_apply_mode(mut self, mode: ApplyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Number of applies performed so far.
    pub fn generation(&self) -> u64 {
        self.nodes.load().generation
    }

    /// Runtime node currently installed for `address`.
    pub fn weighted(&self, address: &str) -> Option<Arc<B::Node>> {
        self.nodes
            .load()
            .nodes
            .iter()
            .find(|n| n.raw().address() == address)
            .cloned()
    }

    /// Narrow the set through the scope's filters, preserving set order.
    fn filter(&self, scope: &Scope, nodes: &[Arc<B::Node>]) -> Vec<Arc<B::Node>> {
        let mut raw: Vec<Node> = nodes.iter().map(|n| n.raw().clone()).collect();
        for filter in scope.filters() {
            raw = filter.filter(scope, raw);
        }

        let by_address: HashMap<&str, &Arc<B::Node>> =
            nodes.iter().map(|n| (n.raw().address(), n)).collect();
        raw.iter()
            .filter_map(|n| by_address.get(n.address()).map(|w| Arc::clone(w)))
            .collect()
    }
}

impl<B, N> Rebalancer for DefaultSelector<B, N>
where
    B: Balancer,
    N: WeightedNodeBuilder<Output = B::Node>,
{
    fn apply(&self, nodes: Vec<Node>) {
        let current = self.nodes.load();
        let previous: HashMap<&str, &Arc<B::Node>> = match self.mode {
            ApplyMode::Merge => current
                .nodes
                .iter()
                .map(|n| (n.raw().address(), n))
                .collect(),
            ApplyMode::Replace => HashMap::new(),
        };

        let mut seen = HashSet::with_capacity(nodes.len());
        let mut next = Vec::with_capacity(nodes.len());
        let mut retained = 0usize;

        for node in nodes {
            if !seen.insert(node.address().to_string()) {
                warn!(address = node.address(), "duplicate node address ignored");
                continue;
            }

            match previous.get(node.address()) {
                Some(existing) if existing.raw() == &node => {
                    retained += 1;
                    next.push(Arc::clone(existing));
                }
                _ => next.push(Arc::new(self.builder.build(node))),
            }
        }

        let generation = current.generation + 1;
        let added = next.len() - retained;
        let removed = current.nodes.len() - retained;
        let total = next.len();
        self.nodes.store(Arc::new(NodeSet {
            generation,
            nodes: next,
        }));

        info!(
            generation,
            total,
            added,
            retained,
            removed,
            mode = ?self.mode,
            "applied node set"
        );
    }
}

impl<B, N> Selector for DefaultSelector<B, N>
where
    B: Balancer,
    N: WeightedNodeBuilder<Output = B::Node>,
{
    fn select(&self, scope: &mut Scope) -> Result<Selected, SelectError> {
        if let Some(node) = scope.pinned_node() {
            debug!(node = node.address(), "selected pinned node");
            return Ok(Selected::new(node.clone(), noop_done()));
        }

        let set = self.nodes.load();
        if set.nodes.is_empty() {
            return Err(SelectError::NoAvailableNode);
        }

        let filtered;
        let candidates: &[Arc<B::Node>] = if scope.filters().is_empty() {
            &set.nodes
        } else {
            filtered = self.filter(scope, &set.nodes);
            &filtered
        };

        if candidates.is_empty() {
            debug!(generation = set.generation, "all nodes filtered out");
            return Err(SelectError::NoAvailableNode);
        }

        let (selected, done) = self.balancer.pick(candidates)?;
        let node = selected.raw().clone();
        scope.record(&node);

        debug!(
            node = node.address(),
            generation = set.generation,
            candidates = candidates.len(),
            "selected node"
        );

        Ok(Selected::new(node, done))
    }

    fn nodes(&self) -> Vec<Node> {
        self.nodes
            .load()
            .nodes
            .iter()
            .map(|n| n.raw().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{
        DirectBuilder, DoneInfo, NodeFilter, P2c, P2cBuilder, Peer, Random, Wrr, WrrBuilder, filter,
    };

    fn test_nodes(ports: &[u16]) -> Vec<Node> {
        ports
            .iter()
            .map(|p| Node::new("http", format!("127.0.0.1:{}", p)))
            .collect()
    }

    #[test]
    fn test_select_before_apply() {
        let selector = DefaultSelector::new(Random::new(), DirectBuilder);
        let result = selector.select(&mut Scope::new());
        assert_eq!(result.unwrap_err(), SelectError::NoAvailableNode);
    }

    #[test]
    fn test_select_after_empty_apply() {
        let selector = DefaultSelector::new(Random::new(), DirectBuilder);
        selector.apply(test_nodes(&[8001]));
        selector.apply(Vec::new());
        assert_eq!(
            selector.select(&mut Scope::new()).unwrap_err(),
            SelectError::NoAvailableNode
        );
    }

    #[test]
    fn test_select_never_fails_with_nodes() {
        let selector = DefaultSelector::new(Random::new(), DirectBuilder);
        let nodes = test_nodes(&[8001, 8002, 8003]);
        selector.apply(nodes.clone());

        for _ in 0..100 {
            let (node, done) = selector.select(&mut Scope::new()).unwrap().into_parts();
            assert!(nodes.contains(&node));
            done(DoneInfo::success());
        }
    }

    #[test]
    fn test_pinned_peer_bypasses_balancer() {
        let selector = DefaultSelector::new(Wrr::new(), WrrBuilder);
        selector.apply(test_nodes(&[8001, 8002]));

        let outside = Node::new("http", "10.0.0.9:9000");
        let mut scope = Scope::pinned(outside.clone());
        for _ in 0..10 {
            let selected = selector.select(&mut scope).unwrap();
            assert_eq!(selected.node, outside);
        }

        // The balancer never ran, so the first WRR pick is still node 0.
        let first = selector.select(&mut Scope::new()).unwrap();
        assert_eq!(first.node.address(), "127.0.0.1:8001");
    }

    #[test]
    fn test_pinned_peer_skips_filters() {
        let selector = DefaultSelector::new(Random::new(), DirectBuilder);
        selector.apply(test_nodes(&[8001]));

        let pinned = Node::new("http", "127.0.0.1:8001");
        let mut scope = Scope::pinned(pinned.clone()).with_filter(filter::version("nope"));
        assert_eq!(selector.select(&mut scope).unwrap().node, pinned);
    }

    #[test]
    fn test_empty_peer_records_selection() {
        let selector = DefaultSelector::new(Random::new(), DirectBuilder);
        selector.apply(test_nodes(&[8001, 8002]));

        let mut scope = Scope::new().with_peer(Peer::new());
        let selected = selector.select(&mut scope).unwrap();
        assert_eq!(scope.pinned_node(), Some(&selected.node));

        // Later selections in the same scope stick to the recorded node.
        for _ in 0..20 {
            assert_eq!(selector.select(&mut scope).unwrap().node, selected.node);
        }
    }

    #[test]
    fn test_filters_narrow_candidates() {
        let selector = DefaultSelector::new(Random::new(), DirectBuilder);
        selector.apply(vec![
            Node::new("http", "127.0.0.1:8001").with_version("v1"),
            Node::new("http", "127.0.0.1:8002").with_version("v2"),
        ]);

        for _ in 0..20 {
            let mut scope = Scope::new().with_filter(filter::version("v2"));
            let selected = selector.select(&mut scope).unwrap();
            assert_eq!(selected.node.address(), "127.0.0.1:8002");
        }
    }

    #[test]
    fn test_filter_sees_request_scope() {
        let selector = DefaultSelector::new(Random::new(), DirectBuilder);
        selector.apply(test_nodes(&[8001, 8002]));

        // One shared filter; cancelled requests are routed to the drain node only.
        let drain: Arc<dyn NodeFilter> = Arc::new(|scope: &Scope, nodes: Vec<Node>| -> Vec<Node> {
            if scope.is_cancelled() {
                nodes.into_iter().filter(|n| n.address() == "127.0.0.1:8002").collect()
            } else {
                nodes
            }
        });

        let signal = crate::util::CancelSignal::new();
        signal.cancel();
        for _ in 0..20 {
            let mut scope = Scope::new()
                .with_cancel(signal.clone())
                .with_filter(Arc::clone(&drain));
            let selected = selector.select(&mut scope).unwrap();
            assert_eq!(selected.node.address(), "127.0.0.1:8002");
        }

        let mut seen = HashSet::new();
        for _ in 0..200 {
            let mut scope = Scope::new().with_filter(Arc::clone(&drain));
            seen.insert(selector.select(&mut scope).unwrap().node.address().to_string());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_filters_remove_everything() {
        let selector = DefaultSelector::new(Random::new(), DirectBuilder);
        selector.apply(test_nodes(&[8001, 8002]));

        let mut scope = Scope::new().with_filter(filter::version("v9"));
        assert_eq!(
            selector.select(&mut scope).unwrap_err(),
            SelectError::NoAvailableNode
        );
    }

    #[test]
    fn test_merge_keeps_adaptive_state() {
        let selector = DefaultSelector::new(P2c::new(), P2cBuilder::default());
        selector.apply(test_nodes(&[8001, 8002]));

        let before = selector.weighted("127.0.0.1:8001").unwrap();
        let _held = before.pick();
        assert_eq!(before.in_flight(), 1);

        selector.apply(test_nodes(&[8001, 8003]));

        let after = selector.weighted("127.0.0.1:8001").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.in_flight(), 1);
        assert!(selector.weighted("127.0.0.1:8002").is_none());
        assert!(selector.weighted("127.0.0.1:8003").is_some());
    }

    #[test]
    fn test_merge_rebuilds_changed_descriptor() {
        let selector = DefaultSelector::new(Wrr::new(), WrrBuilder);
        selector.apply(vec![Node::new("http", "127.0.0.1:8001").with_weight(1)]);
        let before = selector.weighted("127.0.0.1:8001").unwrap();

        selector.apply(vec![Node::new("http", "127.0.0.1:8001").with_weight(5)]);
        let after = selector.weighted("127.0.0.1:8001").unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.effective_weight(), 5);
    }

    #[test]
    fn test_replace_discards_state() {
        let selector =
            DefaultSelector::new(P2c::new(), P2cBuilder::default()).with_apply_mode(ApplyMode::Replace);
        selector.apply(test_nodes(&[8001]));
        let before = selector.weighted("127.0.0.1:8001").unwrap();

        selector.apply(test_nodes(&[8001]));
        let after = selector.weighted("127.0.0.1:8001").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(selector.generation(), 2);
    }

    #[test]
    fn test_duplicate_addresses_collapse() {
        let selector = DefaultSelector::new(Random::new(), DirectBuilder);
        selector.apply(vec![
            Node::new("http", "127.0.0.1:8001").with_version("first"),
            Node::new("http", "127.0.0.1:8001").with_version("second"),
        ]);

        let nodes = selector.nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].version(), "first");
    }
}
