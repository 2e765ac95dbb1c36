//! Node selection: node model, balancing algorithms and the active node set.
//!
//! A [`Selector`] owns the currently usable nodes and resolves one node per
//! request. Node membership only changes through [`Rebalancer::apply`].

pub mod algorithms;
mod default;
mod direct;
pub mod filter;
mod fixed;
mod node;
mod peer;
mod scope;
mod weighted;

pub use algorithms::{Balancer, P2c, P2cBuilder, P2cConfig, P2cNode, Random, Wrr, WrrBuilder, WrrNode};
pub use default::{ApplyMode, DefaultSelector};
pub use direct::{DirectBuilder, DirectNode};
pub use filter::NodeFilter;
pub use fixed::StaticSelector;
pub use node::{DEFAULT_WEIGHT, Node, raw_metadata};
pub use peer::Peer;
pub use scope::Scope;
pub use weighted::{DoneFunc, DoneInfo, WeightedNode, WeightedNodeBuilder, noop_done};

use crate::config::{Algorithm, SelectorConfig};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Selection failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    /// The active node set is empty, was never applied, or was filtered out.
    #[error("no available node")]
    NoAvailableNode,
}

/// Replaces the set of usable nodes.
pub trait Rebalancer: Send + Sync {
    /// Install `nodes` as the active node set.
    fn apply(&self, nodes: Vec<Node>);
}

/// Resolves one node per request.
pub trait Selector: Rebalancer {
    /// Select a node for a request.
    ///
    /// A node pinned by the scope's [`Peer`] wins over filters and the
    /// balancer. Otherwise the selected node is recorded into an empty peer.
    fn select(&self, scope: &mut Scope) -> Result<Selected, SelectError>;

    /// Snapshot of the nodes currently installed.
    fn nodes(&self) -> Vec<Node>;
}

/// A selected node and the callback that reports its outcome.
pub struct Selected {
    pub node: Node,
    pub done: DoneFunc,
}

impl Selected {
    pub fn new(node: Node, done: DoneFunc) -> Self {
        Self { node, done }
    }

    /// Split into the node and its completion callback.
    pub fn into_parts(self) -> (Node, DoneFunc) {
        (self.node, self.done)
    }
}

impl fmt::Debug for Selected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selected").field("node", &self.node).finish_non_exhaustive()
    }
}

/// Selector using random balancing over pass-through nodes.
pub type RandomSelector = DefaultSelector<Random, DirectBuilder>;

/// Selector using smooth weighted round-robin.
pub type WrrSelector = DefaultSelector<Wrr, WrrBuilder>;

/// Selector using power-of-two-choices with latency feedback.
pub type P2cSelector = DefaultSelector<P2c, P2cBuilder>;

/// A random selector with the default apply mode.
pub fn random() -> RandomSelector {
    DefaultSelector::new(Random::new(), DirectBuilder)
}

/// A smooth weighted round-robin selector with the default apply mode.
pub fn wrr() -> WrrSelector {
    DefaultSelector::new(Wrr::new(), WrrBuilder)
}

/// A P2C selector with default tuning.
pub fn p2c() -> P2cSelector {
    DefaultSelector::new(P2c::new(), P2cBuilder::default())
}

/// Build the selector described by configuration.
pub fn build(config: &SelectorConfig) -> Arc<dyn Selector> {
    let mode = config.apply_mode;
    match config.algorithm {
        Algorithm::Random => {
            Arc::new(DefaultSelector::new(Random::new(), DirectBuilder).with_apply_mode(mode))
        }
        Algorithm::Wrr => Arc::new(DefaultSelector::new(Wrr::new(), WrrBuilder).with_apply_mode(mode)),
        Algorithm::P2c => Arc::new(
            DefaultSelector::new(P2c::new(), P2cBuilder::new(config.p2c.to_balancer_config()))
                .with_apply_mode(mode),
        ),
        Algorithm::Static => Arc::new(StaticSelector::new()),
    }
}
