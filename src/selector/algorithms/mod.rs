//! Load balancing algorithms.

mod p2c;
mod random;
mod wrr;

pub use p2c::{P2c, P2cBuilder, P2cConfig, P2cNode};
pub use random::Random;
pub use wrr::{Wrr, WrrBuilder, WrrNode};

use super::{DoneFunc, SelectError, WeightedNode};
use std::sync::Arc;

/// Trait for load balancing algorithms.
///
/// A balancer works over the runtime node type produced by its matched
/// [`WeightedNodeBuilder`](super::WeightedNodeBuilder).
pub trait Balancer: Send + Sync + 'static {
    /// Runtime node type this algorithm schedules over.
    type Node: WeightedNode;

    /// Select one of the candidates.
    ///
    /// # Returns
    ///
    /// The selected node and its completion callback, or
    /// [`SelectError::NoAvailableNode`] if there are no candidates.
    fn pick(
        &self,
        candidates: &[Arc<Self::Node>],
    ) -> Result<(Arc<Self::Node>, DoneFunc), SelectError>;
}
