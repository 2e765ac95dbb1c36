//! Runtime scheduling state wrapped around a [`Node`].

use super::Node;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Outcome of a request, reported back to the node that served it.
#[derive(Debug, Clone, Default)]
pub struct DoneInfo {
    /// Error of the attempt, if it failed.
    pub err: Option<Arc<dyn Error + Send + Sync>>,
    /// Whether any bytes were sent to the node.
    pub bytes_sent: bool,
    /// Whether any bytes were received from the node.
    pub bytes_received: bool,
    /// Latency measured by the caller. When absent, nodes that track latency
    /// measure the time since their own pick.
    pub latency: Option<Duration>,
}

impl DoneInfo {
    /// A successful round trip.
    pub fn success() -> Self {
        Self {
            err: None,
            bytes_sent: true,
            bytes_received: true,
            latency: None,
        }
    }

    /// A failed attempt.
    pub fn failure(err: impl Error + Send + Sync + 'static, bytes_sent: bool) -> Self {
        Self {
            err: Some(Arc::new(err)),
            bytes_sent,
            bytes_received: false,
            latency: None,
        }
    }

    /// Attach a measured latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Whether the outcome carries an error.
    pub fn is_err(&self) -> bool {
        self.err.is_some()
    }
}

/// Completion callback, invoked exactly once when the request finishes.
pub type DoneFunc = Box<dyn FnOnce(DoneInfo) + Send + 'static>;

/// A completion callback that ignores the outcome.
pub fn noop_done() -> DoneFunc {
    Box::new(|_| {})
}

/// A node carrying live scheduling state.
///
/// Each balancer family has its own implementation, built by its matched
/// [`WeightedNodeBuilder`].
pub trait WeightedNode: Send + Sync + fmt::Debug + 'static {
    /// The source node.
    fn raw(&self) -> &Node;

    /// Current scheduling weight; may drift from the seed as the algorithm adapts.
    fn weight(&self) -> f64;

    /// Mark the node as in use. The returned callback must be invoked once
    /// the associated request completes.
    fn pick(&self) -> DoneFunc;

    /// Time since the most recent [`pick`](Self::pick), or since the node was
    /// built if it was never picked.
    fn pick_elapsed(&self) -> Duration;
}

/// Builds the runtime wrapper for a node.
pub trait WeightedNodeBuilder: Send + Sync + 'static {
    /// The runtime node type this builder produces.
    type Output: WeightedNode;

    /// Build a fresh runtime node.
    fn build(&self, node: Node) -> Self::Output;
}

/// Lock-free "last picked at" bookkeeping shared by the node implementations.
#[derive(Debug)]
pub(crate) struct PickClock {
    epoch: Instant,
    /// Nanoseconds since `epoch` of the latest pick; 0 when never picked.
    last_pick: AtomicU64,
}

impl PickClock {
    pub(crate) fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_pick: AtomicU64::new(0),
        }
    }

    pub(crate) fn touch(&self) {
        let nanos = self.epoch.elapsed().as_nanos().max(1) as u64;
        self.last_pick.store(nanos, Ordering::Relaxed);
    }

    pub(crate) fn elapsed(&self) -> Duration {
        let last = Duration::from_nanos(self.last_pick.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last)
    }
}
