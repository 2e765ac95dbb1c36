//! Power-of-two-choices load balancing with latency feedback.

use super::Balancer;
use crate::selector::weighted::PickClock;
use crate::selector::{DoneFunc, DoneInfo, Node, SelectError, WeightedNode, WeightedNodeBuilder};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Tuning for the P2C balancer.
#[derive(Debug, Clone, PartialEq)]
pub struct P2cConfig {
    /// Weight of the previous latency estimate on each observation.
    pub decay: f64,
    /// Multiplier applied to the estimate when an outcome carries an error.
    pub error_penalty: f64,
    /// Latency estimate of a node that has not served a request yet.
    pub initial_latency: Duration,
    /// A sampled node that lost the comparison is picked anyway once it has
    /// gone unpicked this long, so a penalized estimate can recover.
    pub force_pick: Duration,
}

impl Default for P2cConfig {
    fn default() -> Self {
        Self {
            decay: 0.9,
            error_penalty: 2.0,
            initial_latency: Duration::from_millis(10),
            force_pick: Duration::from_secs(3),
        }
    }
}

/// Live statistics, shared with outstanding completion callbacks.
#[derive(Debug)]
struct Stats {
    config: Arc<P2cConfig>,
    /// Smoothed latency in nanoseconds, stored as `f64` bits.
    latency: AtomicU64,
    in_flight: AtomicI64,
}

impl Stats {
    fn latency_nanos(&self) -> f64 {
        f64::from_bits(self.latency.load(Ordering::Relaxed))
    }

    fn observe(&self, latency: Duration, failed: bool) {
        let sample = latency.as_nanos() as f64;
        let decay = self.config.decay;
        let penalty = self.config.error_penalty;
        let floor = self.config.initial_latency.as_nanos() as f64;

        let _ = self
            .latency
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let mut ewma = decay * f64::from_bits(bits) + (1.0 - decay) * sample;
                if failed {
                    ewma = ewma.max(floor) * penalty;
                }
                Some(ewma.to_bits())
            });
    }

    fn finish(&self) {
        // Never drop below zero, even if a callback were replayed.
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some((n - 1).max(0)));
    }
}

/// Runtime node tracking smoothed latency and in-flight requests.
#[derive(Debug)]
pub struct P2cNode {
    node: Node,
    stats: Arc<Stats>,
    clock: PickClock,
}

impl P2cNode {
    /// Wrap a node with a fresh latency estimate.
    pub fn new(node: Node, config: Arc<P2cConfig>) -> Self {
        let seed = config.initial_latency.as_nanos() as f64;
        Self {
            node,
            stats: Arc::new(Stats {
                config,
                latency: AtomicU64::new(seed.to_bits()),
                in_flight: AtomicI64::new(0),
            }),
            clock: PickClock::new(),
        }
    }

    /// Smoothed latency estimate.
    pub fn latency(&self) -> Duration {
        Duration::from_nanos(self.stats.latency_nanos() as u64)
    }

    /// Requests picked but not yet completed.
    pub fn in_flight(&self) -> i64 {
        self.stats.in_flight.load(Ordering::Acquire)
    }

    /// Load score; lower is better.
    pub fn score(&self) -> f64 {
        self.stats.latency_nanos() * (self.in_flight() + 1) as f64
    }

    /// Whether the node has gone unpicked longer than the force-pick window.
    pub fn force_pick_due(&self) -> bool {
        self.pick_elapsed() > self.stats.config.force_pick
    }
}

impl WeightedNode for P2cNode {
    fn raw(&self) -> &Node {
        &self.node
    }

    /// Declared weight scaled down by load: `weight / (latency_ms * (in_flight + 1))`.
    fn weight(&self) -> f64 {
        let score_ms = (self.score() / 1_000_000.0).max(f64::EPSILON);
        self.node.weight_or_default() as f64 / score_ms
    }

    fn pick(&self) -> DoneFunc {
        self.clock.touch();
        self.stats.in_flight.fetch_add(1, Ordering::AcqRel);

        let stats = Arc::clone(&self.stats);
        let start = Instant::now();
        Box::new(move |info: DoneInfo| {
            let latency = info.latency.unwrap_or_else(|| start.elapsed());
            stats.finish();
            stats.observe(latency, info.is_err());
        })
    }

    fn pick_elapsed(&self) -> Duration {
        self.clock.elapsed()
    }
}

/// Builder for [`P2cNode`].
#[derive(Debug, Clone, Default)]
pub struct P2cBuilder {
    config: Arc<P2cConfig>,
}

impl P2cBuilder {
    pub fn new(config: P2cConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl WeightedNodeBuilder for P2cBuilder {
    type Output = P2cNode;

    fn build(&self, node: Node) -> P2cNode {
        P2cNode::new(node, Arc::clone(&self.config))
    }
}

/// Power-of-two-choices load balancer.
///
/// Samples two distinct candidates and sends the request to the one with the
/// lower `latency * (in_flight + 1)` score. The completion callback feeds the
/// observed latency back, so failing or slow nodes lose traffic without being
/// removed.
#[derive(Debug, Default)]
pub struct P2c;

impl P2c {
    /// Create a new P2C load balancer.
    pub fn new() -> Self {
        Self
    }
}

impl Balancer for P2c {
    type Node = P2cNode;

    fn pick(&self, candidates: &[Arc<P2cNode>]) -> Result<(Arc<P2cNode>, DoneFunc), SelectError> {
        let selected = match candidates {
            [] => return Err(SelectError::NoAvailableNode),
            [only] => Arc::clone(only),
            _ => {
                let mut rng = rand::thread_rng();
                let a = rng.gen_range(0..candidates.len());
                let mut b = rng.gen_range(0..candidates.len() - 1);
                if b >= a {
                    b += 1;
                }

                let (first, second) = (&candidates[a], &candidates[b]);
                let (score_a, score_b) = (first.score(), second.score());
                let (chosen, other) = if score_a < score_b {
                    (first, second)
                } else if score_b < score_a {
                    (second, first)
                } else if rng.gen_bool(0.5) {
                    (first, second)
                } else {
                    (second, first)
                };

                if other.force_pick_due() {
                    debug!(
                        node = other.raw().address(),
                        elapsed = ?other.pick_elapsed(),
                        "force picking idle node"
                    );
                    Arc::clone(other)
                } else {
                    Arc::clone(chosen)
                }
            }
        };

        let done = selected.pick();
        Ok((selected, done))
    }
}
