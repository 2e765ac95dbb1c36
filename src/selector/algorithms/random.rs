//! Random load balancing algorithm.

use super::Balancer;
use crate::selector::{DirectNode, DoneFunc, SelectError, WeightedNode};
use rand::Rng;
use std::marker::PhantomData;
use std::sync::Arc;

/// Random load balancer.
///
/// Picks uniformly when no candidate declares a weight, otherwise with
/// probability proportional to each candidate's current weight.
pub struct Random<N = DirectNode> {
    _node: PhantomData<fn() -> N>,
}

impl<N> Random<N> {
    /// Create a new random load balancer.
    pub fn new() -> Self {
        Self { _node: PhantomData }
    }
}

impl<N> Default for Random<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: WeightedNode> Balancer for Random<N> {
    type Node = N;

    fn pick(&self, candidates: &[Arc<N>]) -> Result<(Arc<N>, DoneFunc), SelectError> {
        if candidates.is_empty() {
            return Err(SelectError::NoAvailableNode);
        }

        let mut rng = rand::thread_rng();
        let weighted = candidates
            .iter()
            .any(|n| n.raw().initial_weight().is_some());

        let idx = if weighted {
            let total: f64 = candidates.iter().map(|n| n.weight().max(0.0)).sum();
            if total > 0.0 {
                let mut point = rng.gen_range(0.0..total);
                let mut idx = candidates.len() - 1;
                for (i, node) in candidates.iter().enumerate() {
                    let weight = node.weight().max(0.0);
                    if point < weight {
                        idx = i;
                        break;
                    }
                    point -= weight;
                }
                idx
            } else {
                rng.gen_range(0..candidates.len())
            }
        } else {
            rng.gen_range(0..candidates.len())
        };

        let selected = Arc::clone(&candidates[idx]);
        let done = selected.pick();
        Ok((selected, done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{DirectBuilder, Node, WeightedNodeBuilder};
    use std::collections::HashMap;

    fn test_nodes(weights: &[Option<u64>]) -> Vec<Arc<DirectNode>> {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let mut node = Node::new("http", format!("127.0.0.1:{}", 8001 + i));
                if let Some(w) = w {
                    node = node.with_weight(*w);
                }
                Arc::new(DirectBuilder.build(node))
            })
            .collect()
    }

    fn distribution(nodes: &[Arc<DirectNode>], rounds: usize) -> HashMap<String, usize> {
        let random: Random = Random::new();
        let mut counts = HashMap::new();
        for _ in 0..rounds {
            let (selected, done) = random.pick(nodes).unwrap();
            done(Default::default());
            *counts.entry(selected.raw().address().to_string()).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn test_random_uniform() {
        let nodes = test_nodes(&[None, None, None, None]);
        let counts = distribution(&nodes, 40_000);

        for node in &nodes {
            let share = counts[node.raw().address()] as f64 / 40_000.0;
            assert!((share - 0.25).abs() < 0.03, "share {} too far from 0.25", share);
        }
    }

    #[test]
    fn test_random_weighted() {
        let nodes = test_nodes(&[Some(1), Some(3)]);
        let counts = distribution(&nodes, 20_000);

        let heavy = counts["127.0.0.1:8002"] as f64 / 20_000.0;
        assert!((heavy - 0.75).abs() < 0.03, "heavy share {}", heavy);
    }

    #[test]
    fn test_random_empty() {
        let random: Random = Random::new();
        assert!(matches!(random.pick(&[]), Err(SelectError::NoAvailableNode)));
    }

    #[test]
    fn test_random_single() {
        let nodes = test_nodes(&[Some(5)]);
        let (selected, _) = Random::<DirectNode>::new().pick(&nodes).unwrap();
        assert_eq!(selected.raw().address(), "127.0.0.1:8001");
    }
}
