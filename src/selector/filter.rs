//! Candidate filters applied before balancing.

use super::{Node, Scope};
use std::sync::Arc;

/// Narrows the candidate list before the balancer runs.
///
/// Filters are applied in order; each receives the output of the previous one
/// along with the scope of the request being routed.
pub trait NodeFilter: Send + Sync {
    fn filter(&self, scope: &Scope, nodes: Vec<Node>) -> Vec<Node>;
}

impl<F> NodeFilter for F
where
    F: Fn(&Scope, Vec<Node>) -> Vec<Node> + Send + Sync,
{
    fn filter(&self, scope: &Scope, nodes: Vec<Node>) -> Vec<Node> {
        self(scope, nodes)
    }
}

/// Keep nodes with the given version.
pub fn version(version: impl Into<String>) -> Arc<dyn NodeFilter> {
    let version = version.into();
    Arc::new(move |_: &Scope, nodes: Vec<Node>| -> Vec<Node> {
        nodes
            .into_iter()
            .filter(|n| n.version() == version)
            .collect()
    })
}

/// Keep nodes whose metadata maps `key` to `value`.
pub fn metadata(key: impl Into<String>, value: impl Into<String>) -> Arc<dyn NodeFilter> {
    let key = key.into();
    let value = value.into();
    Arc::new(move |_: &Scope, nodes: Vec<Node>| -> Vec<Node> {
        nodes
            .into_iter()
            .filter(|n| n.metadata().get(&key) == Some(&value))
            .collect()
    })
}

/// Keep nodes using the given scheme.
pub fn scheme(scheme: impl Into<String>) -> Arc<dyn NodeFilter> {
    let scheme = scheme.into();
    Arc::new(move |_: &Scope, nodes: Vec<Node>| -> Vec<Node> {
        nodes
            .into_iter()
            .filter(|n| n.scheme() == scheme)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::raw_metadata;
    use std::time::Duration;

    fn nodes() -> Vec<Node> {
        vec![
            Node::new("http", "127.0.0.1:8001")
                .with_version("v1")
                .with_metadata(raw_metadata([("zone", "a")])),
            Node::new("http", "127.0.0.1:8002")
                .with_version("v2")
                .with_metadata(raw_metadata([("zone", "b")])),
            Node::new("https", "127.0.0.1:8003")
                .with_version("v2")
                .with_metadata(raw_metadata([("zone", "a")])),
        ]
    }

    #[test]
    fn test_version_filter() {
        let kept = version("v2").filter(&Scope::new(), nodes());
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|n| n.version() == "v2"));
    }

    #[test]
    fn test_metadata_filter() {
        let kept = metadata("zone", "a").filter(&Scope::new(), nodes());
        let addrs: Vec<_> = kept.iter().map(Node::address).collect();
        assert_eq!(addrs, vec!["127.0.0.1:8001", "127.0.0.1:8003"]);
    }

    #[test]
    fn test_filters_compose() {
        let scope = Scope::new();
        let kept = scheme("http").filter(&scope, version("v2").filter(&scope, nodes()));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].address(), "127.0.0.1:8002");
    }

    #[test]
    fn test_filter_reads_scope() {
        // Tight deadlines only go to zone "a".
        let deadline_aware = |scope: &Scope, nodes: Vec<Node>| -> Vec<Node> {
            match scope.timeout() {
                Some(t) if t < Duration::from_millis(100) => nodes
                    .into_iter()
                    .filter(|n| n.metadata().get("zone").map(String::as_str) == Some("a"))
                    .collect(),
                _ => nodes,
            }
        };

        let relaxed = Scope::new().with_timeout(Duration::from_secs(5));
        assert_eq!(deadline_aware.filter(&relaxed, nodes()).len(), 3);

        let tight = Scope::new().with_timeout(Duration::from_millis(50));
        let kept = deadline_aware.filter(&tight, nodes());
        let addrs: Vec<_> = kept.iter().map(Node::address).collect();
        assert_eq!(addrs, vec!["127.0.0.1:8001", "127.0.0.1:8003"]);
    }
}
