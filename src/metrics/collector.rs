//! Metrics collector using prometheus-client.
//!
//! Provides metrics for dispatched requests, latency, in-flight requests,
//! selection failures and node-set churn.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Labels for request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub node: String,
    pub status: String,
}

/// Labels for per-node metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NodeLabels {
    pub node: String,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Dispatched requests by node and outcome.
    requests_total: Family<RequestLabels, Counter>,
    /// Request duration histogram (in seconds).
    request_duration_seconds: Family<NodeLabels, Histogram>,
    /// Requests currently in flight per node.
    in_flight: Family<NodeLabels, Gauge>,
    /// Dispatches rejected because no node was available.
    no_available_node_total: Counter,
    /// Per-node transports currently pooled.
    pooled_transports: Gauge,
    /// Size of the most recently applied node set.
    node_set_size: Gauge,
    /// Node set applies.
    applies_total: Counter,
    /// Per-node series created so far: node address to request statuses.
    series: Mutex<HashMap<String, HashSet<String>>>,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<RequestLabels, Counter>::default();
        let request_duration_seconds = Family::<NodeLabels, Histogram>::new_with_constructor(|| {
            // Buckets: 1ms, 2.5ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
            Histogram::new(exponential_buckets(0.001, 2.5, 13))
        });
        let in_flight = Family::<NodeLabels, Gauge>::default();
        let no_available_node_total = Counter::default();
        let pooled_transports = Gauge::default();
        let node_set_size = Gauge::default();
        let applies_total = Counter::default();

        registry.register(
            "nodeproxy_requests",
            "Total number of dispatched requests",
            requests_total.clone(),
        );
        registry.register(
            "nodeproxy_request_duration_seconds",
            "Request duration in seconds",
            request_duration_seconds.clone(),
        );
        registry.register(
            "nodeproxy_in_flight",
            "Requests currently in flight per node",
            in_flight.clone(),
        );
        registry.register(
            "nodeproxy_no_available_node",
            "Dispatches rejected because no node was available",
            no_available_node_total.clone(),
        );
        registry.register(
            "nodeproxy_pooled_transports",
            "Number of pooled per-node transports",
            pooled_transports.clone(),
        );
        registry.register(
            "nodeproxy_node_set_size",
            "Number of nodes in the most recently applied set",
            node_set_size.clone(),
        );
        registry.register(
            "nodeproxy_applies",
            "Total number of node set applies",
            applies_total.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                requests_total,
                request_duration_seconds,
                in_flight,
                no_available_node_total,
                pooled_transports,
                node_set_size,
                applies_total,
                series: Mutex::default(),
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record a finished request. `status` is the HTTP status or an error class.
    pub fn record_request(&self, node: &str, status: &str, duration: Duration) {
        self.inner
            .series
            .lock()
            .entry(node.to_string())
            .or_default()
            .insert(status.to_string());

        let labels = RequestLabels {
            node: node.to_string(),
            status: status.to_string(),
        };
        self.inner.requests_total.get_or_create(&labels).inc();

        self.inner
            .request_duration_seconds
            .get_or_create(&NodeLabels {
                node: node.to_string(),
            })
            .observe(duration.as_secs_f64());
    }

    /// A request to `node` started.
    pub fn request_started(&self, node: &str) {
        let mut series = self.inner.series.lock();
        series.entry(node.to_string()).or_default();
        self.inner
            .in_flight
            .get_or_create(&NodeLabels {
                node: node.to_string(),
            })
            .inc();
    }

    /// A request to `node` finished.
    pub fn request_finished(&self, node: &str) {
        self.inner
            .in_flight
            .get_or_create(&NodeLabels {
                node: node.to_string(),
            })
            .dec();
    }

    /// A dispatch found no node to use.
    pub fn record_no_available_node(&self) {
        self.inner.no_available_node_total.inc();
    }

    /// Update the pooled transport count.
    pub fn set_pooled_transports(&self, count: usize) {
        self.inner.pooled_transports.set(count as i64);
    }

    /// Record a node set apply.
    pub fn record_apply(&self, size: usize) {
        self.inner.applies_total.inc();
        self.inner.node_set_size.set(size as i64);
    }

    /// Requests currently in flight to `node`.
    pub fn in_flight(&self, node: &str) -> i64 {
        self.inner
            .in_flight
            .get(&NodeLabels {
                node: node.to_string(),
            })
            .map(|gauge| gauge.get())
            .unwrap_or(0)
    }

    /// Drop the per-node series of every node not in `active`.
    ///
    /// A node with requests still in flight keeps its series until a later
    /// call finds it idle.
    pub fn retain_nodes<'a>(&self, active: impl IntoIterator<Item = &'a str>) {
        let active: HashSet<&str> = active.into_iter().collect();
        let mut series = self.inner.series.lock();

        series.retain(|node, statuses| {
            if active.contains(node.as_str()) {
                return true;
            }
            let labels = NodeLabels { node: node.clone() };
            if self.in_flight(node) != 0 {
                return true;
            }

            self.inner.in_flight.remove(&labels);
            self.inner.request_duration_seconds.remove(&labels);
            for status in statuses.drain() {
                self.inner.requests_total.remove(&RequestLabels {
                    node: node.clone(),
                    status,
                });
            }
            false
        });
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    fn encoded(collector: &MetricsCollector) -> String {
        let mut buffer = String::new();
        encode(&mut buffer, collector.registry()).unwrap();
        buffer
    }

    #[test]
    fn test_record_request() {
        let collector = MetricsCollector::new();
        collector.record_request("127.0.0.1:8001", "200", Duration::from_millis(50));
        collector.record_request("127.0.0.1:8001", "connect_error", Duration::from_millis(5));

        let text = encoded(&collector);
        assert!(text.contains("nodeproxy_requests_total"));
        assert!(text.contains("status=\"connect_error\""));
        assert!(text.contains("nodeproxy_request_duration_seconds"));
    }

    #[test]
    fn test_in_flight_tracking() {
        let collector = MetricsCollector::new();
        collector.request_started("127.0.0.1:8001");
        collector.request_started("127.0.0.1:8001");
        collector.request_finished("127.0.0.1:8001");
        assert_eq!(collector.in_flight("127.0.0.1:8001"), 1);
    }

    #[test]
    fn test_apply_and_pool_gauges() {
        let collector = MetricsCollector::new();
        collector.record_apply(3);
        collector.set_pooled_transports(2);
        collector.record_no_available_node();

        let text = encoded(&collector);
        assert!(text.contains("nodeproxy_node_set_size 3"));
        assert!(text.contains("nodeproxy_pooled_transports 2"));
        assert!(text.contains("nodeproxy_no_available_node_total 1"));
    }

    #[test]
    fn test_retain_nodes_prunes_removed_nodes() {
        let collector = MetricsCollector::new();
        for node in ["127.0.0.1:8001", "127.0.0.1:8002"] {
            collector.request_started(node);
            collector.request_finished(node);
            collector.record_request(node, "200", Duration::from_millis(5));
        }
        collector.record_request("127.0.0.1:8002", "timeout", Duration::from_millis(5));

        collector.retain_nodes(["127.0.0.1:8001"]);

        let text = encoded(&collector);
        assert!(text.contains("node=\"127.0.0.1:8001\""));
        assert!(!text.contains("127.0.0.1:8002"));
    }

    #[test]
    fn test_retain_nodes_keeps_busy_node() {
        let collector = MetricsCollector::new();
        collector.request_started("127.0.0.1:8001");

        collector.retain_nodes(std::iter::empty());
        assert_eq!(collector.in_flight("127.0.0.1:8001"), 1);

        collector.request_finished("127.0.0.1:8001");
        collector.record_request("127.0.0.1:8001", "200", Duration::from_millis(5));
        collector.retain_nodes(std::iter::empty());
        assert!(!encoded(&collector).contains("127.0.0.1:8001"));
    }
}
