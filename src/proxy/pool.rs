//! Transport pool keyed by node address.

use super::transport::{Transport, TransportFactory};
use crate::selector::Node;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type TransportMap = HashMap<String, Arc<dyn Transport>>;

/// Holds one transport per node address for the life of the pool.
///
/// Lookups read a snapshot without locking. Creation is serialized so that
/// concurrent first requests to a node share a single transport. Entries
/// outlive node set changes: a node that comes back reuses its transport.
pub struct TransportPool {
    factory: Arc<dyn TransportFactory>,
    transports: ArcSwap<TransportMap>,
    create_lock: Mutex<()>,
}

impl TransportPool {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            transports: ArcSwap::from_pointee(HashMap::new()),
            create_lock: Mutex::new(()),
        }
    }

    /// Transport for `node`, created on first use.
    pub fn get_or_create(&self, node: &Node) -> Arc<dyn Transport> {
        if let Some(transport) = self.get(node.address()) {
            return transport;
        }

        let _guard = self.create_lock.lock();
        let current = self.transports.load_full();
        if let Some(transport) = current.get(node.address()) {
            return Arc::clone(transport);
        }

        let transport = self.factory.create(node);
        let mut next = TransportMap::clone(&current);
        next.insert(node.address().to_string(), Arc::clone(&transport));
        self.transports.store(Arc::new(next));

        debug!(node = node.address(), pooled = current.len() + 1, "pooled new transport");
        transport
    }

    /// Pooled transport for `address`, if one exists.
    pub fn get(&self, address: &str) -> Option<Arc<dyn Transport>> {
        self.transports.load().get(address).cloned()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.transports.load().contains_key(address)
    }

    /// Number of pooled transports.
    pub fn len(&self) -> usize {
        self.transports.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::body::empty;
    use crate::proxy::transport::TransportFuture;
    use hyper::{Request, Response};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OkTransport;

    impl Transport for OkTransport {
        fn send(&self, _req: Request<crate::proxy::ProxyBody>) -> TransportFuture {
            Box::pin(async { Ok(Response::new(empty())) })
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
    }

    impl TransportFactory for CountingFactory {
        fn create(&self, _node: &Node) -> Arc<dyn Transport> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Arc::new(OkTransport)
        }
    }

    #[test]
    fn test_reuses_transport_per_address() {
        let factory = Arc::new(CountingFactory::default());
        let pool = TransportPool::new(factory.clone());
        let a = Node::new("http", "127.0.0.1:8001");
        let b = Node::new("http", "127.0.0.1:8002");

        let first = pool.get_or_create(&a);
        let second = pool.get_or_create(&a);
        pool.get_or_create(&b);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len(), 2);
        assert!(pool.contains("127.0.0.1:8002"));
    }

    #[test]
    fn test_concurrent_first_use_creates_once() {
        let factory = Arc::new(CountingFactory::default());
        let pool = Arc::new(TransportPool::new(factory.clone()));
        let node = Node::new("http", "127.0.0.1:8001");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let node = node.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        pool.get_or_create(&node);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }
}
