//! Per-node HTTP transports.

use super::body::ProxyBody;
use super::error::TransportError;
use crate::config::PoolConfig;
use crate::selector::Node;
use futures::future::BoxFuture;
use http_body_util::BodyExt;
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use tracing::debug;

/// Future returned by [`Transport::send`].
pub type TransportFuture = BoxFuture<'static, Result<Response<ProxyBody>, TransportError>>;

/// Sends requests to one node over reusable connections.
pub trait Transport: Send + Sync {
    /// Send `req`, whose URI already targets the node.
    fn send(&self, req: Request<ProxyBody>) -> TransportFuture;
}

/// Creates the transport for a node the first time it is dispatched to.
pub trait TransportFactory: Send + Sync {
    fn create(&self, node: &Node) -> Arc<dyn Transport>;
}

/// Transport backed by a pooling hyper client.
///
/// Redirects are returned to the caller untouched.
pub struct HyperTransport {
    address: String,
    client: Client<HttpConnector, ProxyBody>,
}

impl HyperTransport {
    pub fn new(address: impl Into<String>, config: &PoolConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout));
        connector.set_keepalive(config.keepalive);
        connector.set_nodelay(config.nodelay);

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(config.idle_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build(connector);

        Self {
            address: address.into(),
            client,
        }
    }
}

impl Transport for HyperTransport {
    fn send(&self, req: Request<ProxyBody>) -> TransportFuture {
        let address = self.address.clone();
        let response = self.client.request(req);

        Box::pin(async move {
            match response.await {
                Ok(resp) => Ok(resp.map(|body| body.boxed())),
                Err(e) if e.is_connect() => Err(TransportError::connect(address, e)),
                Err(e) => Err(TransportError::request(address, e)),
            }
        })
    }
}

/// Builds a [`HyperTransport`] per node, all sharing one pool configuration.
#[derive(Debug, Clone, Default)]
pub struct HyperTransportFactory {
    config: PoolConfig,
}

impl HyperTransportFactory {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl TransportFactory for HyperTransportFactory {
    fn create(&self, node: &Node) -> Arc<dyn Transport> {
        debug!(
            node = node.address(),
            max_idle = self.config.max_idle_per_host,
            "creating transport"
        );
        Arc::new(HyperTransport::new(node.address(), &self.config))
    }
}
