//! Request dispatch through the selector and the transport pool.

use super::body::{ProxyBody, WriteTracked};
use super::error::ProxyError;
use super::pool::TransportPool;
use super::transport::{HyperTransportFactory, TransportFactory, TransportFuture};
use crate::config::{Config, PoolConfig};
use crate::metrics::MetricsCollector;
use crate::selector::{self, DoneFunc, DoneInfo, Node, Rebalancer, Scope, Selector};
use crate::util::{CancelSignal, RequestId};
use hyper::header::{HOST, HeaderValue};
use hyper::{Request, Response, Uri};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Client-side reverse proxy: picks a node per request and sends the request
/// over that node's pooled transport.
pub struct ReverseProxy {
    selector: Arc<dyn Selector>,
    pool: TransportPool,
    request_timeout: Option<Duration>,
    metrics: MetricsCollector,
}

impl ReverseProxy {
    /// A proxy with a random selector and default pool settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ReverseProxyBuilder {
        ReverseProxyBuilder::default()
    }

    /// Build from configuration and install the configured nodes.
    pub fn from_config(config: &Config) -> Self {
        Self::builder()
            .selector(selector::build(&config.selector))
            .pool_config(config.pool.clone())
            .nodes(config.nodes())
            .build()
    }

    pub fn selector(&self) -> &Arc<dyn Selector> {
        &self.selector
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Number of pooled per-node transports.
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    /// Whether a transport for `address` is pooled.
    pub fn contains_transport(&self, address: &str) -> bool {
        self.pool.contains(address)
    }

    /// Dispatch with an empty scope.
    pub async fn dispatch(&self, req: Request<ProxyBody>) -> Result<Response<ProxyBody>, ProxyError> {
        self.dispatch_with(req, &mut Scope::new()).await
    }

    /// Dispatch `req` to a node chosen under `scope`.
    ///
    /// The request URI is rewritten to the node's scheme and address; the
    /// original authority is kept as the `Host` header when none is set.
    /// The node's completion callback is invoked exactly once, including
    /// when this future is dropped before the response arrives. Latency is
    /// measured up to the response head.
    #[instrument(skip_all, fields(
        request_id = %RequestId::short(),
        method = %req.method(),
        uri = %req.uri()
    ))]
    pub async fn dispatch_with(
        &self,
        req: Request<ProxyBody>,
        scope: &mut Scope,
    ) -> Result<Response<ProxyBody>, ProxyError> {
        if scope.is_cancelled() {
            debug!("scope cancelled before selection");
            return Err(ProxyError::Cancelled);
        }

        let (node, done) = match self.selector.select(scope) {
            Ok(selected) => selected.into_parts(),
            Err(e) => {
                self.metrics.record_no_available_node();
                warn!(error = %e, "dispatch failed");
                return Err(e.into());
            }
        };
        let completion = Completion::start(done, &node, self.metrics.clone());

        let req = match rewrite_request(req, &node) {
            Ok(req) => req.map(|body| WriteTracked::wrap(body, completion.written())),
            Err(e) => {
                completion.finish(DoneInfo::failure(e.clone(), false), e.label());
                return Err(e);
            }
        };

        let transport = self.pool.get_or_create(&node);
        self.metrics.set_pooled_transports(self.pool.len());

        let timeout = scope.timeout().or(self.request_timeout);
        let outcome = tokio::select! {
            res = send(transport.send(req), timeout) => res,
            _ = cancelled(scope.cancel()) => Err(ProxyError::Cancelled),
        };

        match outcome {
            Ok(resp) => {
                debug!(node = node.address(), status = %resp.status(), "dispatched");
                completion.finish(DoneInfo::success(), resp.status().as_str());
                Ok(resp)
            }
            Err(e) => {
                warn!(node = node.address(), error = %e, "dispatch failed");
                let bytes_sent = if e.is_cancellation() {
                    completion.was_written()
                } else {
                    e.bytes_sent()
                };
                completion.finish(DoneInfo::failure(e.clone(), bytes_sent), e.label());
                Err(e)
            }
        }
    }
}

impl Default for ReverseProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl Rebalancer for ReverseProxy {
    fn apply(&self, nodes: Vec<Node>) {
        self.selector.apply(nodes);

        let installed = self.selector.nodes();
        self.metrics.record_apply(installed.len());
        self.metrics
            .retain_nodes(installed.iter().map(|n| n.address()));
    }
}

/// Builder for [`ReverseProxy`].
#[derive(Default)]
pub struct ReverseProxyBuilder {
    selector: Option<Arc<dyn Selector>>,
    factory: Option<Arc<dyn TransportFactory>>,
    pool_config: PoolConfig,
    nodes: Option<Vec<Node>>,
    metrics: Option<MetricsCollector>,
}

impl ReverseProxyBuilder {
    /// Selector to use. Defaults to random balancing.
    pub fn selector(mut self, selector: Arc<dyn Selector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Pool settings for the default transport factory and request timeout.
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Replace how per-node transports are created.
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Nodes applied when the proxy is built.
    pub fn nodes(mut self, nodes: Vec<Node>) -> Self {
        self.nodes = Some(nodes);
        self
    }

    pub fn metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> ReverseProxy {
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(HyperTransportFactory::new(self.pool_config.clone())));
        let proxy = ReverseProxy {
            selector: self.selector.unwrap_or_else(|| Arc::new(selector::random())),
            pool: TransportPool::new(factory),
            request_timeout: self.pool_config.request_timeout,
            metrics: self.metrics.unwrap_or_default(),
        };

        if let Some(nodes) = self.nodes {
            proxy.apply(nodes);
        }
        proxy
    }
}

/// Reports the outcome of one dispatch exactly once.
///
/// Dropping an unfinished completion reports a cancellation. `written` is set
/// by the request body once a connection starts writing the request.
struct Completion {
    done: Option<DoneFunc>,
    node: String,
    metrics: MetricsCollector,
    started: Instant,
    written: Arc<AtomicBool>,
}

impl Completion {
    fn start(done: DoneFunc, node: &Node, metrics: MetricsCollector) -> Self {
        metrics.request_started(node.address());
        Self {
            done: Some(done),
            node: node.address().to_string(),
            metrics,
            started: Instant::now(),
            written: Arc::new(AtomicBool::new(false)),
        }
    }

    fn written(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.written)
    }

    fn was_written(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    fn finish(mut self, info: DoneInfo, status: &str) {
        self.report(info, status);
    }

    fn report(&mut self, info: DoneInfo, status: &str) {
        let Some(done) = self.done.take() else {
            return;
        };
        let elapsed = self.started.elapsed();
        self.metrics.request_finished(&self.node);
        self.metrics.record_request(&self.node, status, elapsed);
        done(info.with_latency(elapsed));
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.done.is_some() {
            debug!(node = %self.node, "dispatch dropped before completion");
            let bytes_sent = self.was_written();
            self.report(DoneInfo::failure(ProxyError::Cancelled, bytes_sent), "cancelled");
        }
    }
}

async fn send(
    response: TransportFuture,
    timeout: Option<Duration>,
) -> Result<Response<ProxyBody>, ProxyError> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, response).await {
            Ok(res) => res.map_err(ProxyError::from),
            Err(_) => Err(ProxyError::TimedOut(limit)),
        },
        None => response.await.map_err(ProxyError::from),
    }
}

async fn cancelled(signal: Option<&CancelSignal>) {
    match signal {
        Some(signal) => signal.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Point the request at `node`, keeping the original authority as `Host`.
fn rewrite_request(mut req: Request<ProxyBody>, node: &Node) -> Result<Request<ProxyBody>, ProxyError> {
    let original = req.uri().clone();
    let path_and_query = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let uri = Uri::builder()
        .scheme(node.scheme())
        .authority(node.address())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ProxyError::InvalidRequest(format!("cannot target {}: {}", node, e)))?;

    if !req.headers().contains_key(HOST) {
        if let Some(authority) = original.authority() {
            let host = HeaderValue::from_str(authority.as_str())
                .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;
            req.headers_mut().insert(HOST, host);
        }
    }

    *req.uri_mut() = uri;
    Ok(req)
}
