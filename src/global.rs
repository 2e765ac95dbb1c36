//! Process-wide default proxy.
//!
//! Convenience for callers that want one shared dispatcher. Nothing else in
//! the crate reads it; independent [`ReverseProxy`] instances work without it.

use crate::proxy::{ProxyBody, ProxyError, ReverseProxy};
use crate::selector::{Node, Rebalancer, Scope};
use hyper::{Request, Response};
use parking_lot::RwLock;
use std::sync::{Arc, LazyLock};

static DEFAULT: LazyLock<ProxyHolder> = LazyLock::new(ProxyHolder::default);

/// Holds one replaceable proxy instance.
pub struct ProxyHolder {
    current: RwLock<Arc<ReverseProxy>>,
}

impl ProxyHolder {
    pub fn new(proxy: ReverseProxy) -> Self {
        Self {
            current: RwLock::new(Arc::new(proxy)),
        }
    }

    /// The current instance.
    pub fn get(&self) -> Arc<ReverseProxy> {
        Arc::clone(&self.current.read())
    }

    /// Replace the instance, returning the previous one. Dispatches already
    /// running keep using the instance they started with.
    pub fn set(&self, proxy: ReverseProxy) -> Arc<ReverseProxy> {
        std::mem::replace(&mut *self.current.write(), Arc::new(proxy))
    }
}

impl Default for ProxyHolder {
    fn default() -> Self {
        Self::new(ReverseProxy::new())
    }
}

/// Replace the default proxy.
pub fn set_proxy(proxy: ReverseProxy) -> Arc<ReverseProxy> {
    DEFAULT.set(proxy)
}

/// The default proxy.
pub fn proxy() -> Arc<ReverseProxy> {
    DEFAULT.get()
}

/// Apply `nodes` to the default proxy.
pub fn apply(nodes: Vec<Node>) {
    DEFAULT.get().apply(nodes);
}

/// Dispatch through the default proxy.
pub async fn dispatch(req: Request<ProxyBody>) -> Result<Response<ProxyBody>, ProxyError> {
    DEFAULT.get().dispatch(req).await
}

/// Dispatch through the default proxy with a request scope.
pub async fn dispatch_with(
    req: Request<ProxyBody>,
    scope: &mut Scope,
) -> Result<Response<ProxyBody>, ProxyError> {
    DEFAULT.get().dispatch_with(req, scope).await
}
