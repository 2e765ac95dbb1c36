//! Per-request selection scope.

use super::{Node, NodeFilter, Peer};
use crate::util::CancelSignal;
use std::sync::Arc;
use std::time::Duration;

/// Values carried alongside one request: affinity, filters, deadline and
/// cancellation.
///
/// The scope is passed by `&mut` so that selection can record its decision
/// into an empty [`Peer`] where the caller can read it back.
#[derive(Clone, Default)]
pub struct Scope {
    peer: Option<Peer>,
    filters: Vec<Arc<dyn NodeFilter>>,
    timeout: Option<Duration>,
    cancel: Option<CancelSignal>,
}

impl Scope {
    /// An empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a peer. Use [`Peer::bound`] to pin, [`Peer::new`] to record.
    pub fn with_peer(mut self, peer: Peer) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Pin the request to `node`.
    pub fn pinned(node: Node) -> Self {
        Self::new().with_peer(Peer::bound(node))
    }

    /// Append a candidate filter.
    pub fn with_filter(mut self, filter: Arc<dyn NodeFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Bound the request duration.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation signal.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The attached peer, if any.
    pub fn peer(&self) -> Option<&Peer> {
        self.peer.as_ref()
    }

    /// Mutable access to the attached peer.
    pub fn peer_mut(&mut self) -> Option<&mut Peer> {
        self.peer.as_mut()
    }

    /// Node pinned by the peer, if the peer holds one.
    pub fn pinned_node(&self) -> Option<&Node> {
        self.peer.as_ref().and_then(Peer::node)
    }

    /// Record the selected node into an attached peer.
    pub(crate) fn record(&mut self, node: &Node) {
        if let Some(peer) = self.peer.as_mut() {
            peer.bind(node.clone());
        }
    }

    pub fn filters(&self) -> &[Arc<dyn NodeFilter>] {
        &self.filters
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancel(&self) -> Option<&CancelSignal> {
        self.cancel.as_ref()
    }

    /// Whether the attached cancellation signal has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("peer", &self.peer)
            .field("filters", &self.filters.len())
            .field("timeout", &self.timeout)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
