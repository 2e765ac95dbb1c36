//! Request and response bodies.

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full, combinators::BoxBody};
use hyper::body::{Body, Frame, SizeHint};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

/// Body type used on both sides of a dispatch.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// A body holding `bytes`.
pub fn full(bytes: impl Into<Bytes>) -> ProxyBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

/// An empty body.
pub fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Request body that flags when a connection starts writing it.
///
/// The connection inspects the body right before it writes the request head,
/// so a set flag means the request left the pool and reached a connection.
pub(crate) struct WriteTracked {
    inner: ProxyBody,
    written: Arc<AtomicBool>,
}

impl WriteTracked {
    /// Wrap `inner`, setting `written` once a connection picks it up.
    pub(crate) fn wrap(inner: ProxyBody, written: Arc<AtomicBool>) -> ProxyBody {
        Self { inner, written }.boxed()
    }
}

impl Body for WriteTracked {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, hyper::Error>>> {
        self.written.store(true, Ordering::Release);
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.written.store(true, Ordering::Release);
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
