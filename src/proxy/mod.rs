//! Request dispatch over pooled per-node transports.

pub mod body;
mod dispatcher;
mod error;
mod pool;
mod transport;

pub use body::{ProxyBody, empty, full};
pub use dispatcher::{ReverseProxy, ReverseProxyBuilder};
pub use error::{ProxyError, SharedError, TransportError};
pub use pool::TransportPool;
pub use transport::{
    HyperTransport, HyperTransportFactory, Transport, TransportFactory, TransportFuture,
};
