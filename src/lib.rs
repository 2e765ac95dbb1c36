//! nodeproxy - client-side load balancing and request dispatch
//!
//! This crate routes outbound HTTP requests to one of several interchangeable
//! backend nodes:
//! - Hot-swappable node sets read without locking on the request path
//! - Random, smooth weighted round-robin, power-of-two-choices and static selection
//! - Per-request peer affinity, candidate filters, timeouts and cancellation
//! - One pooled HTTP transport per node address
//! - YAML configuration with file watching, and Prometheus metrics

pub mod config;
pub mod global;
pub mod metrics;
pub mod proxy;
pub mod selector;
pub mod util;

pub use config::Config;
pub use proxy::{ProxyError, ReverseProxy};
pub use selector::{Node, Peer, Rebalancer, Scope, SelectError, Selector};
