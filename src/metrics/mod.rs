//! Metrics collection.
//!
//! The collector only records; exposition is left to the embedding
//! application through [`MetricsCollector::registry`].

mod collector;

pub use collector::MetricsCollector;
