//! Utility functions and helpers.

mod cancel;
mod logging;
mod request_id;

pub use cancel::CancelSignal;
pub use logging::init_logging;
pub use request_id::{RequestId, generate_request_id, generate_short_request_id};
