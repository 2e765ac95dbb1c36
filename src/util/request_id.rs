//! Dispatch identifiers for correlating log lines.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static DISPATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Globally unique id, for callers that forward it to other systems.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Process-unique id of the form `dispatch-{counter:016x}`.
pub fn generate_short_request_id() -> String {
    let count = DISPATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("dispatch-{:016x}", count)
}

/// Identifier attached to each dispatch span.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// A UUID-based id.
    pub fn new() -> Self {
        Self(generate_request_id())
    }

    /// A counter-based id; cheaper, unique within this process only.
    pub fn short() -> Self {
        Self(generate_short_request_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
