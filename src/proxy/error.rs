//! Dispatch errors.

use crate::selector::SelectError;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Shared, cloneable error source.
pub type SharedError = Arc<dyn Error + Send + Sync>;

/// Failure of a pooled transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// No connection could be established; nothing was sent.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: SharedError,
    },

    /// The request was handed to a connection but no response came back.
    #[error("request to {address} failed: {source}")]
    Request {
        address: String,
        #[source]
        source: SharedError,
    },
}

impl TransportError {
    pub fn connect(address: impl Into<String>, err: impl Error + Send + Sync + 'static) -> Self {
        Self::Connect {
            address: address.into(),
            source: Arc::new(err),
        }
    }

    pub fn request(address: impl Into<String>, err: impl Error + Send + Sync + 'static) -> Self {
        Self::Request {
            address: address.into(),
            source: Arc::new(err),
        }
    }

    /// Address of the node the transport talks to.
    pub fn address(&self) -> &str {
        match self {
            Self::Connect { address, .. } | Self::Request { address, .. } => address,
        }
    }

    /// Whether any request bytes may have reached the node.
    pub fn bytes_sent(&self) -> bool {
        matches!(self, Self::Request { .. })
    }
}

/// Dispatch failure.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// No node could be selected; no network I/O was attempted.
    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The scope's cancellation signal fired.
    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {0:?}")]
    TimedOut(Duration),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProxyError {
    /// Whether the dispatch failed for lack of a node.
    pub fn is_no_available_node(&self) -> bool {
        matches!(self, Self::Select(SelectError::NoAvailableNode))
    }

    /// Whether the request was cancelled or timed out.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut(_))
    }

    /// Whether calling dispatch again may succeed without side effects on the
    /// failed attempt: nothing was sent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Select(_) => true,
            Self::Transport(e) => !e.bytes_sent(),
            _ => false,
        }
    }

    /// Whether any request bytes may have reached a node.
    ///
    /// The error alone cannot tell for cancellations, so they answer `true`.
    /// Dispatch reports whether the request body was actually polled instead.
    pub fn bytes_sent(&self) -> bool {
        match self {
            Self::Select(_) | Self::InvalidRequest(_) => false,
            Self::Transport(e) => e.bytes_sent(),
            Self::Cancelled | Self::TimedOut(_) => true,
        }
    }

    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Select(_) => "no_available_node",
            Self::Transport(TransportError::Connect { .. }) => "connect_error",
            Self::Transport(TransportError::Request { .. }) => "request_error",
            Self::Cancelled => "cancelled",
            Self::TimedOut(_) => "timeout",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}
