//! Request cancellation signal.

use tokio::sync::watch;

/// Cancels the requests whose scope carries it.
///
/// Cloning yields a handle to the same signal. Once cancelled it stays
/// cancelled, and waiters that subscribe afterwards observe it immediately.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    sender: watch::Sender<bool>,
}

impl CancelSignal {
    /// Create a new, untriggered signal.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Trigger cancellation.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether cancellation was triggered.
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Wait until cancellation is triggered.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
