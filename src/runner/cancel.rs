//! Session-wide cancellation signal

use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken as Signal;

/// Cloneable cancellation flag shared by every pipeline of a session.
///
/// The first call to [`cancel`](Self::cancel) wins; its reason is kept.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    token: Signal,
    reason: Arc<OnceLock<String>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reason given by the first canceller
    pub fn reason(&self) -> Option<String> {
        self.reason.get().cloned()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
