//! Request context carried through every operation

use tokio_util::sync::CancellationToken;

use crate::utils::generate_uuid;

/// Correlation and cancellation data for one broker request
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: String,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Create a context with a fresh correlation ID
    pub fn new() -> Self {
        Self::with_correlation_id(generate_uuid())
    }

    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// A context for background jobs: same correlation ID, independent cancellation
    pub fn detached(&self) -> Self {
        Self::with_correlation_id(self.correlation_id.clone())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the context is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
