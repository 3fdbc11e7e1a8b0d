use async_trait::async_trait;
use tracing::error;

use crate::error::DeepstreamError;

/// Receives failures the client detects while it talks to the server
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Called when the client or its transport detects an error
    async fn on_error(&self, err: &DeepstreamError) {
        error!("deepstream error: {}", err);
    }
}

/// Error handler that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {}
