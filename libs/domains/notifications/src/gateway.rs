//! Dispatch gateway seam.
//!
//! Delivery is fire-and-forget from the engine's perspective: the gateway
//! accepts a [`Dispatch`] and owns transport, retries, and error reporting.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::Dispatch;

/// Accepts outgoing messages for asynchronous delivery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DispatchGateway: Send + Sync {
    /// Hand a message to the transport. Never blocks on delivery and never
    /// surfaces transport errors to the caller.
    async fn send(&self, dispatch: Dispatch);
}

/// Gateway that records dispatches instead of delivering them (for
/// development/testing).
#[derive(Debug, Clone, Default)]
pub struct RecordingGateway {
    sent: Arc<RwLock<Vec<Dispatch>>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything handed to the gateway so far, in send order.
    pub async fn sent(&self) -> Vec<Dispatch> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl DispatchGateway for RecordingGateway {
    async fn send(&self, dispatch: Dispatch) {
        tracing::debug!(
            to = dispatch.to.len(),
            cc = dispatch.cc.len(),
            subject = %dispatch.subject,
            "Recording dispatch"
        );
        self.sent.write().await.push(dispatch);
    }
}
