//! The channel to a paired companion device.

use super::payload::CompanionPayload;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound side of a companion session.
///
/// `update_context` replaces the context the partner sees. Only the latest
/// context matters, so a link may drop superseded payloads.
#[async_trait]
pub trait CompanionLink: Send + Sync {
    async fn update_context(&self, payload: CompanionPayload) -> SyncResult<()>;

    /// Whether a partner device is currently paired.
    fn is_paired(&self) -> bool {
        true
    }
}

/// Link backed by a tokio channel. Used for in-process pairs and as the
/// bridge to platform session code.
#[derive(Debug, Clone)]
pub struct ChannelLink {
    outbound: mpsc::Sender<CompanionPayload>,
}

impl ChannelLink {
    pub fn new(outbound: mpsc::Sender<CompanionPayload>) -> Self {
        Self { outbound }
    }

    /// Creates two connected links. Each side's receiver yields what the
    /// other side sends.
    pub fn pair(
        capacity: usize,
    ) -> (
        (Self, mpsc::Receiver<CompanionPayload>),
        (Self, mpsc::Receiver<CompanionPayload>),
    ) {
        let (to_b, inbox_b) = mpsc::channel(capacity);
        let (to_a, inbox_a) = mpsc::channel(capacity);
        ((Self::new(to_b), inbox_a), (Self::new(to_a), inbox_b))
    }
}

#[async_trait]
impl CompanionLink for ChannelLink {
    async fn update_context(&self, payload: CompanionPayload) -> SyncResult<()> {
        self.outbound
            .send(payload)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }

    fn is_paired(&self) -> bool {
        !self.outbound.is_closed()
    }
}

/// Link used when no partner is configured. Payloads are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLink;

#[async_trait]
impl CompanionLink for NullLink {
    async fn update_context(&self, payload: CompanionPayload) -> SyncResult<()> {
        debug!("No companion paired; dropping context with {} records", payload.len());
        Ok(())
    }

    fn is_paired(&self) -> bool {
        false
    }
}
