use async_trait::async_trait;

use crate::models::BookingSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("ticket render failed: {0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel send failed: {0}")]
    SendFailed(String),

    #[error("destination rejected: {0}")]
    InvalidDestination(String),
}

/// Provider-side acknowledgement of a delivery.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub provider_message_id: Option<String>,
}

/// External PDF renderer. Implemented outside this core; the pipeline only
/// depends on the contract.
#[async_trait]
pub trait TicketRenderer: Send + Sync {
    async fn render(&self, snapshot: &BookingSnapshot) -> Result<Vec<u8>, RenderError>;
}

/// External delivery channel (WhatsApp, Email). One implementation per
/// channel is wired at startup.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, pdf: &[u8], destination: &str) -> Result<DeliveryReceipt, ChannelError>;
}
