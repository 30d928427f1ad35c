use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use reserva_core::delivery::{
    ChannelError, ChannelSender, DeliveryReceipt, RenderError, TicketRenderer,
};
use reserva_core::models::BookingSnapshot;

/// Stand-in renderer used in tests and local wiring; real deployments plug
/// in the external PDF service behind the same trait.
pub struct MockRenderer {
    fail_with: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockRenderer {
    pub fn ok() -> Self {
        Self {
            fail_with: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(detail: &str) -> Self {
        Self {
            fail_with: Some(detail.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            fail_with: None,
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TicketRenderer for MockRenderer {
    async fn render(&self, snapshot: &BookingSnapshot) -> Result<Vec<u8>, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(detail) = &self.fail_with {
            return Err(RenderError::Failed(detail.clone()));
        }

        let body = format!(
            "%PDF-1.4\n% ticket for booking {} ({} line items, total {} cents)\n",
            snapshot.booking_id,
            snapshot.line_items.len(),
            snapshot.total_cents()
        );
        Ok(body.into_bytes())
    }
}

/// Stand-in delivery channel that records destinations it was asked to send
/// to.
pub struct MockChannel {
    name: &'static str,
    fail_with: Option<String>,
    delay: Duration,
    sent: Mutex<Vec<String>>,
}

impl MockChannel {
    pub fn ok(name: &'static str) -> Self {
        Self {
            name,
            fail_with: None,
            delay: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &'static str, detail: &str) -> Self {
        Self {
            name,
            fail_with: Some(detail.to_string()),
            delay: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(name: &'static str, delay: Duration) -> Self {
        Self {
            name,
            fail_with: None,
            delay,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Destinations successfully sent to, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelSender for MockChannel {
    async fn send(&self, _pdf: &[u8], destination: &str) -> Result<DeliveryReceipt, ChannelError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(detail) = &self.fail_with {
            return Err(ChannelError::SendFailed(detail.clone()));
        }

        self.sent.lock().unwrap().push(destination.to_string());
        info!(channel = self.name, destination, "mock delivery sent");
        Ok(DeliveryReceipt {
            provider_message_id: Some(format!("{}-{}", self.name, destination)),
        })
    }
}
