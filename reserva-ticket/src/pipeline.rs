use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use reserva_core::delivery::{ChannelSender, TicketRenderer};
use reserva_core::models::{
    AttemptStatus, Booking, BookingSnapshot, PipelineStep, TicketDeliveryAttempt,
};
use reserva_core::repository::BookingStore;
use reserva_core::StoreError;

/// Observable outcome of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    NotStarted,
    /// The step started but has not recorded a terminal attempt yet, either
    /// because it is still running or because the process died mid-step.
    Pending,
    Success,
    Failed { detail: String },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPipelineResult {
    pub booking_id: Uuid,
    pub pdf: StepOutcome,
    pub whatsapp: StepOutcome,
    pub email: StepOutcome,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("ticket pipeline already running for booking {0}")]
    AlreadyRunning(Uuid),

    #[error("no ticket artifact for booking {0}; generate the PDF first")]
    ArtifactMissing(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Orchestrates PDF generation and channel fan-out after a booking commits.
///
/// The PDF render is a hard prerequisite; WhatsApp and Email run
/// independently of each other. Every step appends an audit attempt and no
/// step ever touches the booking row: a confirmed booking stays confirmed
/// whatever the delivery does.
pub struct TicketPipeline {
    store: Arc<dyn BookingStore>,
    renderer: Arc<dyn TicketRenderer>,
    whatsapp: Arc<dyn ChannelSender>,
    email: Arc<dyn ChannelSender>,
    step_timeout: Duration,
    in_flight: Mutex<HashSet<Uuid>>,
}

impl TicketPipeline {
    pub fn new(
        store: Arc<dyn BookingStore>,
        renderer: Arc<dyn TicketRenderer>,
        whatsapp: Arc<dyn ChannelSender>,
        email: Arc<dyn ChannelSender>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            store,
            renderer,
            whatsapp,
            email,
            step_timeout,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Run the full pipeline for a booking: render, then fan out to both
    /// channels. At most one pipeline per booking id is in flight at a time.
    pub async fn generate_and_deliver(
        &self,
        booking: &Booking,
    ) -> Result<TicketPipelineResult, PipelineError> {
        let _guard = self.begin(booking.id)?;

        let line_items = self.store.list_line_items(booking.id).await?;
        let snapshot = BookingSnapshot {
            booking_id: booking.id,
            tenant_id: booking.tenant_id,
            slot: booking.slot.clone(),
            customer: booking.customer.clone(),
            line_items,
        };

        let (pdf_outcome, pdf_bytes) = self.render_step(booking, &snapshot).await;

        let (whatsapp, email) = match pdf_bytes {
            Some(bytes) => {
                tokio::join!(
                    self.channel_step(
                        booking.id,
                        PipelineStep::Whatsapp,
                        &self.whatsapp,
                        &bytes,
                        &booking.customer.phone,
                    ),
                    self.channel_step(
                        booking.id,
                        PipelineStep::Email,
                        &self.email,
                        &bytes,
                        &booking.customer.email,
                    ),
                )
            }
            None => {
                // Without a PDF neither channel is attempted; the skips are
                // still recorded so the audit trail is complete.
                self.record(booking.id, PipelineStep::Whatsapp, AttemptStatus::Skipped, None)
                    .await;
                self.record(booking.id, PipelineStep::Email, AttemptStatus::Skipped, None)
                    .await;
                (StepOutcome::Skipped, StepOutcome::Skipped)
            }
        };

        let result = TicketPipelineResult {
            booking_id: booking.id,
            pdf: pdf_outcome,
            whatsapp,
            email,
        };
        info!(booking_id = %booking.id, ?result, "ticket pipeline finished");
        Ok(result)
    }

    /// Manual re-invocation of a single step. Channel steps reuse the stored
    /// PDF artifact; the PDF step re-renders and replaces it.
    pub async fn redeliver(
        &self,
        booking: &Booking,
        step: PipelineStep,
    ) -> Result<StepOutcome, PipelineError> {
        let _guard = self.begin(booking.id)?;

        match step {
            PipelineStep::Pdf => {
                let line_items = self.store.list_line_items(booking.id).await?;
                let snapshot = BookingSnapshot {
                    booking_id: booking.id,
                    tenant_id: booking.tenant_id,
                    slot: booking.slot.clone(),
                    customer: booking.customer.clone(),
                    line_items,
                };
                let (outcome, _) = self.render_step(booking, &snapshot).await;
                Ok(outcome)
            }
            PipelineStep::Whatsapp | PipelineStep::Email => {
                let pdf = self
                    .store
                    .get_ticket_artifact(booking.id)
                    .await?
                    .ok_or(PipelineError::ArtifactMissing(booking.id))?;

                let (sender, destination) = match step {
                    PipelineStep::Whatsapp => (&self.whatsapp, booking.customer.phone.as_str()),
                    _ => (&self.email, booking.customer.email.as_str()),
                };

                Ok(self
                    .channel_step(booking.id, step, sender, &pdf, destination)
                    .await)
            }
        }
    }

    /// Current per-step status folded from the persisted attempt trail.
    /// Stable between explicit pipeline invocations.
    pub async fn status(&self, booking_id: Uuid) -> Result<TicketPipelineResult, PipelineError> {
        let attempts = self.store.list_delivery_attempts(booking_id).await?;
        Ok(fold_status(booking_id, &attempts))
    }

    async fn render_step(
        &self,
        booking: &Booking,
        snapshot: &BookingSnapshot,
    ) -> (StepOutcome, Option<Vec<u8>>) {
        // Mark the step started before doing any work, so an interrupted
        // render is visible in the trail instead of looking never attempted.
        self.record(booking.id, PipelineStep::Pdf, AttemptStatus::Pending, None)
            .await;
        match timeout(self.step_timeout, self.renderer.render(snapshot)).await {
            Ok(Ok(bytes)) => {
                self.record(booking.id, PipelineStep::Pdf, AttemptStatus::Success, None)
                    .await;
                // Persist the artifact so manual re-delivery does not have
                // to re-render.
                if let Err(e) = self.store.save_ticket_artifact(booking.id, &bytes).await {
                    error!(booking_id = %booking.id, error = %e, "failed to persist ticket artifact");
                }
                (StepOutcome::Success, Some(bytes))
            }
            Ok(Err(e)) => {
                let detail = e.to_string();
                warn!(booking_id = %booking.id, error = %detail, "ticket render failed");
                self.record(
                    booking.id,
                    PipelineStep::Pdf,
                    AttemptStatus::Failed,
                    Some(detail.clone()),
                )
                .await;
                (StepOutcome::Failed { detail }, None)
            }
            Err(_) => {
                let detail = format!("render timed out after {:?}", self.step_timeout);
                warn!(booking_id = %booking.id, "ticket render timed out");
                self.record(
                    booking.id,
                    PipelineStep::Pdf,
                    AttemptStatus::Failed,
                    Some(detail.clone()),
                )
                .await;
                (StepOutcome::Failed { detail }, None)
            }
        }
    }

    async fn channel_step(
        &self,
        booking_id: Uuid,
        step: PipelineStep,
        sender: &Arc<dyn ChannelSender>,
        pdf: &[u8],
        destination: &str,
    ) -> StepOutcome {
        self.record(booking_id, step, AttemptStatus::Pending, None).await;
        match timeout(self.step_timeout, sender.send(pdf, destination)).await {
            Ok(Ok(_receipt)) => {
                info!(booking_id = %booking_id, channel = step.as_str(), "ticket delivered");
                self.record(booking_id, step, AttemptStatus::Success, None).await;
                StepOutcome::Success
            }
            Ok(Err(e)) => {
                let detail = e.to_string();
                warn!(
                    booking_id = %booking_id,
                    channel = step.as_str(),
                    error = %detail,
                    "ticket delivery failed"
                );
                self.record(booking_id, step, AttemptStatus::Failed, Some(detail.clone()))
                    .await;
                StepOutcome::Failed { detail }
            }
            Err(_) => {
                let detail = format!("send timed out after {:?}", self.step_timeout);
                warn!(booking_id = %booking_id, channel = step.as_str(), "ticket delivery timed out");
                self.record(booking_id, step, AttemptStatus::Failed, Some(detail.clone()))
                    .await;
                StepOutcome::Failed { detail }
            }
        }
    }

    async fn record(
        &self,
        booking_id: Uuid,
        step: PipelineStep,
        status: AttemptStatus,
        error_detail: Option<String>,
    ) {
        let attempt = TicketDeliveryAttempt::new(booking_id, step, status, error_detail);
        // A lost audit row must not abort the pipeline or the booking.
        if let Err(e) = self.store.record_delivery_attempt(&attempt).await {
            error!(
                booking_id = %booking_id,
                step = step.as_str(),
                error = %e,
                "failed to record delivery attempt"
            );
        }
    }

    fn begin(&self, booking_id: Uuid) -> Result<InFlightGuard<'_>, PipelineError> {
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.insert(booking_id) {
            return Err(PipelineError::AlreadyRunning(booking_id));
        }
        Ok(InFlightGuard {
            pipeline: self,
            booking_id,
        })
    }
}

struct InFlightGuard<'a> {
    pipeline: &'a TicketPipeline,
    booking_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.pipeline
            .in_flight
            .lock()
            .unwrap()
            .remove(&self.booking_id);
    }
}

/// Folds the attempt trail into per-step outcomes. The latest attempt per
/// step wins; a step with no attempts is `NotStarted`.
pub fn fold_status(booking_id: Uuid, attempts: &[TicketDeliveryAttempt]) -> TicketPipelineResult {
    let mut result = TicketPipelineResult {
        booking_id,
        pdf: StepOutcome::NotStarted,
        whatsapp: StepOutcome::NotStarted,
        email: StepOutcome::NotStarted,
    };

    for attempt in attempts {
        let outcome = match attempt.status {
            AttemptStatus::Pending => StepOutcome::Pending,
            AttemptStatus::Success => StepOutcome::Success,
            AttemptStatus::Skipped => StepOutcome::Skipped,
            AttemptStatus::Failed => StepOutcome::Failed {
                detail: attempt
                    .error_detail
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
        };
        match attempt.step {
            PipelineStep::Pdf => result.pdf = outcome,
            PipelineStep::Whatsapp => result.whatsapp = outcome,
            PipelineStep::Email => result.email = outcome,
        }
    }

    result
}
