pub mod fanout;
pub mod registry;

use crate::core::domain::envelope::{
    ActivityEvent, AiAnalysisEvent, AiAnalysisFailureEvent, AiAnalysisProgressEvent, CampaignEvent,
    CampaignFailureEvent, CampaignProgressEvent, CustomerEvent, Envelope, EventPayload, QuoteEvent,
    QuoteStatusEvent,
};
use crate::core::ports::broker::BrokerPort;
use crate::utils::error::NotifierResult;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Returns the broker channel carrying events for a tenant.
pub fn event_channel(tenant_id: &str) -> String {
    format!("tenant:{tenant_id}:events")
}

/// Extracts the tenant id from an event channel name.
///
/// Returns `None` for anything that is not a well-formed `tenant:{id}:events`
/// channel; the fan-out listener drops such messages.
pub fn tenant_from_channel(channel: &str) -> Option<&str> {
    let tenant = channel.strip_prefix("tenant:")?.strip_suffix(":events")?;
    if tenant.is_empty() {
        None
    } else {
        Some(tenant)
    }
}

/// The producer-facing facade over the broker.
///
/// Business services (customer, quote, campaign, activity, AI analysis) call
/// the typed convenience methods below; everything funnels through
/// [`EventPublisher::publish`], which wraps the payload in an [`Envelope`] and
/// pushes it onto the owning tenant's channel.
///
/// Publishing is fire-and-forget by contract: no method here returns an
/// error, because notification delivery must never affect the outcome of the
/// domain operation that triggered it. A broker outage costs at most the one
/// event (after a single reconnect attempt); the failure is logged and
/// swallowed.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn BrokerPort>,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn BrokerPort>) -> Self {
        Self { broker }
    }

    /// Publishes one event for a tenant.
    ///
    /// Serializes an envelope stamped with the current time and publishes it
    /// to `tenant:{tenant_id}:events`. On `BrokerUnavailable` the publisher
    /// makes exactly one reconnect attempt and retries once; any further
    /// failure drops the event with an error log.
    pub async fn publish(&self, tenant_id: &str, payload: EventPayload) {
        if tenant_id.is_empty() {
            error!(
                event_type = payload.event_type(),
                "dropping event with empty tenant id"
            );
            return;
        }

        let envelope = Envelope::new(tenant_id, payload);
        let frame = match serde_json::to_string(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                error!(
                    tenant_id,
                    event_type = envelope.event_type(),
                    "failed to serialize event: {e}"
                );
                return;
            }
        };

        let channel = event_channel(tenant_id);
        match self.broker.publish(&channel, &frame).await {
            Ok(()) => {
                debug!(tenant_id, event_type = envelope.event_type(), "event published");
            }
            Err(e) if e.is_broker_unavailable() => {
                if let Err(e) = self.reconnect_and_retry(&channel, &frame).await {
                    error!(
                        tenant_id,
                        event_type = envelope.event_type(),
                        "event dropped, broker unavailable: {e}"
                    );
                }
            }
            Err(e) => {
                error!(
                    tenant_id,
                    event_type = envelope.event_type(),
                    "event dropped: {e}"
                );
            }
        }
    }

    async fn reconnect_and_retry(&self, channel: &str, frame: &str) -> NotifierResult<()> {
        self.broker.connect().await?;
        self.broker.publish(channel, frame).await
    }

    // Typed wrappers, one per domain event kind. These are the entire surface
    // the business services know about.

    pub async fn customer_created(&self, tenant_id: &str, customer_id: &str, customer: Value) {
        self.publish(
            tenant_id,
            EventPayload::CustomerCreated(CustomerEvent {
                customer_id: customer_id.to_string(),
                customer: Some(customer),
            }),
        )
        .await;
    }

    pub async fn customer_updated(&self, tenant_id: &str, customer_id: &str, customer: Value) {
        self.publish(
            tenant_id,
            EventPayload::CustomerUpdated(CustomerEvent {
                customer_id: customer_id.to_string(),
                customer: Some(customer),
            }),
        )
        .await;
    }

    pub async fn customer_deleted(&self, tenant_id: &str, customer_id: &str) {
        self.publish(
            tenant_id,
            EventPayload::CustomerDeleted(CustomerEvent {
                customer_id: customer_id.to_string(),
                customer: None,
            }),
        )
        .await;
    }

    pub async fn quote_created(&self, tenant_id: &str, quote_id: &str, quote: Value) {
        self.publish(
            tenant_id,
            EventPayload::QuoteCreated(QuoteEvent {
                quote_id: quote_id.to_string(),
                quote: Some(quote),
            }),
        )
        .await;
    }

    pub async fn quote_updated(&self, tenant_id: &str, quote_id: &str, quote: Value) {
        self.publish(
            tenant_id,
            EventPayload::QuoteUpdated(QuoteEvent {
                quote_id: quote_id.to_string(),
                quote: Some(quote),
            }),
        )
        .await;
    }

    pub async fn quote_status_changed(
        &self,
        tenant_id: &str,
        quote_id: &str,
        old_status: &str,
        new_status: &str,
    ) {
        self.publish(
            tenant_id,
            EventPayload::QuoteStatusChanged(QuoteStatusEvent {
                quote_id: quote_id.to_string(),
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            }),
        )
        .await;
    }

    pub async fn campaign_started(&self, tenant_id: &str, campaign_id: &str, details: Value) {
        self.publish(
            tenant_id,
            EventPayload::CampaignStarted(CampaignEvent {
                campaign_id: campaign_id.to_string(),
                details: Some(details),
            }),
        )
        .await;
    }

    pub async fn campaign_progress(
        &self,
        tenant_id: &str,
        campaign_id: &str,
        processed: u64,
        total: u64,
    ) {
        self.publish(
            tenant_id,
            EventPayload::CampaignProgress(CampaignProgressEvent {
                campaign_id: campaign_id.to_string(),
                processed,
                total,
            }),
        )
        .await;
    }

    pub async fn campaign_completed(&self, tenant_id: &str, campaign_id: &str, details: Value) {
        self.publish(
            tenant_id,
            EventPayload::CampaignCompleted(CampaignEvent {
                campaign_id: campaign_id.to_string(),
                details: Some(details),
            }),
        )
        .await;
    }

    pub async fn campaign_failed(&self, tenant_id: &str, campaign_id: &str, error: &str) {
        self.publish(
            tenant_id,
            EventPayload::CampaignFailed(CampaignFailureEvent {
                campaign_id: campaign_id.to_string(),
                error: error.to_string(),
            }),
        )
        .await;
    }

    pub async fn activity_created(&self, tenant_id: &str, activity_id: &str, activity: Value) {
        self.publish(
            tenant_id,
            EventPayload::ActivityCreated(ActivityEvent {
                activity_id: activity_id.to_string(),
                activity: Some(activity),
            }),
        )
        .await;
    }

    pub async fn activity_updated(&self, tenant_id: &str, activity_id: &str, activity: Value) {
        self.publish(
            tenant_id,
            EventPayload::ActivityUpdated(ActivityEvent {
                activity_id: activity_id.to_string(),
                activity: Some(activity),
            }),
        )
        .await;
    }

    pub async fn ai_analysis_started(&self, tenant_id: &str, customer_id: &str) {
        self.publish(
            tenant_id,
            EventPayload::AiAnalysisStarted(AiAnalysisEvent {
                customer_id: customer_id.to_string(),
                analysis: None,
            }),
        )
        .await;
    }

    pub async fn ai_analysis_progress(
        &self,
        tenant_id: &str,
        customer_id: &str,
        stage: &str,
        progress: u8,
    ) {
        self.publish(
            tenant_id,
            EventPayload::AiAnalysisProgress(AiAnalysisProgressEvent {
                customer_id: customer_id.to_string(),
                stage: stage.to_string(),
                progress,
            }),
        )
        .await;
    }

    pub async fn ai_analysis_completed(&self, tenant_id: &str, customer_id: &str, analysis: Value) {
        self.publish(
            tenant_id,
            EventPayload::AiAnalysisCompleted(AiAnalysisEvent {
                customer_id: customer_id.to_string(),
                analysis: Some(analysis),
            }),
        )
        .await;
    }

    pub async fn ai_analysis_failed(&self, tenant_id: &str, customer_id: &str, error: &str) {
        self.publish(
            tenant_id,
            EventPayload::AiAnalysisFailed(AiAnalysisFailureEvent {
                customer_id: customer_id.to_string(),
                error: error.to_string(),
            }),
        )
        .await;
    }
}
