use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The canonical wrapper around a domain event for transport.
///
/// An envelope exists only on the wire: it is created by the publisher at
/// publish time, serialized onto the tenant's broker channel, deserialized by
/// the fan-out listener, and forwarded verbatim to every WebSocket client of
/// the owning tenant. It is never persisted.
///
/// Wire shape:
/// `{"type": "<category.verb>", "tenant_id": "...", "data": {...}, "timestamp": "<RFC 3339>"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// The tenant the event belongs to. Always present and non-empty.
    pub tenant_id: String,
    /// The typed event payload; serializes as the `type` and `data` fields.
    #[serde(flatten)]
    pub payload: EventPayload,
    /// When the event was published (UTC, RFC 3339 on the wire).
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Wraps a payload for the given tenant, stamping the current time.
    pub fn new(tenant_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Returns the dotted `category.verb` discriminator of the payload.
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

/// The closed catalogue of domain events the service distributes.
///
/// Each variant carries a payload with a fixed field set, selected by the
/// `type` discriminator on the wire. Producers construct variants through the
/// typed convenience methods on `EventPublisher`; frames with an unknown
/// discriminator fail deserialization and are dropped by the listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    #[serde(rename = "customer.created")]
    CustomerCreated(CustomerEvent),
    #[serde(rename = "customer.updated")]
    CustomerUpdated(CustomerEvent),
    #[serde(rename = "customer.deleted")]
    CustomerDeleted(CustomerEvent),
    #[serde(rename = "quote.created")]
    QuoteCreated(QuoteEvent),
    #[serde(rename = "quote.updated")]
    QuoteUpdated(QuoteEvent),
    #[serde(rename = "quote.status_changed")]
    QuoteStatusChanged(QuoteStatusEvent),
    #[serde(rename = "campaign.started")]
    CampaignStarted(CampaignEvent),
    #[serde(rename = "campaign.progress")]
    CampaignProgress(CampaignProgressEvent),
    #[serde(rename = "campaign.completed")]
    CampaignCompleted(CampaignEvent),
    #[serde(rename = "campaign.failed")]
    CampaignFailed(CampaignFailureEvent),
    #[serde(rename = "activity.created")]
    ActivityCreated(ActivityEvent),
    #[serde(rename = "activity.updated")]
    ActivityUpdated(ActivityEvent),
    #[serde(rename = "ai_analysis.started")]
    AiAnalysisStarted(AiAnalysisEvent),
    #[serde(rename = "ai_analysis.progress")]
    AiAnalysisProgress(AiAnalysisProgressEvent),
    #[serde(rename = "ai_analysis.completed")]
    AiAnalysisCompleted(AiAnalysisEvent),
    #[serde(rename = "ai_analysis.failed")]
    AiAnalysisFailed(AiAnalysisFailureEvent),
}

impl EventPayload {
    /// The discriminator string written to the wire `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::CustomerCreated(_) => "customer.created",
            EventPayload::CustomerUpdated(_) => "customer.updated",
            EventPayload::CustomerDeleted(_) => "customer.deleted",
            EventPayload::QuoteCreated(_) => "quote.created",
            EventPayload::QuoteUpdated(_) => "quote.updated",
            EventPayload::QuoteStatusChanged(_) => "quote.status_changed",
            EventPayload::CampaignStarted(_) => "campaign.started",
            EventPayload::CampaignProgress(_) => "campaign.progress",
            EventPayload::CampaignCompleted(_) => "campaign.completed",
            EventPayload::CampaignFailed(_) => "campaign.failed",
            EventPayload::ActivityCreated(_) => "activity.created",
            EventPayload::ActivityUpdated(_) => "activity.updated",
            EventPayload::AiAnalysisStarted(_) => "ai_analysis.started",
            EventPayload::AiAnalysisProgress(_) => "ai_analysis.progress",
            EventPayload::AiAnalysisCompleted(_) => "ai_analysis.completed",
            EventPayload::AiAnalysisFailed(_) => "ai_analysis.failed",
        }
    }
}

/// Payload for customer lifecycle events.
///
/// `customer` carries the customer document on create/update and is absent on
/// delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerEvent {
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Value>,
}

/// Payload for quote create/update events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteEvent {
    pub quote_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<Value>,
}

/// Payload for quote status transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteStatusEvent {
    pub quote_id: String,
    pub old_status: String,
    pub new_status: String,
}

/// Payload for campaign start/completion events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignEvent {
    pub campaign_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Payload for campaign progress updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignProgressEvent {
    pub campaign_id: String,
    pub processed: u64,
    pub total: u64,
}

/// Payload for campaign failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignFailureEvent {
    pub campaign_id: String,
    pub error: String,
}

/// Payload for activity feed events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub activity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Value>,
}

/// Payload for AI analysis start/completion events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysisEvent {
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
}

/// Payload for AI analysis progress updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysisProgressEvent {
    pub customer_id: String,
    pub stage: String,
    pub progress: u8,
}

/// Payload for AI analysis failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysisFailureEvent {
    pub customer_id: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::new(
            "T1",
            EventPayload::CustomerCreated(CustomerEvent {
                customer_id: "C1".into(),
                customer: Some(json!({"name": "Acme"})),
            }),
        );

        let value: Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "customer.created");
        assert_eq!(value["tenant_id"], "T1");
        assert_eq!(value["data"]["customer_id"], "C1");
        assert_eq!(value["data"]["customer"]["name"], "Acme");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_envelope_parses_from_wire() {
        let frame = r#"{
            "type": "quote.status_changed",
            "tenant_id": "T2",
            "data": {"quote_id": "Q7", "old_status": "draft", "new_status": "accepted"},
            "timestamp": "2026-01-15T10:30:00Z"
        }"#;

        let envelope: Envelope = serde_json::from_str(frame).unwrap();
        assert_eq!(envelope.tenant_id, "T2");
        assert_eq!(envelope.event_type(), "quote.status_changed");
        match envelope.payload {
            EventPayload::QuoteStatusChanged(ref status) => {
                assert_eq!(status.quote_id, "Q7");
                assert_eq!(status.new_status, "accepted");
            }
            ref other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let frame = r#"{
            "type": "invoice.created",
            "tenant_id": "T1",
            "data": {"invoice_id": "I1"},
            "timestamp": "2026-01-15T10:30:00Z"
        }"#;

        assert!(serde_json::from_str::<Envelope>(frame).is_err());
    }

    #[test]
    fn test_deleted_customer_omits_document() {
        let envelope = Envelope::new(
            "T1",
            EventPayload::CustomerDeleted(CustomerEvent {
                customer_id: "C9".into(),
                customer: None,
            }),
        );

        let value: Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "customer.deleted");
        assert!(value["data"].get("customer").is_none());
    }
}
