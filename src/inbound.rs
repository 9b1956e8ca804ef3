// ABOUTME: Translates raw inbound deliver_sm PDUs into domain events for a registered listener
// ABOUTME: Distinguishes mobile-originated messages from delivery receipts and parses receipt text

use crate::codec::Frame;
use crate::datatypes::MessageBody;
use crate::datatypes::tags;
use crate::telemetry::{InboundKind, Metrics, NoopMetrics};
use crate::transport::InboundSink;
use chrono::{DateTime, Utc};
use num_enum::{FromPrimitive, IntoPrimitive};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

/// message_state values (SMPP v3.4 5.2.28)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum DeliveryStatus {
    Enroute = 1,
    Delivered = 2,
    Expired = 3,
    Deleted = 4,
    Undeliverable = 5,
    Accepted = 6,
    #[num_enum(default)]
    Unknown = 7,
    Rejected = 8,
    Skipped = 9,
}

impl DeliveryStatus {
    /// Parse the `stat:` field of receipt text
    pub fn from_stat(stat: &str) -> Self {
        match stat.to_ascii_uppercase().as_str() {
            "ENROUTE" => Self::Enroute,
            "DELIVRD" => Self::Delivered,
            "EXPIRED" => Self::Expired,
            "DELETED" => Self::Deleted,
            "UNDELIV" => Self::Undeliverable,
            "ACCEPTD" => Self::Accepted,
            "REJECTD" => Self::Rejected,
            "SKIPPED" => Self::Skipped,
            _ => Self::Unknown,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::Expired | Self::Deleted | Self::Undeliverable | Self::Rejected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enroute => "ENROUTE",
            Self::Delivered => "DELIVRD",
            Self::Expired => "EXPIRED",
            Self::Deleted => "DELETED",
            Self::Undeliverable => "UNDELIV",
            Self::Accepted => "ACCEPTD",
            Self::Unknown => "UNKNOWN",
            Self::Rejected => "REJECTD",
            Self::Skipped => "SKIPPED",
        }
    }
}

/// A message a handset sent to the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedSmsRequest {
    pub connector_id: String,
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

/// A delivery receipt for a message the gateway sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsDeliveryResponse {
    pub connector_id: String,
    /// Carrier tracking id of the original submission
    pub message_id: String,
    pub status: DeliveryStatus,
    pub error_code: Option<String>,
    pub from: String,
    pub received_at: DateTime<Utc>,
}

/// Consumer of translated inbound events. Persisting delivery outcomes is
/// the listener's job.
pub trait InboundListener: Send + Sync {
    fn on_sms_request(&self, request: ReceivedSmsRequest);

    fn on_sms_delivered(&self, response: SmsDeliveryResponse);
}

/// What a frame translated into
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Received(ReceivedSmsRequest),
    Delivered(SmsDeliveryResponse),
}

static RECEIPT_FIELD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(id|stat|err):(\S+)").ok());

/// `id:`, `stat:` and `err:` fields of SMSC receipt text
#[derive(Debug, Default, PartialEq)]
struct ReceiptText {
    id: Option<String>,
    stat: Option<String>,
    err: Option<String>,
}

impl ReceiptText {
    fn parse(text: &str) -> Self {
        let mut fields = Self::default();
        let Some(regex) = RECEIPT_FIELD.as_ref() else {
            return fields;
        };
        for capture in regex.captures_iter(text) {
            let value = capture[2].to_string();
            match capture[1].to_ascii_lowercase().as_str() {
                "id" => fields.id.get_or_insert(value),
                "stat" => fields.stat.get_or_insert(value),
                _ => fields.err.get_or_insert(value),
            };
        }
        fields
    }
}

/// Decodes inbound PDUs and forwards them to the listener.
///
/// Only deliver_sm carries anything the listener cares about; every other
/// frame is counted as dropped.
pub struct InboundTranslator {
    listener: Arc<dyn InboundListener>,
    metrics: Arc<dyn Metrics>,
}

impl InboundTranslator {
    pub fn new(listener: Arc<dyn InboundListener>) -> Self {
        Self {
            listener,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Translate and forward one frame, returning what was forwarded
    pub fn translate(&self, connector_id: &str, frame: Frame) -> Option<InboundEvent> {
        let pdu = match frame {
            Frame::DeliverSm(pdu) => pdu,
            other => {
                debug!(connector = %connector_id, "Dropping unsupported inbound {:?}", other.command_id());
                self.metrics.inbound_dropped("unsupported");
                return None;
            }
        };

        let body = &pdu.body;
        let event = if body.is_delivery_receipt() {
            let receipt = receipt(connector_id, body);
            debug!(
                connector = %connector_id,
                message_id = %receipt.message_id,
                status = receipt.status.as_str(),
                "Delivery receipt"
            );
            self.metrics.inbound_event(InboundKind::Receipt);
            self.listener.on_sms_delivered(receipt.clone());
            InboundEvent::Delivered(receipt)
        } else {
            let request = received(connector_id, body);
            info!(connector = %connector_id, from = %request.from, "Message received");
            self.metrics.inbound_event(InboundKind::Message);
            self.listener.on_sms_request(request.clone());
            InboundEvent::Received(request)
        };
        Some(event)
    }
}

impl InboundSink for InboundTranslator {
    fn on_frame(&self, connector_id: &str, frame: Frame) {
        self.translate(connector_id, frame);
    }
}

fn received(connector_id: &str, body: &MessageBody) -> ReceivedSmsRequest {
    let message_id = body
        .tlv(tags::USER_MESSAGE_REFERENCE)
        .and_then(|tlv| tlv.as_u16())
        .map(|reference| reference.to_string())
        .unwrap_or_else(|| body.sm_default_msg_id.to_string());

    ReceivedSmsRequest {
        connector_id: connector_id.to_string(),
        message_id,
        from: body.source_addr.clone(),
        to: body.destination_addr.clone(),
        content: body.content(),
        received_at: Utc::now(),
    }
}

fn receipt(connector_id: &str, body: &MessageBody) -> SmsDeliveryResponse {
    let text = ReceiptText::parse(&body.content());

    let message_id = body
        .tlv(tags::RECEIPTED_MESSAGE_ID)
        .and_then(|tlv| tlv.as_str())
        .filter(|id| !id.is_empty())
        .or(text.id)
        .unwrap_or_else(|| body.sm_default_msg_id.to_string());

    let status = body
        .tlv(tags::MESSAGE_STATE)
        .and_then(|tlv| tlv.as_u8())
        .map(DeliveryStatus::from)
        .or_else(|| text.stat.as_deref().map(DeliveryStatus::from_stat))
        .unwrap_or(DeliveryStatus::Unknown);

    let error_code = text.err.or_else(|| {
        body.tlv(tags::NETWORK_ERROR_CODE)
            .map(|tlv| tlv.value.iter().map(|b| format!("{b:02X}")).collect())
    });

    SmsDeliveryResponse {
        connector_id: connector_id.to_string(),
        message_id,
        status,
        error_code,
        from: body.source_addr.clone(),
        received_at: Utc::now(),
    }
}
