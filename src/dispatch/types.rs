//! Request, response and record types of the outbound accept flow.

use crate::datatypes::CommandStatus;
use crate::routing::MatchContext;
use crate::transport::OutboundMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// A client's request to send one SMS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendSmsRequest {
    /// Caller assigned idempotency key
    pub id: String,
    pub to: String,
    pub from: String,
    pub content: String,
    /// `None` and empty are both "no tags"
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Pre-split message parts
    #[serde(default)]
    pub parts: Vec<String>,
}

impl SendSmsRequest {
    pub fn new(
        id: impl Into<String>,
        to: impl Into<String>,
        from: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            to: to.into(),
            from: from.into(),
            content: content.into(),
            tags: None,
            parts: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_parts(mut self, parts: Vec<String>) -> Self {
        self.parts = parts;
        self
    }

    /// Full text, joined from the parts when only parts were given
    pub fn text(&self) -> Cow<'_, str> {
        if self.content.is_empty() && !self.parts.is_empty() {
            Cow::Owned(self.parts.concat())
        } else {
            Cow::Borrowed(&self.content)
        }
    }

    pub fn match_context(&self) -> MatchContext<'_> {
        let context = MatchContext::new(&self.to)
            .with_source(&self.from)
            .with_content(self.text());
        match &self.tags {
            Some(tags) => context.with_tags(tags),
            None => context,
        }
    }

    pub fn outbound_message(&self) -> OutboundMessage {
        OutboundMessage::new(self.to.clone(), self.content.clone())
            .with_source(self.from.clone())
            .with_parts(self.parts.clone())
    }
}

/// Reference to the connector that carried (or refused) a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorRef {
    pub id: String,
}

/// Whether the gateway expects a delivery receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStrategy {
    Track,
    FireAndForget,
}

impl DeliveryStrategy {
    pub fn from_tracking(tracking: bool) -> Self {
        if tracking {
            DeliveryStrategy::Track
        } else {
            DeliveryStrategy::FireAndForget
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemKind {
    NoConnectorFound,
    Rejected,
}

impl ProblemKind {
    pub fn title(self) -> &'static str {
        match self {
            ProblemKind::NoConnectorFound => "No connector found",
            ProblemKind::Rejected => "Rejected by carrier",
        }
    }
}

/// Structured problem detail carried by a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub kind: ProblemKind,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Terminal failure stored on a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ProblemKind,
    pub detail: Option<String>,
}

impl ErrorDetail {
    pub fn no_connector() -> Self {
        Self {
            kind: ProblemKind::NoConnectorFound,
            detail: Some("no connector is configured to carry this message".to_string()),
        }
    }

    pub fn rejected(status: CommandStatus) -> Self {
        Self {
            kind: ProblemKind::Rejected,
            detail: Some(format!("command_status 0x{:08X} ({:?})", status.code(), status)),
        }
    }

    fn to_problem(&self) -> Problem {
        Problem {
            kind: self.kind,
            title: self.kind.title().to_string(),
            detail: self.detail.clone(),
        }
    }
}

/// Persisted outcome of a first dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sms {
    pub id: String,
    pub tracking_id: Option<String>,
    pub connector_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub delivery_tracking: bool,
    pub error: Option<ErrorDetail>,
    /// Set by an external process, never by dispatch
    pub canceled_at: Option<DateTime<Utc>>,
}

impl Sms {
    pub fn sent(
        id: impl Into<String>,
        tracking_id: impl Into<String>,
        connector_id: impl Into<String>,
        delivery_tracking: bool,
    ) -> Self {
        Self {
            id: id.into(),
            tracking_id: Some(tracking_id.into()),
            connector_id: Some(connector_id.into()),
            submitted_at: Utc::now(),
            delivery_tracking,
            error: None,
            canceled_at: None,
        }
    }

    pub fn failed(id: impl Into<String>, connector_id: Option<String>, error: ErrorDetail) -> Self {
        Self {
            id: id.into(),
            tracking_id: None,
            connector_id,
            submitted_at: Utc::now(),
            delivery_tracking: false,
            error: Some(error),
            canceled_at: None,
        }
    }
}

/// Answer to a send request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendSmsResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector: Option<ConnectorRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<Problem>,
}

impl SendSmsResponse {
    /// Rebuild the answer a record stands for. First responses are built
    /// the same way, so a replay is identical to the original.
    pub fn from_record(record: &Sms) -> Self {
        let connector = record
            .connector_id
            .as_ref()
            .map(|id| ConnectorRef { id: id.clone() });

        if let Some(canceled_at) = record.canceled_at {
            return Self {
                id: record.id.clone(),
                connector: None,
                delivery: None,
                canceled_at: Some(canceled_at),
                problem: None,
            };
        }

        if let Some(error) = &record.error {
            return Self {
                id: record.id.clone(),
                connector,
                delivery: None,
                canceled_at: None,
                problem: Some(error.to_problem()),
            };
        }

        Self {
            id: record.id.clone(),
            connector,
            delivery: Some(DeliveryStrategy::from_tracking(record.delivery_tracking)),
            canceled_at: None,
            problem: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_record_exposes_only_cancellation() {
        let mut record = Sms::sent("r1", "t1", "c1", true);
        let canceled_at = Utc::now();
        record.canceled_at = Some(canceled_at);

        let response = SendSmsResponse::from_record(&record);
        assert_eq!(response.id, "r1");
        assert_eq!(response.canceled_at, Some(canceled_at));
        assert_eq!(response.connector, None);
        assert_eq!(response.delivery, None);
        assert_eq!(response.problem, None);
    }

    #[test]
    fn failed_record_carries_problem_and_connector() {
        let record = Sms::failed(
            "r2",
            Some("c1".to_string()),
            ErrorDetail::rejected(CommandStatus::InvalidDestinationAddress),
        );
        let response = SendSmsResponse::from_record(&record);

        assert_eq!(response.connector, Some(ConnectorRef { id: "c1".to_string() }));
        let problem = response.problem.unwrap();
        assert_eq!(problem.kind, ProblemKind::Rejected);
        assert_eq!(problem.title, "Rejected by carrier");
        assert_eq!(
            problem.detail.as_deref(),
            Some("command_status 0x0000000B (InvalidDestinationAddress)")
        );
    }

    #[test]
    fn sent_record_carries_delivery_strategy() {
        let response = SendSmsResponse::from_record(&Sms::sent("r3", "t3", "c1", false));
        assert_eq!(response.delivery, Some(DeliveryStrategy::FireAndForget));
        assert_eq!(response.problem, None);
    }

    #[test]
    fn parts_stand_in_for_empty_content() {
        let request = SendSmsRequest::new("r", "+1", "GW", "")
            .with_parts(vec!["ab".to_string(), "cd".to_string()]);
        assert_eq!(request.text(), "abcd");
        assert_eq!(request.match_context().content, "abcd");
    }
}
