// ABOUTME: Outbound accept flow: idempotent, failover-aware dispatch of send requests
// ABOUTME: Consults the Sms record store, routes over live connectors and persists the outcome

mod types;

pub use types::{
    ConnectorRef, DeliveryStrategy, ErrorDetail, Problem, ProblemKind, SendSmsRequest,
    SendSmsResponse, Sms,
};

use crate::connector::ConnectorError;
use crate::manager::ConnectorManager;
use crate::repository::{RoutingConditionRepository, SmsRecordStore, StorageError};
use crate::routing::RoutingCache;
use crate::telemetry::{DispatchOutcome, Metrics, NoopMetrics};
use crate::transport::SmppError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failures that escape `accept`. Everything else is a response.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Every matching connector was unavailable. Not persisted; retry later.
    #[error("service not available: {candidates} matching connector(s) unavailable")]
    ServiceNotAvailable { candidates: usize },

    #[error("cannot process request: {0}")]
    Storage(#[from] StorageError),

    /// The carrier's verdict is unknown, so nothing was persisted
    #[error("submit through {connector} failed: {source}")]
    SubmitFailed {
        connector: String,
        source: SmppError,
    },
}

/// Turns send requests into delivery attempts
pub struct DispatchHandler {
    manager: Arc<ConnectorManager>,
    routing: RoutingCache,
    store: Arc<dyn SmsRecordStore>,
    metrics: Arc<dyn Metrics>,
}

impl DispatchHandler {
    pub fn new(
        manager: Arc<ConnectorManager>,
        conditions: Arc<dyn RoutingConditionRepository>,
        store: Arc<dyn SmsRecordStore>,
    ) -> Self {
        Self {
            manager,
            routing: RoutingCache::new(conditions),
            store,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Drop compiled routing so edited conditions take effect
    pub fn reload_routing(&self) {
        self.routing.invalidate();
    }

    /// Accept one send request.
    ///
    /// A request id seen before is answered from its record without touching
    /// any connector. Otherwise live connectors are tried in registry order
    /// and the first one whose routing matches and which accepts the
    /// message wins; unavailable connectors are skipped.
    pub async fn accept(&self, request: &SendSmsRequest) -> Result<SendSmsResponse, DispatchError> {
        let outcome = self.dispatch(request).await;
        let label = match &outcome {
            Ok((_, label)) => *label,
            Err(DispatchError::ServiceNotAvailable { .. }) => DispatchOutcome::Unavailable,
            Err(_) => DispatchOutcome::Failed,
        };
        self.metrics.dispatch_outcome(label);
        outcome.map(|(response, _)| response)
    }

    async fn dispatch(
        &self,
        request: &SendSmsRequest,
    ) -> Result<(SendSmsResponse, DispatchOutcome), DispatchError> {
        if let Some(record) = self.store.find_by_id(&request.id).await? {
            debug!(request = %request.id, "Replaying stored outcome");
            return Ok((SendSmsResponse::from_record(&record), DispatchOutcome::Replayed));
        }

        let (generation, connectors) = self.manager.snapshot();
        let table = self.routing.table_for(generation, &connectors).await?;
        let context = request.match_context();
        let message = request.outbound_message();

        let mut candidates = 0;
        let mut outcome = None;
        for connector in &connectors {
            let Some(predicate) = table.get(connector.id()) else {
                warn!(connector = %connector.id(), "No routing predicate, skipping");
                continue;
            };
            if !predicate.matches(&context) {
                continue;
            }
            candidates += 1;

            match connector.send_message(&message).await {
                Ok(response) => {
                    info!(
                        request = %request.id,
                        connector = %connector.id(),
                        tracking_id = %response.tracking_id,
                        "Message submitted"
                    );
                    outcome = Some((
                        Sms::sent(
                            &request.id,
                            response.tracking_id,
                            connector.id(),
                            connector.delivery_tracking(),
                        ),
                        DispatchOutcome::Sent,
                    ));
                    break;
                }
                Err(e @ ConnectorError::Unavailable { .. }) => {
                    info!(request = %request.id, "Failing over: {}", e);
                }
                Err(ConnectorError::Rejected { status }) => {
                    warn!(
                        request = %request.id,
                        connector = %connector.id(),
                        "Carrier rejected message: {:?}", status
                    );
                    outcome = Some((
                        Sms::failed(
                            &request.id,
                            Some(connector.id().to_string()),
                            ErrorDetail::rejected(status),
                        ),
                        DispatchOutcome::Rejected,
                    ));
                    break;
                }
                Err(ConnectorError::Transport(source)) => {
                    warn!(request = %request.id, connector = %connector.id(), "Submit failed: {}", source);
                    return Err(DispatchError::SubmitFailed {
                        connector: connector.id().to_string(),
                        source,
                    });
                }
            }
        }

        let (record, label) = match outcome {
            Some(outcome) => outcome,
            None if candidates > 0 => {
                return Err(DispatchError::ServiceNotAvailable { candidates });
            }
            None => {
                info!(request = %request.id, "No connector matches");
                (
                    Sms::failed(&request.id, None, ErrorDetail::no_connector()),
                    DispatchOutcome::NoConnector,
                )
            }
        };

        match self.store.save(&record).await {
            Ok(()) => Ok((SendSmsResponse::from_record(&record), label)),
            // A concurrent call with the same id got there first; its
            // record is the answer.
            Err(StorageError::Duplicate(_)) => {
                warn!(request = %request.id, "Concurrent dispatch of the same request");
                match self.store.find_by_id(&request.id).await? {
                    Some(existing) => Ok((SendSmsResponse::from_record(&existing), DispatchOutcome::Replayed)),
                    None => Ok((SendSmsResponse::from_record(&record), label)),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}
