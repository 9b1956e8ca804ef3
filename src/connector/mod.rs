// ABOUTME: Runtime handle to one carrier endpoint with its lifecycle state machine
// ABOUTME: Owns the current transport, applies connection events and maps send failures for failover

mod definition;
mod state;

pub use definition::{CarrierRole, ConnectorDefinition, Tunables};
pub use state::ConnectorState;

use crate::datatypes::CommandStatus;
use crate::telemetry::Metrics;
use crate::transport::{
    ConnectionEvent, ConnectorEvent, InboundSink, OutboundMessage, SendMessageResponse,
    SessionEvents, SmppError, SmppResult, Transport, TransportFactory,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Why a send through a connector did not succeed
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The connector cannot carry traffic right now; try the next one
    #[error("connector {connector} unavailable ({state}): {cause}")]
    Unavailable {
        connector: String,
        state: ConnectorState,
        cause: String,
    },

    /// The carrier answered and refused the message
    #[error("carrier rejected message: {status:?}")]
    Rejected { status: CommandStatus },

    #[error(transparent)]
    Transport(#[from] SmppError),
}

impl ConnectorError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ConnectorError::Unavailable { .. })
    }
}

/// What the owner should do after a connector has seen an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Nothing,
    Close,
    Rebind,
}

/// Everything a connector needs to build and report on transports
pub struct TransportWiring {
    pub factory: Arc<dyn TransportFactory>,
    pub events: mpsc::UnboundedSender<ConnectorEvent>,
    pub inbound: Option<Arc<dyn InboundSink>>,
    pub metrics: Arc<dyn Metrics>,
}

impl TransportWiring {
    fn session_events(&self, connector_id: &str, generation: u64) -> SessionEvents {
        SessionEvents::new(
            connector_id,
            generation,
            self.events.clone(),
            self.inbound.clone(),
        )
    }
}

/// One carrier endpoint.
///
/// State lives in a watch channel: transitions are atomic check-and-set
/// operations on the connector's own lock, and readers never block
/// writers of other connectors. Each transport is stamped with a
/// generation number; events from an older generation are ignored.
pub struct Connector {
    id: String,
    definition: RwLock<ConnectorDefinition>,
    state: watch::Sender<ConnectorState>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    generation: AtomicU64,
    last_error: Mutex<Option<String>>,
    rebinding: tokio::sync::Mutex<()>,
    wiring: Arc<TransportWiring>,
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}

impl Connector {
    pub fn new(definition: ConnectorDefinition, wiring: Arc<TransportWiring>) -> Self {
        let (state, _) = watch::channel(ConnectorState::Startup);
        Self {
            id: definition.id.clone(),
            definition: RwLock::new(definition),
            state,
            transport: RwLock::new(None),
            generation: AtomicU64::new(0),
            last_error: Mutex::new(None),
            rebinding: tokio::sync::Mutex::new(()),
            wiring,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn alias(&self) -> String {
        self.read_definition().alias.clone()
    }

    pub fn role(&self) -> CarrierRole {
        self.read_definition().role
    }

    pub fn delivery_tracking(&self) -> bool {
        self.read_definition().delivery_tracking
    }

    pub fn definition(&self) -> ConnectorDefinition {
        self.read_definition().clone()
    }

    pub fn state(&self) -> ConnectorState {
        *self.state.borrow()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectorState> {
        self.state.subscribe()
    }

    /// Generation of the current transport
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cause of the most recent failure, if any
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read_definition(&self) -> std::sync::RwLockReadGuard<'_, ConnectorDefinition> {
        self.definition.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn swap_transport(&self, next: Option<Arc<dyn Transport>>) -> Option<Arc<dyn Transport>> {
        let mut slot = self.transport.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, next)
    }

    fn record_error(&self, cause: Option<String>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = cause;
    }

    /// Move to `next` if the state machine allows it. Returns false when
    /// the transition was refused.
    fn transition(&self, next: ConnectorState) -> bool {
        self.transition_with(next, || true)
    }

    /// Like [`transition`](Self::transition), with `guard` evaluated under
    /// the state lock once the state machine allows the move. Generation
    /// checks and bumps go through here so they cannot interleave with
    /// another transition.
    fn transition_with(&self, next: ConnectorState, guard: impl FnOnce() -> bool) -> bool {
        let mut allowed = false;
        let mut previous = None;
        self.state.send_if_modified(|state| {
            allowed = state.can_transition_to(next) && guard();
            if allowed && *state != next {
                previous = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });

        if let Some(previous) = previous {
            info!(connector = %self.id, from = %previous, to = %next, "State changed");
            self.wiring.metrics.state_changed(&self.id, next);
        } else if !allowed {
            debug!(connector = %self.id, state = %self.state(), to = %next, "Transition refused");
        }
        allowed
    }

    /// Enter WAIT, starting a new transport generation when `fresh`.
    /// Returns the generation the pending bind belongs to.
    fn enter_wait(&self, fresh: bool) -> Option<u64> {
        let mut generation = self.generation();
        let entered = self.transition_with(ConnectorState::Wait, || {
            if fresh {
                generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            }
            true
        });
        entered.then_some(generation)
    }

    /// Build the transport for `generation` from the current definition
    fn create_transport(&self, generation: u64) -> SmppResult<Arc<dyn Transport>> {
        let events = self.wiring.session_events(&self.id, generation);
        self.wiring.factory.create(&self.read_definition(), events)
    }

    /// Issue a bind and return immediately. The outcome arrives later as a
    /// `Bound` or `BindError` event.
    pub(crate) fn bind(self: &Arc<Self>) {
        let existing = self.current_transport();
        let Some(generation) = self.enter_wait(existing.is_none()) else {
            return;
        };

        let transport = match existing {
            Some(transport) => transport,
            None => match self.create_transport(generation) {
                Ok(transport) => {
                    self.swap_transport(Some(transport.clone()));
                    transport
                }
                Err(e) => {
                    self.fail_bind(e);
                    return;
                }
            },
        };

        self.spawn_bind(transport, generation);
    }

    /// Replace the transport with a fresh one built from `definition` (or
    /// the current definition) and bind it. Closed connectors stay closed.
    pub(crate) async fn rebind(self: &Arc<Self>, definition: Option<ConnectorDefinition>) {
        let _guard = self.rebinding.lock().await;

        if self.state().is_terminal() {
            debug!(connector = %self.id, "Not rebinding a closed connector");
            return;
        }
        if let Some(definition) = definition {
            *self.definition.write().unwrap_or_else(PoisonError::into_inner) = definition;
        }
        let Some(generation) = self.enter_wait(true) else {
            return;
        };

        let created = self.create_transport(generation);
        let stale = match &created {
            Ok(transport) => self.swap_transport(Some(transport.clone())),
            Err(_) => self.swap_transport(None),
        };
        if let Some(stale) = stale {
            if let Err(e) = stale.close().await {
                debug!(connector = %self.id, "Closing stale transport failed: {}", e);
            }
        }

        match created {
            Ok(transport) => {
                // close() may have run while the old transport was closing
                if self.state().is_terminal() {
                    self.swap_transport(None);
                    if let Err(e) = transport.close().await {
                        debug!(connector = %self.id, "Close failed: {}", e);
                    }
                    return;
                }
                info!(connector = %self.id, generation, "Rebinding");
                self.spawn_bind(transport, generation);
            }
            Err(e) => self.fail_bind(e),
        }
    }

    fn fail_bind(&self, e: SmppError) {
        warn!(connector = %self.id, "Cannot build transport: {}", e);
        self.wiring.metrics.bind_completed(&self.id, false);
        self.record_error(Some(e.to_string()));
        self.transition(ConnectorState::Error);
    }

    fn spawn_bind(self: &Arc<Self>, transport: Arc<dyn Transport>, generation: u64) {
        let connector = Arc::clone(self);
        tokio::spawn(async move {
            let events = connector.wiring.session_events(&connector.id, generation);
            match transport.bind().await {
                Ok(()) => {
                    connector.wiring.metrics.bind_completed(&connector.id, true);
                    if connector.state().is_terminal() || connector.generation() != generation {
                        debug!(connector = %connector.id, generation, "Bind completed for a superseded transport");
                        if let Err(e) = transport.close().await {
                            debug!(connector = %connector.id, "Close failed: {}", e);
                        }
                        return;
                    }
                    events.connection(ConnectionEvent::Bound);
                }
                Err(e) => {
                    connector.wiring.metrics.bind_completed(&connector.id, false);
                    warn!(connector = %connector.id, generation, "Bind failed: {}", e);
                    events.connection(ConnectionEvent::BindError(e.to_string()));
                }
            }
        });
    }

    /// Apply a connection event. Events stamped with an older generation
    /// are discarded, and nothing moves a closed connector.
    pub(crate) fn apply(&self, event: &ConnectorEvent) -> EventAction {
        if event.generation != self.generation() {
            debug!(
                connector = %self.id,
                generation = event.generation,
                current = self.generation(),
                "Discarding stale event {:?}",
                event.event
            );
            return EventAction::Nothing;
        }
        if self.state().is_terminal() {
            debug!(connector = %self.id, "Discarding {:?} for closed connector", event.event);
            return EventAction::Nothing;
        }

        // A rebind may start a new generation after the check above
        let current = || self.generation() == event.generation;
        match &event.event {
            ConnectionEvent::Bound => {
                if self.transition_with(ConnectorState::Ready, current) {
                    self.record_error(None);
                }
                EventAction::Nothing
            }
            ConnectionEvent::BindError(cause) | ConnectionEvent::GenericError(cause) => {
                self.transition_with(ConnectorState::Error, current);
                if current() {
                    self.record_error(Some(cause.clone()));
                }
                EventAction::Nothing
            }
            ConnectionEvent::Disconnected => EventAction::Close,
            ConnectionEvent::Interrupted => EventAction::Rebind,
        }
    }

    /// Send a message through this connector.
    ///
    /// Receive-only connectors, connectors that are not READY and link
    /// failures during the submit all yield [`ConnectorError::Unavailable`],
    /// which callers treat as "try the next candidate".
    pub async fn send_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<SendMessageResponse, ConnectorError> {
        let state = self.state();
        if !self.role().can_send() {
            return Err(self.unavailable(state, "connector is receive-only".to_string()));
        }
        if state != ConnectorState::Ready {
            let cause = self.last_error().unwrap_or_else(|| "not bound".to_string());
            return Err(self.unavailable(state, cause));
        }
        let Some(transport) = self.current_transport() else {
            return Err(self.unavailable(state, "no transport".to_string()));
        };

        match transport.submit(message).await {
            Ok(response) => Ok(response),
            Err(SmppError::Protocol(status)) if status.is_transient() => {
                Err(self.unavailable(self.state(), format!("carrier busy: {status:?}")))
            }
            Err(SmppError::Protocol(status)) => Err(ConnectorError::Rejected { status }),
            Err(e) if e.is_link_failure() => Err(self.unavailable(self.state(), e.to_string())),
            Err(e) => Err(ConnectorError::Transport(e)),
        }
    }

    fn unavailable(&self, state: ConnectorState, cause: String) -> ConnectorError {
        ConnectorError::Unavailable {
            connector: self.id.clone(),
            state,
            cause,
        }
    }

    /// Move to CLOSED and release the transport. Closing twice is a no-op.
    pub async fn close(&self) -> SmppResult<()> {
        if !self.transition(ConnectorState::Closed) {
            return Ok(());
        }
        match self.swap_transport(None) {
            Some(transport) => transport.close().await,
            None => Ok(()),
        }
    }

    /// Wait until the pending bind has an outcome, for at most `limit`.
    /// Returns the state observed at the end.
    pub async fn wait_settled(&self, limit: Duration) -> ConnectorState {
        let mut rx = self.subscribe();
        let _ = tokio::time::timeout(limit, rx.wait_for(|state| state.is_settled())).await;
        self.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NoopMetrics;
    use crate::transport::mock::{BindOutcome, MockScript, MockTransportFactory, SubmitOutcome};

    fn wiring(
        factory: Arc<MockTransportFactory>,
    ) -> (Arc<TransportWiring>, mpsc::UnboundedReceiver<ConnectorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let wiring = TransportWiring {
            factory,
            events: tx,
            inbound: None,
            metrics: NoopMetrics::shared(),
        };
        (Arc::new(wiring), rx)
    }

    /// Bind and feed the resulting event back, the way the manager does
    async fn bind_and_apply(
        connector: &Arc<Connector>,
        rx: &mut mpsc::UnboundedReceiver<ConnectorEvent>,
    ) -> ConnectorEvent {
        connector.bind();
        let event = rx.recv().await.unwrap();
        connector.apply(&event);
        event
    }

    #[tokio::test]
    async fn bind_success_reaches_ready() {
        let factory = Arc::new(MockTransportFactory::new());
        let (wiring, mut rx) = wiring(factory.clone());
        let connector = Arc::new(Connector::new(
            ConnectorDefinition::new("c1", CarrierRole::Transceiver),
            wiring,
        ));
        assert_eq!(connector.state(), ConnectorState::Startup);

        let event = bind_and_apply(&connector, &mut rx).await;
        assert_eq!(event.event, ConnectionEvent::Bound);
        assert_eq!(connector.state(), ConnectorState::Ready);

        let response = connector
            .send_message(&OutboundMessage::new("+1", "hi"))
            .await
            .unwrap();
        assert_eq!(response.tracking_id, "c1-000001");
    }

    #[tokio::test]
    async fn bind_failure_reaches_error_and_is_unavailable() {
        let factory = Arc::new(MockTransportFactory::new().with_script(
            "c1",
            MockScript::default().bind(BindOutcome::Fail(CommandStatus::BindFailed)),
        ));
        let (wiring, mut rx) = wiring(factory);
        let connector = Arc::new(Connector::new(
            ConnectorDefinition::new("c1", CarrierRole::Transmitter),
            wiring,
        ));

        bind_and_apply(&connector, &mut rx).await;
        assert_eq!(connector.state(), ConnectorState::Error);
        assert!(connector.last_error().is_some());

        let err = connector
            .send_message(&OutboundMessage::new("+1", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::Unavailable { state: ConnectorState::Error, .. }
        ));
    }

    #[tokio::test]
    async fn receiver_is_never_a_sender() {
        let factory = Arc::new(MockTransportFactory::new());
        let (wiring, mut rx) = wiring(factory);
        let connector = Arc::new(Connector::new(
            ConnectorDefinition::new("rx", CarrierRole::Receiver),
            wiring,
        ));
        bind_and_apply(&connector, &mut rx).await;
        assert_eq!(connector.state(), ConnectorState::Ready);

        let err = connector
            .send_message(&OutboundMessage::new("+1", "hi"))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn submit_failures_are_classified() {
        let factory = Arc::new(MockTransportFactory::new());
        let (wiring, mut rx) = wiring(factory.clone());
        let connector = Arc::new(Connector::new(
            ConnectorDefinition::new("c1", CarrierRole::Transmitter),
            wiring,
        ));
        bind_and_apply(&connector, &mut rx).await;
        let mock = factory.latest("c1").unwrap();
        let message = OutboundMessage::new("+1", "hi");

        mock.set_submit(SubmitOutcome::Drop);
        assert!(connector.send_message(&message).await.unwrap_err().is_unavailable());

        mock.set_submit(SubmitOutcome::Reject(CommandStatus::ThrottlingError));
        assert!(connector.send_message(&message).await.unwrap_err().is_unavailable());

        mock.set_submit(SubmitOutcome::Reject(CommandStatus::InvalidDestinationAddress));
        assert!(matches!(
            connector.send_message(&message).await,
            Err(ConnectorError::Rejected {
                status: CommandStatus::InvalidDestinationAddress
            })
        ));

        mock.set_submit(SubmitOutcome::Timeout);
        assert!(matches!(
            connector.send_message(&message).await,
            Err(ConnectorError::Transport(SmppError::Timeout))
        ));
    }

    #[tokio::test]
    async fn closed_ignores_late_bound() {
        let factory = Arc::new(MockTransportFactory::new().with_script(
            "c1",
            MockScript::default().bind_latency(Duration::from_millis(50)),
        ));
        let (wiring, mut rx) = wiring(factory.clone());
        let connector = Arc::new(Connector::new(
            ConnectorDefinition::new("c1", CarrierRole::Transmitter),
            wiring,
        ));

        connector.bind();
        assert_eq!(connector.state(), ConnectorState::Wait);
        connector.close().await.unwrap();
        assert_eq!(connector.state(), ConnectorState::Closed);

        let late = ConnectorEvent {
            connector_id: "c1".to_string(),
            generation: connector.generation(),
            event: ConnectionEvent::Bound,
        };
        assert_eq!(connector.apply(&late), EventAction::Nothing);
        assert_eq!(connector.state(), ConnectorState::Closed);

        // The superseded bind closes its own transport instead of reporting
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert!(factory.latest("c1").unwrap().is_closed());

        connector.close().await.unwrap();
        connector.rebind(None).await;
        assert_eq!(connector.state(), ConnectorState::Closed);
    }

    #[tokio::test]
    async fn rebind_discards_old_generation() {
        let factory = Arc::new(MockTransportFactory::new());
        let (wiring, mut rx) = wiring(factory.clone());
        let connector = Arc::new(Connector::new(
            ConnectorDefinition::new("c1", CarrierRole::Transmitter),
            wiring,
        ));
        bind_and_apply(&connector, &mut rx).await;
        let first = factory.latest("c1").unwrap();

        connector.rebind(None).await;
        assert_eq!(connector.generation(), 2);
        assert!(first.is_closed());

        let stale = ConnectorEvent {
            connector_id: "c1".to_string(),
            generation: 1,
            event: ConnectionEvent::Disconnected,
        };
        assert_eq!(connector.apply(&stale), EventAction::Nothing);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.generation, 2);
        connector.apply(&event);
        assert_eq!(connector.state(), ConnectorState::Ready);
        assert_eq!(factory.transports("c1").len(), 2);
    }

    #[tokio::test]
    async fn rebinding_connector_stays_waiting_on_old_outcomes() {
        let factory = Arc::new(MockTransportFactory::new());
        let (wiring, mut rx) = wiring(factory.clone());
        let connector = Arc::new(Connector::new(
            ConnectorDefinition::new("c1", CarrierRole::Transmitter),
            wiring,
        ));
        bind_and_apply(&connector, &mut rx).await;
        assert_eq!(connector.state(), ConnectorState::Ready);

        factory.set_script("c1", MockScript::default().bind(BindOutcome::Hang));
        connector.rebind(None).await;
        assert_eq!(connector.state(), ConnectorState::Wait);
        assert_eq!(connector.generation(), 2);

        for event in [
            ConnectionEvent::Bound,
            ConnectionEvent::BindError("bind refused".to_string()),
        ] {
            let old = ConnectorEvent {
                connector_id: "c1".to_string(),
                generation: 1,
                event,
            };
            assert_eq!(connector.apply(&old), EventAction::Nothing);
            assert_eq!(connector.state(), ConnectorState::Wait);
        }
        assert_eq!(connector.last_error(), None);

        // The guard runs under the state lock and can veto an allowed move
        assert!(!connector.transition_with(ConnectorState::Ready, || false));
        assert_eq!(connector.state(), ConnectorState::Wait);
        assert!(connector.transition_with(ConnectorState::Ready, || true));
        assert_eq!(connector.state(), ConnectorState::Ready);
    }
}
