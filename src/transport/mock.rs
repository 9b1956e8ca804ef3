//! Scripted transports for exercising connectors without an SMSC.

use crate::codec::Frame;
use crate::connector::ConnectorDefinition;
use crate::datatypes::CommandStatus;
use crate::transport::{
    ConnectionEvent, OutboundMessage, SendMessageResponse, SessionEvents, SmppError, SmppResult,
    Transport, TransportFactory,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a mock bind resolves
#[derive(Debug, Clone, PartialEq)]
pub enum BindOutcome {
    Succeed,
    Fail(CommandStatus),
    /// The bind never completes
    Hang,
}

/// How a mock submit resolves
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Accept,
    Reject(CommandStatus),
    /// The link drops mid-request
    Drop,
    Timeout,
}

/// Behaviour of one mock transport
#[derive(Debug, Clone)]
pub struct MockScript {
    pub bind: BindOutcome,
    pub bind_latency: Duration,
    pub submit: SubmitOutcome,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            bind: BindOutcome::Succeed,
            bind_latency: Duration::ZERO,
            submit: SubmitOutcome::Accept,
        }
    }
}

impl MockScript {
    pub fn bind(mut self, outcome: BindOutcome) -> Self {
        self.bind = outcome;
        self
    }

    pub fn bind_latency(mut self, latency: Duration) -> Self {
        self.bind_latency = latency;
        self
    }

    pub fn submit(mut self, outcome: SubmitOutcome) -> Self {
        self.submit = outcome;
        self
    }
}

/// Transport whose outcomes come from a [`MockScript`]
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<MockScript>,
    events: SessionEvents,
    message_counter: AtomicU64,
    bind_count: AtomicU64,
    submit_count: AtomicU64,
    bound: AtomicBool,
    closed: AtomicBool,
    submitted: Mutex<Vec<OutboundMessage>>,
}

impl MockTransport {
    pub fn new(events: SessionEvents, script: MockScript) -> Self {
        Self {
            script: Mutex::new(script),
            events,
            message_counter: AtomicU64::new(1),
            bind_count: AtomicU64::new(0),
            submit_count: AtomicU64::new(0),
            bound: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn set_submit(&self, outcome: SubmitOutcome) {
        lock(&self.script).submit = outcome;
    }

    pub fn bind_count(&self) -> u64 {
        self.bind_count.load(Ordering::Relaxed)
    }

    pub fn submit_count(&self) -> u64 {
        self.submit_count.load(Ordering::Relaxed)
    }

    pub fn submitted(&self) -> Vec<OutboundMessage> {
        lock(&self.submitted).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    /// Report a connection event as if the session had seen it
    pub fn emit(&self, event: ConnectionEvent) {
        self.events.connection(event);
    }

    /// Push an inbound PDU as if the SMSC had sent it
    pub fn deliver(&self, frame: Frame) {
        self.events.inbound(frame);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn bind(&self) -> SmppResult<()> {
        self.bind_count.fetch_add(1, Ordering::Relaxed);
        let script = lock(&self.script).clone();
        if !script.bind_latency.is_zero() {
            sleep(script.bind_latency).await;
        }

        match script.bind {
            BindOutcome::Succeed => {
                self.bound.store(true, Ordering::SeqCst);
                Ok(())
            }
            BindOutcome::Fail(status) => Err(SmppError::Protocol(status)),
            BindOutcome::Hang => std::future::pending().await,
        }
    }

    async fn submit(&self, message: &OutboundMessage) -> SmppResult<SendMessageResponse> {
        self.submit_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.submitted).push(message.clone());

        if self.is_closed() {
            return Err(SmppError::InvalidState("transport closed".to_string()));
        }

        let outcome = lock(&self.script).submit.clone();
        match outcome {
            SubmitOutcome::Accept if self.bound.load(Ordering::SeqCst) => {
                let n = self.message_counter.fetch_add(1, Ordering::Relaxed);
                Ok(SendMessageResponse {
                    tracking_id: format!("{}-{:06}", self.events.connector_id(), n),
                })
            }
            SubmitOutcome::Accept => Err(SmppError::InvalidState("not bound".to_string())),
            SubmitOutcome::Reject(status) => Err(SmppError::Protocol(status)),
            SubmitOutcome::Drop => Err(SmppError::ConnectionClosed),
            SubmitOutcome::Timeout => Err(SmppError::Timeout),
        }
    }

    async fn close(&self) -> SmppResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.bound.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out [`MockTransport`]s and remembers every one it built
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    scripts: Mutex<HashMap<String, MockScript>>,
    created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, connector_id: impl Into<String>, script: MockScript) -> Self {
        self.set_script(connector_id, script);
        self
    }

    /// Script used for transports created from now on
    pub fn set_script(&self, connector_id: impl Into<String>, script: MockScript) {
        lock(&self.scripts).insert(connector_id.into(), script);
    }

    /// Every transport built for a connector, oldest first
    pub fn transports(&self, connector_id: &str) -> Vec<Arc<MockTransport>> {
        lock(&self.created)
            .iter()
            .filter(|transport| transport.events().connector_id() == connector_id)
            .cloned()
            .collect()
    }

    pub fn latest(&self, connector_id: &str) -> Option<Arc<MockTransport>> {
        self.transports(connector_id).pop()
    }

    pub fn total_submits(&self) -> u64 {
        lock(&self.created).iter().map(|t| t.submit_count()).sum()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(
        &self,
        definition: &ConnectorDefinition,
        events: SessionEvents,
    ) -> SmppResult<Arc<dyn Transport>> {
        let script = lock(&self.scripts)
            .get(&definition.id)
            .cloned()
            .unwrap_or_default();
        let transport = Arc::new(MockTransport::new(events, script));
        lock(&self.created).push(transport.clone());

        let transport: Arc<dyn Transport> = transport;
        Ok(transport)
    }
}
