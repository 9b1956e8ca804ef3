// ABOUTME: Transport client contract between connectors and physical SMPP sessions
// ABOUTME: Defines the transport traits, the event channel back to the manager, and the real TCP factory

pub mod assembler;
mod error;
pub mod keepalive;
pub mod mock;
pub mod session;
pub mod settings;

pub use error::{SmppError, SmppResult};
pub use session::SmppSession;
pub use settings::{
    Endpoint, ReceiverSettings, SessionSettings, TransceiverSettings, TransmitterSettings,
};

use crate::codec::Frame;
use crate::connector::ConnectorDefinition;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// An outbound message as the transport sees it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundMessage {
    pub destination: String,
    /// Originator; the connector's default source address is used when absent
    pub source: Option<String>,
    pub content: String,
    /// Pre-split parts. When non-empty these are sent instead of `content`.
    pub parts: Vec<String>,
}

impl OutboundMessage {
    pub fn new(destination: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_parts(mut self, parts: Vec<String>) -> Self {
        self.parts = parts;
        self
    }
}

/// The carrier's acknowledgement of an accepted submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageResponse {
    /// SMSC assigned message id, used to correlate delivery receipts
    pub tracking_id: String,
}

/// Connection-level happenings a session reports upward
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Bound,
    BindError(String),
    GenericError(String),
    /// The SMSC ended the session deliberately
    Disconnected,
    /// The session was lost and should be re-established
    Interrupted,
}

/// A connection event addressed to one connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorEvent {
    pub connector_id: String,
    /// Transport generation the event came from
    pub generation: u64,
    pub event: ConnectionEvent,
}

/// Receives raw inbound PDUs from sessions
pub trait InboundSink: Send + Sync {
    fn on_frame(&self, connector_id: &str, frame: Frame);
}

/// Handle a transport uses to report back to whoever owns it
#[derive(Clone)]
pub struct SessionEvents {
    connector_id: Arc<str>,
    generation: u64,
    connection: mpsc::UnboundedSender<ConnectorEvent>,
    inbound: Option<Arc<dyn InboundSink>>,
}

impl SessionEvents {
    pub fn new(
        connector_id: &str,
        generation: u64,
        connection: mpsc::UnboundedSender<ConnectorEvent>,
        inbound: Option<Arc<dyn InboundSink>>,
    ) -> Self {
        Self {
            connector_id: Arc::from(connector_id),
            generation,
            connection,
            inbound,
        }
    }

    pub fn connector_id(&self) -> &str {
        &self.connector_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report a connection event. A dropped receiver means nobody is
    /// listening any more, which is not an error for the session.
    pub fn connection(&self, event: ConnectionEvent) {
        let envelope = ConnectorEvent {
            connector_id: self.connector_id.to_string(),
            generation: self.generation,
            event,
        };
        if let Err(e) = self.connection.send(envelope) {
            debug!("Dropping connection event, receiver gone: {:?}", e.0.event);
        }
    }

    /// Hand an inbound PDU to the registered sink, if any
    pub fn inbound(&self, frame: Frame) {
        match &self.inbound {
            Some(sink) => sink.on_frame(&self.connector_id, frame),
            None => debug!(
                "No inbound sink for {}, dropping {:?}",
                self.connector_id,
                frame.command_id()
            ),
        }
    }
}

impl fmt::Debug for SessionEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEvents")
            .field("connector_id", &self.connector_id)
            .field("generation", &self.generation)
            .field("inbound", &self.inbound.is_some())
            .finish()
    }
}

/// One physical carrier session. Binding, submitting and closing are the
/// whole contract; everything else is reported through [`SessionEvents`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and bind. Resolves once the SMSC has answered the bind.
    async fn bind(&self) -> SmppResult<()>;

    /// Submit a message and wait for the SMSC's verdict
    async fn submit(&self, message: &OutboundMessage) -> SmppResult<SendMessageResponse>;

    /// Unbind and release the socket. Closing twice is a no-op.
    async fn close(&self) -> SmppResult<()>;
}

/// Builds transports from connector definitions
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        definition: &ConnectorDefinition,
        events: SessionEvents,
    ) -> SmppResult<Arc<dyn Transport>>;
}

/// Factory for real TCP sessions
#[derive(Debug, Default, Clone, Copy)]
pub struct SmppTransportFactory;

impl TransportFactory for SmppTransportFactory {
    fn create(
        &self,
        definition: &ConnectorDefinition,
        events: SessionEvents,
    ) -> SmppResult<Arc<dyn Transport>> {
        let settings = SessionSettings::from_definition(definition)?;
        Ok(Arc::new(SmppSession::new(settings, events)))
    }
}
