// ABOUTME: Real SMPP v3.4 session over TCP implementing the transport contract
// ABOUTME: Runs a reader task for response correlation and inbound PDUs plus a keep-alive task

use crate::codec::Frame;
use crate::connection::{Connection, FrameReader, FrameWriter};
use crate::datatypes::{
    Bind, CommandStatus, DeliverSmResponse, EnquireLink, EnquireLinkResponse, GenericNack,
    MessageBody, SubmitSm, Unbind, UnbindResponse,
};
use crate::transport::assembler::{MessageAssembler, sar_for};
use crate::transport::error::{SmppError, SmppResult};
use crate::transport::keepalive::{KeepAliveConfig, KeepAliveTracker};
use crate::transport::settings::SessionSettings;
use crate::transport::{ConnectionEvent, OutboundMessage, SendMessageResponse, SessionEvents, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};

const UNBIND_TIMEOUT: Duration = Duration::from_secs(5);
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const MAX_SEQUENCE: u32 = 0x7FFF_FFFF;

type PendingMap = HashMap<u32, oneshot::Sender<Frame>>;

/// Write half plus the table of requests waiting for a response
struct Link {
    writer: Mutex<FrameWriter<OwnedWriteHalf>>,
    pending: std::sync::Mutex<PendingMap>,
    sequence: AtomicU32,
    closing: AtomicBool,
    /// Set once the reader task has stopped; nothing will answer requests
    dead: AtomicBool,
}

impl Link {
    fn new(writer: FrameWriter<OwnedWriteHalf>) -> Self {
        Self {
            writer: Mutex::new(writer),
            pending: std::sync::Mutex::new(HashMap::new()),
            sequence: AtomicU32::new(0),
            closing: AtomicBool::new(false),
            dead: AtomicBool::new(false),
        }
    }

    /// Sequence numbers run 1..=0x7FFFFFFF and then wrap
    fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed) % MAX_SEQUENCE + 1
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_closing(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn mark_dead(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }

    fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    async fn send(&self, frame: &Frame) -> SmppResult<()> {
        self.writer.lock().await.write_frame(frame).await?;
        Ok(())
    }

    /// Send a request and wait for the response with the same sequence number
    async fn request(&self, frame: Frame, wait: Duration) -> SmppResult<Frame> {
        if self.is_dead() {
            return Err(SmppError::ConnectionClosed);
        }
        let sequence = frame.sequence_number();
        let (tx, rx) = oneshot::channel();
        self.pending().insert(sequence, tx);
        // The reader may have stopped and drained the table before the insert
        if self.is_dead() {
            self.pending().remove(&sequence);
            return Err(SmppError::ConnectionClosed);
        }

        if let Err(e) = self.send(&frame).await {
            self.pending().remove(&sequence);
            return Err(e);
        }

        match timeout(wait, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Sender dropped: the reader task ended
            Ok(Err(_)) => Err(SmppError::ConnectionClosed),
            Err(_) => {
                self.pending().remove(&sequence);
                Err(SmppError::Timeout)
            }
        }
    }

    /// Route a response to its waiting request. Returns false if nobody
    /// was waiting for it.
    fn complete(&self, frame: Frame) -> bool {
        match self.pending().remove(&frame.sequence_number()) {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    fn fail_pending(&self) {
        self.pending().clear();
    }
}

struct Active {
    link: Arc<Link>,
    reader: JoinHandle<()>,
    keep_alive: Option<JoinHandle<()>>,
}

impl Drop for Active {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(keep_alive) = &self.keep_alive {
            keep_alive.abort();
        }
    }
}

/// One bound SMPP session.
///
/// `bind` connects, binds and starts the background tasks. Responses are
/// matched to requests by sequence number, so several submits can be in
/// flight at once. Lost connections are reported as
/// [`ConnectionEvent::Interrupted`] and an SMSC initiated unbind as
/// [`ConnectionEvent::Disconnected`]; the session never reconnects on its own.
pub struct SmppSession {
    settings: SessionSettings,
    events: SessionEvents,
    active: Mutex<Option<Active>>,
    sar_reference: AtomicU32,
}

impl SmppSession {
    pub fn new(settings: SessionSettings, events: SessionEvents) -> Self {
        Self {
            settings,
            events,
            active: Mutex::new(None),
            sar_reference: AtomicU32::new(0),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    async fn link(&self) -> SmppResult<Arc<Link>> {
        match self.active.lock().await.as_ref() {
            Some(active) if active.link.is_dead() => Err(SmppError::ConnectionClosed),
            Some(active) if !active.link.is_closing() => Ok(active.link.clone()),
            _ => Err(SmppError::InvalidState("session is not bound".to_string())),
        }
    }

    async fn connect_and_bind(&self) -> SmppResult<(FrameReader<OwnedReadHalf>, Arc<Link>)> {
        let endpoint = self.settings.endpoint();
        let socket = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        let (mut reader, writer) = Connection::new(socket);
        let link = Arc::new(Link::new(writer));

        let kind = self.settings.bind_kind();
        let sequence = link.next_sequence();
        let mut bind = Bind::new(kind, sequence, &endpoint.system_id, &endpoint.password);
        if let Some(system_type) = &endpoint.system_type {
            bind = bind.with_system_type(system_type);
        }
        link.send(&Frame::Bind(bind)).await?;

        // Wait for and validate bind response
        loop {
            match reader.read_frame().await? {
                Some(Frame::BindResp(response)) if response.sequence_number == sequence => {
                    if response.command_status != CommandStatus::Ok {
                        return Err(SmppError::Protocol(response.command_status));
                    }
                    if response.kind != kind {
                        return Err(SmppError::UnexpectedPdu {
                            expected: format!("{:?}", kind.response_command_id()),
                            actual: format!("{:?}", response.kind.response_command_id()),
                        });
                    }
                    return Ok((reader, link));
                }
                Some(Frame::GenericNack(nack)) => return Err(SmppError::Protocol(nack.command_status)),
                Some(other) => debug!("Ignoring {:?} while binding", other.command_id()),
                None => return Err(SmppError::ConnectionClosed),
            }
        }
    }

    fn build_bodies(&self, message: &OutboundMessage) -> SmppResult<Vec<MessageBody>> {
        if message.destination.is_empty() {
            return Err(SmppError::InvalidData("destination is empty".to_string()));
        }

        let texts: Vec<&str> = if message.parts.is_empty() {
            vec![message.content.as_str()]
        } else {
            message.parts.iter().map(String::as_str).collect()
        };
        if texts.len() > u8::MAX as usize {
            return Err(SmppError::InvalidData(format!(
                "{} parts exceeds {}",
                texts.len(),
                u8::MAX
            )));
        }

        let source = message
            .source
            .as_deref()
            .filter(|source| !source.is_empty())
            .or(self.settings.source_addr())
            .unwrap_or_default();
        let registered_delivery = u8::from(self.settings.registered_delivery());
        let total = texts.len();
        let reference = (self.sar_reference.fetch_add(1, Ordering::Relaxed) & 0xFFFF) as u16;

        Ok(texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let mut body = MessageBody::new(message.destination.as_str(), source);
                body.registered_delivery = registered_delivery;
                body.set_content(text);
                if total > 1 {
                    body.set_sar(sar_for(reference, total, index));
                }
                body
            })
            .collect())
    }
}

#[async_trait]
impl Transport for SmppSession {
    async fn bind(&self) -> SmppResult<()> {
        let mut active = self.active.lock().await;
        // Rebinding a live session replaces it
        active.take();

        let (reader, link) = timeout(self.settings.bind_timeout(), self.connect_and_bind())
            .await
            .map_err(|_| SmppError::Timeout)??;

        info!(
            connector = %self.events.connector_id(),
            "Bound as {:?} to {}:{}",
            self.settings.bind_kind(),
            self.settings.endpoint().host,
            self.settings.endpoint().port
        );

        let assembler = self.settings.merge_interval().map(MessageAssembler::new);
        let reader = tokio::spawn(run_reader(reader, link.clone(), self.events.clone(), assembler));

        let keep_alive_config = self.settings.keep_alive().clone();
        let keep_alive = keep_alive_config.enabled.then(|| {
            tokio::spawn(run_keep_alive(
                link.clone(),
                self.events.clone(),
                keep_alive_config,
            ))
        });

        *active = Some(Active {
            link,
            reader,
            keep_alive,
        });
        Ok(())
    }

    async fn submit(&self, message: &OutboundMessage) -> SmppResult<SendMessageResponse> {
        let response_timeout = self.settings.response_timeout().ok_or_else(|| {
            SmppError::InvalidState("receiver sessions cannot submit".to_string())
        })?;
        let link = self.link().await?;

        let mut tracking_id: Option<String> = None;
        for body in self.build_bodies(message)? {
            let sequence = link.next_sequence();
            let request = Frame::SubmitSm(Box::new(SubmitSm::new(sequence, body)));

            match link.request(request, response_timeout).await? {
                Frame::SubmitSmResp(response) if response.command_status == CommandStatus::Ok => {
                    tracking_id.get_or_insert(response.message_id);
                }
                Frame::SubmitSmResp(response) => {
                    return Err(SmppError::Protocol(response.command_status));
                }
                Frame::GenericNack(nack) => return Err(SmppError::Protocol(nack.command_status)),
                other => {
                    return Err(SmppError::UnexpectedPdu {
                        expected: "SubmitSmResp".to_string(),
                        actual: format!("{:?}", other.command_id()),
                    });
                }
            }
        }

        tracking_id
            .map(|tracking_id| SendMessageResponse { tracking_id })
            .ok_or_else(|| SmppError::InvalidData("message has no content".to_string()))
    }

    async fn close(&self) -> SmppResult<()> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(());
        };

        let link = active.link.clone();
        // Already unbound by the SMSC, or the connection is gone
        let unbound = link.is_closing() || link.is_dead();
        link.mark_closing();

        if !unbound {
            let sequence = link.next_sequence();
            match link.request(Frame::Unbind(Unbind::new(sequence)), UNBIND_TIMEOUT).await {
                Ok(Frame::UnbindResp(_)) => debug!("Unbound {}", self.events.connector_id()),
                Ok(other) => debug!("Unexpected {:?} answering unbind", other.command_id()),
                // The peer may already be gone; close anyway
                Err(e) => debug!("Unbind of {} failed: {}", self.events.connector_id(), e),
            }
        }

        drop(active);
        if let Err(e) = link.writer.lock().await.shutdown().await {
            debug!("Socket shutdown failed: {}", e);
        }
        Ok(())
    }
}

/// Reads everything the SMSC sends for the lifetime of the session
async fn run_reader(
    mut reader: FrameReader<OwnedReadHalf>,
    link: Arc<Link>,
    events: SessionEvents,
    mut assembler: Option<MessageAssembler>,
) {
    let mut sweep = interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let interrupted = loop {
        let result = tokio::select! {
            result = reader.read_frame() => result,
            _ = sweep.tick() => {
                if let Some(assembler) = assembler.as_mut() {
                    for pdu in assembler.flush_expired(Instant::now()) {
                        events.inbound(Frame::DeliverSm(Box::new(pdu)));
                    }
                }
                continue;
            }
        };

        let frame = match result {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                if !link.is_closing() {
                    info!(connector = %events.connector_id(), "SMSC closed the connection");
                }
                break true;
            }
            Err(e) => {
                if !link.is_closing() {
                    warn!(connector = %events.connector_id(), "Read failed: {}", e);
                }
                break true;
            }
        };

        match handle_frame(&link, &events, &mut assembler, frame).await {
            Ok(true) => {}
            Ok(false) => break false,
            Err(e) => {
                if !link.is_closing() {
                    warn!(connector = %events.connector_id(), "Write failed: {}", e);
                }
                break true;
            }
        }
    };

    // Mark dead before reporting
    link.mark_dead();
    link.fail_pending();
    if interrupted && !link.is_closing() {
        events.connection(ConnectionEvent::Interrupted);
    }
}

/// Returns `Ok(false)` when the session is over
async fn handle_frame(
    link: &Link,
    events: &SessionEvents,
    assembler: &mut Option<MessageAssembler>,
    frame: Frame,
) -> SmppResult<bool> {
    match frame {
        Frame::EnquireLink(pdu) => {
            link.send(&Frame::EnquireLinkResp(EnquireLinkResponse::new(pdu.sequence_number)))
                .await?;
        }
        Frame::Unbind(pdu) => {
            link.mark_closing();
            link.send(&Frame::UnbindResp(UnbindResponse::new(pdu.sequence_number)))
                .await?;
            info!(connector = %events.connector_id(), "SMSC requested unbind");
            events.connection(ConnectionEvent::Disconnected);
            return Ok(false);
        }
        Frame::DeliverSm(pdu) => {
            link.send(&Frame::DeliverSmResp(DeliverSmResponse::new(pdu.sequence_number)))
                .await?;
            let delivered = match assembler.as_mut() {
                Some(assembler) => assembler.push(*pdu, Instant::now()),
                None => Some(*pdu),
            };
            if let Some(pdu) = delivered {
                events.inbound(Frame::DeliverSm(Box::new(pdu)));
            }
        }
        frame if frame.is_response() => {
            let sequence = frame.sequence_number();
            if !link.complete(frame) {
                debug!("No request waiting for response {}", sequence);
            }
        }
        other => {
            debug!("Rejecting unsupported {:?}", other.command_id());
            link.send(&Frame::GenericNack(GenericNack::new(
                other.sequence_number(),
                CommandStatus::InvalidCommandId,
            )))
            .await?;
        }
    }
    Ok(true)
}

async fn run_keep_alive(link: Arc<Link>, events: SessionEvents, config: KeepAliveConfig) {
    let mut ticker = interval(config.interval);
    // The first tick completes immediately
    ticker.tick().await;
    let mut tracker = KeepAliveTracker::new(config);

    loop {
        ticker.tick().await;
        // The reader reports a lost link itself
        if link.is_closing() || link.is_dead() {
            break;
        }

        let sequence = link.next_sequence();
        tracker.on_ping_sent();
        match link
            .request(Frame::EnquireLink(EnquireLink::new(sequence)), tracker.config().timeout)
            .await
        {
            Ok(Frame::EnquireLinkResp(_)) => tracker.on_ping_success(),
            Ok(other) => {
                debug!("Unexpected {:?} answering enquire_link", other.command_id());
                tracker.on_ping_failure();
            }
            Err(e) => {
                debug!("Enquire_link failed: {}", e);
                tracker.on_ping_failure();
            }
        }

        if tracker.is_connection_failed() {
            if !link.is_closing() {
                warn!(connector = %events.connector_id(), "Keep-alive failed, session interrupted");
                events.connection(ConnectionEvent::Interrupted);
            }
            break;
        }
    }
}
