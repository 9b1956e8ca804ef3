// ABOUTME: Owns every connector: concurrent startup binding, event-driven rebinds and shutdown
// ABOUTME: Publishes the live connector list together with a registry generation for routing snapshots

use crate::connector::{Connector, ConnectorState, EventAction, TransportWiring};
use crate::repository::{ConnectorDefinitionRepository, StorageError};
use crate::telemetry::{Metrics, NoopMetrics};
use crate::transport::{ConnectorEvent, InboundSink, SmppError, TransportFactory};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("cannot load connector definitions: {0}")]
    Repository(#[from] StorageError),

    #[error("transport error: {0}")]
    Transport(#[from] SmppError),

    #[error("connector manager is closed")]
    Closed,

    #[error("unknown connector {0}")]
    UnknownConnector(String),
}

#[derive(Default)]
struct Registry {
    by_id: HashMap<String, Arc<Connector>>,
    order: Vec<Arc<Connector>>,
    generation: u64,
}

impl Registry {
    fn insert(&mut self, connector: Arc<Connector>) {
        if let Some(previous) = self.by_id.insert(connector.id().to_string(), connector.clone()) {
            self.order.retain(|c| !Arc::ptr_eq(c, &previous));
        }
        self.order.push(connector);
        self.generation += 1;
    }

    fn remove(&mut self, id: &str) -> Option<Arc<Connector>> {
        let removed = self.by_id.remove(id)?;
        self.order.retain(|c| !Arc::ptr_eq(c, &removed));
        self.generation += 1;
        Some(removed)
    }

    fn drain(&mut self) -> Vec<Arc<Connector>> {
        self.by_id.clear();
        self.generation += 1;
        std::mem::take(&mut self.order)
    }
}

struct Shared {
    definitions: Arc<dyn ConnectorDefinitionRepository>,
    wiring: Arc<TransportWiring>,
    registry: Mutex<Registry>,
    closed: AtomicBool,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, id: &str) -> Option<Arc<Connector>> {
        self.registry().by_id.get(id).cloned()
    }

    /// Rebind with a freshly loaded definition. A definition that has
    /// disappeared closes the connector and drops it from the registry.
    async fn rebind(&self, connector: Arc<Connector>) {
        let definition = match self.definitions.find_by_id(connector.id()).await {
            Ok(Some(definition)) => Some(definition),
            Ok(None) => {
                warn!(connector = %connector.id(), "Definition removed, closing connector");
                self.registry().remove(connector.id());
                if let Err(e) = connector.close().await {
                    warn!(connector = %connector.id(), "Close failed: {}", e);
                }
                return;
            }
            Err(e) => {
                warn!(connector = %connector.id(), "Cannot refresh definition, reusing current: {}", e);
                None
            }
        };
        connector.rebind(definition).await;
    }
}

/// Builder for [`ConnectorManager`]
pub struct ManagerBuilder {
    definitions: Arc<dyn ConnectorDefinitionRepository>,
    factory: Arc<dyn TransportFactory>,
    inbound: Option<Arc<dyn InboundSink>>,
    metrics: Arc<dyn Metrics>,
    startup_timeout: Duration,
}

impl ManagerBuilder {
    /// Where inbound PDUs from every session go
    pub fn inbound(mut self, sink: Arc<dyn InboundSink>) -> Self {
        self.inbound = Some(sink);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Overall bound on how long `start` waits for binds
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn build(self) -> ConnectorManager {
        let (tx, rx) = mpsc::unbounded_channel();
        let wiring = TransportWiring {
            factory: self.factory,
            events: tx,
            inbound: self.inbound,
            metrics: self.metrics,
        };

        ConnectorManager {
            shared: Arc::new(Shared {
                definitions: self.definitions,
                wiring: Arc::new(wiring),
                registry: Mutex::new(Registry::default()),
                closed: AtomicBool::new(false),
            }),
            events: Mutex::new(Some(rx)),
            event_loop: Mutex::new(None),
            startup_timeout: self.startup_timeout,
        }
    }
}

/// Owns the full set of connectors.
///
/// Registry changes go through one manager-level lock; each connector's
/// state is guarded separately by the connector itself. Connection events
/// from every transport arrive on one channel and are handled by a single
/// event loop task.
pub struct ConnectorManager {
    shared: Arc<Shared>,
    events: Mutex<Option<mpsc::UnboundedReceiver<ConnectorEvent>>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    startup_timeout: Duration,
}

impl ConnectorManager {
    pub fn builder(
        definitions: Arc<dyn ConnectorDefinitionRepository>,
        factory: Arc<dyn TransportFactory>,
    ) -> ManagerBuilder {
        ManagerBuilder {
            definitions,
            factory,
            inbound: None,
            metrics: Arc::new(NoopMetrics),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// Load every definition, build one connector per definition and bind
    /// them all concurrently. Waits at most the startup timeout; connectors
    /// still binding after that keep going in the background.
    pub async fn start(&self) -> Result<(), ManagerError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(ManagerError::Closed);
        }
        let Some(rx) = self.events.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            debug!("Connector manager already started");
            return Ok(());
        };
        let event_loop = tokio::spawn(run_events(self.shared.clone(), rx));
        *self.event_loop.lock().unwrap_or_else(PoisonError::into_inner) = Some(event_loop);

        let definitions = self.shared.definitions.find_all().await?;
        info!("Starting {} connector(s)", definitions.len());

        let connectors: Vec<Arc<Connector>> = {
            let mut registry = self.shared.registry();
            definitions
                .into_iter()
                .map(|definition| {
                    let connector =
                        Arc::new(Connector::new(definition, self.shared.wiring.clone()));
                    registry.insert(connector.clone());
                    connector
                })
                .collect()
        };

        for connector in &connectors {
            connector.bind();
        }

        // Binds run concurrently; waiting on each in turn against one
        // shared deadline bounds the whole startup.
        let deadline = Instant::now() + self.startup_timeout;
        for connector in &connectors {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let state = connector.wait_settled(remaining).await;
            match state {
                ConnectorState::Ready => debug!(connector = %connector.id(), "Ready"),
                ConnectorState::Wait | ConnectorState::Startup => warn!(
                    connector = %connector.id(),
                    alias = %connector.alias(),
                    "Slow start: still binding after startup timeout"
                ),
                other => warn!(
                    connector = %connector.id(),
                    state = %other,
                    cause = ?connector.last_error(),
                    "Connector not ready after startup"
                ),
            }
        }

        let ready = connectors
            .iter()
            .filter(|c| c.state() == ConnectorState::Ready)
            .count();
        info!("{}/{} connector(s) ready", ready, connectors.len());
        Ok(())
    }

    /// Live connectors in load order
    pub fn list(&self) -> Vec<Arc<Connector>> {
        self.shared.registry().order.clone()
    }

    /// Live connectors together with the registry generation they belong to
    pub fn snapshot(&self) -> (u64, Vec<Arc<Connector>>) {
        let registry = self.shared.registry();
        (registry.generation, registry.order.clone())
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<Connector>> {
        self.shared.get(id)
    }

    /// Registry generation; moves on whenever connectors are added or removed
    pub fn generation(&self) -> u64 {
        self.shared.registry().generation
    }

    /// Externally triggered rebind of one connector
    pub async fn rebind(&self, id: &str) -> Result<(), ManagerError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(ManagerError::Closed);
        }
        let connector = self
            .get_by_id(id)
            .ok_or_else(|| ManagerError::UnknownConnector(id.to_string()))?;
        self.shared.rebind(connector).await;
        Ok(())
    }

    /// Close every connector and empty the registry. Individual close
    /// failures are logged; the first one is returned after all connectors
    /// have been closed.
    pub async fn close(&self) -> Result<(), ManagerError> {
        self.shared.closed.store(true, Ordering::SeqCst);
        let connectors = self.shared.registry().drain();

        let mut first_error = None;
        for connector in connectors {
            if let Err(e) = connector.close().await {
                error!(connector = %connector.id(), "Close failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(event_loop) = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            event_loop.abort();
        }

        match first_error {
            Some(e) => Err(ManagerError::Transport(e)),
            None => Ok(()),
        }
    }
}

impl Drop for ConnectorManager {
    fn drop(&mut self) {
        if let Some(event_loop) = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            event_loop.abort();
        }
    }
}

async fn run_events(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<ConnectorEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(connector) = shared.get(&event.connector_id) else {
            debug!(connector = %event.connector_id, "Event for unregistered connector: {:?}", event.event);
            continue;
        };

        match connector.apply(&event) {
            EventAction::Nothing => {}
            EventAction::Close => {
                info!(connector = %connector.id(), "Disconnected by carrier, closing");
                if let Err(e) = connector.close().await {
                    warn!(connector = %connector.id(), "Close failed: {}", e);
                }
            }
            EventAction::Rebind => {
                if shared.closed.load(Ordering::SeqCst) {
                    continue;
                }
                info!(connector = %connector.id(), "Session interrupted, rebinding");
                let shared = shared.clone();
                tokio::spawn(async move { shared.rebind(connector).await });
            }
        }
    }
}
