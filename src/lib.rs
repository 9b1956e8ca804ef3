pub mod codec;
pub mod config;
pub mod connection;
pub mod connector;
pub mod datatypes;
pub mod dispatch;
pub mod inbound;
pub mod manager;
pub mod repository;
pub mod routing;
pub mod telemetry;
pub mod transport;


// Wire layer
pub use codec::{CodecError, Decodable, Encodable, Frame, PduHeader, PduRegistry};

// Gateway core
pub use config::{ConfigError, GatewayConfig};
pub use connector::{
    CarrierRole, Connector, ConnectorDefinition, ConnectorError, ConnectorState, Tunables,
};
pub use dispatch::{DispatchError, DispatchHandler, SendSmsRequest, SendSmsResponse, Sms};
pub use inbound::{
    DeliveryStatus, InboundListener, InboundTranslator, ReceivedSmsRequest, SmsDeliveryResponse,
};
pub use manager::{ConnectorManager, ManagerError};
pub use repository::{
    ConnectorDefinitionRepository, MemorySmsStore, RoutingConditionRepository, SmsRecordStore,
    StaticRepository, StorageError,
};
pub use routing::{Condition, Predicate, Subject};
pub use transport::{SmppError, SmppResult, SmppTransportFactory, TransportFactory};

/// Multiplexes SMS traffic over a pool of SMPP carrier connections.
///
/// A [`ConnectorManager`] binds one session per configured carrier and keeps
/// it bound. A [`DispatchHandler`] routes each [`SendSmsRequest`] to the first
/// live connector whose routing conditions match, failing over past
/// connectors that are down, and records the outcome so a retried request
/// gets the same answer.
///
/// # Examples
///
/// ```rust,no_run
/// use smsgw::{
///     ConnectorManager, DispatchHandler, GatewayConfig, MemorySmsStore, SendSmsRequest,
///     SmppTransportFactory, StaticRepository,
/// };
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = GatewayConfig::load("gateway.yaml")?;
///     let repository = Arc::new(StaticRepository::from_config(&config));
///
///     let manager = Arc::new(
///         ConnectorManager::builder(repository.clone(), Arc::new(SmppTransportFactory))
///             .startup_timeout(config.startup_timeout)
///             .build(),
///     );
///     manager.start().await?;
///
///     let dispatcher =
///         DispatchHandler::new(manager.clone(), repository, Arc::new(MemorySmsStore::new()));
///     let request = SendSmsRequest::new("req-1", "+258841234567", "GATEWAY", "Hello");
///     let response = dispatcher.accept(&request).await?;
///     println!("{:?}", response);
///
///     manager.close().await?;
///     Ok(())
/// }
/// ```
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;
