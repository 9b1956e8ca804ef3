// ABOUTME: Strongly typed session settings, one struct and builder per carrier role
// ABOUTME: Each role only exposes the options that are meaningful for its bind type

use crate::connector::{CarrierRole, ConnectorDefinition};
use crate::datatypes::BindKind;
use crate::transport::error::{SmppError, SmppResult};
use crate::transport::keepalive::KeepAliveConfig;
use std::time::Duration;

const DEFAULT_BIND_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MERGE_INTERVAL: Duration = Duration::from_secs(30);

/// Where to connect and how to authenticate
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub system_id: String,
    pub password: String,
    pub system_type: Option<String>,
}

impl Endpoint {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        system_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            system_id: system_id.into(),
            password: password.into(),
            system_type: None,
        }
    }

    pub fn with_system_type(mut self, system_type: impl Into<String>) -> Self {
        self.system_type = Some(system_type.into());
        self
    }

    fn from_definition(definition: &ConnectorDefinition) -> SmppResult<Self> {
        if definition.host.trim().is_empty() {
            return Err(SmppError::InvalidData(format!(
                "connector {} has no host",
                definition.id
            )));
        }
        if definition.port == 0 {
            return Err(SmppError::InvalidData(format!(
                "connector {} has no port",
                definition.id
            )));
        }

        let endpoint = Self::new(
            definition.host.clone(),
            definition.port,
            definition.system_id.clone(),
            definition.password.clone(),
        );
        Ok(if definition.system_type.is_empty() {
            endpoint
        } else {
            endpoint.with_system_type(definition.system_type.clone())
        })
    }
}

/// Settings for a send-only session
#[derive(Debug, Clone, PartialEq)]
pub struct TransmitterSettings {
    pub endpoint: Endpoint,
    pub bind_timeout: Duration,
    pub keep_alive: KeepAliveConfig,
    pub response_timeout: Duration,
    /// Originator used when a message does not carry one
    pub source_addr: String,
    pub registered_delivery: bool,
}

impl TransmitterSettings {
    pub fn builder(endpoint: Endpoint) -> TransmitterSettingsBuilder {
        TransmitterSettingsBuilder {
            settings: TransmitterSettings {
                endpoint,
                bind_timeout: DEFAULT_BIND_TIMEOUT,
                keep_alive: KeepAliveConfig::default(),
                response_timeout: DEFAULT_RESPONSE_TIMEOUT,
                source_addr: String::new(),
                registered_delivery: false,
            },
        }
    }
}

pub struct TransmitterSettingsBuilder {
    settings: TransmitterSettings,
}

impl TransmitterSettingsBuilder {
    pub fn bind_timeout(mut self, timeout: Duration) -> Self {
        self.settings.bind_timeout = timeout;
        self
    }

    pub fn keep_alive(mut self, keep_alive: KeepAliveConfig) -> Self {
        self.settings.keep_alive = keep_alive;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.settings.response_timeout = timeout;
        self
    }

    pub fn source_addr(mut self, source_addr: impl Into<String>) -> Self {
        self.settings.source_addr = source_addr.into();
        self
    }

    pub fn registered_delivery(mut self, enabled: bool) -> Self {
        self.settings.registered_delivery = enabled;
        self
    }

    pub fn build(self) -> TransmitterSettings {
        self.settings
    }
}

/// Settings for a receive-only session
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverSettings {
    pub endpoint: Endpoint,
    pub bind_timeout: Duration,
    pub keep_alive: KeepAliveConfig,
    /// How long inbound parts wait for their siblings
    pub merge_interval: Duration,
}

impl ReceiverSettings {
    pub fn builder(endpoint: Endpoint) -> ReceiverSettingsBuilder {
        ReceiverSettingsBuilder {
            settings: ReceiverSettings {
                endpoint,
                bind_timeout: DEFAULT_BIND_TIMEOUT,
                keep_alive: KeepAliveConfig::default(),
                merge_interval: DEFAULT_MERGE_INTERVAL,
            },
        }
    }
}

pub struct ReceiverSettingsBuilder {
    settings: ReceiverSettings,
}

impl ReceiverSettingsBuilder {
    pub fn bind_timeout(mut self, timeout: Duration) -> Self {
        self.settings.bind_timeout = timeout;
        self
    }

    pub fn keep_alive(mut self, keep_alive: KeepAliveConfig) -> Self {
        self.settings.keep_alive = keep_alive;
        self
    }

    pub fn merge_interval(mut self, interval: Duration) -> Self {
        self.settings.merge_interval = interval;
        self
    }

    pub fn build(self) -> ReceiverSettings {
        self.settings
    }
}

/// Settings for a session that both sends and receives
#[derive(Debug, Clone, PartialEq)]
pub struct TransceiverSettings {
    pub endpoint: Endpoint,
    pub bind_timeout: Duration,
    pub keep_alive: KeepAliveConfig,
    pub response_timeout: Duration,
    pub merge_interval: Duration,
    pub source_addr: String,
    pub registered_delivery: bool,
}

impl TransceiverSettings {
    pub fn builder(endpoint: Endpoint) -> TransceiverSettingsBuilder {
        TransceiverSettingsBuilder {
            settings: TransceiverSettings {
                endpoint,
                bind_timeout: DEFAULT_BIND_TIMEOUT,
                keep_alive: KeepAliveConfig::default(),
                response_timeout: DEFAULT_RESPONSE_TIMEOUT,
                merge_interval: DEFAULT_MERGE_INTERVAL,
                source_addr: String::new(),
                registered_delivery: false,
            },
        }
    }
}

pub struct TransceiverSettingsBuilder {
    settings: TransceiverSettings,
}

impl TransceiverSettingsBuilder {
    pub fn bind_timeout(mut self, timeout: Duration) -> Self {
        self.settings.bind_timeout = timeout;
        self
    }

    pub fn keep_alive(mut self, keep_alive: KeepAliveConfig) -> Self {
        self.settings.keep_alive = keep_alive;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.settings.response_timeout = timeout;
        self
    }

    pub fn merge_interval(mut self, interval: Duration) -> Self {
        self.settings.merge_interval = interval;
        self
    }

    pub fn source_addr(mut self, source_addr: impl Into<String>) -> Self {
        self.settings.source_addr = source_addr.into();
        self
    }

    pub fn registered_delivery(mut self, enabled: bool) -> Self {
        self.settings.registered_delivery = enabled;
        self
    }

    pub fn build(self) -> TransceiverSettings {
        self.settings
    }
}

/// Settings for any of the three bind types
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSettings {
    Transmitter(TransmitterSettings),
    Receiver(ReceiverSettings),
    Transceiver(TransceiverSettings),
}

impl SessionSettings {
    /// Pick the builder matching the definition's role and feed it the
    /// definition's tunables.
    pub fn from_definition(definition: &ConnectorDefinition) -> SmppResult<Self> {
        let endpoint = Endpoint::from_definition(definition)?;
        let tunables = &definition.tunables;
        let keep_alive = KeepAliveConfig::from_tunables(tunables);

        Ok(match definition.role {
            CarrierRole::Transmitter => SessionSettings::Transmitter(
                TransmitterSettings::builder(endpoint)
                    .bind_timeout(tunables.bind_timeout)
                    .keep_alive(keep_alive)
                    .response_timeout(tunables.response_timeout)
                    .source_addr(definition.source_addr.clone())
                    .registered_delivery(definition.delivery_tracking)
                    .build(),
            ),
            CarrierRole::Receiver => SessionSettings::Receiver(
                ReceiverSettings::builder(endpoint)
                    .bind_timeout(tunables.bind_timeout)
                    .keep_alive(keep_alive)
                    .merge_interval(tunables.merge_interval)
                    .build(),
            ),
            CarrierRole::Transceiver => SessionSettings::Transceiver(
                TransceiverSettings::builder(endpoint)
                    .bind_timeout(tunables.bind_timeout)
                    .keep_alive(keep_alive)
                    .response_timeout(tunables.response_timeout)
                    .merge_interval(tunables.merge_interval)
                    .source_addr(definition.source_addr.clone())
                    .registered_delivery(definition.delivery_tracking)
                    .build(),
            ),
        })
    }

    pub fn bind_kind(&self) -> BindKind {
        match self {
            SessionSettings::Transmitter(_) => BindKind::Transmitter,
            SessionSettings::Receiver(_) => BindKind::Receiver,
            SessionSettings::Transceiver(_) => BindKind::Transceiver,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        match self {
            SessionSettings::Transmitter(s) => &s.endpoint,
            SessionSettings::Receiver(s) => &s.endpoint,
            SessionSettings::Transceiver(s) => &s.endpoint,
        }
    }

    pub fn bind_timeout(&self) -> Duration {
        match self {
            SessionSettings::Transmitter(s) => s.bind_timeout,
            SessionSettings::Receiver(s) => s.bind_timeout,
            SessionSettings::Transceiver(s) => s.bind_timeout,
        }
    }

    pub fn keep_alive(&self) -> &KeepAliveConfig {
        match self {
            SessionSettings::Transmitter(s) => &s.keep_alive,
            SessionSettings::Receiver(s) => &s.keep_alive,
            SessionSettings::Transceiver(s) => &s.keep_alive,
        }
    }

    /// `None` for receivers, which never submit
    pub fn response_timeout(&self) -> Option<Duration> {
        match self {
            SessionSettings::Transmitter(s) => Some(s.response_timeout),
            SessionSettings::Receiver(_) => None,
            SessionSettings::Transceiver(s) => Some(s.response_timeout),
        }
    }

    /// `None` for transmitters, which never receive
    pub fn merge_interval(&self) -> Option<Duration> {
        match self {
            SessionSettings::Transmitter(_) => None,
            SessionSettings::Receiver(s) => Some(s.merge_interval),
            SessionSettings::Transceiver(s) => Some(s.merge_interval),
        }
    }

    pub fn source_addr(&self) -> Option<&str> {
        match self {
            SessionSettings::Transmitter(s) => Some(&s.source_addr),
            SessionSettings::Receiver(_) => None,
            SessionSettings::Transceiver(s) => Some(&s.source_addr),
        }
    }

    pub fn registered_delivery(&self) -> bool {
        match self {
            SessionSettings::Transmitter(s) => s.registered_delivery,
            SessionSettings::Receiver(_) => false,
            SessionSettings::Transceiver(s) => s.registered_delivery,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(role: CarrierRole) -> ConnectorDefinition {
        ConnectorDefinition::new("c1", role)
            .with_endpoint("smsc.local", 2776)
            .with_credentials("gw", "pw")
            .with_delivery_tracking(true)
    }

    #[test]
    fn transmitter_has_no_merge_interval() {
        let settings = SessionSettings::from_definition(&definition(CarrierRole::Transmitter)).unwrap();
        assert_eq!(settings.bind_kind(), BindKind::Transmitter);
        assert_eq!(settings.merge_interval(), None);
        assert_eq!(settings.response_timeout(), Some(Duration::from_secs(10)));
        assert!(settings.registered_delivery());
        assert_eq!(settings.endpoint().port, 2776);
    }

    #[test]
    fn receiver_has_no_response_timeout() {
        let settings = SessionSettings::from_definition(&definition(CarrierRole::Receiver)).unwrap();
        assert_eq!(settings.bind_kind(), BindKind::Receiver);
        assert_eq!(settings.response_timeout(), None);
        assert_eq!(settings.merge_interval(), Some(Duration::from_secs(30)));
        assert!(!settings.registered_delivery());
    }

    #[test]
    fn transceiver_carries_both() {
        let settings =
            SessionSettings::from_definition(&definition(CarrierRole::Transceiver)).unwrap();
        assert!(settings.response_timeout().is_some());
        assert!(settings.merge_interval().is_some());
        assert_eq!(settings.endpoint().system_type, None);
    }

    #[test]
    fn empty_host_is_rejected() {
        let definition = definition(CarrierRole::Transmitter).with_endpoint("", 2775);
        assert!(matches!(
            SessionSettings::from_definition(&definition),
            Err(SmppError::InvalidData(_))
        ));
    }
}
