//! Carrier connection definitions, as created and edited by the
//! administrative surface. The gateway core only reads them.

use crate::datatypes::BindKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Contractual role of a carrier connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CarrierRole {
    /// Send-only
    Transmitter,
    /// Receive-only
    Receiver,
    /// Both directions over one session
    Transceiver,
}

impl CarrierRole {
    pub fn can_send(self) -> bool {
        !matches!(self, CarrierRole::Receiver)
    }

    pub fn can_receive(self) -> bool {
        !matches!(self, CarrierRole::Transmitter)
    }

    pub fn bind_kind(self) -> BindKind {
        match self {
            CarrierRole::Transmitter => BindKind::Transmitter,
            CarrierRole::Receiver => BindKind::Receiver,
            CarrierRole::Transceiver => BindKind::Transceiver,
        }
    }
}

/// Session tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tunables {
    /// TCP connect plus bind round trip
    #[serde(default = "default_bind_timeout", with = "humantime_serde")]
    pub bind_timeout: Duration,

    /// Interval between enquire_link probes
    #[serde(default = "default_enquire_link_interval", with = "humantime_serde")]
    pub enquire_link_interval: Duration,

    /// Wait for an enquire_link_resp
    #[serde(default = "default_enquire_link_timeout", with = "humantime_serde")]
    pub enquire_link_timeout: Duration,

    /// Consecutive failed probes before the session counts as interrupted
    #[serde(default = "default_max_keep_alive_failures")]
    pub max_keep_alive_failures: u32,

    /// Wait for a submit_sm_resp
    #[serde(default = "default_response_timeout", with = "humantime_serde")]
    pub response_timeout: Duration,

    /// How long inbound message parts wait for their siblings
    #[serde(default = "default_merge_interval", with = "humantime_serde")]
    pub merge_interval: Duration,
}

fn default_bind_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_enquire_link_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_enquire_link_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_keep_alive_failures() -> u32 {
    3
}

fn default_response_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_merge_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            bind_timeout: default_bind_timeout(),
            enquire_link_interval: default_enquire_link_interval(),
            enquire_link_timeout: default_enquire_link_timeout(),
            max_keep_alive_failures: default_max_keep_alive_failures(),
            response_timeout: default_response_timeout(),
            merge_interval: default_merge_interval(),
        }
    }
}

/// One carrier endpoint as configured by an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDefinition {
    pub id: String,
    /// Human readable name used in logs
    pub alias: String,
    pub role: CarrierRole,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub system_id: String,
    pub password: String,
    #[serde(default)]
    pub system_type: String,
    /// Originator used when a request does not name one
    #[serde(default)]
    pub source_addr: String,
    /// Request delivery receipts for messages sent through this connector
    #[serde(default)]
    pub delivery_tracking: bool,
    #[serde(default)]
    pub tunables: Tunables,
}

fn default_port() -> u16 {
    2775
}

impl ConnectorDefinition {
    /// Definition pointing at localhost with default tunables
    pub fn new(id: impl Into<String>, role: CarrierRole) -> Self {
        let id = id.into();
        Self {
            alias: id.clone(),
            id,
            role,
            host: "localhost".to_string(),
            port: default_port(),
            system_id: String::new(),
            password: String::new(),
            system_type: String::new(),
            source_addr: String::new(),
            delivery_tracking: false,
            tunables: Tunables::default(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_credentials(
        mut self,
        system_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.system_id = system_id.into();
        self.password = password.into();
        self
    }

    pub fn with_delivery_tracking(mut self, enabled: bool) -> Self {
        self.delivery_tracking = enabled;
        self
    }

    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles() {
        assert!(CarrierRole::Transmitter.can_send());
        assert!(!CarrierRole::Transmitter.can_receive());
        assert!(!CarrierRole::Receiver.can_send());
        assert!(CarrierRole::Transceiver.can_send() && CarrierRole::Transceiver.can_receive());
        assert_eq!(CarrierRole::Receiver.bind_kind(), BindKind::Receiver);
    }

    #[test]
    fn yaml_definition_with_defaults() {
        let yaml = r#"
id: vodacom-1
alias: Vodacom primary
role: TRANSCEIVER
host: smsc.example.net
system_id: gw
password: secret
delivery_tracking: true
tunables:
  bind_timeout: 5s
  merge_interval: 1m
"#;
        let definition: ConnectorDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(definition.role, CarrierRole::Transceiver);
        assert_eq!(definition.port, 2775);
        assert!(definition.delivery_tracking);
        assert_eq!(definition.tunables.bind_timeout, Duration::from_secs(5));
        assert_eq!(definition.tunables.merge_interval, Duration::from_secs(60));
        assert_eq!(definition.tunables.response_timeout, Duration::from_secs(10));
    }
}
