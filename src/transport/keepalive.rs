// ABOUTME: SMPP keep-alive tracking for long-running carrier sessions
// ABOUTME: Counts enquire_link probes and decides when a session should be treated as interrupted

use crate::connector::Tunables;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for periodic enquire_link probes
///
/// The SMSC should answer each enquire_link with an enquire_link_resp. A
/// session that misses `max_failures` answers in a row is considered dead
/// even if the TCP socket still looks healthy.
#[derive(Debug, Clone, PartialEq)]
pub struct KeepAliveConfig {
    /// Interval between enquire_link PDUs (default: 30 seconds)
    pub interval: Duration,

    /// Timeout for enquire_link responses (default: 10 seconds)
    pub timeout: Duration,

    /// Maximum consecutive failures before the session is dead (default: 3)
    pub max_failures: u32,

    /// Whether probes are sent at all (default: true)
    pub enabled: bool,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            max_failures: 3,
            enabled: true,
        }
    }
}

impl KeepAliveConfig {
    /// Keep-alive settings carried by a connector definition. A zero
    /// interval disables probing.
    pub fn from_tunables(tunables: &Tunables) -> Self {
        Self {
            interval: tunables.enquire_link_interval,
            timeout: tunables.enquire_link_timeout,
            max_failures: tunables.max_keep_alive_failures.max(1),
            enabled: !tunables.enquire_link_interval.is_zero(),
        }
    }
}

/// Tracks probe outcomes for one session
#[derive(Debug)]
pub struct KeepAliveTracker {
    config: KeepAliveConfig,
    consecutive_failures: u32,
    total_pings: u32,
}

impl KeepAliveTracker {
    pub fn new(config: KeepAliveConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
            total_pings: 0,
        }
    }

    pub fn config(&self) -> &KeepAliveConfig {
        &self.config
    }

    pub fn on_ping_sent(&mut self) {
        self.total_pings += 1;
        debug!("Enquire_link sent (total: {})", self.total_pings);
    }

    pub fn on_ping_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn on_ping_failure(&mut self) {
        self.consecutive_failures += 1;
        warn!(
            "Enquire_link failed ({}/{})",
            self.consecutive_failures, self.config.max_failures
        );
    }

    /// True once the failure budget is spent
    pub fn is_connection_failed(&self) -> bool {
        self.consecutive_failures >= self.config.max_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_disables_probing() {
        let tunables = Tunables {
            enquire_link_interval: Duration::ZERO,
            ..Tunables::default()
        };
        assert!(!KeepAliveConfig::from_tunables(&tunables).enabled);
        assert!(KeepAliveConfig::from_tunables(&Tunables::default()).enabled);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let mut tracker = KeepAliveTracker::new(KeepAliveConfig {
            max_failures: 2,
            ..KeepAliveConfig::default()
        });

        tracker.on_ping_sent();
        tracker.on_ping_failure();
        assert!(!tracker.is_connection_failed());

        tracker.on_ping_sent();
        tracker.on_ping_success();
        assert_eq!(tracker.consecutive_failures, 0);

        tracker.on_ping_sent();
        tracker.on_ping_failure();
        tracker.on_ping_sent();
        tracker.on_ping_failure();
        assert!(tracker.is_connection_failed());
        assert_eq!(tracker.total_pings, 4);
    }
}
