//! Injected metrics capability.
//!
//! The library never installs a global recorder. Whoever builds the
//! manager, dispatcher and translator hands each of them an
//! `Arc<dyn Metrics>`; [`NoopMetrics`] is used when nobody cares.

use crate::connector::ConnectorState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// How one `accept` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    /// Answered from a stored record
    Replayed,
    Sent,
    Rejected,
    NoConnector,
    Unavailable,
    Failed,
}

impl DispatchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchOutcome::Replayed => "replayed",
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::Rejected => "rejected",
            DispatchOutcome::NoConnector => "no_connector",
            DispatchOutcome::Unavailable => "unavailable",
            DispatchOutcome::Failed => "failed",
        }
    }
}

/// Kind of a translated inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    Message,
    Receipt,
}

/// Counter hooks. Every method has an empty default body.
pub trait Metrics: Send + Sync {
    fn bind_completed(&self, _connector: &str, _ok: bool) {}

    fn state_changed(&self, _connector: &str, _state: ConnectorState) {}

    fn dispatch_outcome(&self, _outcome: DispatchOutcome) {}

    fn inbound_event(&self, _kind: InboundKind) {}

    fn inbound_dropped(&self, _reason: &'static str) {}
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {}

impl NoopMetrics {
    pub fn shared() -> Arc<dyn Metrics> {
        Arc::new(NoopMetrics)
    }
}

/// Point-in-time copy of [`CounterMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub binds_ok: u64,
    pub binds_failed: u64,
    pub state_changes: u64,
    pub dispatch: HashMap<DispatchOutcome, u64>,
    pub inbound_messages: u64,
    pub inbound_receipts: u64,
    pub inbound_dropped: u64,
}

impl MetricsSnapshot {
    pub fn dispatched(&self, outcome: DispatchOutcome) -> u64 {
        self.dispatch.get(&outcome).copied().unwrap_or(0)
    }
}

/// In-process atomic counters
#[derive(Debug, Default)]
pub struct CounterMetrics {
    binds_ok: AtomicU64,
    binds_failed: AtomicU64,
    state_changes: AtomicU64,
    dispatch: RwLock<HashMap<DispatchOutcome, u64>>,
    inbound_messages: AtomicU64,
    inbound_receipts: AtomicU64,
    inbound_dropped: AtomicU64,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            binds_ok: self.binds_ok.load(Ordering::Relaxed),
            binds_failed: self.binds_failed.load(Ordering::Relaxed),
            state_changes: self.state_changes.load(Ordering::Relaxed),
            dispatch: self
                .dispatch
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            inbound_messages: self.inbound_messages.load(Ordering::Relaxed),
            inbound_receipts: self.inbound_receipts.load(Ordering::Relaxed),
            inbound_dropped: self.inbound_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Metrics for CounterMetrics {
    fn bind_completed(&self, _connector: &str, ok: bool) {
        if ok {
            self.binds_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.binds_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn state_changed(&self, _connector: &str, _state: ConnectorState) {
        self.state_changes.fetch_add(1, Ordering::Relaxed);
    }

    fn dispatch_outcome(&self, outcome: DispatchOutcome) {
        *self
            .dispatch
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(outcome)
            .or_insert(0) += 1;
    }

    fn inbound_event(&self, kind: InboundKind) {
        match kind {
            InboundKind::Message => self.inbound_messages.fetch_add(1, Ordering::Relaxed),
            InboundKind::Receipt => self.inbound_receipts.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn inbound_dropped(&self, _reason: &'static str) {
        self.inbound_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = CounterMetrics::new();
        metrics.bind_completed("a", true);
        metrics.bind_completed("a", false);
        metrics.dispatch_outcome(DispatchOutcome::Sent);
        metrics.dispatch_outcome(DispatchOutcome::Sent);
        metrics.inbound_dropped("unsupported");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.binds_ok, 1);
        assert_eq!(snapshot.binds_failed, 1);
        assert_eq!(snapshot.dispatched(DispatchOutcome::Sent), 2);
        assert_eq!(snapshot.dispatched(DispatchOutcome::Failed), 0);
        assert_eq!(snapshot.inbound_dropped, 1);
    }
}
