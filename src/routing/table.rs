//! Routing table snapshots, one per connector registry generation.

use crate::connector::Connector;
use crate::repository::{RoutingConditionRepository, StorageError};
use crate::routing::compiler::{CompiledPredicate, compile_conditions};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Compiled predicates keyed by connector id. Immutable once built.
#[derive(Debug, Default)]
pub struct RoutingTable {
    generation: u64,
    predicates: HashMap<String, CompiledPredicate>,
}

impl RoutingTable {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            predicates: HashMap::new(),
        }
    }

    pub fn insert(&mut self, connector_id: impl Into<String>, predicate: CompiledPredicate) {
        self.predicates.insert(connector_id.into(), predicate);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `None` for connectors that were not registered when the table was built
    pub fn get(&self, connector_id: &str) -> Option<&CompiledPredicate> {
        self.predicates.get(connector_id)
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Holds the current routing table and rebuilds it wholesale whenever the
/// connector registry generation moves on.
pub struct RoutingCache {
    conditions: Arc<dyn RoutingConditionRepository>,
    current: RwLock<Option<Arc<RoutingTable>>>,
    rebuild: tokio::sync::Mutex<()>,
}

impl RoutingCache {
    pub fn new(conditions: Arc<dyn RoutingConditionRepository>) -> Self {
        Self {
            conditions,
            current: RwLock::new(None),
            rebuild: tokio::sync::Mutex::new(()),
        }
    }

    fn published(&self, generation: u64) -> Option<Arc<RoutingTable>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|table| table.generation() == generation)
            .cloned()
    }

    /// Table for `generation`, built from the given connectors if the
    /// published one belongs to another generation.
    ///
    /// A table is only published when every connector's conditions loaded;
    /// on a load failure nothing is cached and the error is returned.
    pub async fn table_for(
        &self,
        generation: u64,
        connectors: &[Arc<Connector>],
    ) -> Result<Arc<RoutingTable>, StorageError> {
        if let Some(table) = self.published(generation) {
            return Ok(table);
        }

        let _guard = self.rebuild.lock().await;
        // Another caller may have built it while we waited
        if let Some(table) = self.published(generation) {
            return Ok(table);
        }

        let table = Arc::new(self.build(generation, connectors).await?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(table.clone());
        Ok(table)
    }

    async fn build(
        &self,
        generation: u64,
        connectors: &[Arc<Connector>],
    ) -> Result<RoutingTable, StorageError> {
        let mut table = RoutingTable::new(generation);
        for connector in connectors {
            let conditions = self
                .conditions
                .conditions_for(connector.id())
                .await
                .inspect_err(|e| {
                    warn!(connector = %connector.id(), "Cannot load routing conditions: {}", e)
                })?;
            debug!(
                connector = %connector.id(),
                conditions = conditions.len(),
                "Compiled routing conditions"
            );
            table.insert(connector.id(), compile_conditions(connector.id(), &conditions));
        }
        Ok(table)
    }

    /// Drop the published table so the next lookup rebuilds it
    pub fn invalidate(&self) {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{CarrierRole, ConnectorDefinition, TransportWiring};
    use crate::routing::Condition;
    use crate::telemetry::NoopMetrics;
    use crate::transport::mock::MockTransportFactory;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FlakyConditions {
        failing: AtomicBool,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl RoutingConditionRepository for FlakyConditions {
        async fn conditions_for(&self, _connector_id: &str) -> Result<Vec<Condition>, StorageError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(StorageError::Backend("conditions unavailable".to_string()))
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn connectors(ids: &[&str]) -> Vec<Arc<Connector>> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let wiring = Arc::new(TransportWiring {
            factory: Arc::new(MockTransportFactory::new()),
            events: tx,
            inbound: None,
            metrics: Arc::new(NoopMetrics),
        });
        ids.iter()
            .map(|id| {
                let definition = ConnectorDefinition::new(*id, CarrierRole::Transmitter);
                Arc::new(Connector::new(definition, wiring.clone()))
            })
            .collect()
    }

    #[tokio::test]
    async fn table_is_cached_per_generation() {
        let conditions = Arc::new(FlakyConditions::default());
        let cache = RoutingCache::new(conditions.clone());
        let connectors = connectors(&["a", "b"]);

        let first = cache.table_for(1, &connectors).await.unwrap();
        let second = cache.table_for(1, &connectors).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 2);
        assert_eq!(conditions.loads.load(Ordering::SeqCst), 2);

        let next = cache.table_for(2, &connectors).await.unwrap();
        assert_eq!(next.generation(), 2);
        assert_eq!(conditions.loads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn load_failure_publishes_nothing() {
        let conditions = Arc::new(FlakyConditions::default());
        conditions.failing.store(true, Ordering::SeqCst);
        let cache = RoutingCache::new(conditions.clone());
        let connectors = connectors(&["a"]);

        assert!(matches!(
            cache.table_for(1, &connectors).await,
            Err(StorageError::Backend(_))
        ));

        conditions.failing.store(false, Ordering::SeqCst);
        let table = cache.table_for(1, &connectors).await.unwrap();
        assert!(table.get("a").is_some());
    }
}
