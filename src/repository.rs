// ABOUTME: Storage seams consumed by the gateway core and their in-memory implementations
// ABOUTME: Connector definitions, routing conditions and the Sms record store with at-most-one-insert semantics

use crate::connector::ConnectorDefinition;
use crate::dispatch::Sms;
use crate::routing::Condition;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A record with this id already exists
    #[error("record {0} already exists")]
    Duplicate(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ConnectorDefinitionRepository: Send + Sync {
    /// All definitions, in a stable order
    async fn find_all(&self) -> Result<Vec<ConnectorDefinition>, StorageError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<ConnectorDefinition>, StorageError>;
}

#[async_trait]
pub trait RoutingConditionRepository: Send + Sync {
    async fn conditions_for(&self, connector_id: &str) -> Result<Vec<Condition>, StorageError>;
}

/// Sms records. `save` must reject a second record with the same id.
#[async_trait]
pub trait SmsRecordStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Sms>, StorageError>;

    async fn save(&self, sms: &Sms) -> Result<(), StorageError>;
}

/// Definitions and conditions held in memory, typically loaded from a
/// configuration file. Editable at runtime so operators' changes can be
/// simulated.
#[derive(Debug, Default)]
pub struct StaticRepository {
    definitions: RwLock<Vec<ConnectorDefinition>>,
    conditions: RwLock<Vec<Condition>>,
}

impl StaticRepository {
    pub fn new(definitions: Vec<ConnectorDefinition>, conditions: Vec<Condition>) -> Self {
        Self {
            definitions: RwLock::new(definitions),
            conditions: RwLock::new(conditions),
        }
    }

    /// Insert or replace a definition, keeping its position if it exists
    pub fn upsert_definition(&self, definition: ConnectorDefinition) {
        let mut definitions = self.definitions.write().unwrap_or_else(PoisonError::into_inner);
        match definitions.iter_mut().find(|d| d.id == definition.id) {
            Some(existing) => *existing = definition,
            None => definitions.push(definition),
        }
    }

    pub fn remove_definition(&self, id: &str) {
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|d| d.id != id);
    }

    pub fn set_conditions(&self, conditions: Vec<Condition>) {
        *self.conditions.write().unwrap_or_else(PoisonError::into_inner) = conditions;
    }
}

#[async_trait]
impl ConnectorDefinitionRepository for StaticRepository {
    async fn find_all(&self) -> Result<Vec<ConnectorDefinition>, StorageError> {
        Ok(self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ConnectorDefinition>, StorageError> {
        Ok(self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }
}

#[async_trait]
impl RoutingConditionRepository for StaticRepository {
    async fn conditions_for(&self, connector_id: &str) -> Result<Vec<Condition>, StorageError> {
        Ok(self
            .conditions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.connector_id == connector_id)
            .cloned()
            .collect())
    }
}

/// Volatile Sms store
#[derive(Debug, Default)]
pub struct MemorySmsStore {
    records: Mutex<HashMap<String, Sms>>,
    lookups: AtomicUsize,
    fail: AtomicBool,
}

impl MemorySmsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, Sms>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Number of `find_by_id` calls served
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Simulate an outage: every call fails while set
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Mark a record canceled, as an external process would
    pub fn cancel(&self, id: &str, at: chrono::DateTime<chrono::Utc>) -> bool {
        match self.records().get_mut(id) {
            Some(record) => {
                record.canceled_at = Some(at);
                true
            }
            None => false,
        }
    }

    fn check_backend(&self) -> Result<(), StorageError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(StorageError::Backend("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SmsRecordStore for MemorySmsStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Sms>, StorageError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.check_backend()?;
        Ok(self.records().get(id).cloned())
    }

    async fn save(&self, sms: &Sms) -> Result<(), StorageError> {
        self.check_backend()?;
        let mut records = self.records();
        if records.contains_key(&sms.id) {
            return Err(StorageError::Duplicate(sms.id.clone()));
        }
        records.insert(sms.id.clone(), sms.clone());
        Ok(())
    }
}
