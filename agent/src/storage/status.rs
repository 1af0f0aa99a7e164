//! Status store: upserts the latest outcome of each deployment

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::StatusStoreError;
use crate::models::status::{StatusKey, StatusRecord};

/// Keeps at most one active record per [`StatusKey`]
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Insert the record, or replace the active record with the same key
    async fn record_status(&self, record: &StatusRecord) -> Result<(), StatusStoreError>;

    /// The active record for a key, if any
    async fn active_status(&self, key: &StatusKey) -> Result<Option<StatusRecord>, StatusStoreError>;

    /// Release the connection
    async fn close(&self);
}

/// Opens a store from the configured connection string
#[async_trait]
pub trait StatusStoreConnector: Send + Sync {
    async fn connect(
        &self,
        connection_string: &str,
        database: &str,
        collection: &str,
    ) -> Result<Box<dyn StatusStore>, StatusStoreError>;
}

/// In-process store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusStore {
    records: Arc<RwLock<Vec<StatusRecord>>>,
    closed: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record stored so far
    pub async fn records(&self) -> Vec<StatusRecord> {
        self.records.read().await.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of times the store was opened through the connector
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn record_status(&self, record: &StatusRecord) -> Result<(), StatusStoreError> {
        let mut records = self.records.write().await;
        match records
            .iter_mut()
            .find(|existing| existing.is_active && existing.key == record.key)
        {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn active_status(&self, key: &StatusKey) -> Result<Option<StatusRecord>, StatusStoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|record| record.is_active && &record.key == key)
            .cloned())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusStoreConnector for MemoryStatusStore {
    async fn connect(
        &self,
        connection_string: &str,
        _database: &str,
        _collection: &str,
    ) -> Result<Box<dyn StatusStore>, StatusStoreError> {
        if connection_string.trim().is_empty() {
            return Err(StatusStoreError::NotConfigured);
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
        Ok(Box::new(self.clone()))
    }
}
