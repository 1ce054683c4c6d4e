// src/store/memory.rs
use super::{ProxyState, StateStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Process-local store. Used by tests and single-node runs without Redis.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<String, ProxyState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn set(&self, key: &str, state: &ProxyState) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), state.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ProxyState>, StoreError> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
