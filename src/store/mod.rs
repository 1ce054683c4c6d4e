// src/store/mod.rs
mod memory;
mod redis_store;
mod state;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use state::ProxyState;

use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("malformed record: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Keyed storage for proxy records. Writes are last-write-wins.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn set(&self, key: &str, state: &ProxyState) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<ProxyState>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Slot-level access on top of a [`StateStore`].
#[derive(Clone)]
pub struct ProxyStore {
    inner: Arc<dyn StateStore>,
}

impl ProxyStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self { inner }
    }

    pub fn key(id: u32) -> String {
        format!("proxy:{}", id)
    }

    pub async fn set_proxy_state(&self, state: &ProxyState) -> Result<(), StoreError> {
        self.inner.set(&Self::key(state.id), state).await
    }

    pub async fn get_proxy_state(&self, id: u32) -> Result<Option<ProxyState>, StoreError> {
        self.inner.get(&Self::key(id)).await
    }

    /// Records for slots `1..=count`. Missing or unreadable records are skipped.
    pub async fn all_proxy_states(&self, count: u32) -> Vec<ProxyState> {
        let mut states = Vec::new();
        for id in 1..=count {
            match self.get_proxy_state(id).await {
                Ok(Some(state)) => states.push(state),
                Ok(None) => {}
                Err(e) => tracing::debug!(slot = id, error = %e, "skipping unreadable record"),
            }
        }
        states
    }

    pub async fn healthy_proxies(&self, count: u32) -> Vec<ProxyState> {
        self.all_proxy_states(count)
            .await
            .into_iter()
            .filter(|state| state.healthy)
            .collect()
    }

    /// Read-modify-write of one slot's health. `blank` is written when the
    /// slot has no record yet. A failed read is returned and nothing is written.
    pub async fn update_health(&self, blank: ProxyState, healthy: bool, ip: &str) -> Result<ProxyState, StoreError> {
        let mut state = self.get_proxy_state(blank.id).await?.unwrap_or(blank);
        state.mark(healthy, ip);
        self.set_proxy_state(&state).await?;
        Ok(state)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}
