// src/store/redis_store.rs
use super::{ProxyState, StateStore, StoreError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

/// Redis-backed store. Records are stored as JSON strings without expiry.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        let store = Self { conn };
        store.ping().await?;
        tracing::info!("Connected to redis at {}", url);
        Ok(store)
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn set(&self, key: &str, state: &ProxyState) -> Result<(), StoreError> {
        let data = serde_json::to_string(state)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ProxyState>, StoreError> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(key).await?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
