// src/registry/mod.rs
mod health;

pub use health::{HealthCheckResult, HealthChecker};

use crate::config::SlotLayout;
use crate::metrics::MetricsCollector;
use crate::store::{ProxyState, ProxyStore, StoreError};
use crate::tunnel::RegistrationHandler;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

/// Sole writer of proxy records. Everything else reads snapshots through
/// [`ProxyRegistry::list_all`] and [`ProxyRegistry::list_healthy`].
pub struct ProxyRegistry {
    store: ProxyStore,
    slots: SlotLayout,
    kind: String,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ProxyRegistry {
    pub fn new(store: ProxyStore, slots: SlotLayout, kind: impl Into<String>) -> Self {
        Self {
            store,
            slots,
            kind: kind.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn slots(&self) -> &SlotLayout {
        &self.slots
    }

    /// Record a freshly provisioned slot as healthy.
    pub async fn register(&self, id: u32, ip: &str) -> Result<ProxyState, StoreError> {
        let port = self.slots.port(id);
        let state = ProxyState {
            id,
            kind: self.kind.clone(),
            port,
            public_ip: ip.to_string(),
            healthy: !ip.is_empty(),
            last_check: Utc::now(),
        };
        self.store.set_proxy_state(&state).await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_health_check(id, state.healthy);
        }
        info!(slot = id, port, ip, "Registered proxy");
        Ok(state)
    }

    /// Store the outcome of a health probe for an existing slot.
    pub(crate) async fn update_health(&self, id: u32, healthy: bool, ip: &str) -> Result<ProxyState, StoreError> {
        let blank = ProxyState {
            kind: self.kind.clone(),
            port: self.slots.port(id),
            ..ProxyState::empty(id)
        };
        let state = self.store.update_health(blank, healthy, ip).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_health_check(id, state.healthy);
        }
        Ok(state)
    }

    pub async fn get(&self, id: u32) -> Result<Option<ProxyState>, StoreError> {
        self.store.get_proxy_state(id).await
    }

    pub async fn list_all(&self) -> Vec<ProxyState> {
        self.store.all_proxy_states(self.slots.count).await
    }

    pub async fn list_healthy(&self) -> Vec<ProxyState> {
        self.store.healthy_proxies(self.slots.count).await
    }
}

#[async_trait]
impl RegistrationHandler for ProxyRegistry {
    async fn on_ready(&self, id: u32, ip: &str) {
        if let Err(e) = self.register(id, ip).await {
            error!(slot = id, ip, error = %e, "failed to register proxy");
        }
    }
}
