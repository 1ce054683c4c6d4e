// src/registry/health.rs
use super::ProxyRegistry;
use crate::runtime::ContainerRuntime;
use crate::store::ProxyState;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval_at, Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct HealthChecker {
    registry: Arc<ProxyRegistry>,
    runtime: Arc<dyn ContainerRuntime>,
    interval: Duration,
}

#[derive(Debug)]
pub struct HealthCheckResult {
    pub slot: u32,
    pub healthy: bool,
    pub ip: String,
    pub error: Option<String>,
}

impl HealthChecker {
    pub fn new(
        registry: Arc<ProxyRegistry>,
        runtime: Arc<dyn ContainerRuntime>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            runtime,
            interval,
        }
    }

    /// Re-probe every registered slot once per interval until `shutdown`
    /// turns true. Does not replace dead tunnels.
    pub async fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);

        info!("Starting health checker with interval: {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One pass over all slots that have a record; unregistered slots are
    /// not counted.
    pub async fn check_all(&self) -> Vec<HealthCheckResult> {
        let mut states = Vec::new();
        for id in self.registry.slots().ids() {
            match self.registry.get(id).await {
                Ok(Some(state)) => states.push(state),
                Ok(None) => {}
                Err(e) => debug!(slot = id, error = %e, "skipping unreadable record"),
            }
        }

        let results =
            futures::future::join_all(states.into_iter().map(|state| self.check_slot(state))).await;

        let healthy = results.iter().filter(|r| r.healthy).count();
        info!("Health check complete: {}/{} healthy", healthy, results.len());
        results
    }

    async fn check_slot(&self, state: ProxyState) -> HealthCheckResult {
        let (healthy, ip, error) = match self.runtime.probe_public_ip(state.port).await {
            Ok(ip) if !ip.is_empty() => (true, ip, None),
            Ok(_) => (false, String::new(), Some("empty IP response".to_string())),
            Err(e) => (false, String::new(), Some(e.to_string())),
        };

        if healthy {
            if !state.healthy {
                info!(slot = state.id, ip = %ip, "Proxy {} is back up", state.id);
            }
        } else {
            warn!(
                slot = state.id,
                error = error.as_deref().unwrap_or(""),
                "Proxy {} DOWN (port {})",
                state.id,
                state.port
            );
        }

        if let Err(e) = self.registry.update_health(state.id, healthy, &ip).await {
            error!(slot = state.id, error = %e, "failed to store health result");
        }

        HealthCheckResult {
            slot: state.id,
            healthy,
            ip,
            error,
        }
    }
}
