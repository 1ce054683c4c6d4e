// src/tunnel/manager.rs
use super::RegistrationHandler;
use crate::config::{RetryConfig, SlotLayout, TunnelConfig};
use crate::metrics::MetricsCollector;
use crate::retry::RetryStrategy;
use crate::runtime::{ContainerRuntime, RuntimeError};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("slot {id}: could not acquire unique IP after {attempts} attempts")]
    NoUniqueIp { id: u32, attempts: u32 },
}

/// Why a single provisioning attempt did not produce a usable IP.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("start failed: {0}")]
    Start(RuntimeError),

    #[error("probe failed: {0}")]
    Probe(RuntimeError),

    #[error("duplicate IP {0}")]
    Duplicate(String),
}

/// Provisions fleet slots one after another so that every live slot holds a
/// distinct public IP.
///
/// The used-IP set is only touched through `&mut self`; provisioning for
/// the whole fleet runs on one task.
pub struct TunnelManager {
    slots: SlotLayout,
    tunnel: TunnelConfig,
    retry: RetryStrategy,
    runtime: Arc<dyn ContainerRuntime>,
    used_ips: HashSet<String>,
    handlers: Vec<Arc<dyn RegistrationHandler>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl TunnelManager {
    pub fn new(
        slots: SlotLayout,
        tunnel: TunnelConfig,
        retry: RetryConfig,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            slots,
            tunnel,
            retry: RetryStrategy::new(retry),
            runtime,
            used_ips: HashSet::new(),
            handlers: Vec::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn subscribe(&mut self, handler: Arc<dyn RegistrationHandler>) {
        self.handlers.push(handler);
    }

    pub fn used_ips(&self) -> &HashSet<String> {
        &self.used_ips
    }

    /// Provision slots `1..=N` in order. A slot that runs out of attempts is
    /// logged and skipped. Returns the number of slots that came up.
    pub async fn provision_all(&mut self) -> usize {
        info!(
            "Starting {} tunnels with unique IPs...",
            self.slots.count
        );

        let mut ready = 0;
        for id in self.slots.ids() {
            let ip = match self.provision_one(id).await {
                Ok(ip) => ip,
                Err(e) => {
                    warn!(slot = id, error = %e, "slot failed to provision");
                    continue;
                }
            };

            self.used_ips.insert(ip.clone());
            ready += 1;
            info!(
                slot = id,
                ip = %ip,
                "{} ready",
                self.slots.container_name(id)
            );

            for handler in &self.handlers {
                handler.on_ready(id, &ip).await;
            }
        }

        let mut ips: Vec<&String> = self.used_ips.iter().collect();
        ips.sort();
        info!(
            "Provisioning finished: {}/{} slots up. Unique IPs: {:?}",
            ready, self.slots.count, ips
        );
        ready
    }

    /// Bring up one slot, replacing its container until the probed IP is
    /// not already in use. Does not modify the used-IP set.
    pub async fn provision_one(&self, id: u32) -> Result<String, TunnelError> {
        let max = self.retry.max_attempts();

        self.retry
            .execute(|attempt| self.attempt(id, attempt, max))
            .await
            .map_err(|_| TunnelError::NoUniqueIp { id, attempts: max })
    }

    async fn attempt(&self, id: u32, attempt: u32, max: u32) -> Result<String, AttemptError> {
        let name = self.slots.container_name(id);
        let port = self.slots.port(id);
        info!("Starting {} (attempt {}/{})...", name, attempt, max);

        // Fresh container and volumes force a new registration upstream.
        if let Err(e) = self.runtime.force_remove(&name).await {
            debug!(container = %name, error = %e, "nothing to remove");
        }
        sleep(self.tunnel.settle_delay()).await;

        if let Err(e) = self.runtime.start(&name, port).await {
            warn!(container = %name, error = %e, "failed to start");
            self.record("failed");
            return Err(AttemptError::Start(e));
        }

        sleep(self.tunnel.init_delay()).await;

        let ip = match self.runtime.probe_public_ip(port).await {
            Ok(ip) if !ip.is_empty() => ip,
            Ok(_) => {
                self.record("failed");
                return Err(AttemptError::Probe(RuntimeError::EmptyIp));
            }
            Err(e) => {
                warn!(container = %name, error = %e, "failed to get IP");
                self.record("failed");
                return Err(AttemptError::Probe(e));
            }
        };

        if self.used_ips.contains(&ip) {
            warn!("Duplicate IP {} for {}, retrying...", ip, name);
            self.record("duplicate");
            return Err(AttemptError::Duplicate(ip));
        }

        self.record("ok");
        Ok(ip)
    }

    /// Swap a slot's IP. On failure the old IP stays reserved so a later
    /// slot cannot silently take it.
    pub async fn restart_with_new_ip(&mut self, id: u32, current_ip: &str) -> Result<String, TunnelError> {
        self.used_ips.remove(current_ip);

        match self.provision_one(id).await {
            Ok(ip) => {
                self.used_ips.insert(ip.clone());
                info!(slot = id, old = current_ip, new = %ip, "rotated IP");
                Ok(ip)
            }
            Err(e) => {
                self.used_ips.insert(current_ip.to_string());
                Err(e)
            }
        }
    }

    /// Remove every slot container.
    pub async fn stop_all(&self) {
        remove_fleet(self.runtime.as_ref(), &self.slots).await;
    }

    fn record(&self, result: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_provision_attempt(result);
        }
    }
}

/// Force-remove the containers of every slot in `slots`. Usable after the
/// provisioning task has been aborted.
pub async fn remove_fleet(runtime: &dyn ContainerRuntime, slots: &SlotLayout) {
    for id in slots.ids() {
        let name = slots.container_name(id);
        if let Err(e) = runtime.force_remove(&name).await {
            debug!(container = %name, error = %e, "remove on shutdown failed");
        }
    }
}
