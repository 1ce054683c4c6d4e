// src/balancer/front_door.rs
use super::relay::{connect_upstream, relay, RelayError, RelayOutcome};
use super::{RoundRobinSelector, TunnelSelector};
use crate::config::BalancerConfig;
use crate::metrics::MetricsCollector;
use crate::registry::ProxyRegistry;
use crate::server::bind_tcp;
use crate::store::ProxyState;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum BalancerError {
    #[error("load balancer cannot start from state {0:?}")]
    InvalidState(BalancerState),

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct BalancerStats {
    pub healthy_count: usize,
    pub port: u16,
    pub state: BalancerState,
}

/// The front door: one TCP listener relaying each client to a healthy
/// tunnel picked round robin from a periodically refreshed snapshot.
pub struct LoadBalancer {
    config: BalancerConfig,
    registry: Arc<ProxyRegistry>,
    selector: Arc<dyn TunnelSelector>,
    snapshot: RwLock<Arc<[ProxyState]>>,
    state: Mutex<BalancerState>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    local_addr: OnceLock<SocketAddr>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl LoadBalancer {
    pub fn new(config: BalancerConfig, registry: Arc<ProxyRegistry>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let empty: Vec<ProxyState> = Vec::new();

        Self {
            config,
            registry,
            selector: Arc::new(RoundRobinSelector::new()),
            snapshot: RwLock::new(empty.into()),
            state: Mutex::new(BalancerState::Created),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            local_addr: OnceLock::new(),
            metrics: None,
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn TunnelSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn state(&self) -> BalancerState {
        *self.state.lock().await
    }

    /// Address actually bound, once running. Differs from the configured
    /// port when that port is 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Load the snapshot, bind the front door and spawn the refresh and
    /// accept loops.
    pub async fn start(self: &Arc<Self>) -> Result<(), BalancerError> {
        let mut state = self.state.lock().await;
        if *state != BalancerState::Created {
            return Err(BalancerError::InvalidState(*state));
        }

        // Fill the snapshot first so early clients are not rejected.
        self.refresh().await;

        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let listener = match bind_tcp(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                *state = BalancerState::Stopped;
                return Err(BalancerError::Bind { addr, source });
            }
        };
        if let Ok(bound) = listener.local_addr() {
            let _ = self.local_addr.set(bound);
        }

        let refresher = tokio::spawn(self.clone().refresh_loop(self.shutdown_tx.subscribe()));
        let acceptor = tokio::spawn(self.clone().accept_loop(listener, self.shutdown_tx.subscribe()));
        self.tasks.lock().await.extend([refresher, acceptor]);

        *state = BalancerState::Running;
        info!(
            "Load balancer started on {} (selector: {}, cache refresh: {:?})",
            self.local_addr().unwrap_or(addr),
            self.selector.name(),
            self.config.refresh_interval()
        );
        Ok(())
    }

    /// Stop both loops and close the listener. Relays already in flight run
    /// until their sockets close.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        match *state {
            BalancerState::Running => {}
            BalancerState::Created => {
                *state = BalancerState::Stopped;
                return;
            }
            BalancerState::Stopping | BalancerState::Stopped => return,
        }

        info!("Load balancer stopping...");
        *state = BalancerState::Stopping;
        let _ = self.shutdown_tx.send(true);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in futures::future::join_all(tasks).await {
            if let Err(e) = task {
                warn!(error = %e, "load balancer task ended abnormally");
            }
        }

        *state = BalancerState::Stopped;
        info!("Load balancer stopped");
    }

    /// Replace the cached healthy set. Returns the new size.
    pub async fn refresh(&self) -> usize {
        let tunnels: Arc<[ProxyState]> = self.registry.list_healthy().await.into();
        let count = tunnels.len();

        let previous = {
            let mut snapshot = self.snapshot.write().await;
            std::mem::replace(&mut *snapshot, tunnels).len()
        };

        if let Some(metrics) = &self.metrics {
            metrics.set_healthy_tunnels(count);
        }
        if count != previous {
            info!("Cache refreshed: {} healthy proxies", count);
        }
        count
    }

    pub async fn next_tunnel(&self) -> Option<ProxyState> {
        let snapshot = self.snapshot.read().await;
        self.selector.select(&snapshot)
    }

    pub async fn stats(&self) -> BalancerStats {
        BalancerStats {
            healthy_count: self.snapshot.read().await.len(),
            port: self.local_addr().map(|a| a.port()).unwrap_or(self.config.port),
            state: self.state().await,
        }
    }

    async fn refresh_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.refresh_interval();
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("refresh loop exiting");
                        break;
                    }
                }
            }
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let lb = self.clone();
                        tokio::spawn(async move {
                            lb.handle_connection(stream, peer).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        sleep(Duration::from_millis(50)).await;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("accept loop exiting");
                        break;
                    }
                }
            }
        }
        // Listener is dropped here, which closes the front door.
    }

    async fn handle_connection(&self, client: TcpStream, peer: SocketAddr) {
        let conn_id = Uuid::new_v4();
        let span = info_span!("relay", %conn_id, %peer);

        async move {
            match self.serve(client).await {
                Ok(outcome) => debug!(?outcome, "connection finished"),
                Err(RelayError::NoHealthyTunnel) => {
                    warn!("No healthy proxies available");
                    self.record("rejected");
                }
                Err(e) => warn!(error = %e, "relay failed"),
            }
        }
        .instrument(span)
        .await
    }

    async fn serve(&self, client: TcpStream) -> Result<RelayOutcome, RelayError> {
        // No tunnel means the client is dropped without touching upstream.
        let tunnel = self.next_tunnel().await.ok_or(RelayError::NoHealthyTunnel)?;
        let addr = format!("{}:{}", self.config.tunnel_host, tunnel.port);
        debug!(slot = tunnel.id, %addr, "selected tunnel");

        let upstream = match connect_upstream(&addr, self.config.connect_timeout()).await {
            Ok(upstream) => upstream,
            Err(e) => {
                self.record("upstream_failed");
                return Err(e);
            }
        };

        self.record("relayed");
        if let Some(metrics) = &self.metrics {
            metrics.increment_active_connections();
        }
        let result = relay(client, upstream).await;
        if let Some(metrics) = &self.metrics {
            metrics.decrement_active_connections();
        }
        result
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_connection(outcome);
        }
    }
}
