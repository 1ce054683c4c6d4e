// src/main.rs
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use tunnel_pool::{
    balancer::LoadBalancer,
    config,
    metrics::MetricsRegistry,
    registry::{HealthChecker, ProxyRegistry},
    runtime::{ContainerRuntime, DockerRuntime, IpProbe},
    server::{ServerBuilder, StatusHandler},
    store::{ProxyStore, RedisStore},
    tunnel::{remove_fleet, TunnelManager},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tunnel_pool=info".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("POOL_CONFIG").ok());
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path);
    }
    let config = config::load_config(config_path.as_deref())?;
    info!("Starting tunnel pool with {} tunnels", config.warp_count);

    // Initialize metrics
    let metrics_registry = Arc::new(MetricsRegistry::new()?);
    let metrics = metrics_registry.collector();

    // The store must be reachable before anything else starts.
    let redis = RedisStore::connect(&config.redis_url)
        .await
        .context("Redis connection failed")?;
    let store = ProxyStore::new(Arc::new(redis));

    let registry = Arc::new(
        ProxyRegistry::new(store, config.slots(), config.proxy_kind.clone())
            .with_metrics(metrics.clone()),
    );

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::new(
        config.tunnel(),
        IpProbe::new(config.probe()),
    ));

    // Each slot registers as soon as it is up.
    let mut manager = TunnelManager::new(
        config.slots(),
        config.tunnel(),
        config.retry(),
        runtime.clone(),
    )
    .with_metrics(metrics.clone());
    manager.subscribe(registry.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Front door before provisioning, so tunnels are used as they appear.
    let balancer = Arc::new(
        LoadBalancer::new(config.balancer(), registry.clone()).with_metrics(metrics.clone()),
    );
    balancer.start().await.context("Load balancer failed to start")?;

    // Status API
    let handler = StatusHandler::new(registry.clone(), &config.api_auth_token)
        .with_balancer(balancer.clone())
        .with_metrics(metrics_registry, &config.metrics_path);
    let api_addr: SocketAddr = ([0, 0, 0, 0], config.api_port).into();
    let api = tokio::spawn(
        ServerBuilder::new(api_addr)
            .with_handler(handler)
            .with_shutdown(shutdown_rx.clone())
            .serve(),
    );

    // Health checker
    let checker = Arc::new(HealthChecker::new(
        registry.clone(),
        runtime.clone(),
        config.health_interval(),
    ));
    let health = tokio::spawn(checker.start(shutdown_rx.clone()));

    info!(
        "LB (:{}) and API (:{}) ready. Starting tunnels in background...",
        config.lb_port, config.api_port
    );
    let provisioning = tokio::spawn(async move {
        manager.provision_all().await;
        manager
    });

    shutdown_signal().await;
    info!("Shutting down...");

    let _ = shutdown_tx.send(true);
    balancer.stop().await;

    if !provisioning.is_finished() {
        warn!("Provisioning still running, aborting it");
        provisioning.abort();
    }
    match provisioning.await {
        Ok(manager) => manager.stop_all().await,
        Err(_) => remove_fleet(runtime.as_ref(), &config.slots()).await,
    }

    if let Err(e) = health.await {
        error!("Health checker task failed: {}", e);
    }
    match api.await {
        Ok(Err(e)) => error!("Status API error: {:#}", e),
        Err(e) => error!("Status API task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Goodbye!");
    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
