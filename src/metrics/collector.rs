// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Front door
    pub connections_total: IntCounterVec,
    pub active_connections: IntGauge,
    pub healthy_tunnels: IntGauge,

    // Fleet
    pub provision_attempts_total: IntCounterVec,
    pub health_checks_total: IntCounterVec,
    pub tunnel_health_status: IntGaugeVec,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let connections_total = IntCounterVec::new(
            Opts::new("pool_connections_total", "Front door connections by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(connections_total.clone()))?;

        let active_connections =
            IntGauge::new("pool_active_connections", "Connections currently relayed")?;
        registry.register(Box::new(active_connections.clone()))?;

        let healthy_tunnels =
            IntGauge::new("pool_healthy_tunnels", "Tunnels in the load balancer snapshot")?;
        registry.register(Box::new(healthy_tunnels.clone()))?;

        let provision_attempts_total = IntCounterVec::new(
            Opts::new(
                "pool_provision_attempts_total",
                "Provisioning attempts by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(provision_attempts_total.clone()))?;

        let health_checks_total = IntCounterVec::new(
            Opts::new("pool_health_checks_total", "Health probes by result"),
            &["result"],
        )?;
        registry.register(Box::new(health_checks_total.clone()))?;

        let tunnel_health_status = IntGaugeVec::new(
            Opts::new(
                "pool_tunnel_health_status",
                "Tunnel health status (1=healthy, 0=unhealthy)",
            ),
            &["slot"],
        )?;
        registry.register(Box::new(tunnel_health_status.clone()))?;

        Ok(Self {
            connections_total,
            active_connections,
            healthy_tunnels,
            provision_attempts_total,
            health_checks_total,
            tunnel_health_status,
        })
    }

    /// `outcome` is one of `relayed`, `rejected`, `upstream_failed`.
    pub fn record_connection(&self, outcome: &str) {
        self.connections_total.with_label_values(&[outcome]).inc();
    }

    pub fn increment_active_connections(&self) {
        self.active_connections.inc();
    }

    pub fn decrement_active_connections(&self) {
        self.active_connections.dec();
    }

    pub fn set_healthy_tunnels(&self, count: usize) {
        self.healthy_tunnels.set(count as i64);
    }

    /// `result` is one of `ok`, `duplicate`, `failed`.
    pub fn record_provision_attempt(&self, result: &str) {
        self.provision_attempts_total.with_label_values(&[result]).inc();
    }

    pub fn record_health_check(&self, slot: u32, healthy: bool) {
        let result = if healthy { "up" } else { "down" };
        self.health_checks_total.with_label_values(&[result]).inc();
        self.tunnel_health_status
            .with_label_values(&[&slot.to_string()])
            .set(if healthy { 1 } else { 0 });
    }
}
