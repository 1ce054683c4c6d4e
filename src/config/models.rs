// src/config/models.rs
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Flat process configuration. Keys line up with environment variable
/// names (`WARP_COUNT` -> `warp_count`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub redis_url: String,

    // Fleet
    pub warp_count: u32,
    pub warp_base_port: u16,
    pub proxy_kind: String,
    pub container_prefix: String,
    pub container_image: String,
    pub container_port: u16,
    pub tunnel_host: String,

    // Provisioning
    pub init_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,

    // Public IP probe
    pub probe_url: Url,
    pub probe_proxy_scheme: String,
    pub probe_timeout_secs: u64,

    // Health and load balancing
    pub health_interval_secs: u64,
    pub refresh_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub lb_port: u16,

    // Status API
    pub api_port: u16,
    pub api_auth_token: String,
    pub metrics_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6380".to_string(),
            warp_count: 2,
            warp_base_port: 40001,
            proxy_kind: "warp".to_string(),
            container_prefix: "warp".to_string(),
            container_image: "monius/docker-warp-socks:latest".to_string(),
            container_port: 9091,
            tunnel_host: "127.0.0.1".to_string(),
            init_delay_ms: 10_000,
            settle_delay_ms: 1_000,
            max_retries: 20,
            retry_delay_ms: 5_000,
            probe_url: Url::parse("https://api.ipify.org").expect("static url"),
            probe_proxy_scheme: "socks5".to_string(),
            probe_timeout_secs: 15,
            health_interval_secs: 30,
            refresh_interval_secs: 5,
            connect_timeout_secs: 10,
            lb_port: 40000,
            api_port: 8080,
            api_auth_token: "secret123".to_string(),
            metrics_path: "/metrics".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.warp_count == 0 {
            bail!("warp_count must be at least 1");
        }
        let last_port = u64::from(self.warp_base_port) + u64::from(self.warp_count) - 1;
        if last_port > u64::from(u16::MAX) {
            bail!(
                "slot ports {}..{} overflow the port range",
                self.warp_base_port,
                last_port
            );
        }
        if self.warp_base_port == 0 {
            bail!("warp_base_port must be non-zero");
        }
        if self.max_retries == 0 {
            bail!("max_retries must be at least 1");
        }
        if self.health_interval_secs == 0 || self.refresh_interval_secs == 0 {
            bail!("health and refresh intervals must be non-zero");
        }
        if self.probe_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            bail!("probe and connect timeouts must be non-zero");
        }
        Ok(())
    }

    pub fn slots(&self) -> SlotLayout {
        SlotLayout {
            count: self.warp_count,
            base_port: self.warp_base_port,
            prefix: self.container_prefix.clone(),
        }
    }

    pub fn tunnel(&self) -> TunnelConfig {
        TunnelConfig {
            kind: self.proxy_kind.clone(),
            image: self.container_image.clone(),
            container_port: self.container_port,
            host: self.tunnel_host.clone(),
            init_delay_ms: self.init_delay_ms,
            settle_delay_ms: self.settle_delay_ms,
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            delay_ms: self.retry_delay_ms,
        }
    }

    pub fn probe(&self) -> ProbeConfig {
        ProbeConfig {
            url: self.probe_url.clone(),
            proxy_scheme: self.probe_proxy_scheme.clone(),
            host: self.tunnel_host.clone(),
            timeout_secs: self.probe_timeout_secs,
        }
    }

    pub fn balancer(&self) -> BalancerConfig {
        BalancerConfig {
            port: self.lb_port,
            tunnel_host: self.tunnel_host.clone(),
            refresh_interval_secs: self.refresh_interval_secs,
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}

/// Maps fleet slots (1..=count) to container names and local ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLayout {
    pub count: u32,
    pub base_port: u16,
    pub prefix: String,
}

impl SlotLayout {
    pub fn port(&self, id: u32) -> u16 {
        (u32::from(self.base_port) + id - 1) as u16
    }

    pub fn container_name(&self, id: u32) -> String {
        format!("{}-{}", self.prefix, id)
    }

    pub fn ids(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.count
    }
}

#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub kind: String,
    pub image: String,
    pub container_port: u16,
    pub host: String,
    pub init_delay_ms: u64,
    pub settle_delay_ms: u64,
}

impl TunnelConfig {
    pub fn init_delay(&self) -> Duration {
        Duration::from_millis(self.init_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub url: Url,
    pub proxy_scheme: String,
    pub host: String,
    pub timeout_secs: u64,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct BalancerConfig {
    pub port: u16,
    pub tunnel_host: String,
    pub refresh_interval_secs: u64,
    pub connect_timeout_secs: u64,
}

impl BalancerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
