// src/runtime/mod.rs
mod docker;
mod probe;

pub use docker::DockerRuntime;
pub use probe::IpProbe;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("`{command}` failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("failed to spawn runtime command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("probe request failed: {0}")]
    Probe(#[from] reqwest::Error),

    #[error("probe returned HTTP {0}")]
    ProbeStatus(u16),

    #[error("probe timed out")]
    ProbeTimeout,

    #[error("empty IP response")]
    EmptyIp,
}

/// Starts, removes and probes process-isolated tunnel instances.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a tunnel named `name` listening on local `port`.
    async fn start(&self, name: &str, port: u16) -> Result<(), RuntimeError>;

    /// Remove the instance and its volumes, whether running or not.
    async fn force_remove(&self, name: &str) -> Result<(), RuntimeError>;

    /// External IP seen through the tunnel on `port`. Never returns an empty string.
    async fn probe_public_ip(&self, port: u16) -> Result<String, RuntimeError>;
}
