// src/runtime/docker.rs
use super::{ContainerRuntime, IpProbe, RuntimeError};
use crate::config::TunnelConfig;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Drives the `docker` CLI. One container per slot, published on the slot port.
pub struct DockerRuntime {
    binary: String,
    config: TunnelConfig,
    probe: IpProbe,
}

impl DockerRuntime {
    pub fn new(config: TunnelConfig, probe: IpProbe) -> Self {
        Self {
            binary: "docker".to_string(),
            config,
            probe,
        }
    }

    pub fn run_args(&self, name: &str, port: u16) -> Vec<String> {
        vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            name.into(),
            "--cap-add".into(),
            "NET_ADMIN".into(),
            "--sysctl".into(),
            "net.ipv6.conf.all.disable_ipv6=0".into(),
            "-p".into(),
            format!("{}:{}", port, self.config.container_port),
            self.config.image.clone(),
        ]
    }

    pub fn remove_args(name: &str) -> Vec<String> {
        vec!["rm".into(), "-f".into(), "-v".into(), name.into()]
    }

    async fn exec(&self, args: &[String]) -> Result<String, RuntimeError> {
        debug!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary).args(args).output().await?;

        if !output.status.success() {
            let mut text = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if text.is_empty() {
                text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            return Err(RuntimeError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                output: text,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn start(&self, name: &str, port: u16) -> Result<(), RuntimeError> {
        let id = self.exec(&self.run_args(name, port)).await?;
        debug!(container = name, %id, port, "container started");
        Ok(())
    }

    async fn force_remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.exec(&Self::remove_args(name)).await.map(|_| ())
    }

    async fn probe_public_ip(&self, port: u16) -> Result<String, RuntimeError> {
        self.probe.probe(port).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn runtime() -> DockerRuntime {
        let config = Config::default();
        DockerRuntime::new(config.tunnel(), IpProbe::new(config.probe()))
    }

    #[test]
    fn test_run_args_publish_slot_port() {
        let args = runtime().run_args("warp-3", 40003);
        let publish = args.iter().position(|a| a == "-p").unwrap();
        assert_eq!(args[publish + 1], "40003:9091");
        assert_eq!(args.last().unwrap(), "monius/docker-warp-socks:latest");
        assert!(args.windows(2).any(|w| w[0] == "--name" && w[1] == "warp-3"));
        assert!(args.windows(2).any(|w| w[0] == "--cap-add" && w[1] == "NET_ADMIN"));
    }

    #[test]
    fn test_remove_drops_volumes() {
        assert_eq!(DockerRuntime::remove_args("warp-1"), vec!["rm", "-f", "-v", "warp-1"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let mut runtime = runtime();
        runtime.binary = "/nonexistent/docker".to_string();
        let err = runtime.force_remove("warp-1").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn(_)));
    }
}
