// src/runtime/probe.rs
use super::RuntimeError;
use crate::config::ProbeConfig;
use reqwest::{Client, Proxy};
use tokio::time::timeout;

/// Asks an IP echo service which address a tunnel egresses from.
#[derive(Debug, Clone)]
pub struct IpProbe {
    config: ProbeConfig,
}

impl IpProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn proxy_url(&self, port: u16) -> String {
        format!("{}://{}:{}", self.config.proxy_scheme, self.config.host, port)
    }

    pub async fn probe(&self, port: u16) -> Result<String, RuntimeError> {
        let client = Client::builder()
            .proxy(Proxy::all(self.proxy_url(port))?)
            .timeout(self.config.timeout())
            .build()?;

        let response = timeout(
            self.config.timeout(),
            client.get(self.config.url.clone()).send(),
        )
        .await
        .map_err(|_| RuntimeError::ProbeTimeout)??;

        let status = response.status();
        if !status.is_success() {
            return Err(RuntimeError::ProbeStatus(status.as_u16()));
        }

        let body = response.text().await?;
        let ip = body.trim();
        if ip.is_empty() {
            return Err(RuntimeError::EmptyIp);
        }
        Ok(ip.to_string())
    }
}
