// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tunnel_pool::config::Config;
use tunnel_pool::registry::ProxyRegistry;
use tunnel_pool::runtime::{ContainerRuntime, RuntimeError};
use tunnel_pool::store::{MemoryStore, ProxyStore};

/// Container runtime whose probes answer from a per-port script.
/// An exhausted script probes as a timeout.
#[derive(Default)]
pub struct FakeRuntime {
    probes: Mutex<HashMap<u16, VecDeque<Option<String>>>>,
    pub started: Mutex<Vec<(String, u16)>>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, port: u16, ip: &str) {
        self.push(port, Some(ip.to_string()));
    }

    pub fn time_out(&self, port: u16) {
        self.push(port, None);
    }

    fn push(&self, port: u16, result: Option<String>) {
        self.probes
            .lock()
            .unwrap()
            .entry(port)
            .or_default()
            .push_back(result);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn start(&self, name: &str, port: u16) -> Result<(), RuntimeError> {
        self.started.lock().unwrap().push((name.to_string(), port));
        Ok(())
    }

    async fn force_remove(&self, _name: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn probe_public_ip(&self, port: u16) -> Result<String, RuntimeError> {
        let next = self
            .probes
            .lock()
            .unwrap()
            .get_mut(&port)
            .and_then(|q| q.pop_front());
        match next {
            Some(Some(ip)) => Ok(ip),
            _ => Err(RuntimeError::ProbeTimeout),
        }
    }
}

/// Config with no provisioning delays and the given fleet layout.
pub fn test_config(count: u32, base_port: u16) -> Config {
    let mut config = Config::default();
    config.warp_count = count;
    config.warp_base_port = base_port;
    config.init_delay_ms = 0;
    config.settle_delay_ms = 0;
    config.retry_delay_ms = 1;
    config.max_retries = 3;
    config.lb_port = 0;
    config.connect_timeout_secs = 2;
    config.refresh_interval_secs = 1;
    config
}

pub fn registry(config: &Config) -> Arc<ProxyRegistry> {
    let store = ProxyStore::new(Arc::new(MemoryStore::new()));
    Arc::new(ProxyRegistry::new(store, config.slots(), config.proxy_kind.clone()))
}

/// Bind `n` listeners on consecutive loopback ports.
pub async fn bind_consecutive(n: u16) -> Vec<TcpListener> {
    'search: loop {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = first.local_addr().unwrap().port();
        if base > u16::MAX - n {
            continue;
        }
        let mut listeners = vec![first];
        for offset in 1..n {
            match TcpListener::bind(("127.0.0.1", base + offset)).await {
                Ok(listener) => listeners.push(listener),
                Err(_) => continue 'search,
            }
        }
        return listeners;
    }
}

/// Echo every byte back until the peer closes.
pub fn spawn_echo(listener: TcpListener) -> SocketAddr {
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// Write `tag` to each connection, then close it.
pub fn spawn_tagger(listener: TcpListener, tag: &'static str) -> SocketAddr {
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(tag.as_bytes()).await;
        }
    });
    addr
}

/// Loopback address for a balancer bound on 0.0.0.0.
pub fn loopback(addr: SocketAddr) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], addr.port()))
}
