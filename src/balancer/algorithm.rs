// src/balancer/algorithm.rs
use crate::store::ProxyState;

/// Picks the tunnel for the next client connection from a healthy snapshot.
pub trait TunnelSelector: Send + Sync {
    fn select(&self, tunnels: &[ProxyState]) -> Option<ProxyState>;

    fn name(&self) -> &'static str;
}
