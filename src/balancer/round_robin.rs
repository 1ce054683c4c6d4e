// src/balancer/round_robin.rs
use super::TunnelSelector;
use crate::store::ProxyState;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct RoundRobinSelector {
    counter: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl TunnelSelector for RoundRobinSelector {
    fn select(&self, tunnels: &[ProxyState]) -> Option<ProxyState> {
        if tunnels.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % tunnels.len();
        Some(tunnels[index].clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
