// src/balancer/mod.rs
mod algorithm;
mod front_door;
mod relay;
mod round_robin;

pub use algorithm::TunnelSelector;
pub use front_door::{BalancerError, BalancerState, BalancerStats, LoadBalancer};
pub use relay::{connect_upstream, relay, RelayError, RelayOutcome};
pub use round_robin::RoundRobinSelector;
