// src/lib.rs
pub mod balancer;
pub mod config;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod server;
pub mod store;
pub mod tunnel;
