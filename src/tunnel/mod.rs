// src/tunnel/mod.rs
mod events;
mod manager;

pub use events::RegistrationHandler;
pub use manager::{remove_fleet, AttemptError, TunnelError, TunnelManager};
