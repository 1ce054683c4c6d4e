// src/tunnel/events.rs
use async_trait::async_trait;

/// Notified once per slot as soon as that slot holds a unique, live IP.
///
/// Handlers are awaited before the next slot starts provisioning, so a
/// consumer sees tunnels one at a time instead of after the whole fleet.
#[async_trait]
pub trait RegistrationHandler: Send + Sync {
    async fn on_ready(&self, id: u32, ip: &str);
}
