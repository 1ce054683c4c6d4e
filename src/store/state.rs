// src/store/state.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted state of one fleet slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyState {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub port: u16,
    #[serde(rename = "ip")]
    pub public_ip: String,
    pub healthy: bool,
    pub last_check: DateTime<Utc>,
}

impl ProxyState {
    /// Placeholder for a slot that has no record yet.
    pub fn empty(id: u32) -> Self {
        Self {
            id,
            kind: String::new(),
            port: 0,
            public_ip: String::new(),
            healthy: false,
            last_check: Utc::now(),
        }
    }

    /// Apply a health verdict. An unhealthy slot never keeps an address.
    pub fn mark(&mut self, healthy: bool, ip: &str) {
        self.healthy = healthy && !ip.is_empty();
        self.public_ip = if self.healthy { ip.to_string() } else { String::new() };
        self.last_check = Utc::now();
    }
}
