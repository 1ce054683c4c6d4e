// ────────────────────────────────
// src/server/listener.rs
// Low‑level TCP bind shared by the front door and the status API.
// ────────────────────────────────
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub async fn bind_tcp(addr: SocketAddr) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    Ok(listener)
}
