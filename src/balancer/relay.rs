// src/balancer/relay.rs
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("No healthy proxies available")]
    NoHealthyTunnel,

    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("relay I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which side finished first and how many bytes it carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    ClientClosed { bytes: u64 },
    TunnelClosed { bytes: u64 },
}

pub async fn connect_upstream(addr: &str, connect_timeout: Duration) -> Result<TcpStream, RelayError> {
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            stream.set_nodelay(true).ok();
            Ok(stream)
        }
        Ok(Err(source)) => Err(RelayError::Connect {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(RelayError::ConnectTimeout(addr.to_string())),
    }
}

/// Copy bytes both ways and return as soon as either direction reaches
/// EOF or fails. Both sockets are closed on return; the other direction is
/// not drained.
pub async fn relay(client: TcpStream, upstream: TcpStream) -> Result<RelayOutcome, RelayError> {
    let (mut client_read, mut client_write) = client.into_split();
    let (mut upstream_read, mut upstream_write) = upstream.into_split();

    tokio::select! {
        res = tokio::io::copy(&mut client_read, &mut upstream_write) => {
            Ok(RelayOutcome::ClientClosed { bytes: res? })
        }
        res = tokio::io::copy(&mut upstream_read, &mut client_write) => {
            Ok(RelayOutcome::TunnelClosed { bytes: res? })
        }
    }
}
