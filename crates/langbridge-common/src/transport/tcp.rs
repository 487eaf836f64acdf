use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};

use crate::protocol::error::{BridgeError, Result};

/// Default timeout for establishing a connection (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to a broker.
///
/// Resolves `addr` (which may yield several socket addresses) and tries
/// each until one accepts within `timeout`. Nagle is disabled on the
/// resulting stream since every frame is a small, latency-sensitive line.
///
/// # Errors
///
/// Returns `Connection` if the address does not resolve or every
/// resolved address refuses or times out.
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let socket_addrs = lookup_host(addr)
        .await
        .map_err(|e| BridgeError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

    let mut last_err = None;
    for socket_addr in socket_addrs {
        match tokio::time::timeout(timeout, TcpStream::connect(socket_addr)).await {
            Ok(Ok(stream)) => {
                stream
                    .set_nodelay(true)
                    .map_err(|e| BridgeError::Connection(format!("Failed to set TCP_NODELAY: {}", e)))?;
                return Ok(stream);
            }
            Ok(Err(e)) => last_err = Some(e.to_string()),
            Err(_) => last_err = Some(format!("timed out after {}ms", timeout.as_millis())),
        }
    }

    Err(BridgeError::Connection(format!(
        "Failed to connect to {}: {}",
        addr,
        last_err.unwrap_or_else(|| "address resolved to nothing".to_string())
    )))
}
