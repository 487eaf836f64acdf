use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use langbridge_common::protocol::error::{BridgeError, Result};
use langbridge_common::transport::{ConnectionChannel, ConnectionConfig};

use crate::broker::Broker;
use crate::config::BrokerConfig;

/// Shortest interval between sweeps for expired calls.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(10);

/// TCP front end of a [`Broker`].
///
/// Accepts endpoint connections and gives each one a reader loop (this
/// module) and a writer task (from `langbridge_common::transport`). The
/// reader decodes one frame at a time and hands it to the broker before
/// reading the next, so frames from one endpoint are processed in order.
pub struct BrokerServer {
    listener: TcpListener,
    broker: Arc<Broker>,
    config: BrokerConfig,
}

impl BrokerServer {
    /// Binds the listen socket.
    ///
    /// # Arguments
    /// * `config` - Listen address and per-connection limits
    ///
    /// # Example
    /// ```no_run
    /// # use langbridge_broker::{BrokerConfig, BrokerServer};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let server = BrokerServer::bind(BrokerConfig::new("127.0.0.1:8000")).await?;
    /// let handle = server.spawn()?;
    /// // ...
    /// handle.stop().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn bind(config: BrokerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await.map_err(|e| {
            BridgeError::Connection(format!("Failed to bind to {}: {}", config.bind_addr, e))
        })?;

        Ok(Self {
            listener,
            broker: Arc::new(Broker::new().with_call_expiry(config.call_expiry)),
            config,
        })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| BridgeError::Connection(format!("Failed to get local addr: {}", e)))
    }

    pub fn broker(&self) -> Arc<Broker> {
        Arc::clone(&self.broker)
    }

    /// Serves connections until `shutdown` turns true or its sender is dropped.
    ///
    /// On the way out every connection is closed and all session state
    /// is discarded.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut connections = JoinSet::new();
        info!("Broker listening on {}", self.local_addr()?);

        let sweep_period = self
            .config
            .call_expiry
            .map(|expiry| (expiry / 2).max(MIN_SWEEP_PERIOD));
        let mut sweep = tokio::time::interval(sweep_period.unwrap_or(MIN_SWEEP_PERIOD));
        // At most one sweep runs at a time; notifying a slow requester may wait
        let mut sweeps = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    connections.spawn(serve_connection(
                        Arc::clone(&self.broker),
                        stream,
                        peer_addr,
                        self.config.connection.clone(),
                        shutdown.clone(),
                    ));
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = sweep.tick(), if sweep_period.is_some() && sweeps.is_empty() => {
                    let broker = Arc::clone(&self.broker);
                    sweeps.spawn(async move { broker.expire_calls().await });
                }
                Some(_) = sweeps.join_next(), if !sweeps.is_empty() => {}
                _ = stopped(&mut shutdown) => break,
            }
        }

        info!("Broker stopping, closing {} connections", connections.len());
        drop(self.listener);
        sweeps.shutdown().await;
        while connections.join_next().await.is_some() {}
        self.broker.clear().await;
        Ok(())
    }

    /// Runs the server on a background task.
    pub fn spawn(self) -> Result<ServerHandle> {
        let local_addr = self.local_addr()?;
        let broker = self.broker();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));

        Ok(ServerHandle {
            local_addr,
            broker,
            shutdown,
            task,
        })
    }
}

/// Handle to a running broker server.
///
/// Dropping the handle also stops the server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    broker: Arc<Broker>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn broker(&self) -> Arc<Broker> {
        Arc::clone(&self.broker)
    }

    /// Stops accepting, closes every connection and waits for the server to finish.
    pub async fn stop(self) -> Result<()> {
        // Receiver may already be gone if the server task ended on its own
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| BridgeError::Connection(format!("Broker task failed: {}", e)))?
    }
}

/// Resolves once a stop has been requested.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Runs `future` unless a stop is requested first, in which case it is dropped.
async fn until_stopped<F: Future>(
    shutdown: &mut watch::Receiver<bool>,
    future: F,
) -> Option<F::Output> {
    tokio::select! {
        output = future => Some(output),
        _ = stopped(shutdown) => None,
    }
}

async fn serve_connection(
    broker: Arc<Broker>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: ConnectionConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
    }

    let ConnectionChannel {
        mut reader,
        outbound,
        mut writer,
    } = ConnectionChannel::from_tcp(stream, &config);
    let id = broker.connect(outbound).await;
    info!("Endpoint {} connected from {}", id, peer_addr);

    // Every await below gives way to a stop, including a dispatch waiting on a full queue
    let stopping = loop {
        let Some(frame) = until_stopped(&mut shutdown, reader.next_frame()).await else {
            break true;
        };
        match frame {
            Ok(Some(frame)) => {
                if until_stopped(&mut shutdown, broker.handle_frame(id, frame))
                    .await
                    .is_none()
                {
                    break true;
                }
            }
            Ok(None) => {
                info!("Endpoint {} closed the connection", id);
                break false;
            }
            Err(BridgeError::MalformedFrame(e)) => {
                warn!("Endpoint {} sent a malformed frame, closing: {}", id, e);
                break false;
            }
            Err(e) => {
                warn!("Endpoint {} connection failed: {}", id, e);
                break false;
            }
        }
    };

    // A stopping server discards all session state itself
    let mut drained = None;
    if !stopping && until_stopped(&mut shutdown, broker.disconnect(id)).await.is_some() {
        // The writer drains whatever is queued, then closes its half
        drained = until_stopped(&mut shutdown, &mut writer).await;
    }
    let joined = match drained {
        Some(joined) => joined,
        None => {
            writer.abort();
            writer.await
        }
    };
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Writer task for endpoint {} panicked: {}", id, e);
        }
    }
}
