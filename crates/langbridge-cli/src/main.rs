//! # langbridge broker
//!
//! Runs a langbridge broker: endpoints in any runtime connect to it,
//! register the classes they expose, and call methods on each other's
//! objects through it.
//!
//! ## Usage
//!
//! ```bash
//! # Listen on the default address (0.0.0.0:8000)
//! langbridge
//!
//! # Listen on a specific address with a smaller per-connection queue
//! langbridge -b 127.0.0.1:9000 --queue-capacity 256
//!
//! # Fail calls whose executor has not answered within a minute
//! langbridge --call-expiry-secs 60
//! ```
//!
//! Set `RUST_LOG` (e.g. `RUST_LOG=debug`) to change the log level.

use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use langbridge_broker::{BrokerConfig, BrokerServer, DEFAULT_BIND_ADDR};
use langbridge_common::transport::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_OUTBOUND_CAPACITY};

fn default_bind() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

#[derive(FromArgs, Debug)]
/// langbridge - share live objects between runtimes through one broker
struct Cli {
    /// address to listen on
    ///
    /// Defaults to "0.0.0.0:8000". Use port 0 for a random free port;
    /// the bound address is logged at startup.
    #[argh(option, short = 'b', default = "default_bind()")]
    bind: String,

    /// frames that may wait in each connection's outbound queue
    ///
    /// When a queue is full the broker waits instead of dropping frames.
    #[argh(option, default = "DEFAULT_OUTBOUND_CAPACITY")]
    queue_capacity: usize,

    /// longest accepted frame line, in bytes
    ///
    /// A connection that sends a longer line is closed.
    #[argh(option, default = "DEFAULT_MAX_FRAME_SIZE")]
    max_frame_size: usize,

    /// seconds a dispatched call may wait for its return before the
    /// caller gets a Timeout error (default: wait indefinitely)
    #[argh(option)]
    call_expiry_secs: Option<u64>,
}

impl Cli {
    fn broker_config(&self) -> BrokerConfig {
        let mut config = BrokerConfig::new(self.bind.clone()).with_outbound_capacity(self.queue_capacity);
        config.connection.max_frame_size = self.max_frame_size;
        if let Some(secs) = self.call_expiry_secs {
            config = config.with_call_expiry(Duration::from_secs(secs));
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Set default log level to INFO, but allow RUST_LOG env var to override
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if cli.queue_capacity == 0 {
        anyhow::bail!("--queue-capacity must be at least 1");
    }
    if cli.call_expiry_secs == Some(0) {
        anyhow::bail!("--call-expiry-secs must be at least 1");
    }

    tracing::info!("Starting langbridge broker on {}", cli.bind);
    let server = BrokerServer::bind(cli.broker_config())
        .await
        .context("failed to start broker")?;
    let handle = server.spawn()?;
    tracing::info!("Broker ready on {}", handle.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    tracing::info!("Shutting down");
    handle.stop().await?;
    Ok(())
}
