use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::error::{BridgeError, Result};
use crate::protocol::frames::Frame;
use crate::transport::codec::FrameCodec;

/// Default number of frames that may wait in an outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

/// Default maximum length of one frame line (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Per-connection channel settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Capacity of the outbound queue
    ///
    /// Producers wait when the queue is full; frames are never dropped.
    /// Default: 1024
    pub outbound_capacity: usize,
    /// Maximum length of a single frame line in bytes
    ///
    /// Longer lines are rejected as malformed.
    /// Default: 16 MB
    pub max_frame_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Producer side of a connection's outbound queue.
///
/// Cloning is cheap; every clone feeds the same writer task, and frames
/// are written in the order they were enqueued.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Frame>,
}

/// Reserved slot in an outbound queue.
pub type OutboundPermit<'a> = mpsc::Permit<'a, Frame>;

impl Outbound {
    /// Creates a bounded queue, returning the producer handle and the
    /// receiver a writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueues a frame, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionLost` if the writer side has gone away.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| BridgeError::ConnectionLost("outbound queue closed".to_string()))
    }

    /// Reserves one slot, waiting while the queue is full.
    ///
    /// Lets a caller commit state and enqueue the matching frame without
    /// any chance of the send failing in between.
    pub async fn reserve(&self) -> Result<OutboundPermit<'_>> {
        self.tx
            .reserve()
            .await
            .map_err(|_| BridgeError::ConnectionLost("outbound queue closed".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Decodes frames from a line-oriented byte stream, one line at a time.
pub struct FrameReader<R> {
    inner: R,
    max_frame_size: usize,
    line: String,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            max_frame_size,
            line: String::new(),
        }
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` on a clean end of stream. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// - `MalformedFrame` if the line does not decode, is not UTF-8, or
    ///   exceeds the configured maximum size
    /// - `ConnectionLost` / `Io` if reading the stream fails
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            self.line.clear();
            // Room for the line terminator on top of the payload limit
            let limit = (self.max_frame_size as u64).saturating_add(2);
            let read = (&mut self.inner)
                .take(limit)
                .read_line(&mut self.line)
                .await
                .map_err(|e| map_io_error(e, "reading frame"))?;

            if read == 0 {
                return Ok(None);
            }

            if !self.line.ends_with('\n') && read as u64 >= limit {
                return Err(BridgeError::MalformedFrame(format!(
                    "frame exceeds {} bytes",
                    self.max_frame_size
                )));
            }

            if self.line.trim().is_empty() {
                continue;
            }

            return FrameCodec::decode(&self.line).map(Some);
        }
    }
}

/// Drains `rx` into `writer`, one line per frame, until every producer is dropped.
pub async fn write_frames<W>(mut writer: W, mut rx: mpsc::Receiver<Frame>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let mut line = match FrameCodec::encode(&frame) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Dropping unencodable {:?} frame: {}", frame.opcode(), e);
                continue;
            }
        };
        line.push('\n');

        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| map_io_error(e, "writing frame"))?;
        writer
            .flush()
            .await
            .map_err(|e| map_io_error(e, "flushing stream"))?;
    }

    let _ = writer.shutdown().await;
    Ok(())
}

/// Spawns a writer task draining `rx` into `writer`.
pub fn spawn_writer<W>(writer: W, rx: mpsc::Receiver<Frame>) -> JoinHandle<Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let result = write_frames(writer, rx).await;
        if let Err(e) = &result {
            tracing::debug!("Writer task stopped: {}", e);
        }
        result
    })
}

/// One connection's duplex message pump: a frame reader for the inbound
/// half and a writer task fed by a bounded outbound queue.
///
/// The reader is driven by whoever owns the channel; the writer runs in
/// its own task and exits once every [`Outbound`] clone is dropped.
pub struct ConnectionChannel<R> {
    pub reader: FrameReader<BufReader<R>>,
    pub outbound: Outbound,
    pub writer: JoinHandle<Result<()>>,
}

impl<R: AsyncRead + Unpin> ConnectionChannel<R> {
    /// Builds a channel over separate read and write halves.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<W>(read: R, write: W, config: &ConnectionConfig) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, rx) = Outbound::channel(config.outbound_capacity);
        let writer = spawn_writer(write, rx);

        Self {
            reader: FrameReader::new(BufReader::new(read), config.max_frame_size),
            outbound,
            writer,
        }
    }
}

impl ConnectionChannel<OwnedReadHalf> {
    pub fn from_tcp(stream: TcpStream, config: &ConnectionConfig) -> Self {
        let (read, write) = stream.into_split();
        Self::new(read, write, config)
    }
}

/// Maps IO errors to protocol errors.
///
/// - Peer went away -> `ConnectionLost`
/// - Invalid UTF-8 on the wire -> `MalformedFrame`
/// - Anything else -> `Io`
pub fn map_io_error(err: std::io::Error, context: &str) -> BridgeError {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::UnexpectedEof => {
            BridgeError::ConnectionLost(format!("{}: {}", context, err))
        }
        std::io::ErrorKind::InvalidData => {
            BridgeError::MalformedFrame(format!("{}: {}", context, err))
        }
        _ => BridgeError::Io(err),
    }
}
