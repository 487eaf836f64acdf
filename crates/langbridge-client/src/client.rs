use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufRead;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use langbridge_common::protocol::error::{BridgeError, Result};
use langbridge_common::protocol::{
    Argument, ClassDescriptor, ErrorKind, Frame, RemoteError, ReturnValue, NO_RETURN,
};
use langbridge_common::transport::{
    connect, ConnectionChannel, ConnectionConfig, FrameReader, Outbound, DEFAULT_CONNECT_TIMEOUT,
};

use crate::correlator::ReturnCorrelator;
use crate::host::ObjectHost;

/// Configuration for a [`BridgeClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Overload matching for classes this endpoint registers
    ///
    /// Strict matching compares every argument tag; loose matching only
    /// compares argument counts.
    /// Default: true
    pub strict_types: bool,
    /// How long `call_method` waits for a Return
    ///
    /// Default: None (wait until the connection closes)
    pub call_timeout: Option<Duration>,
    /// How many unsolicited errors wait for [`BridgeClient::next_error`]
    ///
    /// Further errors are logged and dropped while the queue is full.
    /// Default: 64
    pub error_queue_capacity: usize,
    /// Outbound queue and frame limits
    pub connection: ConnectionConfig,
}

/// Default number of unsolicited errors kept for `next_error`.
pub const DEFAULT_ERROR_QUEUE_CAPACITY: usize = 64;

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            strict_types: true,
            call_timeout: None,
            error_queue_capacity: DEFAULT_ERROR_QUEUE_CAPACITY,
            connection: ConnectionConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_strict_types(mut self, strict_types: bool) -> Self {
        self.strict_types = strict_types;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

/// Aborts the background tasks when the client goes away.
struct TaskGuard {
    reader: JoinHandle<()>,
    executor: JoinHandle<()>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.reader.abort();
        self.executor.abort();
    }
}

/// One endpoint's connection to the broker.
///
/// The client both issues requests (register, create, call) and serves
/// the instructions the broker forwards to the classes it registered,
/// through the [`ObjectHost`] it was given.
///
/// Three tasks run per client: a reader that completes waiting calls and
/// queues instructions, an executor that runs those instructions on the
/// host in arrival order, and a writer draining the outbound queue.
/// Calls may be issued concurrently from any number of tasks; each one
/// waits only for its own Return.
///
/// # Example
///
/// ```no_run
/// # use langbridge_client::{BridgeClient, ClientConfig, ObjectTable};
/// # use langbridge_common::protocol::Argument;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = BridgeClient::connect("127.0.0.1:8000", ObjectTable::new(), ClientConfig::default()).await?;
/// client.create_object("Calculator", "calc", vec![]).await?;
/// let sum = client.call_method("calc", "add", vec![Argument::from(2), Argument::from(3)]).await?;
/// assert_eq!(sum.parse::<i64>()?, 5);
/// # Ok(())
/// # }
/// ```
pub struct BridgeClient {
    outbound: Outbound,
    correlator: Arc<ReturnCorrelator>,
    errors: Mutex<mpsc::Receiver<RemoteError>>,
    call_timeout: Option<Duration>,
    writer: JoinHandle<Result<()>>,
    tasks: TaskGuard,
}

impl BridgeClient {
    /// Connects to the broker at `addr` and announces this endpoint.
    ///
    /// # Arguments
    /// * `addr` - Broker address (e.g., "127.0.0.1:8000")
    /// * `host` - Executes instructions for the classes this endpoint registers
    /// * `config` - Strictness, call timeout and queue limits
    pub async fn connect<H: ObjectHost>(addr: &str, host: H, config: ClientConfig) -> Result<Self> {
        let stream = connect(addr, DEFAULT_CONNECT_TIMEOUT).await?;
        let ConnectionChannel {
            reader,
            outbound,
            writer,
        } = ConnectionChannel::from_tcp(stream, &config.connection);

        outbound.send(Frame::init(config.strict_types)).await?;
        info!("Connected to broker at {} (strict types: {})", addr, config.strict_types);

        let correlator = Arc::new(ReturnCorrelator::new());
        let (instructions_tx, instructions_rx) = mpsc::channel(config.connection.outbound_capacity.max(1));
        let (errors_tx, errors_rx) = mpsc::channel(config.error_queue_capacity.max(1));

        let executor = tokio::spawn(run_executor(host, instructions_rx, outbound.clone()));
        let reader = tokio::spawn(run_reader(
            reader,
            Arc::clone(&correlator),
            instructions_tx,
            errors_tx,
        ));

        Ok(Self {
            outbound,
            correlator,
            errors: Mutex::new(errors_rx),
            call_timeout: config.call_timeout,
            writer,
            tasks: TaskGuard { reader, executor },
        })
    }

    /// Registers a class this endpoint hosts.
    ///
    /// Rejections (e.g. a duplicate name) arrive later through
    /// [`next_error`](Self::next_error).
    pub async fn register_class(&self, descriptor: ClassDescriptor) -> Result<()> {
        debug!("Registering class '{}'", descriptor.name);
        self.outbound.send(Frame::RegisterClass(descriptor)).await
    }

    /// Asks the broker to create `var_name`, an object of `class_name`,
    /// on whichever endpoint registered the class.
    ///
    /// Rejections arrive later through [`next_error`](Self::next_error).
    pub async fn create_object(
        &self,
        class_name: impl Into<String>,
        var_name: impl Into<String>,
        arguments: Vec<Argument>,
    ) -> Result<()> {
        self.outbound
            .send(Frame::create_object(class_name, var_name, arguments))
            .await
    }

    /// Calls `method` on `var_name` and waits for its return value.
    ///
    /// Void methods yield [`ReturnValue::void`].
    ///
    /// # Errors
    ///
    /// - `Remote` for resolution failures (unknown handle, no matching overload)
    /// - `Invocation` if the owning endpoint failed to run the method
    /// - `ConnectionLost` if the owner or the broker went away first
    /// - `Timeout` if a call timeout is configured and passes
    pub async fn call_method(
        &self,
        var_name: impl Into<String>,
        method: impl Into<String>,
        arguments: Vec<Argument>,
    ) -> Result<ReturnValue> {
        let pending = self.correlator.register().await?;
        let id = pending.id();

        if let Err(e) = self
            .outbound
            .send(Frame::call_method(id, var_name, method, arguments))
            .await
        {
            self.correlator.cancel(id).await;
            return Err(e);
        }

        match pending.wait(self.call_timeout).await {
            Err(BridgeError::Timeout(ms)) => {
                self.correlator.cancel(id).await;
                Err(BridgeError::Timeout(ms))
            }
            outcome => outcome,
        }
    }

    /// Calls `method` on `var_name` without waiting for a result.
    pub async fn call_method_no_return(
        &self,
        var_name: impl Into<String>,
        method: impl Into<String>,
        arguments: Vec<Argument>,
    ) -> Result<()> {
        self.outbound
            .send(Frame::call_method(NO_RETURN, var_name, method, arguments))
            .await
    }

    /// Waits for the next error the broker reported outside any call.
    ///
    /// Returns `None` once the connection has closed and every queued
    /// error was taken.
    pub async fn next_error(&self) -> Option<RemoteError> {
        self.errors.lock().await.recv().await
    }

    /// Whether the connection to the broker has closed.
    pub async fn is_closed(&self) -> bool {
        self.correlator.is_closed().await
    }

    /// Closes the connection, failing calls still in flight.
    pub async fn close(self) -> Result<()> {
        let Self {
            outbound,
            correlator,
            writer,
            tasks,
            ..
        } = self;

        correlator.close("client closed").await;
        drop(tasks);
        drop(outbound);

        writer
            .await
            .map_err(|e| BridgeError::Connection(format!("Writer task failed: {}", e)))?
    }
}

/// Keeps an unsolicited error for `next_error`, dropping it if the queue is full.
fn queue_error(errors: &mpsc::Sender<RemoteError>, remote: RemoteError) {
    match errors.try_send(remote) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(remote)) => {
            debug!("Error queue full, dropping: {}", remote);
        }
        // Client is gone
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

/// Routes frames from the broker until the connection ends.
async fn run_reader<R>(
    mut reader: FrameReader<R>,
    correlator: Arc<ReturnCorrelator>,
    instructions: mpsc::Sender<Frame>,
    errors: mpsc::Sender<RemoteError>,
) where
    R: AsyncBufRead + Unpin,
{
    let reason = loop {
        let frame = match reader.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break "broker closed the connection".to_string(),
            Err(e) => break e.to_string(),
        };

        match frame {
            Frame::Return {
                correlation,
                payload,
            } => {
                if !correlator.complete(correlation, Ok(payload.value())).await {
                    warn!("Dropping return for call {}: nobody is waiting", correlation);
                }
            }
            Frame::Error {
                correlation: NO_RETURN,
                message,
            } => {
                let remote = RemoteError::parse(&message);
                warn!("Broker reported: {}", remote);
                queue_error(&errors, remote);
            }
            Frame::Error {
                correlation,
                message,
            } => {
                let error = BridgeError::from(RemoteError::parse(&message));
                if !correlator.complete(correlation, Err(error)).await {
                    warn!("Dropping error for call {}: nobody is waiting", correlation);
                }
            }
            instruction @ (Frame::CreateObject(_) | Frame::CallMethod { .. }) => {
                if instructions.send(instruction).await.is_err() {
                    break "executor stopped".to_string();
                }
            }
            other => warn!("Ignoring unexpected {:?} frame from broker", other.opcode()),
        }
    };

    info!("Connection to broker ended: {}", reason);
    correlator.close(&reason).await;
}

/// Runs instructions on the host, one at a time, and sends back results.
async fn run_executor<H: ObjectHost>(
    mut host: H,
    mut instructions: mpsc::Receiver<Frame>,
    outbound: Outbound,
) {
    while let Some(instruction) = instructions.recv().await {
        if let Some(reply) = execute(&mut host, instruction) {
            if outbound.send(reply).await.is_err() {
                break;
            }
        }
    }
}

/// Runs one instruction, returning the frame to answer with, if any.
fn execute<H: ObjectHost>(host: &mut H, instruction: Frame) -> Option<Frame> {
    match instruction {
        Frame::CreateObject(payload) => {
            match host.construct(&payload.name, &payload.var_name, &payload.arguments) {
                Ok(()) => {
                    debug!("Constructed '{}' of class '{}'", payload.var_name, payload.name);
                    None
                }
                Err(e) => {
                    warn!("Failed to construct '{}': {}", payload.var_name, e);
                    let error = RemoteError::new(
                        ErrorKind::Invocation,
                        format!("constructing '{}' of class '{}': {}", payload.var_name, payload.name, e),
                    );
                    Some(Frame::error(NO_RETURN, &error))
                }
            }
        }
        Frame::CallMethod {
            correlation,
            payload,
        } => match host.invoke(&payload.var_name, &payload.name, &payload.arguments) {
            Ok(_) if correlation == NO_RETURN => None,
            Ok(value) => Some(Frame::return_value(correlation, value)),
            Err(e) => {
                warn!("Call {}.{} failed: {}", payload.var_name, payload.name, e);
                let error = RemoteError::new(ErrorKind::Invocation, e.to_string());
                (correlation != NO_RETURN).then(|| Frame::error(correlation, &error))
            }
        },
        _ => None,
    }
}
