use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use langbridge_common::protocol::error::{BridgeError, Result};
use langbridge_common::protocol::{
    CallMethodPayload, ClassDescriptor, CorrelationId, CreateObjectPayload, EndpointId, ErrorKind,
    Frame, MethodSignature, RemoteError, ReturnPayload, ReturnValue, TypeTag, NO_RETURN,
};
use langbridge_common::transport::Outbound;

use crate::correlation::{CorrelationTable, PendingCall};
use crate::registry::Registry;
use crate::resolver::{resolve, retag, Strictness};

/// A connected endpoint as the broker sees it.
struct Endpoint {
    outbound: Outbound,
    strictness: Strictness,
}

/// Everything guarded by the broker lock.
#[derive(Default)]
struct BrokerState {
    registry: Registry,
    correlations: CorrelationTable,
    endpoints: HashMap<EndpointId, Endpoint>,
}

impl BrokerState {
    fn endpoint(&self, id: EndpointId) -> Result<&Endpoint> {
        self.endpoints
            .get(&id)
            .ok_or_else(|| BridgeError::ConnectionLost(format!("endpoint {} is not connected", id)))
    }

    fn outbound_of(&self, id: EndpointId) -> Option<Outbound> {
        self.endpoints.get(&id).map(|endpoint| endpoint.outbound.clone())
    }

    /// Error frames telling each still-connected requester its call ended.
    fn call_failures(
        &self,
        calls: Vec<PendingCall>,
        kind: ErrorKind,
        reason: impl Fn(&PendingCall) -> String,
    ) -> Vec<(Outbound, Frame)> {
        calls
            .into_iter()
            .filter_map(|call| {
                let outbound = self.outbound_of(call.requester)?;
                let error = RemoteError::new(kind, reason(&call));
                Some((outbound, Frame::error(call.requester_call_id, &error)))
            })
            .collect()
    }
}

async fn deliver(notices: Vec<(Outbound, Frame)>) {
    for (outbound, frame) in notices {
        if let Err(e) = outbound.send(frame).await {
            debug!("Could not notify waiting caller: {}", e);
        }
    }
}

/// Snapshot of broker state sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub endpoints: usize,
    pub classes: usize,
    pub objects: usize,
    pub pending_calls: usize,
}

/// The call router.
///
/// Owns the registry, the correlation table and the outbound queue of
/// every connected endpoint, all behind one lock. Connection tasks feed it
/// decoded frames through [`handle_frame`](Broker::handle_frame).
///
/// The lock is never held while waiting on a queue. Dispatch resolves
/// under the lock, waits for a slot in the owner's queue without it, then
/// re-locks to bind the handle or allocate the call id and enqueue the
/// instruction in one step. A handle is therefore only bound once its
/// construct instruction is queued, and an owner that stops reading only
/// stalls the endpoints calling into it.
///
/// Resolution failures never escape: they are sent back to the requesting
/// endpoint as Error frames.
///
/// # Example
///
/// ```
/// # use langbridge_broker::Broker;
/// # use langbridge_common::protocol::{ClassDescriptor, Frame, TypeTag};
/// # use langbridge_common::transport::Outbound;
/// # #[tokio::main]
/// # async fn main() {
/// let broker = Broker::new();
/// let (outbound, _rx) = Outbound::channel(16);
/// let endpoint = broker.connect(outbound).await;
///
/// let counter = ClassDescriptor::new("Counter").with_method("get", [], TypeTag::Int);
/// broker.handle_frame(endpoint, Frame::RegisterClass(counter)).await;
/// assert_eq!(broker.stats().await.classes, 1);
/// # }
/// ```
pub struct Broker {
    state: Mutex<BrokerState>,
    next_endpoint: AtomicU64,
    call_expiry: Option<Duration>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            next_endpoint: AtomicU64::new(1),
            call_expiry: None,
        }
    }

    /// Fails dispatched calls left unanswered for longer than `expiry`.
    pub fn with_call_expiry(mut self, expiry: Option<Duration>) -> Self {
        self.call_expiry = expiry;
        self
    }

    /// Admits a new endpoint whose frames are written through `outbound`.
    ///
    /// Endpoint ids increase monotonically and are never reused. The
    /// endpoint matches strictly until its Init frame says otherwise.
    pub async fn connect(&self, outbound: Outbound) -> EndpointId {
        let id = self.next_endpoint.fetch_add(1, Ordering::Relaxed);
        self.state.lock().await.endpoints.insert(
            id,
            Endpoint {
                outbound,
                strictness: Strictness::default(),
            },
        );
        id
    }

    /// Removes an endpoint and everything it owned.
    ///
    /// Its classes and objects stop resolving, calls it made are discarded,
    /// and every caller still waiting on a call it owed gets a
    /// `ConnectionLost` Error frame.
    pub async fn disconnect(&self, id: EndpointId) {
        let notices = {
            let mut state = self.state.lock().await;
            if state.endpoints.remove(&id).is_none() {
                return;
            }

            let (classes, objects) = state.registry.remove_endpoint(id);
            let discarded = state.correlations.discard_requester(id);
            let orphaned = state.correlations.fail_executor(id);
            info!(
                "Endpoint {} disconnected: dropped {} classes, {} objects, {} outgoing and {} incoming calls",
                id,
                classes,
                objects,
                discarded,
                orphaned.len()
            );

            state.call_failures(orphaned, ErrorKind::ConnectionLost, |call| {
                format!("endpoint {} disconnected before answering call {}", id, call.id)
            })
        };

        deliver(notices).await;
    }

    /// Fails every dispatched call older than the configured expiry with
    /// a `Timeout` Error frame to its requester. Returns how many.
    pub async fn expire_calls(&self) -> usize {
        let Some(max_age) = self.call_expiry else {
            return 0;
        };
        let (count, notices) = {
            let mut state = self.state.lock().await;
            let expired = state.correlations.expire(max_age, Instant::now());
            if expired.is_empty() {
                return 0;
            }
            warn!("Expiring {} calls unanswered after {:?}", expired.len(), max_age);
            let count = expired.len();
            let notices = state.call_failures(expired, ErrorKind::Timeout, |call| {
                format!("endpoint {} did not answer call {} in time", call.executor, call.id)
            });
            (count, notices)
        };
        deliver(notices).await;
        count
    }

    /// Drops all session state.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        *state = BrokerState::default();
    }

    pub async fn stats(&self) -> BrokerStats {
        let state = self.state.lock().await;
        BrokerStats {
            endpoints: state.endpoints.len(),
            classes: state.registry.class_count(),
            objects: state.registry.object_count(),
            pending_calls: state.correlations.len(),
        }
    }

    /// Processes one frame sent by endpoint `from`.
    ///
    /// Failures are reported to `from` as an Error frame, carrying the
    /// caller's id for CallMethod and 0 otherwise. Late or unknown returns
    /// are logged and dropped.
    pub async fn handle_frame(&self, from: EndpointId, frame: Frame) {
        debug!("Endpoint {} sent {:?}", from, frame.opcode());

        let reply_id = match &frame {
            Frame::CallMethod { correlation, .. } => *correlation,
            _ => NO_RETURN,
        };

        let result = match frame {
            Frame::Init(payload) => self.init(from, payload.strict_types).await,
            Frame::RegisterClass(descriptor) => self.register_class(from, descriptor).await,
            Frame::CreateObject(payload) => self.create_object(from, payload).await,
            Frame::CallMethod {
                correlation,
                payload,
            } => self.call_method(from, correlation, payload).await,
            Frame::Return {
                correlation,
                payload,
            } => self.complete_return(from, correlation, payload).await,
            Frame::Error {
                correlation,
                message,
            } => self.complete_error(from, correlation, message).await,
        };

        if let Err(err) = result {
            self.report(from, reply_id, err).await;
        }
    }

    async fn report(&self, to: EndpointId, correlation: CorrelationId, err: BridgeError) {
        if let BridgeError::LateOrUnknownReturn(id) = err {
            warn!("Dropping answer to call {} from endpoint {}: no such pending call", id, to);
            return;
        }

        warn!("Request from endpoint {} failed: {}", to, err);
        let Some(outbound) = self.state.lock().await.outbound_of(to) else {
            return;
        };
        if let Err(e) = outbound.send(Frame::error(correlation, &err.to_remote())).await {
            debug!("Could not report error to endpoint {}: {}", to, e);
        }
    }

    async fn init(&self, from: EndpointId, strict_types: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let endpoint = state
            .endpoints
            .get_mut(&from)
            .ok_or_else(|| BridgeError::ConnectionLost(format!("endpoint {} is not connected", from)))?;
        endpoint.strictness = Strictness::from_strict_types(strict_types);
        info!("Endpoint {} uses {:?} type matching", from, endpoint.strictness);
        Ok(())
    }

    async fn register_class(&self, from: EndpointId, descriptor: ClassDescriptor) -> Result<()> {
        let name = descriptor.name.clone();
        let (constructors, methods) = (descriptor.constructors.len(), descriptor.methods.len());

        self.state
            .lock()
            .await
            .registry
            .register_class(from, descriptor)?;

        info!(
            "Endpoint {} registered class '{}' ({} constructors, {} methods)",
            from, name, constructors, methods
        );
        Ok(())
    }

    async fn create_object(&self, from: EndpointId, payload: CreateObjectPayload) -> Result<()> {
        let (owner, outbound, arguments) = {
            let state = self.state.lock().await;

            let owner = state.registry.resolve_owner(&payload.name)?;
            let owner_endpoint = state.endpoint(owner)?;
            let strictness = owner_endpoint.strictness;
            let outbound = owner_endpoint.outbound.clone();

            let class = state.registry.class(&payload.name)?;
            let candidates: Vec<&[TypeTag]> = class
                .descriptor
                .constructors
                .iter()
                .map(|c| c.parameters.as_slice())
                .collect();
            let index = resolve(&candidates, &payload.arguments, strictness)?;
            let arguments = retag(&payload.arguments, candidates[index]);

            if state.registry.is_bound(&payload.var_name) {
                return Err(BridgeError::DuplicateHandle(payload.var_name));
            }
            (owner, outbound, arguments)
        };

        // Wait for room in the owner's queue with the lock released
        let permit = outbound.reserve().await?;

        let mut state = self.state.lock().await;
        state.endpoint(owner)?;
        state
            .registry
            .bind_object(payload.var_name.clone(), owner, payload.name.clone())?;

        debug!(
            "Endpoint {} created '{}' of class '{}' on endpoint {}",
            from, payload.var_name, payload.name, owner
        );
        permit.send(Frame::create_object(payload.name, payload.var_name, arguments));
        Ok(())
    }

    async fn call_method(
        &self,
        from: EndpointId,
        requester_call_id: CorrelationId,
        payload: CallMethodPayload,
    ) -> Result<()> {
        let (owner, outbound, arguments, declared_return) = {
            let state = self.state.lock().await;

            let binding = state.registry.resolve_object(&payload.var_name)?;
            let owner_endpoint = state.endpoint(binding.owner)?;
            let strictness = owner_endpoint.strictness;
            let outbound = owner_endpoint.outbound.clone();

            let class = state.registry.class(&binding.class_name)?;
            let overloads: Vec<&MethodSignature> = class.descriptor.overloads(&payload.name).collect();
            let candidates: Vec<&[TypeTag]> = overloads.iter().map(|m| m.parameters.as_slice()).collect();
            let index = resolve(&candidates, &payload.arguments, strictness)?;
            (
                binding.owner,
                outbound,
                retag(&payload.arguments, candidates[index]),
                overloads[index].return_type.clone(),
            )
        };

        let permit = outbound.reserve().await?;

        let mut state = self.state.lock().await;
        // The owner may have left while we waited for its queue
        state.endpoint(owner)?;

        if declared_return.is_void() || requester_call_id == NO_RETURN {
            debug!(
                "Endpoint {} calls {}.{} on endpoint {} without return",
                from, payload.var_name, payload.name, owner
            );
            permit.send(Frame::call_method(NO_RETURN, payload.var_name, payload.name, arguments));

            if requester_call_id != NO_RETURN {
                // Caller wants an answer from a void method
                let requester = state.endpoint(from)?.outbound.clone();
                drop(state);
                requester
                    .send(Frame::return_value(requester_call_id, ReturnValue::void()))
                    .await?;
            }
            return Ok(());
        }

        let id = state
            .correlations
            .allocate(from, requester_call_id, owner, declared_return)?;
        debug!(
            "Endpoint {} calls {}.{} on endpoint {} as call {}",
            from, payload.var_name, payload.name, owner, id
        );
        permit.send(Frame::call_method(id, payload.var_name, payload.name, arguments));
        Ok(())
    }

    /// Consumes a pending call answered by `from`, returning it with the
    /// requester's queue if the requester is still connected.
    async fn take_pending(
        &self,
        from: EndpointId,
        correlation: CorrelationId,
    ) -> Result<(PendingCall, Option<Outbound>)> {
        let mut state = self.state.lock().await;
        let call = state.correlations.complete(correlation, from)?;
        let requester = state.outbound_of(call.requester);
        Ok((call, requester))
    }

    async fn complete_return(
        &self,
        from: EndpointId,
        correlation: CorrelationId,
        payload: ReturnPayload,
    ) -> Result<()> {
        let (call, requester) = self.take_pending(from, correlation).await?;

        if call.declared_return != TypeTag::Any && payload.return_type != call.declared_return {
            warn!(
                "Call {} declared return type {} but endpoint {} returned {}",
                call.id, call.declared_return, from, payload.return_type
            );
        }

        let Some(requester) = requester else {
            debug!("Requester of call {} is gone, dropping its return", call.id);
            return Ok(());
        };
        let frame = Frame::return_value(call.requester_call_id, payload.value());
        if let Err(e) = requester.send(frame).await {
            debug!("Could not deliver return of call {}: {}", call.id, e);
        }
        Ok(())
    }

    async fn complete_error(
        &self,
        from: EndpointId,
        correlation: CorrelationId,
        message: String,
    ) -> Result<()> {
        let remote = RemoteError::parse(&message);
        if correlation == NO_RETURN {
            warn!("Endpoint {} reported: {}", from, remote);
            return Ok(());
        }

        let (call, requester) = self.take_pending(from, correlation).await?;
        let Some(requester) = requester else {
            debug!("Requester of call {} is gone, dropping its error", call.id);
            return Ok(());
        };

        let detail = match remote.kind {
            ErrorKind::Invocation | ErrorKind::Other => remote.message,
            _ => remote.to_string(),
        };
        let error = RemoteError::new(ErrorKind::Invocation, detail);
        if let Err(e) = requester.send(Frame::error(call.requester_call_id, &error)).await {
            debug!("Could not deliver error of call {}: {}", call.id, e);
        }
        Ok(())
    }
}
