use std::collections::HashMap;
use std::time::{Duration, Instant};

use langbridge_common::protocol::error::{BridgeError, Result};
use langbridge_common::protocol::{CorrelationId, EndpointId, TypeTag, MAX_CORRELATION_ID};

/// A dispatched call whose Return has not arrived yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    /// Broker-allocated id carried by the instruction and its Return
    pub id: CorrelationId,
    /// Endpoint waiting for the value
    pub requester: EndpointId,
    /// Id the requester used for this call; its Return is rewritten to it
    pub requester_call_id: CorrelationId,
    /// Endpoint the instruction was sent to
    pub executor: EndpointId,
    pub declared_return: TypeTag,
    pub dispatched_at: Instant,
}

/// Broker-side correlation table.
///
/// Ids run from 1 to [`MAX_CORRELATION_ID`] and wrap back to 1, skipping
/// any id that is still outstanding. An id is consumed by exactly one
/// Return (or Error) from the endpoint it was dispatched to, by the
/// executor disconnecting, or by [`expire`](Self::expire).
#[derive(Debug)]
pub struct CorrelationTable {
    pending: HashMap<CorrelationId, PendingCall>,
    next: CorrelationId,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            next: 1,
        }
    }
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh id and records the pending call under it.
    ///
    /// An executor that stays connected but never answers holds its ids
    /// until it disconnects or the calls are expired, so at most
    /// [`MAX_CORRELATION_ID`] such calls can pile up.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when every id is outstanding.
    pub fn allocate(
        &mut self,
        requester: EndpointId,
        requester_call_id: CorrelationId,
        executor: EndpointId,
        declared_return: TypeTag,
    ) -> Result<CorrelationId> {
        for _ in 0..MAX_CORRELATION_ID {
            let id = self.next;
            self.next = if id >= MAX_CORRELATION_ID { 1 } else { id + 1 };

            if !self.pending.contains_key(&id) {
                self.pending.insert(
                    id,
                    PendingCall {
                        id,
                        requester,
                        requester_call_id,
                        executor,
                        declared_return,
                        dispatched_at: Instant::now(),
                    },
                );
                return Ok(id);
            }
        }

        Err(BridgeError::InvalidRequest(format!(
            "all {} correlation ids are outstanding",
            MAX_CORRELATION_ID
        )))
    }

    /// Consumes the pending call `id`, answered by `executor`.
    ///
    /// # Errors
    ///
    /// Returns `LateOrUnknownReturn` if nothing is pending under `id`, or
    /// if it was dispatched to a different endpoint. The entry is left in
    /// place in the latter case.
    pub fn complete(&mut self, id: CorrelationId, executor: EndpointId) -> Result<PendingCall> {
        match self.pending.get(&id) {
            Some(call) if call.executor == executor => {}
            _ => return Err(BridgeError::LateOrUnknownReturn(id)),
        }
        self.pending
            .remove(&id)
            .ok_or(BridgeError::LateOrUnknownReturn(id))
    }

    /// Removes and returns every call that `executor` still owes.
    pub fn fail_executor(&mut self, executor: EndpointId) -> Vec<PendingCall> {
        let ids: Vec<CorrelationId> = self
            .pending
            .values()
            .filter(|call| call.executor == executor)
            .map(|call| call.id)
            .collect();
        let mut failed: Vec<PendingCall> = ids
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .collect();
        failed.sort_by_key(|call| call.id);
        failed
    }

    /// Removes and returns every call dispatched more than `max_age` before `now`.
    pub fn expire(&mut self, max_age: Duration, now: Instant) -> Vec<PendingCall> {
        let ids: Vec<CorrelationId> = self
            .pending
            .values()
            .filter(|call| now.saturating_duration_since(call.dispatched_at) > max_age)
            .map(|call| call.id)
            .collect();
        let mut expired: Vec<PendingCall> = ids
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .collect();
        expired.sort_by_key(|call| call.id);
        expired
    }

    /// Discards calls made by a requester that went away. Returns how many.
    pub fn discard_requester(&mut self, requester: EndpointId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, call| call.requester != requester);
        before - self.pending.len()
    }

    pub fn get(&self, id: CorrelationId) -> Option<&PendingCall> {
        self.pending.get(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
