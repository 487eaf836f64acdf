use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use langbridge_common::protocol::error::{BridgeError, Result};
use langbridge_common::protocol::{CorrelationId, ReturnValue, MAX_CORRELATION_ID};

type Waiter = oneshot::Sender<Result<ReturnValue>>;

struct CorrelatorState {
    waiters: HashMap<CorrelationId, Waiter>,
    next: CorrelationId,
    /// Why the connection closed, once it has
    closed: Option<String>,
}

/// Caller-side table of calls waiting for a Return.
///
/// Every call gets its own id and one-shot completion, so any number of
/// calls can be outstanding at once. Closing the correlator fails every
/// waiter with `ConnectionLost` and refuses new registrations.
pub struct ReturnCorrelator {
    state: Mutex<CorrelatorState>,
}

impl Default for ReturnCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReturnCorrelator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CorrelatorState {
                waiters: HashMap::new(),
                next: 1,
                closed: None,
            }),
        }
    }

    /// Allocates an id for a new call and the handle to wait on.
    ///
    /// Ids run from 1 to 99999, wrapping and skipping ids still in use.
    ///
    /// # Errors
    ///
    /// `ConnectionLost` after [`close`](Self::close); `InvalidRequest` if
    /// every id is in use.
    pub async fn register(&self) -> Result<PendingReturn> {
        let mut state = self.state.lock().await;
        if let Some(reason) = &state.closed {
            return Err(BridgeError::ConnectionLost(reason.clone()));
        }

        for _ in 0..MAX_CORRELATION_ID {
            let id = state.next;
            state.next = if id >= MAX_CORRELATION_ID { 1 } else { id + 1 };

            if !state.waiters.contains_key(&id) {
                let (tx, rx) = oneshot::channel();
                state.waiters.insert(id, tx);
                return Ok(PendingReturn { id, rx });
            }
        }

        Err(BridgeError::InvalidRequest(format!(
            "all {} call ids are in use",
            MAX_CORRELATION_ID
        )))
    }

    /// Hands the outcome of call `id` to its waiter.
    ///
    /// Returns `false` if nobody is waiting on `id`.
    pub async fn complete(&self, id: CorrelationId, outcome: Result<ReturnValue>) -> bool {
        let waiter = self.state.lock().await.waiters.remove(&id);
        match waiter {
            // The waiter may have given up already
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Forgets call `id` without completing it.
    pub async fn cancel(&self, id: CorrelationId) {
        self.state.lock().await.waiters.remove(&id);
    }

    /// Fails every waiter with `ConnectionLost` and refuses new calls.
    pub async fn close(&self, reason: &str) {
        let waiters: Vec<Waiter> = {
            let mut state = self.state.lock().await;
            state.closed.get_or_insert_with(|| reason.to_string());
            state.waiters.drain().map(|(_, tx)| tx).collect()
        };
        for tx in waiters {
            let _ = tx.send(Err(BridgeError::ConnectionLost(reason.to_string())));
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed.is_some()
    }

    /// Number of calls still waiting.
    pub async fn outstanding(&self) -> usize {
        self.state.lock().await.waiters.len()
    }
}

/// A registered call waiting for its Return.
#[derive(Debug)]
pub struct PendingReturn {
    id: CorrelationId,
    rx: oneshot::Receiver<Result<ReturnValue>>,
}

impl PendingReturn {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Waits for the outcome, up to `timeout` if given.
    ///
    /// # Errors
    ///
    /// `Timeout` if the deadline passes first (the caller should
    /// [`cancel`](ReturnCorrelator::cancel) the id), `ConnectionLost` if
    /// the correlator is dropped, or whatever error the call completed with.
    pub async fn wait(self, timeout: Option<Duration>) -> Result<ReturnValue> {
        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.rx)
                .await
                .map_err(|_| BridgeError::Timeout(limit.as_millis() as u64))?,
            None => self.rx.await,
        };
        outcome.map_err(|_| BridgeError::ConnectionLost("correlator dropped".to_string()))?
    }
}
