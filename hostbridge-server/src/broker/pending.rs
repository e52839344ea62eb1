//! Pending call table
//!
//! Maps each in-flight request id to the single waiter that will receive its
//! outcome. Whoever removes an entry owns its completion slot, so a call is
//! completed at most once no matter how a response, a deadline and a
//! cancellation race.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use hostbridge_protocol::{RequestId, ToolCallResponse};

use super::error::BrokerError;

/// What a waiter eventually receives
pub type CallOutcome = Result<ToolCallResponse, BrokerError>;

/// Identity of a front session that owns pending calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrontId(Uuid);

impl FrontId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FrontId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FrontId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct PendingEntry {
    tool_name: String,
    owner: FrontId,
    deadline: Instant,
    timeout: Duration,
    slot: oneshot::Sender<CallOutcome>,
}

impl PendingEntry {
    fn complete(self, request_id: RequestId, outcome: CallOutcome) {
        if self.slot.send(outcome).is_err() {
            debug!(request_id = %request_id, tool = %self.tool_name, "Waiter already gone");
        }
    }

    fn timeout_error(&self) -> BrokerError {
        BrokerError::CallTimeout {
            tool: self.tool_name.clone(),
            after: self.timeout,
        }
    }
}

/// Table of calls awaiting an executor response
#[derive(Debug, Default)]
pub struct PendingCallTable {
    entries: Mutex<HashMap<RequestId, PendingEntry>>,
}

impl PendingCallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `request_id` with a deadline `timeout` from now
    pub fn register(
        self: &Arc<Self>,
        request_id: RequestId,
        tool_name: impl Into<String>,
        owner: FrontId,
        timeout: Duration,
    ) -> Result<PendingCall, BrokerError> {
        let tool_name = tool_name.into();
        let deadline = Instant::now() + timeout;
        let (tx, rx) = oneshot::channel();

        {
            let mut entries = self.entries.lock();
            if entries.contains_key(&request_id) {
                return Err(BrokerError::DuplicateRequest(request_id));
            }
            entries.insert(
                request_id,
                PendingEntry {
                    tool_name: tool_name.clone(),
                    owner,
                    deadline,
                    timeout,
                    slot: tx,
                },
            );
        }

        Ok(PendingCall {
            request_id,
            tool_name,
            deadline,
            slot: rx,
            table: Arc::clone(self),
        })
    }

    /// Complete a waiter with the executor's response
    ///
    /// A response with no pending entry (already completed, timed out,
    /// cancelled, or never issued) is rejected and leaves the table untouched.
    pub fn resolve(&self, response: ToolCallResponse) -> Result<(), BrokerError> {
        let request_id = response.request_id;
        match self.take(&request_id) {
            Some(entry) => {
                debug!(request_id = %request_id, tool = %entry.tool_name, success = response.success, "Call resolved");
                entry.complete(request_id, Ok(response));
                Ok(())
            }
            None => {
                warn!(request_id = %request_id, "Duplicate or late response, discarded");
                Err(BrokerError::DuplicateOrUnknownResponse(request_id))
            }
        }
    }

    /// Complete a waiter with a timeout error
    pub fn expire(&self, request_id: &RequestId) -> bool {
        match self.take(request_id) {
            Some(entry) => {
                warn!(request_id = %request_id, tool = %entry.tool_name, "Call timed out");
                let err = entry.timeout_error();
                entry.complete(*request_id, Err(err));
                true
            }
            None => false,
        }
    }

    /// Complete a waiter with an arbitrary error
    pub fn fail(&self, request_id: &RequestId, error: BrokerError) -> bool {
        match self.take(request_id) {
            Some(entry) => {
                entry.complete(*request_id, Err(error));
                true
            }
            None => false,
        }
    }

    /// Complete a waiter as cancelled
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        match self.take(request_id) {
            Some(entry) => {
                let err = BrokerError::Cancelled {
                    tool: entry.tool_name.clone(),
                };
                entry.complete(*request_id, Err(err));
                true
            }
            None => false,
        }
    }

    /// Cancel every call owned by `owner`
    pub fn cancel_owner(&self, owner: FrontId) -> usize {
        let cancelled: Vec<(RequestId, PendingEntry)> = {
            let mut entries = self.entries.lock();
            let ids: Vec<RequestId> = entries
                .iter()
                .filter(|(_, entry)| entry.owner == owner)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        let count = cancelled.len();
        for (id, entry) in cancelled {
            let err = BrokerError::Cancelled {
                tool: entry.tool_name.clone(),
            };
            entry.complete(id, Err(err));
        }
        if count > 0 {
            debug!(owner = %owner, count, "Cancelled calls for departed front");
        }
        count
    }

    /// Time out every call whose deadline is at or before `now`
    pub fn expire_overdue(&self, now: Instant) -> usize {
        let overdue: Vec<(RequestId, PendingEntry)> = {
            let mut entries = self.entries.lock();
            let ids: Vec<RequestId> = entries
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        let count = overdue.len();
        for (id, entry) in overdue {
            warn!(request_id = %id, tool = %entry.tool_name, "Call timed out");
            let err = entry.timeout_error();
            entry.complete(id, Err(err));
        }
        count
    }

    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.entries.lock().contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Drop an entry without completing it
    fn forget(&self, request_id: &RequestId) -> bool {
        self.take(request_id).is_some()
    }

    fn take(&self, request_id: &RequestId) -> Option<PendingEntry> {
        self.entries.lock().remove(request_id)
    }
}

/// Handle held by the caller of a submitted tool call
///
/// Dropping the handle before completion removes the pending entry, so a
/// response arriving afterwards is discarded.
#[derive(Debug)]
pub struct PendingCall {
    request_id: RequestId,
    tool_name: String,
    deadline: Instant,
    slot: oneshot::Receiver<CallOutcome>,
    table: Arc<PendingCallTable>,
}

impl PendingCall {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Wait for the outcome, enforcing the deadline
    pub async fn wait(mut self) -> CallOutcome {
        let deadline = self.deadline;
        let early = tokio::select! {
            biased;
            outcome = &mut self.slot => Some(outcome),
            _ = tokio::time::sleep_until(deadline) => None,
        };

        let outcome = match early {
            Some(outcome) => outcome,
            None => {
                // Whoever removes the entry completes the slot, so this
                // receive never hangs
                self.table.expire(&self.request_id);
                (&mut self.slot).await
            }
        };

        outcome.unwrap_or_else(|_| {
            Err(BrokerError::Cancelled {
                tool: self.tool_name.clone(),
            })
        })
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if self.table.forget(&self.request_id) {
            debug!(request_id = %self.request_id, tool = %self.tool_name, "Waiter dropped before completion");
        }
    }
}
