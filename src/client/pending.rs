//! Caller-side pending-call table.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::invocation::InvocationResult;

/// Request id → waiting caller.
///
/// An entry is created before the INVOKE is sent and removed exactly once:
/// on resolution, on send failure, or on timeout. Clones share the table.
#[derive(Clone, Default)]
pub struct PendingCalls {
    calls: Arc<DashMap<String, oneshot::Sender<InvocationResult>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the entry for `request_id` and return its receiver.
    pub fn register(&self, request_id: &str) -> oneshot::Receiver<InvocationResult> {
        let (tx, rx) = oneshot::channel();
        self.calls.insert(request_id.to_string(), tx);
        rx
    }

    /// Complete the waiting call for `result`.
    ///
    /// Returns `false` if no entry exists (late, duplicate or unknown
    /// result); nothing is woken in that case.
    pub fn resolve(&self, result: InvocationResult) -> bool {
        match self.calls.remove(result.request_id()) {
            // The caller may have given up between removal and send.
            Some((_, tx)) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Drop the entry without resolving it.
    pub fn remove(&self, request_id: &str) -> bool {
        self.calls.remove(request_id).is_some()
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.calls.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Drop every entry. Waiting callers observe a closed channel.
    pub fn clear(&self) {
        self.calls.clear();
    }
}
