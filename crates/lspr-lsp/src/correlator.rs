//! Request id allocation and response correlation

use crate::error::LspError;
use crate::message::{ResponseError, ResponseOutcome};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use tokio::sync::oneshot;
use tracing::debug;

/// Why a pending request completed without a result
#[derive(Debug, Clone, PartialEq)]
pub enum RequestFailure {
    /// The server answered with an error object
    Server(ResponseError),
    /// The server process (or its output stream) went away
    ProcessExited,
    /// The request bytes could not be written
    WriteFailed(String),
}

impl RequestFailure {
    pub fn into_error(self) -> LspError {
        match self {
            Self::Server(error) => LspError::Server {
                code: error.code,
                message: error.message,
            },
            Self::ProcessExited => LspError::ProcessExited,
            Self::WriteFailed(message) => LspError::WriteFailed { message },
        }
    }
}

pub type RequestOutcome = Result<Value, RequestFailure>;

/// Handle for awaiting one registered request
#[derive(Debug)]
pub struct PendingRequest {
    id: i64,
    receiver: oneshot::Receiver<RequestOutcome>,
}

impl PendingRequest {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub(crate) fn into_receiver(self) -> oneshot::Receiver<RequestOutcome> {
        self.receiver
    }
}

/// Matches responses to the requests that produced them.
///
/// Ids start at 1 and are never reused. Each entry is removed the moment it
/// is resolved, failed or cancelled, so a continuation fires at most once.
#[derive(Debug)]
pub struct RequestCorrelator {
    next_id: AtomicI64,
    pending: DashMap<i64, oneshot::Sender<RequestOutcome>>,
    closed: OnceLock<RequestFailure>,
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            pending: DashMap::new(),
            closed: OnceLock::new(),
        }
    }
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next request id
    pub fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocate an id and track it until a response arrives.
    ///
    /// After `fail_all` the request is rejected immediately with the same
    /// failure.
    pub fn register(&self) -> PendingRequest {
        let id = self.next_id();
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(id, sender);

        if let Some(failure) = self.closed.get() {
            self.fail(id, failure.clone());
        }

        PendingRequest { id, receiver }
    }

    /// Deliver a response. Returns `false` for ids that are not pending.
    pub fn resolve(&self, id: i64, outcome: ResponseOutcome) -> bool {
        let Some((_, sender)) = self.pending.remove(&id) else {
            debug!(lsp_request_id = id, "Received response for unknown request id");
            return false;
        };
        let outcome = outcome.into_result().map_err(RequestFailure::Server);
        // The caller may have stopped waiting; nothing else to do then.
        let _ = sender.send(outcome);
        true
    }

    /// Reject one pending request
    pub fn fail(&self, id: i64, failure: RequestFailure) -> bool {
        match self.pending.remove(&id) {
            Some((_, sender)) => {
                let _ = sender.send(Err(failure));
                true
            }
            None => false,
        }
    }

    /// Forget a pending request without completing it (e.g. after a timeout)
    pub fn cancel(&self, id: i64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Reject every outstanding request and all future registrations.
    /// Returns the number of requests rejected.
    pub fn fail_all(&self, failure: RequestFailure) -> usize {
        let _ = self.closed.set(failure.clone());

        let ids: Vec<i64> = self.pending.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.fail(*id, failure.clone()))
            .count()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get().is_some()
    }
}
