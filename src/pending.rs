use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::reply::Reply;

pub type ReplyReceiver = oneshot::Receiver<Result<Reply>>;

/// A request whose bytes have started going out and whose reply has not been decoded yet.
#[derive(Debug)]
pub struct PendingRequest {
    seq_id: u64,
    submitted_at: Instant,
    sink: oneshot::Sender<Result<Reply>>,
}

impl PendingRequest {
    pub fn new(seq_id: u64) -> (PendingRequest, ReplyReceiver) {
        let (sink, rx) = oneshot::channel();
        let pending = PendingRequest {
            seq_id,
            submitted_at: Instant::now(),
            sink,
        };
        (pending, rx)
    }

    pub fn seq_id(&self) -> u64 {
        self.seq_id
    }

    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    /// Resolves the caller. Consumes the request, so a result is delivered at most once.
    pub fn complete(self, result: Result<Reply>) {
        if self.sink.send(result).is_err() {
            debug!(seq_id = self.seq_id, "caller went away before its reply was delivered");
        }
    }
}

/// FIFO of in-flight requests for one connection.
///
/// Replies on a connection arrive in the order the requests were written, so the oldest entry is
/// always the one a freshly decoded reply belongs to. Once drained the registry stays closed and
/// rejects new entries.
#[derive(Debug)]
pub struct PendingRegistry {
    // `None` once the owning connection has been torn down.
    queue: Mutex<Option<VecDeque<PendingRequest>>>,
}

impl PendingRegistry {
    pub fn new() -> PendingRegistry {
        PendingRegistry {
            queue: Mutex::new(Some(VecDeque::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<VecDeque<PendingRequest>>> {
        // Every critical section is a single push or pop, a panic cannot leave the queue torn.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Must be called right as the request's bytes start going out, and never earlier.
    pub fn enqueue(&self, request: PendingRequest) -> Result<()> {
        match self.lock().as_mut() {
            Some(queue) => {
                queue.push_back(request);
                Ok(())
            }
            None => Err(Error::ConnectionLost),
        }
    }

    /// Oldest outstanding request, called once per decoded reply.
    pub fn dequeue_one(&self) -> Option<PendingRequest> {
        self.lock().as_mut().and_then(VecDeque::pop_front)
    }

    /// Takes every outstanding request and closes the registry.
    pub fn drain_all(&self) -> Vec<PendingRequest> {
        self.lock()
            .take()
            .map(|queue| queue.into_iter().collect())
            .unwrap_or_default()
    }

    /// How long the oldest outstanding request has been waiting.
    pub fn oldest_elapsed(&self) -> Option<Duration> {
        self.lock()
            .as_ref()
            .and_then(VecDeque::front)
            .map(PendingRequest::elapsed)
    }

    pub fn len(&self) -> usize {
        self.lock().as_ref().map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }
}

impl Default for PendingRegistry {
    fn default() -> Self {
        Self::new()
    }
}
