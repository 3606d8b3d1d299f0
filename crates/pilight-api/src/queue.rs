//! Single-flight job queue with cooperative cancellation.
//!
//! The pilight daemon requires strict ordering and minimum spacing
//! between messages on one socket. All outbound traffic is funnelled
//! through a [`SerializedQueue`]: jobs run one at a time in FIFO order,
//! and the whole backlog can be abandoned instantly when the
//! connection drops, without interrupting a write already in flight.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

/// Lifecycle of a [`SerializedQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Idle, ready to start draining on the next push.
    Ready,
    /// A job is currently executing.
    Busy,
    /// Cancel requested while a job was running; the job finishes,
    /// nothing queued behind it runs.
    Cancelling,
    /// Settled after a cancel. Pushed jobs are held but not run
    /// until [`reset`](SerializedQueue::reset).
    Cancelled,
}

type Job = BoxFuture<'static, ()>;

struct Inner {
    jobs: VecDeque<Job>,
    state: QueueState,
    cancel_waiters: Vec<oneshot::Sender<()>>,
}

/// FIFO queue that runs at most one job at a time.
#[derive(Clone)]
pub struct SerializedQueue {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SerializedQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializedQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                jobs: VecDeque::new(),
                state: QueueState::Ready,
                cancel_waiters: Vec::new(),
            })),
        }
    }

    /// Append a job to the tail. If the queue is idle, draining starts
    /// immediately on a background task. Jobs pushed while cancelled
    /// are held until the next [`reset`](Self::reset).
    pub fn push<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.jobs.push_back(Box::pin(job));
        if guard.state == QueueState::Ready {
            guard.state = QueueState::Busy;
            drop(guard);
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
    }

    /// Cancel the queue.
    ///
    /// Resolves once the queue has settled into
    /// [`Cancelled`](QueueState::Cancelled): immediately (on the next
    /// poll) when idle, or after the in-flight job finishes when busy.
    /// Queued jobs behind the in-flight one never run. Every pending
    /// `cancel` call resolves when settlement happens.
    pub async fn cancel(&self) {
        let rx = {
            let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let (tx, rx) = oneshot::channel();
            match guard.state {
                QueueState::Ready | QueueState::Cancelled => {
                    guard.state = QueueState::Cancelled;
                    let _ = tx.send(());
                }
                QueueState::Busy => {
                    guard.state = QueueState::Cancelling;
                    guard.cancel_waiters.push(tx);
                }
                QueueState::Cancelling => {
                    guard.cancel_waiters.push(tx);
                }
            }
            rx
        };
        // A dropped sender can only mean the waiter list was torn down,
        // which settles the queue just the same.
        let _ = rx.await;
    }

    /// Cancel, discard the backlog, and return to
    /// [`Ready`](QueueState::Ready).
    pub async fn reset(&self) {
        self.cancel().await;
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.jobs.clear();
        guard.state = QueueState::Ready;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> QueueState {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .state
    }
}

/// Run queued jobs one at a time until the backlog empties or a cancel
/// interrupts. The lock is never held across a job await.
async fn drain(inner: Arc<Mutex<Inner>>) {
    loop {
        let job = {
            let mut guard = inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match guard.jobs.pop_front() {
                Some(job) => job,
                None => {
                    guard.state = QueueState::Ready;
                    return;
                }
            }
        };

        job.await;

        let mut guard = inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.state {
            QueueState::Cancelling => {
                guard.state = QueueState::Cancelled;
                for waiter in guard.cancel_waiters.drain(..) {
                    let _ = waiter.send(());
                }
                return;
            }
            _ if guard.jobs.is_empty() => {
                guard.state = QueueState::Ready;
                return;
            }
            _ => {}
        }
    }
}
