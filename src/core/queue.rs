//! Concurrency-safe priority task queue.
//!
//! [`PriorityTaskQueue`] orders pending units of work by ascending
//! `(priority, sequence)`: a lower priority number is dequeued sooner, and
//! among equal priorities the earlier submission wins. The sequence number is
//! allocated monotonically under the queue lock and exists solely to break
//! priority ties deterministically — records are never ordered by their
//! payload, so two tasks sharing a priority can never cause an ordering
//! failure.
//!
//! The queue is a lifecycle-unaware primitive: gating of who may submit
//! belongs to the owning [`Core`](crate::runtime::Core).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::sync::oneshot;
use tracing::debug;

use crate::core::error::RuntimeError;

/// Priority assigned to plainly submitted units of work ("low").
pub const DEFAULT_TASK_PRIORITY: u8 = 9;
/// Priority reserved for event-driven listener invocations, numerically more
/// urgent than [`DEFAULT_TASK_PRIORITY`].
pub const EVENT_TASK_PRIORITY: u8 = 3;

/// Identifier of a submitted unit of work (its queue sequence number).
pub type TaskId = u64;

/// Terminal result of a unit of work.
pub type TaskOutcome = anyhow::Result<()>;

/// A caller-supplied deferred computation submitted to the scheduler.
pub type UnitOfWork = Pin<Box<dyn Future<Output = TaskOutcome> + Send + 'static>>;

/// How a closed queue treats items still buffered at close time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Serve the remaining backlog to workers, then report exhaustion.
    Drain,
    /// Report exhaustion immediately; buffered items are dropped.
    Discard,
}

/// A pending unit of work with its scheduling key.
///
/// Ordering is defined over `(priority, seq)` only; the unit of work itself
/// is opaque to the queue.
pub struct TaskRecord {
    /// Scheduling priority; lower is more urgent.
    pub priority: u8,
    /// Monotonic submission sequence, unique per queue.
    pub seq: TaskId,
    pub(crate) work: UnitOfWork,
    pub(crate) outcome_tx: oneshot::Sender<TaskOutcome>,
}

impl TaskRecord {
    pub(crate) fn into_parts(self) -> (UnitOfWork, oneshot::Sender<TaskOutcome>) {
        (self.work, self.outcome_tx)
    }
}

impl PartialEq for TaskRecord {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for TaskRecord {}

impl PartialOrd for TaskRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaskRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest (priority, seq)
        // surfaces first.
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

/// Handle to a submitted unit of work.
///
/// The handle owns the task's result channel. Dropping it is allowed and
/// turns the task into fire-and-forget; the worker's delivery is then
/// silently discarded.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    outcome_rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    /// The task's identifier (its submission sequence number).
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Await the task's outcome.
    ///
    /// # Errors
    ///
    /// Returns the unit of work's own error, or a synthetic error when the
    /// task was dropped unexecuted (queue discarded or pool shut down).
    pub async fn outcome(self) -> TaskOutcome {
        let id = self.id;
        match self.outcome_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(anyhow::anyhow!("task {id} was dropped before execution")),
        }
    }

    /// Block the current thread until the task's outcome arrives.
    ///
    /// Must not be called from an async context; use [`Self::outcome`]
    /// there instead.
    ///
    /// # Errors
    ///
    /// Same as [`Self::outcome`].
    pub fn wait_blocking(self) -> TaskOutcome {
        let id = self.id;
        match self.outcome_rx.blocking_recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(anyhow::anyhow!("task {id} was dropped before execution")),
        }
    }
}

struct QueueInner {
    heap: BinaryHeap<TaskRecord>,
    next_seq: TaskId,
    closed: Option<CloseMode>,
}

/// Concurrency-safe queue ordering pending units of work by
/// `(priority, sequence)`.
///
/// Submitters and workers share one instance; all mutation happens under an
/// internal lock, and workers block on a condvar while the queue is empty —
/// no polling.
pub struct PriorityTaskQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
    max_depth: usize,
}

impl PriorityTaskQueue {
    /// Create a queue bounded at `max_depth` buffered records.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                heap: BinaryHeap::new(),
                next_seq: 0,
                closed: None,
            }),
            available: Condvar::new(),
            max_depth,
        }
    }

    /// Enqueue a unit of work and return immediately.
    ///
    /// A fresh monotonic sequence number is allocated under the lock; the
    /// submitter never blocks on execution.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::QueueClosed`] after [`Self::close`]
    /// - [`RuntimeError::QueueFull`] when the depth bound is reached
    pub fn push(&self, work: UnitOfWork, priority: u8) -> Result<TaskHandle, RuntimeError> {
        let mut inner = self.inner.lock();
        if inner.closed.is_some() {
            return Err(RuntimeError::QueueClosed);
        }
        if inner.heap.len() >= self.max_depth {
            return Err(RuntimeError::QueueFull {
                depth: self.max_depth,
            });
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let (outcome_tx, outcome_rx) = oneshot::channel();
        inner.heap.push(TaskRecord {
            priority,
            seq,
            work,
            outcome_tx,
        });
        drop(inner);

        self.available.notify_one();
        debug!(task_id = seq, priority, "task enqueued");
        Ok(TaskHandle {
            id: seq,
            outcome_rx,
        })
    }

    /// Block until a record is available and dequeue it.
    ///
    /// Returns `None` once the queue is exhausted: immediately after a
    /// [`CloseMode::Discard`] close, or after the backlog has been served
    /// for a [`CloseMode::Drain`] close.
    pub fn pop_blocking(&self) -> Option<TaskRecord> {
        let mut inner = self.inner.lock();
        loop {
            match inner.closed {
                Some(CloseMode::Discard) => return None,
                Some(CloseMode::Drain) => return inner.heap.pop(),
                None => {}
            }
            if let Some(record) = inner.heap.pop() {
                return Some(record);
            }
            self.available.wait(&mut inner);
        }
    }

    /// Like [`Self::pop_blocking`], but gives up after `timeout` and returns
    /// `None` without the queue being closed.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<TaskRecord> {
        let mut inner = self.inner.lock();
        loop {
            match inner.closed {
                Some(CloseMode::Discard) => return None,
                Some(CloseMode::Drain) => return inner.heap.pop(),
                None => {}
            }
            if let Some(record) = inner.heap.pop() {
                return Some(record);
            }
            if self.available.wait_for(&mut inner, timeout).timed_out() {
                return None;
            }
        }
    }

    /// Dequeue the next record without blocking.
    pub fn try_pop(&self) -> Option<TaskRecord> {
        self.inner.lock().heap.pop()
    }

    /// Close the queue and wake all blocked workers.
    ///
    /// Subsequent [`Self::push`] calls fail with
    /// [`RuntimeError::QueueClosed`]. A [`CloseMode::Discard`] close drops
    /// the buffered records immediately, so their submitters observe the
    /// dropped-before-execution outcome rather than waiting forever.
    /// Closing an already-closed queue keeps the original mode.
    pub fn close(&self, mode: CloseMode) {
        let mut inner = self.inner.lock();
        if inner.closed.is_none() {
            inner.closed = Some(mode);
            debug!(?mode, remaining = inner.heap.len(), "task queue closed");
            if mode == CloseMode::Discard {
                inner.heap.clear();
            }
        }
        drop(inner);
        self.available.notify_all();
    }

    /// Whether the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed.is_some()
    }

    /// Number of buffered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// Whether no records are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
