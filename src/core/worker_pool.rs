//! Worker pool draining the shared priority queue on dedicated OS threads.
//!
//! Each worker owns a single-threaded tokio runtime and loops: block-wait for
//! the next [`TaskRecord`](crate::core::queue::TaskRecord), execute its unit
//! of work to completion, deliver the outcome on the task's result channel,
//! repeat. Workers never retry failed work and never die because of it — a
//! failing (or panicking) unit of work is reported to its submitter and the
//! worker moves on to the next item.
//!
//! # Design
//!
//! - **No polling**: workers park on the queue condvar; closing the queue
//!   wakes them for exit
//! - **Failure isolation**: panics are caught per task and routed to the
//!   task's own result channel
//! - **Best-effort hard cancel**: immediate shutdown signals a cancellation
//!   watch; in-flight work is dropped at its next await point, with no
//!   guarantee about partial side effects

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::core::error::RuntimeError;
use crate::core::queue::{CloseMode, PriorityTaskQueue, TaskHandle, TaskId, UnitOfWork};

/// Submission seam between the event bus and whichever scheduler is live.
///
/// [`WorkerPool`] implements this directly; the runtime's
/// [`SchedulerHandle`](crate::runtime::SchedulerHandle) implements it as an
/// install-at-start indirection.
pub trait TaskSink: Send + Sync {
    /// Enqueue a unit of work at the given priority, fire-and-forget.
    ///
    /// # Errors
    ///
    /// Propagates queue and shutdown errors from the underlying scheduler.
    fn submit_work(&self, work: UnitOfWork, priority: u8) -> Result<TaskId, RuntimeError>;
}

/// How [`WorkerPool::shutdown`] treats queued and in-flight work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Let each worker finish its current unit of work, drop the backlog.
    Graceful,
    /// Serve the queued backlog first, then stop.
    Drain,
    /// Drop the backlog and cancel in-flight work at its next await point.
    Immediate,
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Maximum queued tasks before submission is rejected.
    pub max_queue_depth: usize,
    /// Stack size for worker threads, in bytes.
    pub thread_stack_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPoolConfig {
    /// Configuration with defaults: one worker per available core, a queue
    /// depth of 1024, and 2 MiB worker stacks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            worker_count: num_cpus::get(),
            max_queue_depth: 1024,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }

    /// Override the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Override the queue depth bound.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, max_queue_depth: usize) -> Self {
        self.max_queue_depth = max_queue_depth;
        self
    }

    /// Override the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = thread_stack_size;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Total tasks submitted.
    pub submitted_tasks: u64,
    /// Tasks waiting in the queue.
    pub queued_tasks: u64,
    /// Currently executing tasks.
    pub active_tasks: u64,
    /// Tasks whose unit of work completed successfully.
    pub completed_tasks: u64,
    /// Tasks whose unit of work failed or panicked.
    pub failed_tasks: u64,
}

/// Internal counters for pool statistics (lock-free atomics).
#[derive(Debug, Default)]
struct PoolCounters {
    submitted_tasks: AtomicU64,
    queued_tasks: AtomicU64,
    active_tasks: AtomicU64,
    completed_tasks: AtomicU64,
    failed_tasks: AtomicU64,
}

impl PoolCounters {
    fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
        }
    }
}

/// Fixed-size pool of dedicated OS worker threads draining one shared
/// [`PriorityTaskQueue`].
///
/// The pool is lifecycle-unaware: it accepts submissions until shut down.
/// Gating submissions on a run-phase belongs to the owning
/// [`Core`](crate::runtime::Core).
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<PriorityTaskQueue>,
    counters: Arc<PoolCounters>,
    cancel_tx: watch::Sender<bool>,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool and spawn its worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] when the configuration is
    /// invalid.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, RuntimeError> {
        config.validate().map_err(RuntimeError::InvalidConfig)?;

        let queue = Arc::new(PriorityTaskQueue::new(config.max_queue_depth));
        let counters = Arc::new(PoolCounters::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            workers.push(spawn_worker(
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&counters),
                cancel_rx.clone(),
                config.thread_stack_size,
            ));
        }

        info!(
            worker_count = config.worker_count,
            max_queue_depth = config.max_queue_depth,
            "worker pool initialized"
        );

        Ok(Self {
            config,
            queue,
            counters,
            cancel_tx,
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(workers),
        })
    }

    /// Submit a unit of work at the given priority.
    ///
    /// Enqueue is non-blocking; the returned [`TaskHandle`] carries the
    /// task's result channel and may be dropped for fire-and-forget use.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::PoolShutdown`] once the pool has been shut down
    /// - [`RuntimeError::QueueFull`] when the queue depth bound is reached
    pub fn submit(&self, work: UnitOfWork, priority: u8) -> Result<TaskHandle, RuntimeError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(RuntimeError::PoolShutdown);
        }
        // Count the task as queued before the push so a worker that grabs it
        // immediately never decrements past zero.
        self.counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
        match self.queue.push(work, priority) {
            Ok(handle) => {
                self.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
                Ok(handle)
            }
            Err(e) => {
                self.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                match e {
                    RuntimeError::QueueClosed => Err(RuntimeError::PoolShutdown),
                    other => Err(other),
                }
            }
        }
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.worker_count)
    }

    /// Number of worker threads the pool was built with.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.config.worker_count
    }

    /// Shut down the pool.
    ///
    /// Signals the queue per `mode`, then joins each worker with a short
    /// timeout; workers that do not exit in time are detached rather than
    /// blocking shutdown forever. Calling this twice is a no-op.
    pub fn shutdown(&self, mode: ShutdownMode) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(?mode, "shutting down worker pool");

        match mode {
            ShutdownMode::Graceful => self.queue.close(CloseMode::Discard),
            ShutdownMode::Drain => self.queue.close(CloseMode::Drain),
            ShutdownMode::Immediate => {
                self.queue.close(CloseMode::Discard);
                let _ = self.cancel_tx.send(true);
            }
        }

        let mut workers = self.workers.lock();
        let worker_total = workers.len();
        for (worker_id, worker) in workers.drain(..).enumerate() {
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            let join_helper = thread::spawn(move || {
                let _ = done_tx.send(worker.join().is_ok());
            });

            match done_rx.recv_timeout(Duration::from_secs(2)) {
                Ok(true) => {
                    debug!(worker_id, "worker joined");
                    let _ = join_helper.join();
                }
                Ok(false) => {
                    warn!(worker_id, "worker panicked outside task execution");
                    let _ = join_helper.join();
                }
                Err(_) => {
                    warn!(worker_id, "worker did not exit within timeout, detaching");
                }
            }
        }
        drop(workers);

        info!(worker_count = worker_total, "worker pool shut down complete");
    }
}

impl TaskSink for WorkerPool {
    fn submit_work(&self, work: UnitOfWork, priority: u8) -> Result<TaskId, RuntimeError> {
        self.submit(work, priority).map(|handle| handle.id())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Close the queue so parked workers exit, but do not join here;
        // explicit shutdown() is required for a synchronized stop.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.queue.close(CloseMode::Discard);
            debug!("worker pool dropped without explicit shutdown, workers detached");
        }
    }
}

fn spawn_worker(
    worker_id: usize,
    queue: Arc<PriorityTaskQueue>,
    counters: Arc<PoolCounters>,
    cancel_rx: watch::Receiver<bool>,
    stack_size: usize,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("automaton-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "worker thread started");

            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(worker_id, error = %e, "failed to create worker runtime");
                    return;
                }
            };

            while let Some(record) = queue.pop_blocking() {
                counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                counters.active_tasks.fetch_add(1, Ordering::Relaxed);

                let task_id = record.seq;
                let priority = record.priority;
                let (work, outcome_tx) = record.into_parts();
                debug!(worker_id, task_id, priority, "worker executing task");

                let mut cancel = cancel_rx.clone();
                let ran = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    rt.block_on(async {
                        tokio::select! {
                            outcome = work => outcome,
                            _ = cancel.changed() => {
                                Err(anyhow::anyhow!("task {task_id} cancelled during pool shutdown"))
                            }
                        }
                    })
                }));
                let outcome = ran.unwrap_or_else(|panic| {
                    Err(anyhow::anyhow!(
                        "task {task_id} panicked: {}",
                        panic_message(panic.as_ref())
                    ))
                });

                counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
                if outcome.is_ok() {
                    counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                    debug!(worker_id, task_id, "worker completed task");
                } else {
                    counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                    warn!(worker_id, task_id, "task failed, worker continues");
                }

                // The submitter may have dropped its handle; delivery is
                // best-effort by contract.
                let _ = outcome_tx.send(outcome);
            }

            debug!(worker_id, "worker thread exiting");
        })
        .expect("failed to spawn worker thread")
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic.downcast_ref::<&str>().map_or_else(
        || {
            panic
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "non-string panic payload".into())
        },
        ToString::to_string,
    )
}
