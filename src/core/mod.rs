//! Lifecycle, queue, and worker pool primitives.

pub mod error;
pub mod lifecycle;
pub mod queue;
pub mod worker_pool;

pub use error::{AppResult, RuntimeError};
pub use lifecycle::{LifecycleState, StateTarget, RUNNING, STARTING, STOPPED, STOPPING};
pub use queue::{
    CloseMode, PriorityTaskQueue, TaskHandle, TaskId, TaskOutcome, TaskRecord, UnitOfWork,
    DEFAULT_TASK_PRIORITY, EVENT_TASK_PRIORITY,
};
pub use worker_pool::{PoolStats, ShutdownMode, TaskSink, WorkerPool, WorkerPoolConfig};
