//! The runtime core: lifecycle orchestration over pool, bus, and config.
//!
//! [`Core`] owns its own [`LifecycleState`], one worker pool (built at
//! [`Core::start`] from the resolved configuration), and one [`EventBus`].
//! `start()` blocks on the run loop until [`Core::stop`] is called from
//! another thread (or from a listener); the final STOPPING→STOPPED
//! transition happens on the run-loop thread once it wakes.
//!
//! The pool does not exist before `start()`, so the bus submits through a
//! [`SchedulerHandle`] — an install-at-start indirection that lets listeners
//! register well before the runtime comes up.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::store::{ConfigStore, ENV_PREFIX};
use crate::core::error::RuntimeError;
use crate::core::lifecycle::{LifecycleState, RUNNING, STARTING, STOPPED, STOPPING};
use crate::core::queue::{TaskHandle, TaskId, TaskOutcome, UnitOfWork, DEFAULT_TASK_PRIORITY};
use crate::core::worker_pool::{
    PoolStats, ShutdownMode, TaskSink, WorkerPool, WorkerPoolConfig,
};
use crate::events::bus::EventBus;

/// Cloneable submission handle pointing at whichever worker pool is live.
///
/// Empty until the owning [`Core`] starts; submissions while no pool is
/// installed fail with [`RuntimeError::PoolShutdown`].
#[derive(Clone, Default)]
pub struct SchedulerHandle {
    pool: Arc<RwLock<Option<Arc<WorkerPool>>>>,
}

impl SchedulerHandle {
    fn install(&self, pool: Arc<WorkerPool>) {
        *self.pool.write() = Some(pool);
    }

    fn uninstall(&self) -> Option<Arc<WorkerPool>> {
        self.pool.write().take()
    }

    fn live(&self) -> Result<Arc<WorkerPool>, RuntimeError> {
        self.pool
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(RuntimeError::PoolShutdown)
    }

    /// Whether a pool is currently installed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.pool.read().is_some()
    }
}

impl TaskSink for SchedulerHandle {
    fn submit_work(&self, work: UnitOfWork, priority: u8) -> Result<TaskId, RuntimeError> {
        self.live()?.submit_work(work, priority)
    }
}

/// The application runtime's heart: lifecycle, scheduler, and event bus.
pub struct Core {
    state: Mutex<LifecycleState>,
    config: ConfigStore,
    scheduler: SchedulerHandle,
    bus: EventBus,
    stop_tx: Mutex<Option<crossbeam_channel::Sender<()>>>,
}

impl Default for Core {
    fn default() -> Self {
        Self::new(ConfigStore::new())
    }
}

impl Core {
    /// Create a core around a configuration store.
    ///
    /// The store is consulted once at [`Self::start`]; listeners may be
    /// registered on [`Self::bus`] immediately.
    #[must_use]
    pub fn new(config: ConfigStore) -> Self {
        let scheduler = SchedulerHandle::default();
        let bus = EventBus::new(Arc::new(scheduler.clone()));
        Self {
            state: Mutex::new(LifecycleState::new()),
            config,
            scheduler,
            bus,
            stop_tx: Mutex::new(None),
        }
    }

    /// The core's event bus.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The core's configuration store.
    #[must_use]
    pub const fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// String form of the core's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> String {
        self.state.lock().name().to_owned()
    }

    /// Start the runtime and block on its run loop until [`Self::stop`].
    ///
    /// Hydrates configuration from the environment, resolves the worker
    /// count (`WORKER_COUNT`; 0 or absent means one worker per available
    /// core), builds and installs the worker pool, opens the event bus,
    /// and transitions STARTING→RUNNING. Returns once the runtime has
    /// reached STOPPED. A stopped core may be started again.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::InvalidTransition`] unless called from the absent
    ///   or STOPPED state
    /// - [`RuntimeError::InvalidConfig`] when the pool configuration is
    ///   rejected
    pub fn start(&self) -> Result<(), RuntimeError> {
        {
            let mut state = self.state.lock();
            if !(state.is_absent() || *state == STOPPED) {
                return Err(RuntimeError::InvalidTransition {
                    operation: "start",
                    state: state.name().to_owned(),
                });
            }
            state.set_state(STARTING)?;
        }
        info!("core starting");

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        *self.stop_tx.lock() = Some(stop_tx);

        self.config.hydrate_from_env(ENV_PREFIX);
        let worker_count = match self.config.worker_count() {
            None | Some(0) => num_cpus::get(),
            Some(n) => n,
        };

        let pool = match WorkerPool::new(WorkerPoolConfig::new().with_worker_count(worker_count)) {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                warn!(error = %e, "core startup failed, rolling back to STOPPED");
                self.stop_tx.lock().take();
                let _ = self.state.lock().set_state(STOPPED);
                return Err(e);
            }
        };
        self.scheduler.install(pool);
        self.bus.open();
        self.state.lock().set_state(RUNNING)?;
        info!(worker_count, "core running");

        // Run loop: park until stop() signals shutdown.
        let _ = stop_rx.recv();

        self.state.lock().set_state(STOPPED)?;
        info!("core stopped");
        Ok(())
    }

    /// Stop the runtime gracefully (in-flight work finishes, backlog is
    /// dropped).
    ///
    /// # Errors
    ///
    /// See [`Self::stop_with`].
    pub fn stop(&self) -> Result<(), RuntimeError> {
        self.stop_with(ShutdownMode::Graceful)
    }

    /// Stop the runtime with an explicit shutdown mode.
    ///
    /// Transitions to STOPPING, closes the bus for new dispatches, shuts
    /// the pool down per `mode`, and wakes the run loop; the run-loop
    /// thread then completes the STOPPING→STOPPED transition. Safe to call
    /// from a listener running on a worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidTransition`] unless called while
    /// STARTING or RUNNING.
    pub fn stop_with(&self, mode: ShutdownMode) -> Result<(), RuntimeError> {
        {
            let mut state = self.state.lock();
            if !(*state == STARTING || *state == RUNNING) {
                return Err(RuntimeError::InvalidTransition {
                    operation: "stop",
                    state: state.name().to_owned(),
                });
            }
            state.set_state(STOPPING)?;
        }
        info!(?mode, "core stopping");

        self.bus.stop_soon();
        if let Some(pool) = self.scheduler.uninstall() {
            pool.shutdown(mode);
        }
        if let Some(stop_tx) = self.stop_tx.lock().take() {
            let _ = stop_tx.send(());
        }
        Ok(())
    }

    /// Submit a unit of work at [`DEFAULT_TASK_PRIORITY`].
    ///
    /// # Errors
    ///
    /// See [`Self::submit_with_priority`].
    pub fn submit<F>(&self, work: F) -> Result<TaskHandle, RuntimeError>
    where
        F: std::future::Future<Output = TaskOutcome> + Send + 'static,
    {
        self.submit_with_priority(work, DEFAULT_TASK_PRIORITY)
    }

    /// Submit a unit of work at an explicit priority.
    ///
    /// A thin forward to the scheduler, accepted only while the core is
    /// STARTING or RUNNING.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Closed`] outside STARTING/RUNNING
    /// - queue errors from the pool
    pub fn submit_with_priority<F>(
        &self,
        work: F,
        priority: u8,
    ) -> Result<TaskHandle, RuntimeError>
    where
        F: std::future::Future<Output = TaskOutcome> + Send + 'static,
    {
        {
            let state = self.state.lock();
            if !(*state == STARTING || *state == RUNNING) {
                return Err(RuntimeError::Closed {
                    component: "core",
                    state: state.name().to_owned(),
                });
            }
        }
        self.scheduler.live()?.submit(Box::pin(work), priority)
    }

    /// Statistics of the live worker pool, if one is installed.
    #[must_use]
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.scheduler.live().ok().map(|pool| pool.stats())
    }
}
