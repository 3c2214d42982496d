//! The event bus: dispatch gating, listener resolution, and fan-out.
//!
//! [`EventBus`] owns an [`EventRegistry`] and its own [`LifecycleState`],
//! independent from the runtime's state and used only to gate dispatch. A
//! bus is born closed (absent state) and accepts dispatches only after
//! [`EventBus::open`]; [`EventBus::stop_soon`] closes it again without
//! touching listener invocations already handed to the scheduler — in-flight
//! work started before closing is never expanded.
//!
//! Dispatch is fire-and-forget: matched listener invocations are submitted
//! to the scheduler at [`EVENT_TASK_PRIORITY`] and the dispatcher never
//! waits for their completion. Listener-priority order is preserved end to
//! end because submissions happen in registry order and the queue breaks
//! equal-priority ties by submission sequence.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::error::RuntimeError;
use crate::core::lifecycle::{LifecycleState, RUNNING, STOPPING};
use crate::core::queue::EVENT_TASK_PRIORITY;
use crate::core::worker_pool::TaskSink;
use crate::events::event::{Event, EventSpec};
use crate::events::registry::{EventRegistry, ListenerToken};

/// Priority assigned to listeners registered without an explicit one.
pub const DEFAULT_LISTENER_PRIORITY: u8 = 9;

/// Bus states in which new dispatches are rejected.
pub const CLOSED_STATES: [&str; 3] = ["", STOPPING, crate::core::lifecycle::STOPPED];

/// A callable registered to run when a matching event is dispatched.
///
/// Listeners are referenced, never owned, by the registry; their lifetime
/// belongs to whoever registered them.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Handle one dispatched event.
    async fn on_event(&self, event: Event) -> anyhow::Result<()>;
}

/// Shared handle to a registered listener.
pub type Listener = Arc<dyn EventListener>;

type ListenerFuture = std::pin::Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

struct FnListener<F>(F);

#[async_trait]
impl<F> EventListener for FnListener<F>
where
    F: Fn(Event) -> ListenerFuture + Send + Sync + 'static,
{
    async fn on_event(&self, event: Event) -> anyhow::Result<()> {
        (self.0)(event).await
    }
}

/// Wrap an async closure as a [`Listener`].
pub fn listener_fn<F, Fut>(f: F) -> Listener
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnListener(move |event| {
        Box::pin(f(event)) as ListenerFuture
    }))
}

/// Namespaced publish/subscribe bus feeding the task scheduler.
pub struct EventBus {
    registry: RwLock<EventRegistry>,
    state: Mutex<LifecycleState>,
    sink: Arc<dyn TaskSink>,
}

impl EventBus {
    /// Create a bus submitting through the given sink. The bus starts on
    /// the absent state, i.e. closed for dispatch.
    #[must_use]
    pub fn new(sink: Arc<dyn TaskSink>) -> Self {
        Self {
            registry: RwLock::new(EventRegistry::new()),
            state: Mutex::new(LifecycleState::new()),
            sink,
        }
    }

    /// Register a listener against an event identity.
    ///
    /// A string spec is parsed as the `"NAMESPACE[:NAME]"` wire format and
    /// registers non-strict, since no payload is supplied. The returned
    /// token can be passed to [`Self::unlisten`] later.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidEventSpec`] for a malformed string
    /// spec.
    pub fn listen<S: Into<EventSpec>>(
        &self,
        spec: S,
        priority: u8,
        listener: Listener,
    ) -> Result<ListenerToken, RuntimeError> {
        let event = spec.into().resolve()?;
        debug!(event = %event, priority, "listener registered");
        Ok(self.registry.write().insert(event, priority, listener))
    }

    /// Remove a previously registered listener.
    ///
    /// Returns `false` when the token no longer resolves.
    pub fn unlisten(&self, token: &ListenerToken) -> bool {
        self.registry.write().remove(token)
    }

    /// Dispatch an event with no extra payload attributes.
    ///
    /// # Errors
    ///
    /// See [`Self::dispatch_with`].
    pub fn dispatch<S: Into<EventSpec>>(&self, spec: S) -> Result<usize, RuntimeError> {
        self.dispatch_with(spec, std::iter::empty())
    }

    /// Dispatch an event, merging `extra` into its payload first.
    ///
    /// On success the event is stamped with the current dispatch timestamp
    /// and one unit of work per matching listener is submitted to the
    /// scheduler at [`EVENT_TASK_PRIORITY`], in listener-priority order.
    /// Returns the number of submitted invocations; the dispatcher never
    /// blocks on their completion.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Closed`] while the bus state is one of
    ///   [`CLOSED_STATES`]
    /// - [`RuntimeError::InvalidEventSpec`] for a malformed string spec
    /// - scheduler errors from the sink; later matches are not submitted
    ///   once one submission fails
    pub fn dispatch_with<S, I>(&self, spec: S, extra: I) -> Result<usize, RuntimeError>
    where
        S: Into<EventSpec>,
        I: IntoIterator<Item = (String, Value)>,
    {
        {
            let state = self.state.lock();
            if CLOSED_STATES.contains(&state.name()) {
                warn!(state = %state, "dispatch rejected, event bus is closed");
                return Err(RuntimeError::Closed {
                    component: "event bus",
                    state: state.name().to_owned(),
                });
            }
        }

        let mut event = spec.into().resolve()?;
        event.merge_payload(extra);
        event.stamp_dispatched();

        let matched = self.registry.read().matches(&event);
        let count = matched.len();
        for (_listener_priority, listener) in matched {
            let invocation_event = event.clone();
            self.sink.submit_work(
                Box::pin(async move { listener.on_event(invocation_event).await }),
                EVENT_TASK_PRIORITY,
            )?;
        }
        debug!(event = %event, listeners = count, "event dispatched");
        Ok(count)
    }

    /// All `(priority, listener)` pairs matching `event`, in dispatch
    /// order; empty (not an error) when no listeners match.
    #[must_use]
    pub fn get_listeners(&self, event: &Event) -> Vec<(u8, Listener)> {
        self.registry.read().matches(event)
    }

    /// Open the bus for dispatch by moving its state to RUNNING.
    pub fn open(&self) {
        let mut state = self.state.lock();
        // RUNNING is always a member of the default sequence.
        state
            .set_state(RUNNING)
            .expect("default sequence contains RUNNING");
        debug!("event bus opened");
    }

    /// Close the bus for new dispatches without affecting already-submitted
    /// listener invocations.
    pub fn stop_soon(&self) {
        let mut state = self.state.lock();
        state
            .set_state(STOPPING)
            .expect("default sequence contains STOPPING");
        debug!("event bus stopping, new dispatches rejected");
    }

    /// Move the bus to an explicit lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidState`] when the target is not in the
    /// bus's state sequence.
    pub fn set_state<T: Into<crate::core::lifecycle::StateTarget>>(
        &self,
        target: T,
    ) -> Result<(), RuntimeError> {
        self.state.lock().set_state(target)
    }

    /// String form of the bus's current state.
    #[must_use]
    pub fn state(&self) -> String {
        self.state.lock().name().to_owned()
    }
}
