//! Namespaced events, the listener registry, and the event bus.

pub mod bus;
pub mod event;
pub mod registry;

pub use bus::{
    listener_fn, EventBus, EventListener, Listener, CLOSED_STATES, DEFAULT_LISTENER_PRIORITY,
};
pub use event::{Event, EventSpec, Namespace};
pub use registry::{EventRegistry, ListenerToken};
