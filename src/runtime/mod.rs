//! The `Core` runtime orchestrator and its scheduler handle.

pub mod core;

pub use self::core::{Core, SchedulerHandle};
