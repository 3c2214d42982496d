//! # Automaton Core
//!
//! The embryonic application runtime for the Automaton plugin platform.
//!
//! This library provides the in-process coordination layer every Automaton
//! deployment is built around: a process lifecycle state machine, a priority
//! task scheduler backed by a dedicated worker pool, and a namespaced
//! publish/subscribe event bus that fans dispatched events out to registered
//! listeners as scheduled units of work.
//!
//! ## Core Problem Solved
//!
//! Plugin platforms need a small, dependable kernel with hard guarantees:
//!
//! - **Deterministic scheduling**: work is executed in ascending
//!   `(priority, submission sequence)` order, so equal-priority tasks run
//!   first-in-first-out no matter how many workers drain the queue
//! - **Failure isolation**: one failing or panicking unit of work must never
//!   stall a worker or take the pool down with it
//! - **Lifecycle gating**: dispatch and submission are rejected the moment
//!   the owning component leaves its running phase, so in-flight work is
//!   never expanded during shutdown
//!
//! ## Components
//!
//! - [`core::LifecycleState`] — ordered state machine
//!   (`"" → STARTING → RUNNING → STOPPING → STOPPED`), usable standalone
//! - [`core::PriorityTaskQueue`] — concurrency-safe `(priority, sequence)`
//!   ordered queue
//! - [`core::WorkerPool`] — dedicated OS worker threads draining the queue
//! - [`events::EventBus`] — namespaced listener registry plus dispatch
//!   gating and fan-out
//! - [`runtime::Core`] — wires the above into a startable, stoppable runtime
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use automaton_core::events::listener_fn;
//! use automaton_core::runtime::Core;
//!
//! let core = Arc::new(Core::default());
//! core.bus().listen("greeter:hello", 5, listener_fn(|event| async move {
//!     println!("got {event}");
//!     Ok(())
//! }))?;
//!
//! let runner = Arc::clone(&core);
//! std::thread::spawn(move || runner.start());
//! // ... dispatch events, submit tasks ...
//! core.bus().dispatch("greeter:hello")?;
//! core.stop()?;
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Lifecycle state machine, priority queue, and worker pool primitives.
pub mod core;
/// Namespaced events, the listener registry, and the event bus.
pub mod events;
/// Typed key-value configuration store consumed at startup.
pub mod config;
/// The `Core` runtime orchestrator gluing pool, bus, and lifecycle together.
pub mod runtime;
/// Shared utilities.
pub mod util;
