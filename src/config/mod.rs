//! Typed key-value configuration store consumed at startup.

pub mod store;

pub use store::{ConfigStore, ENV_PREFIX, WORKER_COUNT};
