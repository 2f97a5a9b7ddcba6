//! Runtime layer for the follow monitor.
//!
//! Owns the browser session, the in-memory follow state, the resilience policy
//! and the polling loop that ties them together.

pub mod credentials;
pub mod orchestrator;
pub mod session;
pub mod state_store;
pub mod supervisor;
pub mod webdriver;

pub use monitor_core as core;
pub use monitor_data as data;
