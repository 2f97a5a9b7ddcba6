//! Data layer for the follow monitor.
//!
//! Reads follow signals out of rendered profile markup and keeps the durable
//! registry of monitored accounts and their last recorded counts.

pub mod page_reader;
pub mod registry;

pub use monitor_core as core;
