//! Shared domain types for the follow monitor.
//!
//! Holds the error taxonomy, the account/change models, the notification
//! sink contract and the CLI/env settings used by every other crate.

pub mod error;
pub mod models;
pub mod notifications;
pub mod settings;

pub use error::{MonitorError, Result};
