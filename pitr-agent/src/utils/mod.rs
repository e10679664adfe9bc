//! Utility modules for the PITR agent.

pub mod errors;
pub mod logger;

pub use errors::{PitrError, Result, SyncFailures};
