//! PITR Agent Library
//!
//! Binlog-based point-in-time recovery for MySQL: replicate binlog segments
//! to storage, then plan and replay them up to an exact instant.

pub mod binlog;
pub mod config;
pub mod daemon;
pub mod fs;
pub mod mysql;
pub mod restore;
pub mod storage;
pub mod sync;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use binlog::{BinlogCoordinate, BinlogInfo};
pub use config::Config;
pub use utils::errors::PitrError;
pub use utils::errors::Result;
