//! Moving segment bytes to storage.

pub mod progress;
pub mod resumable;

pub use progress::{format_bytes, SweepStats};
pub use resumable::{RemoteSink, ResumableTransfer, RetryPolicy, TransferResult};
