//! Point-in-time restore: plan the replay window, then run it.

pub mod executor;
pub mod planner;

pub use executor::{build_commands, ClientCommand, ReplayCommand, RestoreExecutor, RestoreOptions};
pub use planner::{parse_stop_datetime, plan_restore, RestorePlan};
