//! CLI subcommand implementations.

pub mod active;
pub mod punch;
pub mod queue;
pub mod report;
pub mod status;
pub mod sync;
pub mod util;
pub mod watch;
