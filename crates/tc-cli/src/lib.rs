//! Staff time clock CLI library.
//!
//! Wires configuration, the offline queue, and the event store together
//! behind the `tc` subcommands.

mod backend;
mod cli;
pub mod commands;
mod config;

pub use backend::{AnyStore, connect, open_store};
pub use cli::{Cli, Commands, OverrideArgs, PunchArgs, ReportArgs};
pub use config::{Config, SyncConfig};
