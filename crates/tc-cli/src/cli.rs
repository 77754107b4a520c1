//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use tc_core::EventType;

/// Offline-tolerant staff time clock.
///
/// Clock actions are staged in a durable local queue and delivered to the
/// event store whenever it is reachable.
#[derive(Debug, Parser)]
#[command(name = "tc", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a shift.
    ClockIn(PunchArgs),

    /// End a shift.
    ClockOut(PunchArgs),

    /// Start a break.
    BreakStart(PunchArgs),

    /// End a break.
    BreakEnd(PunchArgs),

    /// Record an administrator correction for a missed or wrong punch.
    Override(OverrideArgs),

    /// Deliver queued events now.
    Sync {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show connection, queue, and last sync.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List events waiting to be delivered.
    Queue {
        /// Only this staff member's entries.
        #[arg(long)]
        staff: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show worked hours for a day or a week.
    Report(ReportArgs),

    /// List staff currently clocked in.
    Active {
        /// Ignore events older than this many hours.
        #[arg(long)]
        lookback_hours: Option<u32>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Keep syncing in the foreground until interrupted.
    Watch,
}

/// Options shared by the punch commands.
#[derive(Debug, Clone, Default, Args)]
pub struct PunchArgs {
    /// Staff member (defaults to `staff_id` from config).
    #[arg(long)]
    pub staff: Option<String>,

    /// Device recording the punch (defaults to `device_id` or the hostname).
    #[arg(long)]
    pub device: Option<String>,

    /// When it happened: RFC 3339 or relative ("15 minutes ago"). Defaults to now.
    #[arg(long)]
    pub at: Option<String>,

    /// Free-text note stored with the event.
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct OverrideArgs {
    /// Administrator recording the correction.
    #[arg(long)]
    pub admin: String,

    /// Why the correction is needed.
    #[arg(long)]
    pub reason: String,

    /// The punch being recorded (clock-in, clock-out, break-start, break-end).
    #[arg(long)]
    pub punch: EventType,

    /// Staff member (defaults to `staff_id` from config).
    #[arg(long)]
    pub staff: Option<String>,

    /// Device recording the correction (defaults to `device_id` or the hostname).
    #[arg(long)]
    pub device: Option<String>,

    /// When the corrected punch happened: RFC 3339 or relative. Defaults to now.
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ReportArgs {
    /// Report one day (default).
    #[arg(long, conflicts_with = "week")]
    pub day: bool,

    /// Report seven days, with a per-day breakdown.
    #[arg(long)]
    pub week: bool,

    /// Day to report, or first day of the week (YYYY-MM-DD). Defaults to
    /// today, or this week's Monday with --week.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Only this staff member.
    #[arg(long)]
    pub staff: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}
