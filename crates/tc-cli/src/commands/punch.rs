//! Punch commands: clock in/out, break start/end, and administrator overrides.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::SecondsFormat;

use tc_core::{AdminId, DeviceId, EventDraft, EventType, ManualOverride, StaffId};
use tc_sync::{ClockError, ClockService, PunchReceipt};

use crate::Config;
use crate::backend;
use crate::cli::{OverrideArgs, PunchArgs};
use crate::commands::{sync, util};

pub fn run<W: Write>(
    writer: &mut W,
    event_type: EventType,
    args: &PunchArgs,
    config: &Config,
) -> Result<()> {
    let staff = util::resolve_staff(args.staff.as_deref(), config)?;
    let device = args.device.clone().unwrap_or_else(|| config.device_id());
    let at = util::resolve_time(args.at.as_deref())?;

    let mut draft = EventDraft::new(staff, device, event_type, at);
    if let Some(reason) = &args.reason {
        draft = draft.with_reason(reason.as_str());
    }

    let (receipt, last_sync) = util::runtime()?.block_on(async {
        let clock = ClockService::new(backend::connect(config).await?);
        let receipt = clock.punch(&draft).await.map_err(explain)?;
        let last_sync = clock.engine().status().await?.last_sync;
        anyhow::Ok((receipt, last_sync))
    })?;
    sync::remember_last_sync(config, last_sync)?;

    write!(writer, "{}", format_receipt(&receipt))?;
    Ok(())
}

pub fn run_override<W: Write>(writer: &mut W, args: &OverrideArgs, config: &Config) -> Result<()> {
    let request = ManualOverride {
        staff_id: StaffId::new(util::resolve_staff(args.staff.as_deref(), config)?)?,
        device_id: DeviceId::new(args.device.clone().unwrap_or_else(|| config.device_id()))?,
        admin_id: AdminId::new(args.admin.as_str()).context("--admin must not be blank")?,
        punch: args.punch,
        occurred_at: util::resolve_time(args.at.as_deref())?,
        reason: args.reason.clone(),
    };

    let (receipt, last_sync) = util::runtime()?.block_on(async {
        let clock = ClockService::new(backend::connect(config).await?);
        let receipt = clock.manual_override(request).await.map_err(explain)?;
        let last_sync = clock.engine().status().await?.last_sync;
        anyhow::Ok((receipt, last_sync))
    })?;
    sync::remember_last_sync(config, last_sync)?;

    write!(writer, "{}", format_receipt(&receipt))?;
    Ok(())
}

/// Puts the stable rule code in front of rule violations.
fn explain(err: ClockError) -> anyhow::Error {
    match err {
        ClockError::Rule(violation) => anyhow::anyhow!("{}: {violation}", violation.code()),
        other => anyhow::Error::new(other),
    }
}

pub fn format_receipt(receipt: &PunchReceipt) -> String {
    let event = &receipt.queued.event;
    let mut line = format!(
        "Recorded {} for {} at {}",
        event.description(),
        event.staff_id,
        event.occurred_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    if let Some(admin) = &event.admin_id {
        line.push_str(&format!(" by {admin}"));
    }
    if receipt.delivered {
        line.push_str(".\n");
    } else {
        line.push_str(" (pending sync).\n");
    }
    line
}
