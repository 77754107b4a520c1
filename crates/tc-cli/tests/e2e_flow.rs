//! End-to-end tests driving the `tc` binary.
//!
//! Each test gets its own temp directory holding the config, queue, and local
//! event store, so nothing touches the real user data directory.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn tc_binary() -> String {
    env!("CARGO_BIN_EXE_tc").to_string()
}

/// Address nothing listens on; connections are refused immediately.
const UNREACHABLE_SERVER: &str = "http://127.0.0.1:9";

struct Workspace {
    temp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn config_path(&self) -> PathBuf {
        self.path().join("config.toml")
    }

    /// Writes a config using the local store, or `server_url` when given.
    fn write_config(&self, server_url: Option<&str>) {
        let mut config = format!(
            "queue_path = {:?}\nstore_path = {:?}\nstaff_id = \"s-1\"\ndevice_id = \"kiosk-1\"\n",
            self.path().join("queue.db"),
            self.path().join("events.db"),
        );
        if let Some(url) = server_url {
            config.push_str(&format!("server_url = {url:?}\n"));
        }
        config.push_str("\n[sync]\nsubmit_timeout_secs = 2\n");
        std::fs::write(self.config_path(), config).unwrap();
    }

    fn tc(&self, args: &[&str]) -> Output {
        Command::new(tc_binary())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join("xdg-config"))
            .env("XDG_DATA_HOME", self.path().join("xdg-data"))
            .env("TZ", "UTC")
            .env_remove("TC_SERVER_URL")
            .env_remove("TC_STAFF_ID")
            .env_remove("TC_DEVICE_ID")
            .env_remove("TC_QUEUE_PATH")
            .env_remove("TC_STORE_PATH")
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(self.config_path())
            .args(args)
            .output()
            .expect("failed to run tc")
    }

    fn tc_ok(&self, args: &[&str]) -> String {
        let output = self.tc(args);
        assert!(
            output.status.success(),
            "tc {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap()
    }

    fn tc_json(&self, args: &[&str]) -> serde_json::Value {
        serde_json::from_str(&self.tc_ok(args)).unwrap()
    }
}

#[test]
fn test_shift_with_break_is_reported() {
    let ws = Workspace::new();
    ws.write_config(None);

    let out = ws.tc_ok(&["clock-in", "--at", "2025-03-10T09:00:00Z"]);
    assert_eq!(out, "Recorded clock in for s-1 at 2025-03-10T09:00:00Z.\n");
    ws.tc_ok(&["break-start", "--at", "2025-03-10T12:00:00Z"]);
    ws.tc_ok(&["break-end", "--at", "2025-03-10T12:30:00Z"]);
    ws.tc_ok(&["clock-out", "--at", "2025-03-10T17:30:00Z"]);

    let report = ws.tc_json(&["report", "--date", "2025-03-10", "--json"]);
    let staff = &report["staff"][0];
    assert_eq!(staff["staffId"], "s-1");
    assert_eq!(staff["workHours"], 8.5);
    assert_eq!(staff["breakHours"], 0.5);
    assert_eq!(staff["netHours"], 8.0);
    assert_eq!(staff["anomalies"].as_array().unwrap().len(), 0);
}

#[test]
fn test_double_clock_in_is_refused() {
    let ws = Workspace::new();
    ws.write_config(None);

    ws.tc_ok(&["clock-in", "--at", "2025-03-10T09:00:00Z"]);
    let output = ws.tc(&["clock-in", "--at", "2025-03-10T10:00:00Z"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("ALREADY_CLOCKED_IN"),
        "unexpected stderr: {stderr}"
    );

    let output = ws.tc(&["clock-out", "--staff", "s-2", "--at", "2025-03-10T10:00:00Z"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("NOT_CLOCKED_IN"));
}

#[test]
fn test_override_bypasses_rules_and_needs_reason() {
    let ws = Workspace::new();
    ws.write_config(None);

    // Clock-out without a clock-in is fine through the admin path
    let out = ws.tc_ok(&[
        "override",
        "--admin",
        "admin-1",
        "--reason",
        "badge reader down",
        "--punch",
        "clock-out",
        "--at",
        "2025-03-10T17:00:00Z",
    ]);
    assert!(out.contains("by admin-1"), "unexpected output: {out}");

    let output = ws.tc(&[
        "override",
        "--admin",
        "admin-1",
        "--reason",
        "   ",
        "--punch",
        "clock-in",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("reason"));
}

#[test]
fn test_offline_punches_wait_in_queue_until_sync() {
    let ws = Workspace::new();
    ws.write_config(Some(UNREACHABLE_SERVER));

    let out = ws.tc_ok(&["clock-in", "--at", "2025-03-10T09:00:00Z"]);
    assert!(out.ends_with("(pending sync).\n"), "unexpected output: {out}");
    ws.tc_ok(&["clock-out", "--at", "2025-03-10T17:00:00Z"]);

    let status = ws.tc_json(&["status", "--json"]);
    assert_eq!(status["isOnline"], false);
    assert_eq!(status["queueLength"], 2);
    assert!(status["lastSync"].is_null());

    let queued = ws.tc_json(&["queue", "--json"]);
    let types: Vec<&str> = queued
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["eventType"].as_str().unwrap())
        .collect();
    assert_eq!(types, ["CLOCK_IN", "CLOCK_OUT"]);

    let sync = ws.tc_json(&["sync", "--json"]);
    assert_eq!(sync["success"], 0);
    assert_eq!(sync["queueLength"], 2);

    // Store reachable again
    ws.write_config(None);
    let sync = ws.tc_json(&["sync", "--json"]);
    assert_eq!(sync["success"], 2);
    assert_eq!(sync["failed"], 0);
    assert_eq!(sync["queueLength"], 0);

    let status = ws.tc_json(&["status", "--json"]);
    assert_eq!(status["queueLength"], 0);
    assert!(status["lastSync"].is_string());

    let report = ws.tc_json(&["report", "--date", "2025-03-10", "--staff", "s-1", "--json"]);
    assert_eq!(report["staff"][0]["workHours"], 8.0);
}

#[test]
fn test_active_lists_clocked_in_staff() {
    let ws = Workspace::new();
    ws.write_config(None);

    ws.tc_ok(&["clock-in", "--at", "2 hours ago"]);
    ws.tc_ok(&["clock-in", "--staff", "s-2", "--at", "3 hours ago"]);
    ws.tc_ok(&["clock-out", "--staff", "s-2", "--at", "1 hour ago"]);

    let active = ws.tc_json(&["active", "--json"]);
    let staff: Vec<&str> = active
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["staffId"].as_str().unwrap())
        .collect();
    assert_eq!(staff, ["s-1"]);

    let out = ws.tc_ok(&["active", "--lookback-hours", "1"]);
    assert_eq!(out, "Nobody is clocked in.\n");
}

#[test]
fn test_no_command_prints_help() {
    let ws = Workspace::new();
    ws.write_config(None);
    let out = ws.tc_ok(&[]);
    assert!(out.contains("Usage:"));
}
