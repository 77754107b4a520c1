//! Display helpers for hour values.

/// Rounds hours to two decimal places for display.
pub fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

/// Formats hours as `"8h"` or `"8h 30m"`.
/// Negative values are treated as zero.
#[allow(clippy::cast_possible_truncation)]
pub fn format_hours(hours: f64) -> String {
    let total_minutes = (hours.max(0.0) * 60.0).round() as i64;
    let whole_hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if minutes == 0 {
        format!("{whole_hours}h")
    } else {
        format!("{whole_hours}h {minutes}m")
    }
}
