//! Human-readable sizes and durations.

use std::time::Duration;

use crate::config::MIB;

const KIB: u64 = 1024;
const GIB: u64 = 1024 * MIB;

/// Format a byte count in binary units, matching how size limits are configured.
pub fn format_size(bytes: u64) -> String {
    match bytes {
        b if b >= GIB => format!("{:.1} GB", b as f64 / GIB as f64),
        b if b >= MIB => format!("{:.1} MB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.1} KB", b as f64 / KIB as f64),
        b => format!("{} B", b),
    }
}

/// Format a duration as `1h 02m`, `3m 05s` or `42s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
