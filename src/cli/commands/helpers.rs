//! Helper utilities for CLI commands.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::models::{PipelineStatus, Stage};

/// Spinner with a percentage prefix, ticking on its own.
pub fn spinner(message: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos:>3}% {wide_msg}")?
            .progress_chars("█▓░"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

/// Reflect a tracked status on a progress bar.
pub fn show_status(pb: &ProgressBar, status: &PipelineStatus) {
    pb.set_position(status.progress as u64);
    let strategy = status
        .strategy
        .map(|s| format!(" ({})", s))
        .unwrap_or_default();
    pb.set_message(format!("{}{}", stage_label(status.stage), strategy));
}

fn stage_label(stage: Stage) -> String {
    match stage {
        Stage::Completed => style(stage.as_str()).green().to_string(),
        Stage::Failed => style(stage.as_str()).red().to_string(),
        _ => style(stage.as_str()).cyan().to_string(),
    }
}

/// Truncate a string to a maximum number of characters, adding "..." if truncated.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
