use std::time::Duration;

use tracing::info;

use crate::crawler::{Outcome, Report};

pub fn format_elapsed(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms >= 60000 {
        let mins = total_ms / 60000;
        let secs = (total_ms % 60000) / 1000;
        format!("{}m {}s", mins, secs)
    } else if total_ms >= 1000 {
        let secs = total_ms / 1000;
        let ms_remaining = total_ms % 1000;

        if ms_remaining > 0 {
            format!("{}s {}ms", secs, ms_remaining)
        } else {
            format!("{}s", secs)
        }
    } else {
        format!("{}ms", total_ms)
    }
}

pub fn log_summary(report: &Report, elapsed: Duration) {
    for (number, outcome) in &report.outcomes {
        let status = match outcome {
            Outcome::Downloaded(_) => "downloaded",
            Outcome::Skipped(_) => "already present",
            Outcome::Planned(_) => "planned",
        };
        info!("chapter {}: {} ({})", number, status, outcome.path().display());
    }
    info!(
        "done in {}: {} downloaded, {} already present, {} planned, {} failed",
        format_elapsed(elapsed),
        report.downloaded(),
        report.skipped(),
        report.planned(),
        report.failures.len()
    );
}
