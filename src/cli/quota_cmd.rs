//! Quota command.

use chrono::Utc;
use console::style;

use crate::config::Settings;
use crate::quota::QuotaTracker;

/// Show the quota window state.
pub async fn cmd_quota(settings: &Settings) -> anyhow::Result<()> {
    let tracker = QuotaTracker::new(
        &settings.database_path(),
        settings.quota_window_secs as u64,
        settings.quota_ceiling,
    )?;

    let Some(record) = tracker.status()? else {
        println!(
            "{} No jobs recorded yet ({} listings per {}s window)",
            style("·").dim(),
            tracker.ceiling(),
            tracker.window_secs()
        );
        return Ok(());
    };

    let now = Utc::now().timestamp();
    let window_age = now - record.window_reset_epoch;
    let in_window = window_age < tracker.window_secs();
    let used = if in_window { record.window_count } else { 0 };
    let remaining = tracker.ceiling().saturating_sub(used);

    println!("{} Quota window", style("·").dim());
    println!("  last job:   {}", record.last_job_time);
    println!(
        "  window:     {}s of {}s elapsed{}",
        window_age.max(0).min(tracker.window_secs()),
        tracker.window_secs(),
        if in_window { "" } else { " (expired)" }
    );
    println!("  used:       {} of {}", used, tracker.ceiling());
    if remaining == 0 {
        let retry_after = (tracker.window_secs() - window_age).max(0);
        println!(
            "  {} exhausted, resets in {}s",
            style("✗").red(),
            retry_after
        );
    } else {
        println!("  remaining:  {}", style(remaining).green());
    }

    Ok(())
}
