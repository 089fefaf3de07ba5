//! Search command: run jobs and print regional statistics.

use std::sync::Arc;

use console::style;
use serde_json::json;

use crate::config::Settings;
use crate::error::JobError;
use crate::models::{JobRequest, JobResult};
use crate::quota::QuotaTracker;
use crate::reference::ReferenceData;
use crate::scrapers::{Crawler, HttpPageFetcher, RetryPolicy, TokioSleeper};
use crate::services::JobRunner;

/// Run one job per term against a shared runner, so the quota window and
/// result cache behave as they would in a long-lived process.
pub async fn cmd_search(
    settings: &Settings,
    terms: &[String],
    sample_size: Option<u32>,
    max_age: Option<u32>,
    json: bool,
    correlations: bool,
) -> anyhow::Result<()> {
    if terms.is_empty() {
        anyhow::bail!("at least one search term is required");
    }
    if terms.iter().any(|t| t.trim().is_empty()) {
        anyhow::bail!("search terms must not be empty");
    }

    settings.ensure_directories()?;

    let reference = ReferenceData::load(&settings.regions_path(), &settings.postal_codes_path())?;
    let quota = QuotaTracker::new(
        &settings.database_path(),
        settings.quota_window_secs as u64,
        settings.quota_ceiling,
    )?;
    let fetcher = HttpPageFetcher::new(
        &settings.base_url,
        &settings.user_agent,
        std::time::Duration::from_secs(settings.request_timeout),
    );
    let crawler = Crawler::new(
        Arc::new(fetcher),
        RetryPolicy::default(),
        settings.delay_bounds(),
        Box::new(TokioSleeper),
    );
    let runner = JobRunner::new(settings.clone(), quota, crawler, reference);

    let sample_size = sample_size.unwrap_or(settings.default_sample_size);
    let max_age = max_age.unwrap_or(settings.default_max_age_days);

    let mut failures = 0usize;
    for term in terms {
        let request = JobRequest::new(term, sample_size, max_age);
        match runner.run_job(request).await {
            Ok(result) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&result_json(&result))?);
                } else {
                    print_result(&result, correlations);
                }
            }
            Err(e) => {
                failures += 1;
                print_job_error(term, &e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} jobs failed", failures, terms.len());
    }
    Ok(())
}

fn print_job_error(term: &str, err: &JobError) {
    match err {
        JobError::QuotaExceeded {
            retry_after_secs,
            remaining,
        } => {
            println!(
                "{} \"{}\": quota exhausted ({} listings left), retry in {}s",
                style("✗").red(),
                term,
                remaining,
                retry_after_secs
            );
        }
        JobError::NoResults { .. } => {
            println!("{} \"{}\": no listings found", style("!").yellow(), term);
        }
        JobError::SourceBlocked => {
            println!(
                "{} \"{}\": the source is refusing requests, back off before retrying",
                style("✗").red(),
                term
            );
        }
        other => {
            println!("{} \"{}\": {}", style("✗").red(), term, other);
        }
    }
}

fn print_result(result: &JobResult, correlations: bool) {
    println!(
        "\n{} \"{}\": {} listings sampled, {} listed nationally",
        style("✓").green(),
        result.key.term,
        result.listings.len(),
        result.national_total()
    );

    println!(
        "  {:<24} {:>8} {:>10} {:>10} {:>8} {:>10}",
        style("Region").bold(),
        style("Total").bold(),
        style("Rate/1M").bold(),
        style("Expected").bold(),
        style("Sample").bold(),
        style("Expected").bold()
    );
    for row in &result.rows {
        println!(
            "  {:<24} {:>8} {:>10.2} {:>10.1} {:>8} {:>10.1}",
            row.region.name,
            row.total_count,
            row.total_rate,
            row.expected_total,
            row.sample_count,
            row.expected_sample
        );
    }

    match &result.chi_square {
        Some(chi) => {
            let verdict = if chi.p_value < 0.05 {
                style("deviates from population share").red()
            } else {
                style("consistent with population share").green()
            };
            println!(
                "  chi² = {:.2} (df {}, p = {:.4}): {}",
                chi.statistic, chi.degrees_of_freedom, chi.p_value, verdict
            );
        }
        None => println!("  chi² unavailable (no usable totals)"),
    }

    match &result.correlation {
        Some(matrix) if correlations => {
            println!("\n  {}", style("Spearman correlations").bold());
            print!("  {:<18}", "");
            for col in &matrix.columns {
                print!(" {:>9.9}", col);
            }
            println!();
            for (i, col) in matrix.columns.iter().enumerate() {
                print!("  {:<18.18}", col);
                for value in &matrix.values[i] {
                    if value.is_nan() {
                        print!(" {:>9}", "-");
                    } else {
                        print!(" {:>9.3}", value);
                    }
                }
                println!();
            }
        }
        Some(matrix) => {
            if let Some(r) = matrix.get("total_rate", "household_income") {
                if !r.is_nan() {
                    println!("  rate vs household income: r = {:.3} (--correlations for all)", r);
                }
            }
        }
        None => {
            if correlations {
                println!("  correlations unavailable (too few regions)");
            }
        }
    }
}

fn result_json(result: &JobResult) -> serde_json::Value {
    json!({
        "term": result.key.term,
        "sample_size": result.key.sample_size,
        "max_age_days": result.key.max_age_days,
        "national_total": result.national_total(),
        "listings": result.listings,
        "regions": result.rows,
        "chi_square": result.chi_square,
        "correlation": result.correlation,
    })
}
