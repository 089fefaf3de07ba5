//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::quota::QuotaTracker;
use crate::reference::ReferenceData;

/// Initialize the data directory and quota store.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    // Creating the tracker also creates the schema.
    QuotaTracker::new(
        &settings.database_path(),
        settings.quota_window_secs as u64,
        settings.quota_ceiling,
    )?;
    println!(
        "  {} Quota store ready: {}",
        style("✓").green(),
        settings.database_path().display()
    );

    match ReferenceData::load(&settings.regions_path(), &settings.postal_codes_path()) {
        Ok(reference) => {
            println!(
                "  {} Reference data: {} regions, population {}",
                style("✓").green(),
                reference.regions().len(),
                reference.national_population()
            );
        }
        Err(e) => {
            println!("{} Reference data not loadable yet: {}", style("!").yellow(), e);
            println!(
                "  Place {} and {} in the data directory",
                settings.regions_file.display(),
                settings.postal_codes_file.display()
            );
        }
    }

    println!(
        "{} Initialized AdAtlas in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    Ok(())
}
