//! Regions command.

use console::style;

use crate::config::Settings;
use crate::reference::ReferenceData;

/// Print the region reference table.
pub async fn cmd_regions(settings: &Settings) -> anyhow::Result<()> {
    let reference = ReferenceData::load(&settings.regions_path(), &settings.postal_codes_path())?;

    println!(
        "{:<24} {:>4} {:>12} {:>8} {:>10} {:>8}",
        style("Region").bold(),
        style("Code").bold(),
        style("Population").bold(),
        style("Weight").bold(),
        style("Area km²").bold(),
        style("Pop/km²").bold()
    );
    for region in reference.regions() {
        println!(
            "{:<24} {:>4} {:>12} {:>8.4} {:>10.0} {:>8.0}",
            region.name,
            region.code,
            region.population,
            region.population_weight,
            region.area_km2,
            region.density()
        );
    }
    println!(
        "\n{} regions, national population {}",
        reference.regions().len(),
        reference.national_population()
    );

    Ok(())
}
