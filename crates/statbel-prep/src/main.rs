mod bootstrap;

use anyhow::{Context, Result};
use prep_core::settings::Settings;
use prep_data::workbook::CalamineSource;
use prep_runtime::pipeline::{Pipeline, PipelineOptions};

fn main() -> Result<()> {
    let settings = Settings::load()?;
    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("statbel-prep v{} starting", env!("CARGO_PKG_VERSION"));

    let options = PipelineOptions::from_settings(&settings)?;
    bootstrap::ensure_directories(&options.cache_dir, &options.output)?;
    tracing::info!(
        "Data: {}, cache: {} ({}), output: {}",
        options.data_dir.display(),
        options.cache_dir.display(),
        options.cache_policy,
        options.output.display()
    );

    let chooser = options.on_ambiguous.disambiguator();
    let mut pipeline = Pipeline::new(options, CalamineSource::new());
    let summary = pipeline
        .run(chooser.as_ref())
        .context("data preparation failed")?;

    tracing::info!(
        "{} sheet(s) processed ({} parsed, {} table(s) from cache) in {:.1}s",
        summary.sheets_processed,
        summary.sheets_parsed,
        summary.tables_from_cache,
        summary.extract_time_seconds + summary.survey_time_seconds + summary.write_time_seconds
    );
    tracing::debug!("Run summary: {}", serde_json::to_string(&summary)?);

    Ok(())
}
