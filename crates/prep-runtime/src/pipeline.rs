//! Pipeline orchestrator.
//!
//! Runs the three stages in order, threading their results through an
//! explicit [`PipelineContext`]:
//!
//! 1. Category Extractor: CPI workbook → category registry + index series.
//! 2. Survey Loader: survey sheets → subgroup tables (through the cache).
//! 3. Aggregator / Writer: subgroup tables → spending records → JSON file.
//!
//! Any error aborts the run before the output file is touched.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use prep_core::error::{PrepError, Result};
use prep_core::grouping::{self, Disambiguator, FirstCandidate, Grouping, RejectAmbiguous};
use prep_core::models::{OutputDocument, Products, Region, SpendingRecord};
use prep_core::settings::Settings;
use prep_core::timescale::TimescaleRegistry;
use prep_data::aggregator::SpendingAggregator;
use prep_data::cache::{InvalidationPolicy, SheetCache};
use prep_data::cpi;
use prep_data::survey::{self, LoadStats, SurveyLoader};
use prep_data::workbook::WorkbookSource;
use prep_data::writer;
use tracing::{debug, info};

use crate::prompt::PromptDisambiguator;

// ── Options ───────────────────────────────────────────────────────────────────

/// How an approximate grouping name matching several groupings is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguityPolicy {
    /// Ask on the terminal.
    #[default]
    Prompt,
    /// Take the first match in catalogue order.
    First,
    /// Abort with `AmbiguousGrouping`.
    Fail,
}

impl AmbiguityPolicy {
    pub fn disambiguator(self) -> Box<dyn Disambiguator> {
        match self {
            AmbiguityPolicy::Prompt => Box::new(PromptDisambiguator),
            AmbiguityPolicy::First => Box::new(FirstCandidate),
            AmbiguityPolicy::Fail => Box::new(RejectAmbiguous),
        }
    }
}

impl FromStr for AmbiguityPolicy {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prompt" => Ok(Self::Prompt),
            "first" => Ok(Self::First),
            "fail" => Ok(Self::Fail),
            other => Err(PrepError::Config(format!("unknown ambiguity policy {other:?}"))),
        }
    }
}

/// Everything a run needs, resolved from [`Settings`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub data_dir: PathBuf,
    pub output: PathBuf,
    pub cache_dir: PathBuf,
    pub start_date: NaiveDate,
    pub years: Vec<u16>,
    pub regions: Vec<String>,
    pub groupings: Vec<String>,
    pub significant_digits: u32,
    pub cache_policy: InvalidationPolicy,
    pub on_ambiguous: AmbiguityPolicy,
    pub clear_cache: bool,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            data_dir: settings.data_dir.clone(),
            output: settings.output.clone(),
            cache_dir: settings.effective_cache_dir(),
            start_date: settings.start_date,
            years: settings.effective_years(),
            regions: settings.effective_regions(),
            groupings: settings.effective_groupings(),
            significant_digits: settings.significant_digits,
            cache_policy: settings.cache_policy.parse()?,
            on_ambiguous: settings.on_ambiguous.parse()?,
            clear_cache: settings.clear_cache,
        })
    }
}

// ── Context and summary ───────────────────────────────────────────────────────

/// State accumulated across the stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineContext {
    pub products: Products,
    pub timescales: TimescaleRegistry,
    pub spendings: Vec<SpendingRecord>,
}

impl PipelineContext {
    pub fn into_document(self) -> OutputDocument {
        OutputDocument {
            products: self.products,
            timescales: self.timescales,
            spendings: self.spendings,
        }
    }
}

/// Figures reported at the end of a run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunSummary {
    /// RFC 3339 timestamp of the end of the run.
    pub generated_at: String,
    pub categories: usize,
    pub series_attached: usize,
    pub timescales: usize,
    pub sheets_processed: usize,
    pub records: usize,
    pub sheets_parsed: usize,
    pub tables_from_cache: usize,
    pub tables_parsed: usize,
    pub cache_files_cleared: usize,
    pub bytes_written: usize,
    pub extract_time_seconds: f64,
    pub survey_time_seconds: f64,
    pub write_time_seconds: f64,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline<S> {
    options: PipelineOptions,
    loader: SurveyLoader<S>,
}

impl<S: WorkbookSource> Pipeline<S> {
    pub fn new(options: PipelineOptions, source: S) -> Self {
        let cache = SheetCache::new(options.cache_dir.clone(), options.cache_policy);
        Self {
            loader: SurveyLoader::new(source, cache),
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run all stages and write the output document.
    pub fn run(&mut self, chooser: &dyn Disambiguator) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let ctx = self.build(chooser, &mut summary)?;

        let write_start = Instant::now();
        summary.bytes_written = writer::write_document(&ctx.into_document(), &self.options.output)?;
        summary.write_time_seconds = write_start.elapsed().as_secs_f64();
        summary.generated_at = Utc::now().to_rfc3339();

        info!(
            "Done: {} categories, {} spending records, {} bytes",
            summary.categories, summary.records, summary.bytes_written
        );
        Ok(summary)
    }

    /// Run the extraction and aggregation stages without writing anything.
    pub fn build(&mut self, chooser: &dyn Disambiguator, summary: &mut RunSummary) -> Result<PipelineContext> {
        // Configuration problems surface before any workbook is opened.
        let groupings = self.resolve_groupings(chooser)?;
        for region in &self.options.regions {
            region.parse::<Region>()?;
        }

        if self.options.clear_cache {
            summary.cache_files_cleared = self.loader.cache().clear()?;
        }

        let mut ctx = PipelineContext::default();

        // ── Stage 1: categories and index series ──────────────────────────────
        let extract_start = Instant::now();
        summary.series_attached = self.extract_categories(&mut ctx)?;
        summary.categories = ctx.products.len();
        summary.timescales = ctx.timescales.len();
        summary.extract_time_seconds = extract_start.elapsed().as_secs_f64();

        // ── Stages 2 and 3: survey tables and spending records ────────────────
        let survey_start = Instant::now();
        let mut years = self.options.years.clone();
        years.sort_unstable();
        years.dedup();

        for &year in &years {
            for region in &self.options.regions {
                info!("Region {}, year {}...", region, year);
                for &grouping in &groupings {
                    let req = survey::locate(&self.options.data_dir, year, grouping, region)?;
                    let tables = self.loader.load_tables(&req)?;
                    let records = SpendingAggregator::records(
                        year,
                        req.region,
                        grouping.name,
                        &req.sheet,
                        &tables,
                        &ctx.products,
                        self.options.significant_digits,
                    )?;
                    summary.sheets_processed += 1;
                    ctx.spendings.extend(records);
                }
            }
        }

        let LoadStats {
            sheets_parsed,
            tables_from_cache,
            tables_parsed,
        } = self.loader.stats();
        summary.sheets_parsed = sheets_parsed;
        summary.tables_from_cache = tables_from_cache;
        summary.tables_parsed = tables_parsed;
        summary.records = ctx.spendings.len();
        summary.survey_time_seconds = survey_start.elapsed().as_secs_f64();

        Ok(ctx)
    }

    fn resolve_groupings(&self, chooser: &dyn Disambiguator) -> Result<Vec<&'static Grouping>> {
        self.options
            .groupings
            .iter()
            .map(|name| -> Result<&'static Grouping> {
                let g = grouping::resolve_with(name, chooser)?;
                if g.name != name {
                    info!("Grouping {:?} resolved to {:?}", name, g.name);
                }
                Ok(g)
            })
            .collect()
    }

    fn extract_categories(&mut self, ctx: &mut PipelineContext) -> Result<usize> {
        let path = self.options.data_dir.join(cpi::CPI_FILE);
        info!("Extracting categories from {}", path.display());

        let grid = self.loader.source_mut().first_sheet(&path)?;
        let observations = cpi::read_observations(&grid)?;
        ctx.products = cpi::extract_categories(&observations);
        let attached = cpi::attach_series(
            &mut ctx.products,
            &mut ctx.timescales,
            &observations,
            self.options.start_date,
            self.options.significant_digits,
        );
        debug!("{} categories, {} series", ctx.products.len(), attached);
        Ok(attached)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use prep_data::survey::workbook_for_year;
    use prep_data::workbook::{Cell, Grid, MemorySource};
    use tempfile::TempDir;

    fn text_row(values: &[&str]) -> Vec<Cell> {
        values.iter().map(|v| Cell::from(*v)).collect()
    }

    fn cpi_grid() -> Grid {
        let header = text_row(&[
            "NM_YR",
            "NM_MTH",
            "CD_COICOP",
            "MS_CPI_IDX",
            "NM_CD_COICOP_LVL",
            "TX_COICOP_FR_LVL1",
            "TX_COICOP_FR_LVL2",
            "TX_COICOP_FR_LVL3",
            "TX_COICOP_FR_LVL4",
        ]);
        let obs = |year: f64, month: f64, index: f64| {
            vec![
                Cell::Number(year),
                Cell::Number(month),
                Cell::from("1"),
                Cell::Number(index),
                Cell::Number(1.0),
                Cell::from("1. Alimentation"),
            ]
        };
        Grid::from_rows(vec![
            header,
            obs(2011.0, 12.0, 99.0),
            obs(2012.0, 1.0, 100.0),
            obs(2012.0, 2.0, 102.5),
        ])
    }

    fn total_sheet() -> Grid {
        Grid::from_rows(vec![
            text_row(&["Dépenses moyennes"]),
            text_row(&["Belgique - HBS - 2018"]),
            text_row(&["", "", "Total"]),
            text_row(&["", "", "Dépenses moyennes par ménage et par an (€)"]),
            text_row(&["COICOP", "Libellés"]),
            vec![Cell::from("0"), Cell::from("Total"), Cell::Number(1000.0)],
            vec![Cell::from("1"), Cell::from("Alimentation"), Cell::Number(250.0)],
            vec![Cell::from("9"), Cell::from("Inconnu"), Cell::Number(10.0)],
        ])
    }

    fn source(data_dir: &std::path::Path) -> MemorySource {
        let mut src = MemorySource::new();
        src.insert(data_dir.join(cpi::CPI_FILE), "CPI", cpi_grid());
        src.insert(
            workbook_for_year(data_dir, 2018).unwrap(),
            "HBS_Tab01_BE_2018",
            total_sheet(),
        );
        src
    }

    fn options(tmp: &TempDir) -> PipelineOptions {
        let settings = Settings::default();
        let mut options = PipelineOptions::from_settings(&settings).unwrap();
        options.data_dir = tmp.path().to_path_buf();
        options.output = tmp.path().join("src").join("data.json");
        options.cache_dir = tmp.path().join("EBM").join("prep_cache");
        options.years = vec![2018];
        options.regions = vec!["BE".to_string()];
        options.groupings = vec!["total".to_string()];
        options
    }

    #[test]
    fn test_options_from_default_settings() {
        let options = PipelineOptions::from_settings(&Settings::default()).unwrap();
        assert_eq!(options.years, vec![2012, 2014, 2016, 2018, 2020]);
        assert_eq!(options.regions, vec!["BE", "BXL", "WAL", "FL"]);
        assert_eq!(options.groupings.len(), 5);
        assert_eq!(options.significant_digits, 3);
        assert_eq!(options.cache_policy, InvalidationPolicy::Manual);
        assert_eq!(options.on_ambiguous, AmbiguityPolicy::Prompt);
        assert!(options.cache_dir.ends_with("EBM/prep_cache"));
    }

    #[test]
    fn test_ambiguity_policy_parse() {
        assert_eq!("first".parse::<AmbiguityPolicy>().unwrap(), AmbiguityPolicy::First);
        assert_eq!("fail".parse::<AmbiguityPolicy>().unwrap(), AmbiguityPolicy::Fail);
        assert!(matches!("ask".parse::<AmbiguityPolicy>(), Err(PrepError::Config(_))));
    }

    #[test]
    fn test_end_to_end_writes_document() {
        let tmp = TempDir::new().unwrap();
        let options = options(&tmp);
        let output = options.output.clone();

        let mut pipeline = Pipeline::new(options, source(tmp.path()));
        let summary = pipeline.run(&RejectAmbiguous).unwrap();

        assert_eq!(summary.categories, 2);
        assert_eq!(summary.series_attached, 1);
        assert_eq!(summary.timescales, 1);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.tables_parsed, 1);

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(doc["products"]["1"]["CPI"], serde_json::json!([100.0, 102.0]));
        assert_eq!(doc["products"]["1"]["name"], "Alimentation");
        assert_eq!(doc["products"]["1"]["timescale"], 0);
        assert_eq!(doc["timescales"], serde_json::json!([["2012-01-01", "2012-02-01"]]));

        let record = &doc["spendings"][0];
        assert_eq!(record["year"], 2018);
        assert_eq!(record["region"], "BE");
        assert_eq!(record["grouping"], "total");
        assert_eq!(record["group"], "total");
        assert_eq!(record["spendings"]["1"], serde_json::json!([250.0, 0.25]));
        assert!(record["spendings"].get("9").is_none());
    }

    #[test]
    fn test_second_run_reads_survey_from_cache() {
        let tmp = TempDir::new().unwrap();
        Pipeline::new(options(&tmp), source(tmp.path()))
            .run(&RejectAmbiguous)
            .unwrap();

        // Only the CPI workbook is available now.
        let mut cpi_only = MemorySource::new();
        cpi_only.insert(tmp.path().join(cpi::CPI_FILE), "CPI", cpi_grid());

        let mut pipeline = Pipeline::new(options(&tmp), cpi_only);
        let mut summary = RunSummary::default();
        let ctx = pipeline.build(&RejectAmbiguous, &mut summary).unwrap();

        assert_eq!(summary.tables_from_cache, 1);
        assert_eq!(summary.sheets_parsed, 0);
        assert_eq!(ctx.spendings[0].spendings["1"], [250.0, 0.25]);
    }

    #[test]
    fn test_clear_cache_forces_reparse() {
        let tmp = TempDir::new().unwrap();
        Pipeline::new(options(&tmp), source(tmp.path()))
            .run(&RejectAmbiguous)
            .unwrap();

        let mut options = options(&tmp);
        options.clear_cache = true;
        let mut pipeline = Pipeline::new(options, source(tmp.path()));
        let summary = pipeline.run(&RejectAmbiguous).unwrap();

        // info.json plus one subgroup file.
        assert_eq!(summary.cache_files_cleared, 2);
        assert_eq!(summary.sheets_parsed, 1);
        assert_eq!(summary.tables_from_cache, 0);
    }

    #[test]
    fn test_invalid_region_aborts_without_output() {
        let tmp = TempDir::new().unwrap();
        let mut options = options(&tmp);
        options.regions = vec!["BE".to_string(), "LUX".to_string()];
        let output = options.output.clone();

        let err = Pipeline::new(options, source(tmp.path()))
            .run(&RejectAmbiguous)
            .unwrap_err();
        assert!(matches!(err, PrepError::InvalidRegion(ref r) if r == "LUX"));
        assert!(!output.exists());
    }

    #[test]
    fn test_year_without_survey_aborts() {
        let tmp = TempDir::new().unwrap();
        let mut options = options(&tmp);
        options.years = vec![2018, 2019];

        let err = Pipeline::new(options, source(tmp.path()))
            .run(&RejectAmbiguous)
            .unwrap_err();
        assert!(matches!(err, PrepError::NoDataForYear(2019)));
    }

    #[test]
    fn test_ambiguous_grouping_follows_chooser() {
        let tmp = TempDir::new().unwrap();
        let mut options = options(&tmp);
        options.groupings = vec!["type de menage".to_string()];

        let pipeline = Pipeline::new(options, source(tmp.path()));
        let err = pipeline.resolve_groupings(&RejectAmbiguous).unwrap_err();
        assert!(matches!(err, PrepError::AmbiguousGrouping { ref candidates, .. } if candidates.len() == 2));

        let chosen = pipeline.resolve_groupings(&FirstCandidate).unwrap();
        assert_eq!(chosen[0].tab, "TAB09");
    }

    #[test]
    fn test_approximate_grouping_name_is_resolved() {
        let tmp = TempDir::new().unwrap();
        let mut options = options(&tmp);
        options.groupings = vec!["Total".to_string()];

        let mut pipeline = Pipeline::new(options, source(tmp.path()));
        let mut summary = RunSummary::default();
        let ctx = pipeline.build(&RejectAmbiguous, &mut summary).unwrap();
        assert_eq!(ctx.spendings[0].grouping, "total");
    }
}
