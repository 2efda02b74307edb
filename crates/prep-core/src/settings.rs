use chrono::NaiveDate;
use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PrepError, Result};
use crate::grouping::DEFAULT_GROUPINGS;
use crate::rounding::DEFAULT_SIGNIFICANT_DIGITS;

/// Survey years processed by a default run.
pub const DEFAULT_YEARS: &[u16] = &[2012, 2014, 2016, 2018, 2020];

/// Region codes processed by a default run.
pub const DEFAULT_REGIONS: &[&str] = &["BE", "BXL", "WAL", "FL"];

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Build the CPI and household-budget dataset for the visualization
#[derive(Parser, Debug, Clone)]
#[command(
    name = "statbel-prep",
    about = "Build the CPI and household-budget dataset for the visualization",
    version
)]
pub struct Settings {
    /// Directory holding the Statbel workbooks
    #[arg(long, default_value = "../../données statbel/")]
    pub data_dir: PathBuf,

    /// Output JSON document
    #[arg(long, default_value = "src/data.json")]
    pub output: PathBuf,

    /// Cache directory for parsed survey sheets (default: <data-dir>/EBM/prep_cache)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// JSON file supplying values for options not given on the command line
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// First month of the index series (YYYY-MM-DD)
    #[arg(long, default_value = "2012-01-01", value_parser = parse_date)]
    pub start_date: NaiveDate,

    /// Survey years, comma separated (default: 2012,2014,2016,2018,2020)
    #[arg(long, value_delimiter = ',')]
    pub years: Vec<u16>,

    /// Region codes, comma separated (default: BE,BXL,WAL,FL)
    #[arg(long, value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Grouping names, canonical or approximate, separated by ';'
    #[arg(long, value_delimiter = ';')]
    pub groupings: Vec<String>,

    /// Significant digits kept for index values and spendings (1-15)
    #[arg(long, default_value_t = DEFAULT_SIGNIFICANT_DIGITS, value_parser = clap::value_parser!(u32).range(1..=15))]
    pub significant_digits: u32,

    /// When to ignore cached sheet parses
    #[arg(long, default_value = "manual", value_parser = ["manual", "source-modified", "refresh"])]
    pub cache_policy: String,

    /// What to do when a grouping name matches several groupings
    #[arg(long, default_value = "prompt", value_parser = ["prompt", "first", "fail"])]
    pub on_ambiguous: String,

    /// Delete the cache directory before running
    #[arg(long)]
    pub clear_cache: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("{s}: {e}"))
}

// ── FileConfig ─────────────────────────────────────────────────────────────────

/// Optional JSON configuration file. Every field is optional; values given
/// on the command line take precedence.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years: Option<Vec<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groupings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub significant_digits: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_ambiguous: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl FileConfig {
    /// Load a config file. Unlike the CLI defaults, an explicitly named file
    /// that cannot be read or parsed is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| PrepError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments and merge the optional config file.
    pub fn load() -> Result<Self> {
        Self::load_from_args(std::env::args_os().collect())
    }

    /// Same as [`Settings::load`] with an explicit argument list, so tests
    /// can run without spawning a process.
    pub fn load_from_args(args: Vec<std::ffi::OsString>) -> Result<Self> {
        // Build raw ArgMatches so we can query ValueSource.
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if let Some(path) = settings.config.clone() {
            let file = FileConfig::load_from(&path)?;
            settings.merge_file_config(file, &matches)?;
        }

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        Ok(settings)
    }

    /// Apply config-file values to every option not set on the command line.
    fn merge_file_config(&mut self, file: FileConfig, matches: &clap::ArgMatches) -> Result<()> {
        // NOTE: clap stores the arg id using the *field name* (underscores),
        // not the long-flag spelling (hyphens).
        if !is_arg_explicitly_set(matches, "data_dir") {
            if let Some(v) = file.data_dir {
                self.data_dir = v;
            }
        }
        if !is_arg_explicitly_set(matches, "output") {
            if let Some(v) = file.output {
                self.output = v;
            }
        }
        if self.cache_dir.is_none() {
            self.cache_dir = file.cache_dir;
        }
        if !is_arg_explicitly_set(matches, "start_date") {
            if let Some(v) = file.start_date {
                self.start_date = parse_date(&v).map_err(PrepError::Config)?;
            }
        }
        if self.years.is_empty() {
            self.years = file.years.unwrap_or_default();
        }
        if self.regions.is_empty() {
            self.regions = file.regions.unwrap_or_default();
        }
        if self.groupings.is_empty() {
            self.groupings = file.groupings.unwrap_or_default();
        }
        if !is_arg_explicitly_set(matches, "significant_digits") {
            if let Some(v) = file.significant_digits {
                if !(1..=15).contains(&v) {
                    return Err(PrepError::Config(format!(
                        "significant_digits must be between 1 and 15, got {v}"
                    )));
                }
                self.significant_digits = v;
            }
        }
        if !is_arg_explicitly_set(matches, "cache_policy") {
            if let Some(v) = file.cache_policy {
                self.cache_policy = v;
            }
        }
        if !is_arg_explicitly_set(matches, "on_ambiguous") {
            if let Some(v) = file.on_ambiguous {
                self.on_ambiguous = v;
            }
        }
        if !is_arg_explicitly_set(matches, "log_level") {
            if let Some(v) = file.log_level {
                self.log_level = v;
            }
        }
        Ok(())
    }

    /// Cache directory, defaulting to `<data_dir>/EBM/prep_cache`.
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("EBM").join("prep_cache"))
    }

    pub fn effective_years(&self) -> Vec<u16> {
        if self.years.is_empty() {
            DEFAULT_YEARS.to_vec()
        } else {
            self.years.clone()
        }
    }

    pub fn effective_regions(&self) -> Vec<String> {
        if self.regions.is_empty() {
            DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect()
        } else {
            self.regions.clone()
        }
    }

    pub fn effective_groupings(&self) -> Vec<String> {
        if self.groupings.is_empty() {
            DEFAULT_GROUPINGS.iter().map(|g| g.to_string()).collect()
        } else {
            self.groupings.clone()
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::parse_from(["statbel-prep"])
    }
}

// ── Helper: check if an arg was explicitly set on the command line ─────────────

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
