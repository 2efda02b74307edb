//! On-disk cache of parsed survey sheets.
//!
//! Layout, one directory per sheet:
//!
//! ```text
//! <root>/<sheet>/info.json          sheet metadata (SheetInfo)
//! <root>/<sheet>/<subgroup>.csv     rows of one subgroup
//! ```
//!
//! Whether an existing entry is used is decided by the
//! [`InvalidationPolicy`]. Under the default `Manual` policy entries are
//! never checked against the source workbook: delete the directory (or run
//! with `--clear-cache`) after the workbooks change.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use prep_core::error::{PrepError, Result};
use prep_core::text;
use tracing::{debug, info};

use crate::sheet::{SheetInfo, SurveyRow};

const INFO_FILE: &str = "info.json";
const COL_CODE: &str = "COICOP";
const COL_LABEL: &str = "Libellés";
const COL_LEVEL: &str = "level";

/// When a cache entry is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidationPolicy {
    /// A present entry is always used; invalidation is manual.
    #[default]
    Manual,
    /// A present entry is used unless the source workbook is newer.
    SourceModified,
    /// Entries are never read, always rebuilt.
    Refresh,
}

impl FromStr for InvalidationPolicy {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(Self::Manual),
            "source-modified" => Ok(Self::SourceModified),
            "refresh" => Ok(Self::Refresh),
            other => Err(PrepError::Config(format!("unknown cache policy {other:?}"))),
        }
    }
}

impl fmt::Display for InvalidationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Manual => "manual",
            Self::SourceModified => "source-modified",
            Self::Refresh => "refresh",
        })
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Cache of sheet metadata and subgroup rows.
#[derive(Debug, Clone)]
pub struct SheetCache {
    root: PathBuf,
    policy: InvalidationPolicy,
}

impl SheetCache {
    pub fn new(root: impl Into<PathBuf>, policy: InvalidationPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> InvalidationPolicy {
        self.policy
    }

    pub fn sheet_dir(&self, sheet: &str) -> PathBuf {
        self.root.join(sheet)
    }

    pub fn info_path(&self, sheet: &str) -> PathBuf {
        self.sheet_dir(sheet).join(INFO_FILE)
    }

    pub fn rows_path(&self, sheet: &str, group: &str) -> PathBuf {
        self.sheet_dir(sheet)
            .join(format!("{}.csv", text::file_stem(group)))
    }

    /// Whether the entry at `entry` may be used for data from `source`.
    fn usable(&self, entry: &Path, source: &Path) -> bool {
        if !entry.exists() {
            return false;
        }
        match self.policy {
            InvalidationPolicy::Manual => true,
            InvalidationPolicy::Refresh => false,
            InvalidationPolicy::SourceModified => match (modified(entry), modified(source)) {
                (Some(cached), Some(src)) => cached >= src,
                _ => true,
            },
        }
    }

    // ── Sheet metadata ────────────────────────────────────────────────────────

    pub fn load_info(&self, sheet: &str, source: &Path) -> Result<Option<SheetInfo>> {
        let path = self.info_path(sheet);
        if !self.usable(&path, source) {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|source| PrepError::FileRead {
            path: path.clone(),
            source,
        })?;
        debug!("Cache hit: {}", path.display());
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn store_info(&self, info: &SheetInfo) -> Result<()> {
        let path = self.info_path(&info.sheet);
        self.ensure_dir(&info.sheet)?;
        let json = serde_json::to_string_pretty(info)?;
        std::fs::write(&path, json).map_err(|source| PrepError::FileWrite { path, source })
    }

    // ── Subgroup rows ─────────────────────────────────────────────────────────

    pub fn load_rows(&self, sheet: &str, group: &str, source: &Path) -> Result<Option<Vec<SurveyRow>>> {
        let path = self.rows_path(sheet, group);
        if !self.usable(&path, source) {
            return Ok(None);
        }
        debug!("Cache hit: {}", path.display());
        read_rows_csv(&path).map(Some)
    }

    /// Write rows with one column per entry of `metrics`, in that order.
    pub fn store_rows(&self, sheet: &str, group: &str, metrics: &[String], rows: &[SurveyRow]) -> Result<()> {
        self.ensure_dir(sheet)?;
        let path = self.rows_path(sheet, group);
        let mut writer = csv::Writer::from_path(&path)?;

        let mut header = vec![COL_CODE.to_string(), COL_LABEL.to_string(), COL_LEVEL.to_string()];
        header.extend(metrics.iter().cloned());
        writer.write_record(&header)?;

        for row in rows {
            let mut record = vec![row.code.clone(), row.label.clone(), row.level.to_string()];
            record.extend(
                metrics
                    .iter()
                    .map(|m| row.value(m).map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    // ── Maintenance ───────────────────────────────────────────────────────────

    /// All files currently in the cache, sorted by path.
    pub fn files(&self) -> Vec<PathBuf> {
        if !self.root.exists() {
            return Vec::new();
        }
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    /// Delete the whole cache directory. Returns the number of files removed.
    pub fn clear(&self) -> Result<usize> {
        let count = self.files().len();
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root).map_err(|source| PrepError::FileWrite {
                path: self.root.clone(),
                source,
            })?;
        }
        info!("Cleared {} cached file(s) from {}", count, self.root.display());
        Ok(count)
    }

    fn ensure_dir(&self, sheet: &str) -> Result<()> {
        let dir = self.sheet_dir(sheet);
        std::fs::create_dir_all(&dir).map_err(|source| PrepError::FileWrite { path: dir, source })
    }
}

fn read_rows_csv(path: &Path) -> Result<Vec<SurveyRow>> {
    let table = path.display().to_string();
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.len() < 3 || &headers[0] != COL_CODE {
        return Err(PrepError::MissingColumn {
            table,
            column: COL_CODE.to_string(),
        });
    }
    let metrics: Vec<String> = headers.iter().skip(3).map(str::to_string).collect();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let bad = |col: usize| PrepError::InvalidCell {
            table: table.clone(),
            row: i + 1,
            col,
            value: record.get(col).unwrap_or_default().to_string(),
        };

        let level = record
            .get(2)
            .and_then(|l| l.parse().ok())
            .ok_or_else(|| bad(2))?;

        let mut values = BTreeMap::new();
        for (j, metric) in metrics.iter().enumerate() {
            let raw = record.get(j + 3).unwrap_or_default();
            if raw.is_empty() {
                continue;
            }
            let v: f64 = raw.parse().map_err(|_| bad(j + 3))?;
            values.insert(metric.clone(), v);
        }

        rows.push(SurveyRow {
            code: record.get(0).unwrap_or_default().to_string(),
            label: record.get(1).unwrap_or_default().to_string(),
            level,
            values,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::fixtures::grouped_sheet;
    use crate::sheet::{parse_sheet_info, read_rows, SPENDING_METRIC};
    use tempfile::TempDir;

    fn sample_info() -> SheetInfo {
        parse_sheet_info(
            &grouped_sheet(),
            Path::new("EBM/x.xlsx"),
            "HBS_Tab03_QRT_BE_2018",
            "quartile de revenus",
        )
        .unwrap()
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("manual".parse::<InvalidationPolicy>().unwrap(), InvalidationPolicy::Manual);
        assert_eq!(
            "source-modified".parse::<InvalidationPolicy>().unwrap(),
            InvalidationPolicy::SourceModified
        );
        assert_eq!("refresh".parse::<InvalidationPolicy>().unwrap(), InvalidationPolicy::Refresh);
        assert!(matches!("never".parse::<InvalidationPolicy>(), Err(PrepError::Config(_))));
        assert_eq!(InvalidationPolicy::SourceModified.to_string(), "source-modified");
    }

    #[test]
    fn test_paths_use_normalized_group_names() {
        let cache = SheetCache::new("/cache", InvalidationPolicy::Manual);
        assert_eq!(
            cache.info_path("HBS_TAB06_BE_2018"),
            PathBuf::from("/cache/HBS_TAB06_BE_2018/info.json")
        );
        assert_eq!(
            cache.rows_path("HBS_TAB06_BE_2018", "Ménage avec enfant(s)"),
            PathBuf::from("/cache/HBS_TAB06_BE_2018/menage_avec_enfants.csv")
        );
    }

    #[test]
    fn test_info_round_trip() {
        let tmp = TempDir::new().unwrap();
        let cache = SheetCache::new(tmp.path(), InvalidationPolicy::Manual);
        let info = sample_info();

        assert!(cache.load_info(&info.sheet, Path::new("src.xlsx")).unwrap().is_none());
        cache.store_info(&info).unwrap();
        let loaded = cache.load_info(&info.sheet, Path::new("src.xlsx")).unwrap();
        assert_eq!(loaded, Some(info));
    }

    #[test]
    fn test_rows_round_trip_keeps_leading_zeros() {
        let tmp = TempDir::new().unwrap();
        let cache = SheetCache::new(tmp.path(), InvalidationPolicy::Manual);
        let grid = grouped_sheet();
        let info = sample_info();
        let group = &info.groups[0];
        let rows = read_rows(&grid, &info, group).unwrap();

        cache
            .store_rows(&info.sheet, &group.name, &group.metric_names(), &rows)
            .unwrap();
        let loaded = cache
            .load_rows(&info.sheet, &group.name, Path::new("src.xlsx"))
            .unwrap()
            .unwrap();

        assert_eq!(loaded, rows);
        assert_eq!(loaded[1].code, "01");
        assert_eq!(loaded[1].value(SPENDING_METRIC), Some(250.0));
    }

    #[test]
    fn test_manual_policy_trusts_stale_entries() {
        let tmp = TempDir::new().unwrap();
        let cache = SheetCache::new(tmp.path().join("cache"), InvalidationPolicy::Manual);
        let info = sample_info();
        cache.store_info(&info).unwrap();

        // Source written after the cache entry.
        let source = tmp.path().join("src.xlsx");
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(&source, b"newer").unwrap();

        assert!(cache.load_info(&info.sheet, &source).unwrap().is_some());
    }

    #[test]
    fn test_source_modified_policy_ignores_stale_entries() {
        let tmp = TempDir::new().unwrap();
        let cache = SheetCache::new(tmp.path().join("cache"), InvalidationPolicy::SourceModified);
        let info = sample_info();
        let source = tmp.path().join("src.xlsx");

        std::fs::write(&source, b"old").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        cache.store_info(&info).unwrap();
        assert!(cache.load_info(&info.sheet, &source).unwrap().is_some());

        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(&source, b"newer").unwrap();
        assert!(cache.load_info(&info.sheet, &source).unwrap().is_none());
    }

    #[test]
    fn test_refresh_policy_never_reads() {
        let tmp = TempDir::new().unwrap();
        let cache = SheetCache::new(tmp.path(), InvalidationPolicy::Refresh);
        let info = sample_info();
        cache.store_info(&info).unwrap();
        assert!(cache.load_info(&info.sheet, Path::new("src.xlsx")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_csv_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let cache = SheetCache::new(tmp.path(), InvalidationPolicy::Manual);
        let path = cache.rows_path("HBS_Tab01_BE_2020", "total");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "COICOP,Libellés,level,x\n0,Total,zero,1\n").unwrap();

        let err = cache
            .load_rows("HBS_Tab01_BE_2020", "total", Path::new("src.xlsx"))
            .unwrap_err();
        assert!(matches!(err, PrepError::InvalidCell { col: 2, .. }));
    }

    #[test]
    fn test_files_and_clear() {
        let tmp = TempDir::new().unwrap();
        let cache = SheetCache::new(tmp.path().join("prep_cache"), InvalidationPolicy::Manual);
        assert!(cache.files().is_empty());
        assert_eq!(cache.clear().unwrap(), 0);

        let info = sample_info();
        cache.store_info(&info).unwrap();
        cache
            .store_rows(&info.sheet, "Quartile 1", &[SPENDING_METRIC.to_string()], &[])
            .unwrap();
        assert_eq!(cache.files().len(), 2);

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(!cache.root().exists());
    }
}
