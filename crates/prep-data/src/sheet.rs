//! Household budget survey sheet parsing.
//!
//! A survey sheet starts with a small header region (title, area and year,
//! subgroup headers, metric names) followed by one row per COICOP code. Two
//! layouts exist:
//!
//! * **grouped**: a row of subgroup labels (quartiles, household types, ...)
//!   spanning several metric columns each, data starting at row 6 or 7;
//! * **ungrouped**: the `Tab01` totals, with a single implicit `total`
//!   subgroup and data starting at row 5.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use prep_core::coicop;
use prep_core::error::{PrepError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::workbook::{Cell, Grid};

/// Canonical name of the average spending per household metric.
pub const SPENDING_METRIC: &str = "Dépenses moyennes par ménage";

/// Source spellings folded into [`SPENDING_METRIC`].
const SPENDING_ALIASES: [&str; 2] = [
    "Dépenses moyennes par ménage et par an (€)",
    "Dépenses moyennes pour la totalité des ménages (par an en euros)",
];

/// Rows making up the header region.
const HEADER_ROWS: usize = 7;

/// Column A marker found on the row just above the data.
const DATA_MARKER: &str = "COICOP";

/// Textual marker for a missing value, read as zero.
const NO_DATA: &str = "-";

/// Label of the implicit subgroup of ungrouped sheets.
pub const TOTAL_GROUP: &str = "total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetLayout {
    Grouped,
    Ungrouped,
}

/// One metric column of a subgroup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricColumn {
    pub metric: String,
    pub col: usize,
}

/// Columns belonging to one subgroup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgroupColumns {
    pub name: String,
    pub metrics: Vec<MetricColumn>,
}

impl SubgroupColumns {
    /// Column holding `metric`; the last one wins on duplicates.
    pub fn column(&self, metric: &str) -> Option<usize> {
        self.metrics
            .iter()
            .rev()
            .find(|m| m.metric == metric)
            .map(|m| m.col)
    }

    /// Distinct metric names, in column order.
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for m in &self.metrics {
            if !names.contains(&m.metric) {
                names.push(m.metric.clone());
            }
        }
        names
    }
}

/// Metadata recovered from the header region of a survey sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub file: PathBuf,
    pub sheet: String,
    pub title: String,
    pub area: String,
    pub year: String,
    /// Canonical grouping name.
    pub grouping: String,
    pub layout: SheetLayout,
    /// First data row (0-based).
    pub start_of_data: usize,
    pub groups: Vec<SubgroupColumns>,
}

/// One COICOP row of a subgroup table.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyRow {
    pub code: String,
    pub label: String,
    pub level: u32,
    /// Values by metric name; empty cells are absent.
    pub values: BTreeMap<String, f64>,
}

impl SurveyRow {
    pub fn value(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }
}

fn layout_error(sheet: &str, reason: impl Into<String>) -> PrepError {
    PrepError::SheetLayout {
        sheet: sheet.to_string(),
        reason: reason.into(),
    }
}

fn canonical_metric(label: &str) -> String {
    if SPENDING_ALIASES.contains(&label) {
        SPENDING_METRIC.to_string()
    } else {
        label.to_string()
    }
}

/// Find the layout and the first data row from the `COICOP` marker.
fn detect_layout(grid: &Grid, sheet: &str) -> Result<(SheetLayout, usize)> {
    let marker_at = |row: usize| grid.text(row, 0).as_deref() == Some(DATA_MARKER);

    if marker_at(6) {
        Ok((SheetLayout::Grouped, 7))
    } else if marker_at(5) {
        Ok((SheetLayout::Grouped, 6))
    } else if marker_at(4) {
        if !sheet.starts_with("HBS_Tab01") {
            return Err(layout_error(sheet, "ungrouped layout outside a Tab01 sheet"));
        }
        Ok((SheetLayout::Ungrouped, 5))
    } else {
        Err(layout_error(sheet, "no COICOP marker in the header region"))
    }
}

/// Parse the header region of `sheet`.
pub fn parse_sheet_info(grid: &Grid, file: &Path, sheet: &str, grouping: &str) -> Result<SheetInfo> {
    let title = grid
        .text(0, 0)
        .ok_or_else(|| layout_error(sheet, "missing title"))?;
    let subtitle = grid
        .text(1, 0)
        .ok_or_else(|| layout_error(sheet, "missing area line"))?;
    let parts: Vec<&str> = subtitle.split(" - ").collect();
    if parts.len() < 3 {
        return Err(layout_error(sheet, format!("unexpected area line {subtitle:?}")));
    }

    let (layout, start_of_data) = detect_layout(grid, sheet)?;

    let (header_row, headers) = match layout {
        SheetLayout::Ungrouped => (2, vec![(2, TOTAL_GROUP.to_string())]),
        SheetLayout::Grouped => {
            let header_row = start_of_data - 3;
            let headers: Vec<(usize, String)> = grid
                .row(header_row)
                .iter()
                .enumerate()
                .filter_map(|(col, cell)| cell.text().map(|t| (col, t)))
                .collect();
            if headers.is_empty() {
                return Err(layout_error(sheet, "no subgroup headers"));
            }
            (header_row, headers)
        }
    };

    let last_col = grid.width_of_first(HEADER_ROWS).saturating_sub(1);
    let groups = column_groups(grid, header_row, &headers, last_col);

    debug!(
        "Sheet {}: {:?} layout, data from row {}, {} subgroup(s)",
        sheet,
        layout,
        start_of_data,
        groups.len()
    );

    Ok(SheetInfo {
        file: file.to_path_buf(),
        sheet: sheet.to_string(),
        title,
        area: parts[0].to_string(),
        year: parts[2].to_string(),
        grouping: grouping.to_string(),
        layout,
        start_of_data,
        groups,
    })
}

/// Split the header row into subgroups and read their metric names.
///
/// When several header cells are populated, the first one labels the row
/// headers and is not a subgroup.
fn column_groups(
    grid: &Grid,
    header_row: usize,
    headers: &[(usize, String)],
    last_col: usize,
) -> Vec<SubgroupColumns> {
    let first = if headers.len() > 1 { 1 } else { 0 };

    (first..headers.len())
        .map(|i| {
            let (start, name) = &headers[i];
            let end = headers
                .get(i + 1)
                .map(|(next, _)| next - 1)
                .unwrap_or(last_col);

            let metrics = (*start..=end)
                .filter_map(|col| {
                    grid.text(header_row + 1, col).map(|label| MetricColumn {
                        metric: canonical_metric(&label),
                        col,
                    })
                })
                .collect();

            SubgroupColumns {
                name: name.clone(),
                metrics,
            }
        })
        .collect()
}

/// Non-numeric text is fatal in the spending column. In any other metric
/// column it is logged and read as absent.
fn read_value(grid: &Grid, info: &SheetInfo, row: usize, metric: &MetricColumn) -> Result<Option<f64>> {
    let col = metric.col;
    match grid.get(row, col) {
        Cell::Empty => Ok(None),
        Cell::Number(n) => Ok(Some(*n)),
        Cell::Text(t) => {
            let t = t.trim();
            if t.is_empty() {
                return Ok(None);
            }
            if t == NO_DATA {
                return Ok(Some(0.0));
            }
            match t.parse() {
                Ok(v) => Ok(Some(v)),
                Err(_) if metric.metric == SPENDING_METRIC => Err(PrepError::InvalidCell {
                    table: info.sheet.clone(),
                    row,
                    col,
                    value: t.to_string(),
                }),
                Err(_) => {
                    warn!(
                        "{}: ignoring non-numeric {:?} in column {:?} at row {}",
                        info.sheet, t, metric.metric, row
                    );
                    Ok(None)
                }
            }
        }
    }
}

/// Read the data rows of one subgroup.
///
/// Rows without a label or a code are dropped; `-` reads as zero.
pub fn read_rows(grid: &Grid, info: &SheetInfo, group: &SubgroupColumns) -> Result<Vec<SurveyRow>> {
    let mut rows = Vec::new();

    for r in info.start_of_data..grid.height() {
        let Some(label) = grid.text(r, 1) else {
            continue;
        };
        let Some(raw_code) = grid.text(r, 0) else {
            debug!("{}: row {} has a label but no code", info.sheet, r);
            continue;
        };
        let code = coicop::normalize_code(&raw_code);

        let mut values = BTreeMap::new();
        for m in &group.metrics {
            if let Some(v) = read_value(grid, info, r, m)? {
                values.insert(m.metric.clone(), v);
            }
        }

        rows.push(SurveyRow {
            level: coicop::depth(&code),
            code,
            label,
            values,
        });
    }

    Ok(rows)
}
