//! Category extraction from the consumer price index workbook.
//!
//! The CPI workbook is one flat table: one row per (month, COICOP code) with
//! the code's level and the French label of every level of its ancestry.
//! From it we build the category registry and attach to each category its
//! monthly index series.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use prep_core::coicop;
use prep_core::error::{PrepError, Result};
use prep_core::models::{Category, Products};
use prep_core::rounding::round_to_n;
use prep_core::timescale::TimescaleRegistry;
use tracing::{debug, warn};

use crate::workbook::Grid;

/// File name of the CPI workbook inside the data directory.
pub const CPI_FILE: &str = "CPI All groups.xlsx";

const TABLE: &str = "CPI";
const COL_YEAR: &str = "NM_YR";
const COL_MONTH: &str = "NM_MTH";
const COL_CODE: &str = "CD_COICOP";
const COL_INDEX: &str = "MS_CPI_IDX";
const COL_LEVEL: &str = "NM_CD_COICOP_LVL";
const LABEL_LEVELS: u32 = 4;

/// One monthly index observation.
#[derive(Debug, Clone, PartialEq)]
pub struct CpiObservation {
    /// First day of the observed month.
    pub date: NaiveDate,
    /// Normalized COICOP code.
    pub code: String,
    /// Classification level as stated by the source, if any.
    pub level: Option<u32>,
    /// French label of levels 1 to 4.
    pub labels: [Option<String>; LABEL_LEVELS as usize],
    pub index: f64,
}

impl CpiObservation {
    fn label(&self, level: u32) -> Option<&str> {
        let i = level.checked_sub(1)? as usize;
        self.labels.get(i)?.as_deref()
    }
}

// ── Reading ───────────────────────────────────────────────────────────────────

struct Columns {
    year: usize,
    month: usize,
    code: usize,
    index: usize,
    level: usize,
    labels: Vec<usize>,
}

fn locate_columns(grid: &Grid) -> Result<Columns> {
    let headers: Vec<Option<String>> = grid.row(0).iter().map(|c| c.text()).collect();
    let find = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.as_deref() == Some(name))
            .ok_or_else(|| PrepError::MissingColumn {
                table: TABLE.to_string(),
                column: name.to_string(),
            })
    };

    Ok(Columns {
        year: find(COL_YEAR)?,
        month: find(COL_MONTH)?,
        code: find(COL_CODE)?,
        index: find(COL_INDEX)?,
        level: find(COL_LEVEL)?,
        labels: (1..=LABEL_LEVELS)
            .map(|l| find(&format!("TX_COICOP_FR_LVL{l}")))
            .collect::<Result<Vec<_>>>()?,
    })
}

fn invalid(grid: &Grid, row: usize, col: usize) -> PrepError {
    PrepError::InvalidCell {
        table: TABLE.to_string(),
        row,
        col,
        value: grid.text(row, col).unwrap_or_default(),
    }
}

/// Parse the CPI table (header on the first row).
///
/// Rows without an index value are dropped, as are rows without a code.
pub fn read_observations(grid: &Grid) -> Result<Vec<CpiObservation>> {
    let cols = locate_columns(grid)?;
    let mut out = Vec::new();
    let mut skipped = 0usize;

    for r in 1..grid.height() {
        let Some(index) = grid.get(r, cols.index).number() else {
            skipped += 1;
            continue;
        };
        let Some(raw_code) = grid.text(r, cols.code) else {
            skipped += 1;
            continue;
        };

        let year = grid
            .get(r, cols.year)
            .number()
            .ok_or_else(|| invalid(grid, r, cols.year))?;
        let month = grid
            .get(r, cols.month)
            .number()
            .ok_or_else(|| invalid(grid, r, cols.month))?;
        let date = NaiveDate::from_ymd_opt(year as i32, month as u32, 1)
            .ok_or_else(|| invalid(grid, r, cols.month))?;

        let level = grid.get(r, cols.level).number().map(|l| l as u32);
        let mut labels: [Option<String>; LABEL_LEVELS as usize] = Default::default();
        for (slot, col) in labels.iter_mut().zip(&cols.labels) {
            *slot = grid.text(r, *col);
        }

        out.push(CpiObservation {
            date,
            code: coicop::normalize_code(&raw_code),
            level,
            labels,
            index,
        });
    }

    debug!("CPI table: {} observations, {} rows skipped", out.len(), skipped);
    Ok(out)
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Build the category registry from the observations.
///
/// The root is hard-coded; levels 1 to 4 come from the rows stating that
/// level, named after the matching label column. Manual name corrections and
/// numbering-prefix removal are applied last.
pub fn extract_categories(observations: &[CpiObservation]) -> Products {
    let mut products = Products::new();
    let root = Category::root();
    products.insert(root.coicop.clone(), root);

    for level in 1..=LABEL_LEVELS {
        for obs in observations.iter().filter(|o| o.level == Some(level)) {
            match obs.label(level) {
                Some(name) => {
                    products.insert(obs.code.clone(), Category::new(obs.code.clone(), name));
                }
                None => debug!("No level-{} label for code {}", level, obs.code),
            }
        }
    }

    for (code, name) in coicop::NAME_OVERRIDES {
        match products.get_mut(*code) {
            Some(cat) => cat.name = name.to_string(),
            None => warn!("Name override for unknown category {}", code),
        }
    }

    for cat in products.values_mut() {
        cat.name = coicop::strip_numbering(&cat.name);
    }

    products
}

/// Attach to each category its index series from `start` on.
///
/// Values are rounded to `digits` significant digits and the dates are
/// registered in `timescales`. Series of codes missing from `products` are
/// skipped. Returns the number of series attached.
pub fn attach_series(
    products: &mut Products,
    timescales: &mut TimescaleRegistry,
    observations: &[CpiObservation],
    start: NaiveDate,
    digits: u32,
) -> usize {
    let mut by_code: BTreeMap<&str, Vec<(NaiveDate, f64)>> = BTreeMap::new();
    for obs in observations.iter().filter(|o| o.date >= start) {
        by_code
            .entry(obs.code.as_str())
            .or_default()
            .push((obs.date, obs.index));
    }

    let mut attached = 0;
    for (code, mut series) in by_code {
        let Some(category) = products.get_mut(code) else {
            warn!("Index series for unknown category {} skipped", code);
            continue;
        };
        series.sort_by_key(|(date, _)| *date);

        let dates = series
            .iter()
            .map(|(d, _)| d.format("%Y-%m-%d").to_string())
            .collect();
        category.timescale = Some(timescales.add(dates));
        category.cpi = Some(series.iter().map(|(_, v)| round_to_n(*v, digits)).collect());
        attached += 1;
    }

    debug!("Attached {} index series, {} timescales", attached, timescales.len());
    attached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::Cell;

    const HEADER: [&str; 9] = [
        "NM_YR",
        "NM_MTH",
        "CD_COICOP",
        "MS_CPI_IDX",
        "NM_CD_COICOP_LVL",
        "TX_COICOP_FR_LVL1",
        "TX_COICOP_FR_LVL2",
        "TX_COICOP_FR_LVL3",
        "TX_COICOP_FR_LVL4",
    ];

    fn row(
        year: f64,
        month: f64,
        code: &str,
        index: Option<f64>,
        level: f64,
        labels: [&str; 4],
    ) -> Vec<Cell> {
        let mut cells = vec![
            Cell::Number(year),
            Cell::Number(month),
            Cell::from(code),
            index.map(Cell::Number).unwrap_or(Cell::Empty),
            Cell::Number(level),
        ];
        cells.extend(labels.iter().map(|l| Cell::from(*l)));
        cells
    }

    fn grid(rows: Vec<Vec<Cell>>) -> Grid {
        let mut all = vec![HEADER.iter().map(|h| Cell::from(*h)).collect()];
        all.extend(rows);
        Grid::from_rows(all)
    }

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn test_read_observations_basic() {
        let g = grid(vec![
            row(2012.0, 1.0, "01.1", Some(100.0), 2.0, ["01. Alimentation", "011. Pain", "", ""]),
            row(2012.0, 2.0, "-", Some(101.0), 0.0, ["", "", "", ""]),
        ]);
        let obs = read_observations(&g).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].code, "011");
        assert_eq!(obs[0].date, date(2012, 1));
        assert_eq!(obs[0].level, Some(2));
        assert_eq!(obs[0].labels[1].as_deref(), Some("011. Pain"));
        assert_eq!(obs[1].code, "0");
    }

    #[test]
    fn test_read_observations_drops_missing_index() {
        let g = grid(vec![
            row(2012.0, 1.0, "01", None, 1.0, ["Alimentation", "", "", ""]),
            row(2012.0, 1.0, "02", Some(99.0), 1.0, ["Boissons", "", "", ""]),
        ]);
        let obs = read_observations(&g).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].code, "02");
    }

    #[test]
    fn test_read_observations_missing_column() {
        let g = Grid::from_rows(vec![vec![Cell::from("NM_YR"), Cell::from("NM_MTH")]]);
        let err = read_observations(&g).unwrap_err();
        assert!(matches!(err, PrepError::MissingColumn { ref column, .. } if column == "CD_COICOP"));
    }

    #[test]
    fn test_read_observations_invalid_month() {
        let g = grid(vec![row(2012.0, 13.0, "01", Some(100.0), 1.0, ["A", "", "", ""])]);
        let err = read_observations(&g).unwrap_err();
        assert!(matches!(err, PrepError::InvalidCell { row: 1, .. }));
    }

    #[test]
    fn test_extract_categories_levels_and_names() {
        let g = grid(vec![
            row(2012.0, 1.0, "01", Some(100.0), 1.0, ["01. Alimentation", "", "", ""]),
            row(2012.0, 1.0, "01.1", Some(100.0), 2.0, ["01. Alimentation", "011. Pain et céréales", "", ""]),
            row(2012.0, 2.0, "01.1", Some(101.0), 2.0, ["01. Alimentation", "011. Pain et céréales", "", ""]),
            row(2012.0, 1.0, "10.5.0.0", Some(100.0), 4.0, ["10. Enseignement", "", "", "10500. Autre"]),
        ]);
        let obs = read_observations(&g).unwrap();
        let products = extract_categories(&obs);

        assert_eq!(products.len(), 4);
        assert_eq!(products["0"].name, "Tous les produits");
        assert_eq!(products["01"].name, "Alimentation");
        assert_eq!(products["01"].level, 1);
        assert_eq!(products["011"].name, "Pain et céréales");
        assert_eq!(products["011"].level, 2);
        assert_eq!(products["10500"].name, "Education not definable by level");
        assert_eq!(products["10500"].level, 4);
    }

    #[test]
    fn test_attach_series_rounds_and_shares_timescale() {
        let g = grid(vec![
            row(2011.0, 12.0, "01", Some(99.0), 1.0, ["Alimentation", "", "", ""]),
            row(2012.0, 2.0, "01", Some(102.5), 1.0, ["Alimentation", "", "", ""]),
            row(2012.0, 1.0, "01", Some(100.0), 1.0, ["Alimentation", "", "", ""]),
            row(2012.0, 1.0, "02", Some(98.76), 1.0, ["Boissons", "", "", ""]),
            row(2012.0, 2.0, "02", Some(99.0), 1.0, ["Boissons", "", "", ""]),
        ]);
        let obs = read_observations(&g).unwrap();
        let mut products = extract_categories(&obs);
        let mut timescales = TimescaleRegistry::new();

        let n = attach_series(&mut products, &mut timescales, &obs, date(2012, 1), 3);

        assert_eq!(n, 2);
        assert_eq!(timescales.len(), 1);
        assert_eq!(
            timescales.get(0).unwrap(),
            &vec!["2012-01-01".to_string(), "2012-02-01".to_string()]
        );
        assert_eq!(products["01"].cpi, Some(vec![100.0, 102.0]));
        assert_eq!(products["02"].cpi, Some(vec![98.8, 99.0]));
        assert_eq!(products["01"].timescale, Some(0));
        assert_eq!(products["02"].timescale, Some(0));
        assert!(products["0"].cpi.is_none());
    }

    #[test]
    fn test_attach_series_skips_unknown_codes() {
        let g = grid(vec![
            row(2012.0, 1.0, "01", Some(100.0), 1.0, ["Alimentation", "", "", ""]),
            row(2012.0, 1.0, "01.1.1.1.1", Some(100.0), 5.0, ["", "", "", ""]),
        ]);
        let obs = read_observations(&g).unwrap();
        let mut products = extract_categories(&obs);
        let mut timescales = TimescaleRegistry::new();

        let n = attach_series(&mut products, &mut timescales, &obs, date(2012, 1), 3);
        assert_eq!(n, 1);
        assert!(!products.contains_key("011111"));
    }
}
