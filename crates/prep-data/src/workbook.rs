//! Spreadsheet access.
//!
//! Sheets are read into a [`Grid`] addressed by absolute (row, column)
//! positions, so header offsets found in a sheet can be used as-is no matter
//! where the used range of the sheet starts.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use prep_core::error::{PrepError, Result};
use tracing::debug;

// ── Cell ──────────────────────────────────────────────────────────────────────

/// A spreadsheet cell reduced to what the pipeline cares about.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
}

static EMPTY: Cell = Cell::Empty;

impl Cell {
    /// `true` for empty cells and whitespace-only text.
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Trimmed textual content. Whole numbers render without a fraction.
    pub fn text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t.to_string())
                }
            }
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(n.to_string())
                }
            }
        }
    }

    /// Numeric content; text cells are parsed when they hold a number.
    pub fn number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.trim().parse().ok(),
            Cell::Empty => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<&Data> for Cell {
    fn from(d: &Data) -> Self {
        match d {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) if s.is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        }
    }
}

// ── Grid ──────────────────────────────────────────────────────────────────────

/// A sheet as rows of cells. Rows may be ragged; missing cells read as empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Build a grid from a calamine range, shifting cells to their absolute
    /// position in the sheet.
    pub fn from_range(range: &Range<Data>) -> Self {
        let (row0, col0) = match range.start() {
            Some((r, c)) => (r as usize, c as usize),
            None => return Self::default(),
        };

        let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row0];
        for row in range.rows() {
            let mut cells = vec![Cell::Empty; col0];
            cells.extend(row.iter().map(Cell::from));
            rows.push(cells);
        }
        Self { rows }
    }

    pub fn get(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn text(&self, row: usize, col: usize) -> Option<String> {
        self.get(row, col).text()
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Widest row among the first `limit` rows.
    pub fn width_of_first(&self, limit: usize) -> usize {
        self.rows.iter().take(limit).map(Vec::len).max().unwrap_or(0)
    }
}

// ── WorkbookSource ────────────────────────────────────────────────────────────

/// Anything able to hand out sheets of workbooks by path and name.
pub trait WorkbookSource {
    /// Read sheet `sheet` of the workbook at `path`.
    fn sheet(&mut self, path: &Path, sheet: &str) -> Result<Grid>;

    /// Read the first sheet of the workbook at `path`.
    fn first_sheet(&mut self, path: &Path) -> Result<Grid>;
}

/// Reads `.xls` / `.xlsx` files through calamine, keeping each opened
/// workbook for later sheet requests.
#[derive(Default)]
pub struct CalamineSource {
    open: HashMap<PathBuf, Sheets<BufReader<File>>>,
}

impl CalamineSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn workbook(&mut self, path: &Path) -> Result<&mut Sheets<BufReader<File>>> {
        if !self.open.contains_key(path) {
            if !path.exists() {
                return Err(PrepError::FileRead {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                });
            }
            debug!("Opening workbook {}", path.display());
            let wb = open_workbook_auto(path).map_err(|e| PrepError::Workbook {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            self.open.insert(path.to_path_buf(), wb);
        }
        self.open
            .get_mut(path)
            .ok_or_else(|| PrepError::Workbook {
                path: path.to_path_buf(),
                message: "workbook not loaded".to_string(),
            })
    }
}

impl WorkbookSource for CalamineSource {
    fn sheet(&mut self, path: &Path, sheet: &str) -> Result<Grid> {
        let wb = self.workbook(path)?;
        if !wb.sheet_names().iter().any(|n| n == sheet) {
            return Err(PrepError::MissingSheet {
                path: path.to_path_buf(),
                sheet: sheet.to_string(),
            });
        }
        let range = wb.worksheet_range(sheet).map_err(|e| PrepError::Workbook {
            path: path.to_path_buf(),
            message: format!("sheet {sheet}: {e}"),
        })?;
        Ok(Grid::from_range(&range))
    }

    fn first_sheet(&mut self, path: &Path) -> Result<Grid> {
        let wb = self.workbook(path)?;
        let name = wb
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| PrepError::Workbook {
                path: path.to_path_buf(),
                message: "workbook has no sheets".to_string(),
            })?;
        self.sheet(path, &name)
    }
}

/// In-memory workbooks, used to feed the pipeline without files on disk.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    sheets: Vec<(PathBuf, String, Grid)>,
    reads: usize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a sheet. The first sheet added for a path is its
    /// first sheet.
    pub fn insert(&mut self, path: impl Into<PathBuf>, sheet: impl Into<String>, grid: Grid) {
        let path = path.into();
        let sheet = sheet.into();
        if let Some(slot) = self
            .sheets
            .iter_mut()
            .find(|(p, s, _)| *p == path && *s == sheet)
        {
            slot.2 = grid;
        } else {
            self.sheets.push((path, sheet, grid));
        }
    }

    /// Number of sheet reads served so far.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl WorkbookSource for MemorySource {
    fn sheet(&mut self, path: &Path, sheet: &str) -> Result<Grid> {
        let grid = self
            .sheets
            .iter()
            .find(|(p, s, _)| p == path && s == sheet)
            .map(|(_, _, g)| g.clone())
            .ok_or_else(|| PrepError::MissingSheet {
                path: path.to_path_buf(),
                sheet: sheet.to_string(),
            })?;
        self.reads += 1;
        Ok(grid)
    }

    fn first_sheet(&mut self, path: &Path) -> Result<Grid> {
        let name = self
            .sheets
            .iter()
            .find(|(p, _, _)| p == path)
            .map(|(_, s, _)| s.clone())
            .ok_or_else(|| PrepError::FileRead {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such workbook"),
            })?;
        self.sheet(path, &name)
    }
}
