//! Survey Loader: locate survey sheets and load their subgroup tables,
//! going through the [`SheetCache`] when possible.

use std::path::{Path, PathBuf};

use prep_core::error::{PrepError, Result};
use prep_core::grouping::Grouping;
use prep_core::models::Region;
use tracing::{debug, info};

use crate::cache::SheetCache;
use crate::sheet::{self, SheetInfo, SurveyRow};
use crate::workbook::{Grid, WorkbookSource};

pub const WORKBOOK_2020: &str = "EBM/EBM_0113_2020_FR_07SEP21.XLSX";
pub const WORKBOOK_2018: &str = "EBM/EBM_0113_2018_FR_19NOV19.XLSX";
pub const WORKBOOK_2012_2016: &str = "EBM/Enquete_sur_le_budget_des_menages_EBM_2012-2014-2016.xls";

/// Survey workbook holding the tables of `year`.
pub fn workbook_for_year(data_dir: &Path, year: u16) -> Result<PathBuf> {
    let rel = match year {
        2020 => WORKBOOK_2020,
        2018 => WORKBOOK_2018,
        2012 | 2014 | 2016 => WORKBOOK_2012_2016,
        other => return Err(PrepError::NoDataForYear(other)),
    };
    Ok(data_dir.join(rel))
}

/// `HBS_<tab>_<region>_<year>`.
pub fn sheet_name(grouping: &Grouping, region: Region, year: u16) -> String {
    format!("HBS_{}_{}_{}", grouping.tab, region.sheet_code(grouping.tab), year)
}

/// A fully located survey sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRequest {
    pub year: u16,
    pub region: Region,
    pub grouping: &'static Grouping,
    pub workbook: PathBuf,
    pub sheet: String,
}

/// Locate the sheet for one (year, region, grouping). The region is checked
/// before the year.
pub fn locate(data_dir: &Path, year: u16, grouping: &'static Grouping, region: &str) -> Result<SheetRequest> {
    let region: Region = region.parse()?;
    let workbook = workbook_for_year(data_dir, year)?;
    Ok(SheetRequest {
        year,
        region,
        grouping,
        workbook,
        sheet: sheet_name(grouping, region, year),
    })
}

/// Rows of one subgroup of a sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SubgroupTable {
    pub name: String,
    pub rows: Vec<SurveyRow>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub sheets_parsed: usize,
    pub tables_from_cache: usize,
    pub tables_parsed: usize,
}

/// Loads survey tables from a [`WorkbookSource`] through a [`SheetCache`].
pub struct SurveyLoader<S> {
    source: S,
    cache: SheetCache,
    stats: LoadStats,
}

impl<S: WorkbookSource> SurveyLoader<S> {
    pub fn new(source: S, cache: SheetCache) -> Self {
        Self {
            source,
            cache,
            stats: LoadStats::default(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn cache(&self) -> &SheetCache {
        &self.cache
    }

    pub fn stats(&self) -> LoadStats {
        self.stats
    }

    fn read_grid<'a>(&mut self, slot: &'a mut Option<Grid>, req: &SheetRequest) -> Result<&'a Grid> {
        if slot.is_none() {
            info!("Parsing {} from {}", req.sheet, req.workbook.display());
            *slot = Some(self.source.sheet(&req.workbook, &req.sheet)?);
            self.stats.sheets_parsed += 1;
        }
        slot.as_ref().ok_or_else(|| PrepError::MissingSheet {
            path: req.workbook.clone(),
            sheet: req.sheet.clone(),
        })
    }

    fn info_with(&mut self, req: &SheetRequest, grid: &mut Option<Grid>) -> Result<SheetInfo> {
        if let Some(info) = self.cache.load_info(&req.sheet, &req.workbook)? {
            return Ok(info);
        }
        let grid = self.read_grid(grid, req)?;
        let info = sheet::parse_sheet_info(grid, &req.workbook, &req.sheet, req.grouping.name)?;
        self.cache.store_info(&info)?;
        Ok(info)
    }

    /// Metadata of the requested sheet.
    pub fn sheet_info(&mut self, req: &SheetRequest) -> Result<SheetInfo> {
        self.info_with(req, &mut None)
    }

    /// All subgroup tables of the requested sheet, in column order.
    ///
    /// The workbook is read at most once, and only when the metadata or a
    /// subgroup is missing from the cache.
    pub fn load_tables(&mut self, req: &SheetRequest) -> Result<Vec<SubgroupTable>> {
        let mut grid: Option<Grid> = None;
        let info = self.info_with(req, &mut grid)?;

        let mut tables = Vec::with_capacity(info.groups.len());
        for group in &info.groups {
            let rows = match self.cache.load_rows(&req.sheet, &group.name, &req.workbook)? {
                Some(rows) => {
                    self.stats.tables_from_cache += 1;
                    rows
                }
                None => {
                    let grid = self.read_grid(&mut grid, req)?;
                    let rows = sheet::read_rows(grid, &info, group)?;
                    self.cache
                        .store_rows(&req.sheet, &group.name, &group.metric_names(), &rows)?;
                    self.stats.tables_parsed += 1;
                    rows
                }
            };
            debug!("{} / {}: {} row(s)", req.sheet, group.name, rows.len());
            tables.push(SubgroupTable {
                name: group.name.clone(),
                rows,
            });
        }
        Ok(tables)
    }
}
