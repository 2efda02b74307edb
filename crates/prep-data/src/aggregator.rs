//! Joins survey spending onto the category registry.

use std::collections::BTreeMap;

use prep_core::coicop::ROOT_CODE;
use prep_core::error::{PrepError, Result};
use prep_core::models::{Products, Region, SpendingPair, SpendingRecord};
use prep_core::rounding::round_to_n;
use tracing::debug;

use crate::sheet::{SurveyRow, SPENDING_METRIC};
use crate::survey::SubgroupTable;

/// Subgroups whose source tables are known to be incomplete.
pub const MISSING_DATA_GROUPS: &[&str] = &["3 adultes ou plus*"];

// ── SpendingAggregator ────────────────────────────────────────────────────────

/// Stateless helper turning subgroup tables into spending records.
pub struct SpendingAggregator;

impl SpendingAggregator {
    /// `[abs, abs / total]` per code, both rounded to `digits` significant
    /// digits. The total is the absolute spending of the root code.
    ///
    /// Rows without an absolute spending value are left out.
    pub fn percent_and_abs(
        rows: &[SurveyRow],
        digits: u32,
        sheet: &str,
        group: &str,
    ) -> Result<BTreeMap<String, SpendingPair>> {
        if !rows.iter().any(|r| r.value(SPENDING_METRIC).is_some()) {
            return Err(PrepError::MissingColumn {
                table: format!("{sheet} / {group}"),
                column: SPENDING_METRIC.to_string(),
            });
        }

        let missing_total = || PrepError::MissingTotal {
            sheet: sheet.to_string(),
            group: group.to_string(),
        };
        let total = rows
            .iter()
            .find(|r| r.code == ROOT_CODE)
            .and_then(|r| r.value(SPENDING_METRIC))
            .ok_or_else(missing_total)?;
        if total == 0.0 {
            return Err(missing_total());
        }

        Ok(rows
            .iter()
            .filter_map(|r| {
                let abs = r.value(SPENDING_METRIC)?;
                Some((
                    r.code.clone(),
                    [round_to_n(abs, digits), round_to_n(abs / total, digits)],
                ))
            })
            .collect())
    }

    /// One record per subgroup, restricted to codes present in `products`.
    pub fn records(
        year: u16,
        region: Region,
        grouping: &str,
        sheet: &str,
        tables: &[SubgroupTable],
        products: &Products,
        digits: u32,
    ) -> Result<Vec<SpendingRecord>> {
        let mut records = Vec::with_capacity(tables.len());

        for table in tables {
            if MISSING_DATA_GROUPS.contains(&table.name.as_str()) {
                debug!("{}: skipping subgroup {:?}", sheet, table.name);
                continue;
            }

            let mut spendings = Self::percent_and_abs(&table.rows, digits, sheet, &table.name)?;
            let before = spendings.len();
            spendings.retain(|code, _| products.contains_key(code));
            debug!(
                "{} / {}: kept {} of {} code(s)",
                sheet,
                table.name,
                spendings.len(),
                before
            );

            records.push(SpendingRecord {
                year,
                region,
                grouping: grouping.to_string(),
                group: table.name.clone(),
                spendings,
            });
        }

        Ok(records)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
