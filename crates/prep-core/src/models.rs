use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::coicop;
use crate::error::PrepError;
use crate::timescale::TimescaleRegistry;

/// A node of the COICOP product classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Normalized digit-only code.
    pub coicop: String,
    /// Display name without numbering prefix.
    pub name: String,
    /// Depth in the hierarchy, derived from the code length.
    pub level: u32,
    /// Monthly index values, one per entry of the referenced timescale.
    #[serde(rename = "CPI", default, skip_serializing_if = "Option::is_none")]
    pub cpi: Option<Vec<f64>>,
    /// Index of the timescale in [`OutputDocument::timescales`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timescale: Option<usize>,
}

impl Category {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        let coicop = code.into();
        let level = coicop::depth(&coicop);
        Self {
            coicop,
            name: name.into(),
            level,
            cpi: None,
            timescale: None,
        }
    }

    /// The hard-coded "all products" root.
    pub fn root() -> Self {
        Self::new(coicop::ROOT_CODE, coicop::ROOT_NAME)
    }
}

/// Category registry keyed by normalized code.
pub type Products = BTreeMap<String, Category>;

/// Survey region. `FL` and `VL` both designate Flanders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "BE")]
    Belgium,
    #[serde(rename = "BXL")]
    Brussels,
    #[serde(rename = "WAL")]
    Wallonia,
    #[serde(rename = "FL")]
    Flanders,
    #[serde(rename = "VL")]
    FlandersVl,
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::Belgium,
        Region::Brussels,
        Region::Wallonia,
        Region::Flanders,
        Region::FlandersVl,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Region::Belgium => "BE",
            Region::Brussels => "BXL",
            Region::Wallonia => "WAL",
            Region::Flanders => "FL",
            Region::FlandersVl => "VL",
        }
    }

    /// Region code as spelled in the sheet name of table `tab`.
    ///
    /// Flanders is `FL` in `Tab..` sheets and `VL` in `TAB..` sheets.
    pub fn sheet_code(self, tab: &str) -> &'static str {
        match self {
            Region::Flanders | Region::FlandersVl => {
                if tab.starts_with("Tab") {
                    "FL"
                } else {
                    "VL"
                }
            }
            other => other.code(),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Region {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.code() == s)
            .ok_or_else(|| PrepError::InvalidRegion(s.to_string()))
    }
}

/// Absolute and relative-to-total spending for one category.
pub type SpendingPair = [f64; 2];

/// Spending of one subgroup, restricted to known categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingRecord {
    pub year: u16,
    pub region: Region,
    /// Canonical grouping name (e.g. `"quartile de revenus"`).
    pub grouping: String,
    /// Subgroup label as found in the sheet (e.g. `"Quartile 1"`).
    pub group: String,
    pub spendings: BTreeMap<String, SpendingPair>,
}

/// The document written for the visualization front-end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputDocument {
    pub products: Products,
    pub timescales: TimescaleRegistry,
    pub spendings: Vec<SpendingRecord>,
}
