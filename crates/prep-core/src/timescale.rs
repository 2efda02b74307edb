use serde::{Deserialize, Serialize};
use tracing::warn;

/// Ordered date labels (`YYYY-MM-DD`, first of month) shared by index series.
pub type Timescale = Vec<String>;

/// Content-deduplicated list of timescales.
///
/// Index series store the position of their timescale in this list instead
/// of repeating the dates. Two timescales are the same when their first and
/// last labels and their length match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimescaleRegistry {
    entries: Vec<Timescale>,
}

impl TimescaleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `timescale` and return its index.
    ///
    /// An equal timescale already present is reused. A timescale sharing
    /// both endpoints with an existing one of a different length is logged
    /// and appended as a new entry.
    pub fn add(&mut self, timescale: Timescale) -> usize {
        let start = timescale.first();
        let end = timescale.last();

        for (i, existing) in self.entries.iter().enumerate() {
            if existing.first() == start && existing.last() == end {
                if existing.len() == timescale.len() {
                    return i;
                }
                warn!(
                    "Timescale already exists with different length: {} -> {} ({} vs {} entries)",
                    start.map(String::as_str).unwrap_or(""),
                    end.map(String::as_str).unwrap_or(""),
                    existing.len(),
                    timescale.len(),
                );
            }
        }

        self.entries.push(timescale);
        self.entries.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Timescale> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Timescale> {
        self.entries.iter()
    }
}
