//! COICOP code and label helpers.
//!
//! A normalized code is a string of digits whose length encodes the depth of
//! the category in the classification tree (`"0"` is the root, `"01"` a
//! division, `"011"` a group, and so on).

use std::sync::LazyLock;

use regex::Regex;

/// Code of the synthetic root category.
pub const ROOT_CODE: &str = "0";

/// Display name of the synthetic root category.
pub const ROOT_NAME: &str = "Tous les produits";

/// Names corrected after extraction regardless of the source data.
pub const NAME_OVERRIDES: &[(&str, &str)] = &[("10500", "Education not definable by level")];

static NUMBERING_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\. ").expect("regex is valid"));

/// Normalize a raw classification code.
///
/// Separator dots are removed and the `-` placeholder becomes a literal `0`
/// so the code keeps its fixed width. Normalizing twice is a no-op.
pub fn normalize_code(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c == '-' { '0' } else { c })
        .collect()
}

/// Depth of a normalized code in the hierarchy (root is 0).
pub fn depth(code: &str) -> u32 {
    code.chars().count().saturating_sub(1) as u32
}

/// Remove a leading `"<number>. "` numbering prefix from a category name.
///
/// Names without such a prefix are returned unchanged.
pub fn strip_numbering(name: &str) -> String {
    NUMBERING_PREFIX.replace(name, "").into_owned()
}
