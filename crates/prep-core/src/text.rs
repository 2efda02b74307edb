//! Text folding used for grouping lookup and cache file names.

use std::sync::LazyLock;

use regex::Regex;

static NON_STEM_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_]").expect("regex is valid"));

/// Strip diacritics (transliterate to ASCII) and lowercase.
pub fn fold(text: &str) -> String {
    deunicode::deunicode(text).to_lowercase()
}

/// Tokens of a free-text query: folded, split on spaces.
pub fn query_tokens(query: &str) -> Vec<String> {
    fold(query)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokens of a canonical name: folded, split on spaces, hyphens and
/// apostrophes.
pub fn name_tokens(name: &str) -> Vec<String> {
    fold(name)
        .split([' ', '-', '\''])
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// File-system safe stem for a subgroup label.
///
/// `"Présence d'enfant(s)"` becomes `"presence_denfants"`.
pub fn file_stem(label: &str) -> String {
    let folded = fold(label).replace(' ', "_");
    NON_STEM_CHARS.replace_all(&folded, "").into_owned()
}
