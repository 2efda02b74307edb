//! Household-survey grouping dimensions and name resolution.

use tracing::debug;

use crate::error::{PrepError, Result};
use crate::text;

/// A grouping dimension of the survey and the table code of its sheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grouping {
    /// Canonical (French) name.
    pub name: &'static str,
    /// Table code used in sheet names, e.g. `Tab03_QRT` or `TAB06`.
    pub tab: &'static str,
}

pub const GROUPINGS: &[Grouping] = &[
    Grouping { name: "total", tab: "Tab01" },
    Grouping { name: "quartile de revenus", tab: "Tab03_QRT" },
    Grouping { name: "nombre de personnes âgées (65+) dans le ménage", tab: "TAB04" },
    Grouping { name: "nombre d'actifs dans le ménage", tab: "TAB05" },
    Grouping { name: "présence d'enfant(s) (<16 ans) dans le ménage", tab: "TAB06" },
    Grouping { name: "statut propriétaire-locataire de la personne de référence", tab: "TAB07" },
    Grouping { name: "âge de la personne de référence", tab: "TAB08" },
    Grouping { name: "type de ménage eurostat", tab: "TAB09" },
    Grouping { name: "type de ménage", tab: "TAB10" },
    Grouping { name: "taille du ménage", tab: "TAB11" },
    Grouping { name: "statut social de la personne de référence du ménage", tab: "TAB12" },
    Grouping { name: "âge de la personne la plus âgée", tab: "TAB13" },
];

/// Groupings processed by a default run.
pub const DEFAULT_GROUPINGS: &[&str] = &[
    "total",
    "quartile de revenus",
    "présence d'enfant(s) (<16 ans) dans le ménage",
    "statut propriétaire-locataire de la personne de référence",
    "type de ménage eurostat",
];

/// Exact lookup by canonical name.
pub fn find(name: &str) -> Option<&'static Grouping> {
    GROUPINGS.iter().find(|g| g.name == name)
}

/// Outcome of resolving an approximate grouping name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupingMatch {
    Unique(&'static Grouping),
    Ambiguous(Vec<&'static Grouping>),
}

/// Resolve a canonical or approximate grouping name.
///
/// An exact canonical name wins outright. Otherwise every token of `query`
/// (diacritics stripped, lowercased, split on spaces) must appear among the
/// tokens of a candidate's name, in any order.
pub fn resolve(query: &str) -> Result<GroupingMatch> {
    if let Some(g) = find(query) {
        return Ok(GroupingMatch::Unique(g));
    }

    let tokens = text::query_tokens(query);
    let matches: Vec<&'static Grouping> = GROUPINGS
        .iter()
        .filter(|g| {
            let candidate = text::name_tokens(g.name);
            tokens.iter().all(|t| candidate.contains(t))
        })
        .collect();

    debug!("Grouping query {:?} matched {} candidate(s)", query, matches.len());

    match matches.len() {
        0 => Err(PrepError::NoGroupingMatch(query.to_string())),
        1 => Ok(GroupingMatch::Unique(matches[0])),
        _ => Ok(GroupingMatch::Ambiguous(matches)),
    }
}

/// Chooses among several matching groupings.
pub trait Disambiguator {
    /// Return the index of the chosen candidate, or `None` to give up.
    fn choose(&self, query: &str, candidates: &[&'static Grouping]) -> Option<usize>;
}

/// Always picks the first candidate, in catalogue order.
pub struct FirstCandidate;

impl Disambiguator for FirstCandidate {
    fn choose(&self, _query: &str, candidates: &[&'static Grouping]) -> Option<usize> {
        if candidates.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}

/// Never chooses, so ambiguity becomes an error.
pub struct RejectAmbiguous;

impl Disambiguator for RejectAmbiguous {
    fn choose(&self, _query: &str, _candidates: &[&'static Grouping]) -> Option<usize> {
        None
    }
}

/// Resolve `query` to a single grouping, deferring ties to `chooser`.
pub fn resolve_with(query: &str, chooser: &dyn Disambiguator) -> Result<&'static Grouping> {
    match resolve(query)? {
        GroupingMatch::Unique(g) => Ok(g),
        GroupingMatch::Ambiguous(candidates) => chooser
            .choose(query, &candidates)
            .and_then(|i| candidates.get(i).copied())
            .ok_or_else(|| PrepError::AmbiguousGrouping {
                input: query.to_string(),
                candidates: candidates.iter().map(|g| g.name.to_string()).collect(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_groupings_are_in_catalogue() {
        for name in DEFAULT_GROUPINGS {
            assert!(find(name).is_some(), "{name} missing from catalogue");
        }
    }

    #[test]
    fn test_exact_name_resolves() {
        let m = resolve("type de ménage").unwrap();
        assert_eq!(m, GroupingMatch::Unique(find("type de ménage").unwrap()));
    }

    #[test]
    fn test_fuzzy_without_accents() {
        match resolve("Presence enfant(s)").unwrap() {
            GroupingMatch::Unique(g) => assert_eq!(g.tab, "TAB06"),
            other => panic!("expected unique match, got {other:?}"),
        }
    }

    #[test]
    fn test_fuzzy_token_order_is_irrelevant() {
        match resolve("revenus quartile").unwrap() {
            GroupingMatch::Unique(g) => assert_eq!(g.tab, "Tab03_QRT"),
            other => panic!("expected unique match, got {other:?}"),
        }
    }

    #[test]
    fn test_fuzzy_hyphenated_name() {
        match resolve("locataire").unwrap() {
            GroupingMatch::Unique(g) => assert_eq!(g.tab, "TAB07"),
            other => panic!("expected unique match, got {other:?}"),
        }
    }

    #[test]
    fn test_no_match() {
        let err = resolve("revenu disponible").unwrap_err();
        assert!(matches!(err, PrepError::NoGroupingMatch(_)));
    }

    #[test]
    fn test_ambiguous_lists_candidates() {
        match resolve("Type de Menage").unwrap() {
            GroupingMatch::Ambiguous(c) => {
                let tabs: Vec<&str> = c.iter().map(|g| g.tab).collect();
                assert_eq!(tabs, vec!["TAB09", "TAB10"]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_with_first_candidate() {
        let g = resolve_with("type menage", &FirstCandidate).unwrap();
        assert_eq!(g.tab, "TAB09");
    }

    #[test]
    fn test_resolve_with_reject() {
        let err = resolve_with("type menage", &RejectAmbiguous).unwrap_err();
        match err {
            PrepError::AmbiguousGrouping { input, candidates } => {
                assert_eq!(input, "type menage");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_resolve_with_out_of_range_choice_is_ambiguous() {
        struct Pick(usize);
        impl Disambiguator for Pick {
            fn choose(&self, _q: &str, _c: &[&'static Grouping]) -> Option<usize> {
                Some(self.0)
            }
        }
        assert_eq!(resolve_with("type menage", &Pick(1)).unwrap().tab, "TAB10");
        assert!(resolve_with("type menage", &Pick(7)).is_err());
    }
}
