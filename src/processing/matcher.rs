//! Destination name resolution
//!
//! Spoken or typed destination queries rarely match a beacon name exactly.
//! Both sides are folded (diacritics stripped, lowercased, whitespace
//! collapsed) and matched through a cascade of tiers; the first tier with any
//! hit decides. Within a tier candidates rank exact > prefix > closeness in
//! length to the query. Closeness is a plain length difference, not an edit
//! distance.

use crate::core::Beacon;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Most candidates reported back for an ambiguous query
pub const MAX_AMBIGUOUS_CANDIDATES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
    Success(String),
    Ambiguous(Vec<String>),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchTier {
    Exact,
    Prefix,
    Substring,
    CompactSubstring,
}

/// Fold case, diacritics and whitespace
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn tier(query: &str, candidate: &str) -> Option<MatchTier> {
    if candidate == query {
        Some(MatchTier::Exact)
    } else if candidate.starts_with(query) {
        Some(MatchTier::Prefix)
    } else if candidate.contains(query) {
        Some(MatchTier::Substring)
    } else if compact(candidate).contains(&compact(query)) {
        Some(MatchTier::CompactSubstring)
    } else {
        None
    }
}

/// Resolve a query against a set of names
pub fn resolve_names<'a, I>(query: &str, names: I) -> MatchResult
where
    I: IntoIterator<Item = &'a str>,
{
    let query = normalize(query);
    if query.is_empty() {
        return MatchResult::NotFound;
    }
    let query_len = query.chars().count();

    let mut seen = Vec::new();
    let mut hits: Vec<(MatchTier, usize, &str)> = Vec::new();
    for name in names {
        let folded = normalize(name);
        if folded.is_empty() || seen.contains(&folded) {
            continue;
        }
        if let Some(t) = tier(&query, &folded) {
            let closeness = folded.chars().count().abs_diff(query_len);
            hits.push((t, closeness, name));
        }
        seen.push(folded);
    }

    let Some(best_tier) = hits.iter().map(|(t, _, _)| *t).min() else {
        return MatchResult::NotFound;
    };
    hits.retain(|(t, _, _)| *t == best_tier);
    hits.sort_by_key(|(_, closeness, name)| (*closeness, *name));

    let top = hits[0].1;
    let tied = hits.iter().filter(|(_, c, _)| *c == top).count();
    if tied == 1 {
        return MatchResult::Success(hits[0].2.to_string());
    }
    MatchResult::Ambiguous(
        hits.iter()
            .take(MAX_AMBIGUOUS_CANDIDATES)
            .map(|(_, _, name)| name.to_string())
            .collect(),
    )
}

/// Resolve a destination query against the available beacons
pub fn resolve(query: &str, beacons: &[Beacon]) -> MatchResult {
    resolve_names(query, beacons.iter().map(|b| b.name.as_str()))
}

/// Beacon named by a successful resolution
pub fn resolve_beacon<'a>(query: &str, beacons: &'a [Beacon]) -> Option<&'a Beacon> {
    match resolve(query, beacons) {
        MatchResult::Success(name) => beacons.iter().find(|b| b.name == name),
        _ => None,
    }
}
