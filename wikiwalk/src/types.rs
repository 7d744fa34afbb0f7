use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A Wikipedia page id. `0` is reserved as the "absent/invalid" sentinel;
/// valid pages are non-zero. Dumps cap ids at 10 decimal digits, which
/// always fits in 32 bits.
pub type PageId = u32;

/// Normalize a raw dump title into the canonical form used as the key for
/// title lookups: `\'` unescaped to `'`, and `_` turned into a space. This
/// must run exactly once per title, at the parser boundary (see
/// [`crate::dump`]), so downstream consumers never re-normalize.
pub fn normalize_title(raw: &str) -> String {
    raw.replace("\\'", "'").replace('_', " ")
}

/// The subgraph induced by every shortest path between `source` and
/// `target`, as returned by the search engine and served verbatim (once
/// serialized) by the HTTP boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub source: PageId,
    pub target: PageId,
    pub source_is_redirect: bool,
    pub target_is_redirect: bool,
    pub language_code: String,
    /// Adjacency of the paths subgraph: source id -> sorted, deduplicated
    /// list of destination ids, restricted to edges that lie on at least
    /// one shortest path.
    pub links: BTreeMap<PageId, Vec<PageId>>,
    /// Exact number of distinct shortest paths between source and target.
    pub path_count: u64,
    /// The common length (hop count) of every shortest path, or 0 when
    /// `path_count == 0`.
    pub path_degrees: u32,
}

impl Graph {
    /// The trivial `source == target` result: a single path of length 0.
    pub fn trivial(id: PageId, language_code: String, is_redirect: bool) -> Graph {
        Graph {
            source: id,
            target: id,
            source_is_redirect: is_redirect,
            target_is_redirect: is_redirect,
            language_code,
            links: BTreeMap::new(),
            path_count: 1,
            path_degrees: 0,
        }
    }

    /// The unreachable result: no path exists.
    pub fn unreachable(
        source: PageId,
        target: PageId,
        language_code: String,
        source_is_redirect: bool,
        target_is_redirect: bool,
    ) -> Graph {
        Graph {
            source,
            target,
            source_is_redirect,
            target_is_redirect,
            language_code,
            links: BTreeMap::new(),
            path_count: 0,
            path_degrees: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_escaped_quote_and_underscore() {
        assert_eq!(normalize_title("Bob\\'s_Burgers"), "Bob's Burgers");
    }

    #[test]
    fn leaves_plain_titles_alone() {
        assert_eq!(normalize_title("Rust (programming language)"), "Rust (programming language)");
    }
}
