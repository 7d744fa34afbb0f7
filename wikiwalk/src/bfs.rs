use std::collections::{HashMap, HashSet};

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::store::Store;
use crate::types::{Graph, PageId};

/// Outcome of one [`search`] invocation. A dedicated `Cancelled` variant
/// (rather than folding it into `Result`) lets the HTTP boundary tell "the
/// engine gave up cleanly" apart from "the store failed".
pub enum SearchOutcome {
    Completed(Graph),
    Cancelled,
}

type ParentMap = HashMap<PageId, HashSet<PageId>>;

/// Bidirectional BFS with all-shortest-paths backtracking. See the module's
/// test scenarios for the exact contract; the short version: expand the
/// smaller frontier each round until the two cones touch, then recursively
/// count and collect every edge that lies on a shortest path.
pub fn search(
    store: &Store,
    language_code: &str,
    raw_source: PageId,
    raw_target: PageId,
    cancel: &CancellationToken,
) -> Result<SearchOutcome> {
    let source_is_redirect = store.redirect(raw_source).is_some();
    let source = store.redirect(raw_source).unwrap_or(raw_source);
    let target_is_redirect = store.redirect(raw_target).is_some();
    let target = store.redirect(raw_target).unwrap_or(raw_target);

    if source == target {
        return Ok(SearchOutcome::Completed(Graph::trivial(
            source,
            language_code.to_string(),
            source_is_redirect,
        )));
    }

    let mut forward_parents: ParentMap = HashMap::new();
    forward_parents.insert(source, HashSet::new());
    let mut backward_parents: ParentMap = HashMap::new();
    backward_parents.insert(target, HashSet::new());

    let mut forward_frontier = vec![source];
    let mut backward_frontier = vec![target];
    let mut forward_depth: u32 = 0;
    let mut backward_depth: u32 = 0;
    let mut overlap: HashSet<PageId> = HashSet::new();

    while overlap.is_empty() && !forward_frontier.is_empty() && !backward_frontier.is_empty() {
        if cancel.is_cancelled() {
            return Ok(SearchOutcome::Cancelled);
        }

        let expand_forward = forward_frontier.len() < backward_frontier.len();
        if expand_forward {
            forward_frontier = expand_level(
                store,
                cancel,
                &forward_frontier,
                &mut forward_parents,
                &backward_parents,
                &mut overlap,
                Direction::Forward,
            )?;
            forward_depth += 1;
        } else {
            backward_frontier = expand_level(
                store,
                cancel,
                &backward_frontier,
                &mut backward_parents,
                &forward_parents,
                &mut overlap,
                Direction::Backward,
            )?;
            backward_depth += 1;
        }

        if cancel.is_cancelled() {
            return Ok(SearchOutcome::Cancelled);
        }
    }

    if overlap.is_empty() {
        return Ok(SearchOutcome::Completed(Graph::unreachable(
            source,
            target,
            language_code.to_string(),
            source_is_redirect,
            target_is_redirect,
        )));
    }

    let mut links: HashMap<PageId, HashSet<PageId>> = HashMap::new();
    let mut forward_memo: HashMap<PageId, u64> = HashMap::new();
    let mut backward_memo: HashMap<PageId, u64> = HashMap::new();
    let mut path_count: u64 = 0;

    let mut overlap: Vec<PageId> = overlap.into_iter().collect();
    overlap.sort_unstable();
    for m in overlap {
        let fc = count_forward(m, source, &forward_parents, &mut forward_memo, &mut links);
        let bc = count_backward(m, target, &backward_parents, &mut backward_memo, &mut links);
        path_count += fc * bc;
    }

    let path_degrees = if path_count > 0 {
        forward_depth + backward_depth
    } else {
        0
    };
    let sorted_links: std::collections::BTreeMap<PageId, Vec<PageId>> = links
        .into_iter()
        .map(|(k, v)| {
            let mut v: Vec<PageId> = v.into_iter().collect();
            v.sort_unstable();
            (k, v)
        })
        .collect();

    Ok(SearchOutcome::Completed(Graph {
        source,
        target,
        source_is_redirect,
        target_is_redirect,
        language_code: language_code.to_string(),
        links: sorted_links,
        path_count,
        path_degrees,
    }))
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

/// Expands one BFS level on one side. `same_side` is this side's parent
/// map (mutated in place); `opposite_side` is the other side's, read only
/// to detect the frontiers touching. Returns the next frontier.
fn expand_level(
    store: &Store,
    cancel: &CancellationToken,
    frontier: &[PageId],
    same_side: &mut ParentMap,
    opposite_side: &ParentMap,
    overlap: &mut HashSet<PageId>,
    direction: Direction,
) -> Result<Vec<PageId>> {
    let visited_before: HashSet<PageId> = same_side.keys().copied().collect();
    let mut next_frontier: Vec<PageId> = Vec::new();
    let mut newly_seen: HashSet<PageId> = HashSet::new();

    for &p in frontier {
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }
        let neighbors = match direction {
            Direction::Forward => store.outgoing(p)?,
            Direction::Backward => store.incoming(p)?,
        };
        for n in neighbors {
            if visited_before.contains(&n) {
                continue;
            }
            same_side.entry(n).or_default().insert(p);
            if opposite_side.contains_key(&n) {
                overlap.insert(n);
            }
            if newly_seen.insert(n) {
                next_frontier.push(n);
            }
        }
    }
    Ok(next_frontier)
}

/// Counts distinct shortest paths from `source` to `x` through the forward
/// parent map, memoized, and records every traversed edge `(parent -> x)`
/// into `links` as it goes. Each node's parent set is only ever walked
/// once thanks to the memo check guarding the loop body.
fn count_forward(
    x: PageId,
    source: PageId,
    parents: &ParentMap,
    memo: &mut HashMap<PageId, u64>,
    links: &mut HashMap<PageId, HashSet<PageId>>,
) -> u64 {
    if x == source {
        return 1;
    }
    if let Some(&cached) = memo.get(&x) {
        return cached;
    }
    let mut total = 0u64;
    if let Some(parents_of_x) = parents.get(&x) {
        for &q in parents_of_x {
            total += count_forward(q, source, parents, memo, links);
            links.entry(q).or_default().insert(x);
        }
    }
    memo.insert(x, total);
    total
}

/// Symmetric to [`count_forward`], but walking the backward parent map:
/// `parents[x]` there holds the real successors of `x` towards `target`,
/// so the traversed edge is `(x -> successor)`.
fn count_backward(
    x: PageId,
    target: PageId,
    parents: &ParentMap,
    memo: &mut HashMap<PageId, u64>,
    links: &mut HashMap<PageId, HashSet<PageId>>,
) -> u64 {
    if x == target {
        return 1;
    }
    if let Some(&cached) = memo.get(&x) {
        return cached;
    }
    let mut total = 0u64;
    if let Some(successors_of_x) = parents.get(&x) {
        for &q in successors_of_x {
            total += count_backward(q, target, parents, memo, links);
            links.entry(x).or_default().insert(q);
        }
    }
    memo.insert(x, total);
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Metadata, WriteStore};
    use std::collections::HashSet as Set;

    fn build_store(edges: &[(PageId, PageId)], redirects: &[(PageId, PageId)]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let store = WriteStore::create(&path).unwrap();
        store
            .set_metadata(&Metadata {
                dump_date: "20240101".into(),
                build_date: "20240101".into(),
                language_code: "en".into(),
                language_name: "English".into(),
                max_page_id: 100,
            })
            .unwrap();
        for &(from, to) in redirects {
            store.put_redirect(from, to).unwrap();
        }
        let mut outgoing: HashMap<PageId, Set<PageId>> = HashMap::new();
        let mut incoming: HashMap<PageId, Set<PageId>> = HashMap::new();
        for &(s, t) in edges {
            outgoing.entry(s).or_default().insert(t);
            incoming.entry(t).or_default().insert(s);
        }
        for (id, n) in outgoing {
            store.put_outgoing(id, n).unwrap();
        }
        for (id, n) in incoming {
            store.put_incoming(id, n).unwrap();
        }
        store.flush().unwrap();
        (dir, path)
    }

    fn run(edges: &[(PageId, PageId)], redirects: &[(PageId, PageId)], s: PageId, t: PageId) -> Graph {
        let (_dir, path) = build_store(edges, redirects);
        let store = Store::open(&path).unwrap();
        let cancel = CancellationToken::new();
        match search(&store, "en", s, t, &cancel).unwrap() {
            SearchOutcome::Completed(g) => g,
            SearchOutcome::Cancelled => panic!("unexpected cancellation"),
        }
    }

    #[test]
    fn trivial_same_source_and_target() {
        let g = run(&[], &[], 1, 1);
        assert_eq!(g.path_count, 1);
        assert_eq!(g.path_degrees, 0);
        assert!(g.links.is_empty());
    }

    #[test]
    fn direct_single_hop() {
        let g = run(&[(1, 2)], &[], 1, 2);
        assert_eq!(g.path_count, 1);
        assert_eq!(g.path_degrees, 1);
        assert_eq!(g.links.get(&1), Some(&vec![2]));
    }

    #[test]
    fn redirect_fold_reports_terminal_source() {
        let g = run(&[(2, 3)], &[(1, 2)], 1, 3);
        assert!(g.source_is_redirect);
        assert_eq!(g.source, 2);
        assert_eq!(g.path_count, 1);
        assert_eq!(g.path_degrees, 1);
        assert_eq!(g.links.get(&2), Some(&vec![3]));
    }

    #[test]
    fn diamond_has_two_shortest_paths() {
        let g = run(&[(1, 2), (1, 3), (2, 4), (3, 4)], &[], 1, 4);
        assert_eq!(g.path_count, 2);
        assert_eq!(g.path_degrees, 2);
        assert_eq!(g.links.get(&1), Some(&vec![2, 3]));
        assert_eq!(g.links.get(&2), Some(&vec![4]));
        assert_eq!(g.links.get(&3), Some(&vec![4]));
    }

    #[test]
    fn unreachable_pair_has_zero_paths() {
        let g = run(&[(1, 2)], &[], 1, 3);
        assert_eq!(g.path_count, 0);
        assert_eq!(g.path_degrees, 0);
        assert!(g.links.is_empty());
    }

    #[test]
    fn cancellation_before_any_expansion_returns_cancelled() {
        let (_dir, path) = build_store(&[(1, 2)], &[]);
        let store = Store::open(&path).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        match search(&store, "en", 1, 2, &cancel).unwrap() {
            SearchOutcome::Cancelled => {}
            SearchOutcome::Completed(_) => panic!("expected cancellation"),
        }
    }
}
