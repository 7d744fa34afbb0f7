use std::collections::{HashMap, HashSet};

use crate::types::PageId;

/// Resolves a raw `from -> to` redirect map into one where every target is
/// terminal (not itself a key), breaking cycles by deleting the edge that
/// closes them.
///
/// For each `(s, t)` the chain `t, raw[t], raw[raw[t]], ...` is followed
/// with a per-chain seen-set seeded with `{s, t}`. The first time the next
/// hop is already in the seen-set, the edge that would have produced it —
/// `raw[current]` — is deleted, which makes `current` terminal; that
/// becomes the resolved target for `s`. Redirect cycles are expected
/// (editors occasionally create them) and are not an error.
pub fn resolve_redirects(mut raw: HashMap<PageId, PageId>) -> HashMap<PageId, PageId> {
    let mut sources: Vec<PageId> = raw.keys().copied().collect();
    sources.sort_unstable();

    for s in sources {
        let Some(&t0) = raw.get(&s) else {
            // Removed by an earlier cycle-break; s is no longer a redirect.
            continue;
        };
        if s == t0 {
            raw.remove(&s);
            continue;
        }

        let mut seen: HashSet<PageId> = HashSet::new();
        seen.insert(s);
        seen.insert(t0);
        let mut current = t0;

        let terminal = loop {
            match raw.get(&current).copied() {
                None => break current,
                Some(next) => {
                    if seen.contains(&next) {
                        raw.remove(&current);
                        break current;
                    }
                    seen.insert(next);
                    current = next;
                }
            }
        };

        raw.insert(s, terminal);
    }

    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_simple_chain() {
        let raw = HashMap::from([(1, 2), (2, 3)]);
        let resolved = resolve_redirects(raw);
        assert_eq!(resolved.get(&1), Some(&3));
        assert_eq!(resolved.get(&2), Some(&3));
        assert!(!resolved.contains_key(&3));
    }

    #[test]
    fn breaks_three_cycle() {
        // Spec §8 scenario 6.
        let raw = HashMap::from([(1, 2), (2, 3), (3, 1)]);
        let resolved = resolve_redirects(raw);
        assert!(resolved.len() <= 2);
        for target in resolved.values() {
            assert!(
                !resolved.contains_key(target),
                "persisted target {target} must not itself be a redirect"
            );
        }
    }

    #[test]
    fn breaks_two_cycle() {
        let raw = HashMap::from([(1, 2), (2, 1)]);
        let resolved = resolve_redirects(raw);
        for target in resolved.values() {
            assert!(!resolved.contains_key(target));
        }
    }

    #[test]
    fn drops_self_loop() {
        let raw = HashMap::from([(1, 1)]);
        let resolved = resolve_redirects(raw);
        assert!(resolved.is_empty());
    }

    #[test]
    fn no_target_is_ever_a_redirect_on_hand_built_graphs() {
        let graphs: Vec<HashMap<PageId, PageId>> = vec![
            HashMap::from([(1, 2), (2, 3), (3, 4), (4, 2)]),
            HashMap::from([(10, 11), (11, 12), (12, 13), (13, 10), (20, 11)]),
            HashMap::from([(1, 2), (3, 2), (2, 4)]),
        ];
        for raw in graphs {
            let resolved = resolve_redirects(raw);
            for target in resolved.values() {
                assert!(!resolved.contains_key(target));
            }
        }
    }
}
