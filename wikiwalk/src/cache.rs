use std::sync::Mutex;
use std::time::Duration;

use lrumap::LruBTreeMap;

use crate::types::PageId;

/// Below this wall-clock duration, a freshly computed result isn't worth
/// the cache slot: repeating the search is cheaper than the bookkeeping.
pub const POPULATE_THRESHOLD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct CacheKey {
    language_code: String,
    source: PageId,
    target: PageId,
}

struct Inner {
    map: LruBTreeMap<CacheKey, Vec<u8>>,
    current_bytes: usize,
}

/// A byte-budgeted LRU over serialized `Graph` payloads. One mutex guards
/// both the ordering structure and the running byte total, which keeps
/// the "currentBytes == sum of entry lengths" invariant trivially true.
pub struct ResultCache {
    max_bytes: usize,
    inner: Mutex<Inner>,
}

impl ResultCache {
    pub fn new(max_bytes: usize) -> ResultCache {
        ResultCache {
            max_bytes,
            inner: Mutex::new(Inner {
                map: LruBTreeMap::new(usize::MAX),
                current_bytes: 0,
            }),
        }
    }

    pub fn get(&self, language_code: &str, source: PageId, target: PageId) -> Option<Vec<u8>> {
        let key = CacheKey {
            language_code: language_code.to_string(),
            source,
            target,
        };
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.map.get(&key).cloned()
    }

    /// Inserts `payload` unless the key is already present (duplicate
    /// insert is a no-op per spec), then evicts from the LRU end until
    /// back under `max_bytes`.
    pub fn put(&self, language_code: &str, source: PageId, target: PageId, payload: Vec<u8>) {
        let key = CacheKey {
            language_code: language_code.to_string(),
            source,
            target,
        };
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        if inner.map.get(&key).is_some() {
            return;
        }
        let added = payload.len();
        inner.map.insert(key, payload);
        inner.current_bytes += added;

        while inner.current_bytes > self.max_bytes {
            match inner.map.pop_lru() {
                Some((_, evicted)) => inner.current_bytes -= evicted.len(),
                None => break,
            }
        }
    }

    /// Whether a search that took `elapsed` is worth caching.
    pub fn should_populate(elapsed: Duration) -> bool {
        elapsed >= POPULATE_THRESHOLD
    }

    #[cfg(test)]
    fn current_bytes(&self) -> usize {
        self.inner.lock().unwrap().current_bytes
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }
}
