use std::path::Path;
use std::time::Instant;

pub mod bfs;
pub mod builder;
pub mod cache;
pub mod cancel;
pub mod dump;
pub mod error;
pub mod paths;
pub mod redirect;
pub mod store;
pub mod types;

pub use bfs::SearchOutcome;
pub use cache::ResultCache;
pub use cancel::{CancelGuard, CancellationToken};
pub use error::{Result, WikiwalkError};
pub use store::Store;
pub use types::{Graph, PageId};

/// One opened language database plus its result cache: the unit the HTTP
/// surface multiplexes over when serving `shortest_paths` for many
/// languages out of one process.
pub struct Database {
    store: Store,
    cache: ResultCache,
}

impl Database {
    pub fn open(path: &Path, cache_max_bytes: usize) -> Result<Database> {
        let store = Store::open(path)?;
        Ok(Database {
            store,
            cache: ResultCache::new(cache_max_bytes),
        })
    }

    pub fn language_code(&self) -> &str {
        &self.store.metadata().language_code
    }

    pub fn max_page_id(&self) -> PageId {
        self.store.metadata().max_page_id
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Answers one `(source, target)` query, consulting the cache first
    /// and populating it afterward only if the uncached search took long
    /// enough to be worth keeping (see [`cache::POPULATE_THRESHOLD`]).
    pub fn shortest_paths(
        &self,
        source: PageId,
        target: PageId,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        let language_code = self.language_code().to_string();
        if let Some(cached) = self.cache.get(&language_code, source, target) {
            let graph: Graph = serde_json::from_slice(&cached)
                .map_err(|e| WikiwalkError::corruption(format!("cached payload: {e}")))?;
            return Ok(SearchOutcome::Completed(graph));
        }

        let start = Instant::now();
        let outcome = bfs::search(&self.store, &language_code, source, target, cancel)?;
        let elapsed = start.elapsed();

        if let SearchOutcome::Completed(ref graph) = outcome {
            if ResultCache::should_populate(elapsed) {
                match serde_json::to_vec(graph) {
                    Ok(payload) => self.cache.put(&language_code, source, target, payload),
                    Err(e) => log::warn!("failed to serialize graph for caching: {e}"),
                }
            }
        }

        Ok(outcome)
    }
}
