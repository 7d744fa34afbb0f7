use std::collections::HashSet;
use std::path::Path;

use crate::error::{Result, WikiwalkError};
use crate::types::PageId;

const TREE_METADATA: &str = "metadata";
const TREE_REDIRECTS: &str = "redirects";
const TREE_INCOMING: &str = "incoming";
const TREE_OUTGOING: &str = "outgoing";
const TREE_TITLES: &str = "titles";
const TREE_TITLES_BY_ID: &str = "titles_by_id";

pub const KEY_DUMP_DATE: &str = "dumpDate";
pub const KEY_BUILD_DATE: &str = "buildDate";
pub const KEY_LANGUAGE_CODE: &str = "languageCode";
pub const KEY_LANGUAGE_NAME: &str = "languageName";
pub const KEY_MAX_PAGE_ID: &str = "maxPageId";

/// Packs a set of page ids into the on-disk adjacency blob format: 4-byte
/// little-endian ids, concatenated, no framing, duplicate-free. Dedup also
/// sorts, which is what gives reads of the same key a stable order.
pub fn encode_adjacency(mut ids: Vec<PageId>) -> Vec<u8> {
    ids.sort_unstable();
    ids.dedup();
    let mut buf = Vec::with_capacity(ids.len() * 4);
    for id in ids {
        buf.extend_from_slice(&id.to_le_bytes());
    }
    buf
}

/// Unpacks an adjacency blob. A length that isn't a multiple of 4 means the
/// store is corrupt; per spec this is the one adjacency-read failure mode
/// that must NOT be silently swallowed into an empty list.
pub fn decode_adjacency(bytes: &[u8]) -> Result<Vec<PageId>> {
    if bytes.len() % 4 != 0 {
        return Err(WikiwalkError::corruption(format!(
            "adjacency blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

fn page_key(id: PageId) -> [u8; 4] {
    id.to_be_bytes()
}

/// Immutable metadata snapshot, read once at open time.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub dump_date: String,
    pub build_date: String,
    pub language_code: String,
    pub language_name: String,
    pub max_page_id: PageId,
}

fn required_string(tree: &sled::Tree, key: &str) -> Result<String> {
    let bytes = tree
        .get(key)
        .map_err(|e| WikiwalkError::Transient(e.to_string()))?
        .ok_or_else(|| WikiwalkError::corruption(format!("missing metadata key {key}")))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| WikiwalkError::corruption(format!("metadata key {key} is not utf-8: {e}")))
}

impl Metadata {
    fn load(tree: &sled::Tree) -> Result<Metadata> {
        let max_page_id_str = required_string(tree, KEY_MAX_PAGE_ID)?;
        let max_page_id = max_page_id_str.parse::<PageId>().map_err(|e| {
            WikiwalkError::corruption(format!("maxPageId {max_page_id_str:?} not decimal: {e}"))
        })?;
        Ok(Metadata {
            dump_date: required_string(tree, KEY_DUMP_DATE)?,
            build_date: required_string(tree, KEY_BUILD_DATE)?,
            language_code: required_string(tree, KEY_LANGUAGE_CODE)?,
            language_name: required_string(tree, KEY_LANGUAGE_NAME)?,
            max_page_id,
        })
    }
}

/// A read-only-opened database, safe to share across search workers: sled's
/// `Db` is `Clone + Send + Sync` and multiplexes readers over one
/// consistent view of the tree files.
pub struct Store {
    db: sled::Db,
    metadata: Metadata,
    redirects: sled::Tree,
    incoming: sled::Tree,
    outgoing: sled::Tree,
    titles: sled::Tree,
    titles_by_id: sled::Tree,
}

impl Store {
    pub fn open(path: &Path) -> Result<Store> {
        let db = sled::open(path).map_err(|e| WikiwalkError::Transient(e.to_string()))?;
        let metadata_tree = db
            .open_tree(TREE_METADATA)
            .map_err(|e| WikiwalkError::Transient(e.to_string()))?;
        let metadata = Metadata::load(&metadata_tree)?;
        let redirects = db
            .open_tree(TREE_REDIRECTS)
            .map_err(|e| WikiwalkError::Transient(e.to_string()))?;
        let incoming = db
            .open_tree(TREE_INCOMING)
            .map_err(|e| WikiwalkError::Transient(e.to_string()))?;
        let outgoing = db
            .open_tree(TREE_OUTGOING)
            .map_err(|e| WikiwalkError::Transient(e.to_string()))?;
        let titles = db
            .open_tree(TREE_TITLES)
            .map_err(|e| WikiwalkError::Transient(e.to_string()))?;
        let titles_by_id = db
            .open_tree(TREE_TITLES_BY_ID)
            .map_err(|e| WikiwalkError::Transient(e.to_string()))?;
        Ok(Store {
            db,
            metadata,
            redirects,
            incoming,
            outgoing,
            titles,
            titles_by_id,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Terminal redirect target for `id`, or `None` if `id` is not a
    /// redirect (including if `id` is unknown).
    pub fn redirect(&self, id: PageId) -> Option<PageId> {
        match self.redirects.get(page_key(id)) {
            Ok(Some(bytes)) if bytes.len() == 4 => {
                Some(u32::from_be_bytes(bytes.as_ref().try_into().unwrap()))
            }
            Ok(_) => None,
            Err(e) => {
                log::error!("transient store read failure resolving redirect {id}: {e}");
                None
            }
        }
    }

    pub fn incoming(&self, id: PageId) -> Result<Vec<PageId>> {
        Self::read_adjacency(&self.incoming, id)
    }

    pub fn outgoing(&self, id: PageId) -> Result<Vec<PageId>> {
        Self::read_adjacency(&self.outgoing, id)
    }

    fn read_adjacency(tree: &sled::Tree, id: PageId) -> Result<Vec<PageId>> {
        match tree.get(page_key(id)) {
            Ok(Some(bytes)) => decode_adjacency(&bytes),
            Ok(None) => Ok(Vec::new()),
            Err(e) => {
                // Can't distinguish "no such row" from "row read failed"
                // cheaply; the conservative choice is an empty adjacency.
                log::error!("transient store read failure fetching page {id}: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Looks up a normalized title's page id, for the `/random` endpoint and
    /// for resolving human-entered titles at the HTTP boundary.
    pub fn title_to_id(&self, normalized_title: &str) -> Option<PageId> {
        match self.titles.get(normalized_title) {
            Ok(Some(bytes)) if bytes.len() == 4 => {
                Some(u32::from_be_bytes(bytes.as_ref().try_into().unwrap()))
            }
            Ok(_) => None,
            Err(e) => {
                log::error!("transient store read failure resolving title: {e}");
                None
            }
        }
    }

    /// Looks up the title for a page id, for the `/random` endpoint.
    pub fn title_for_id(&self, id: PageId) -> Option<String> {
        match self.titles_by_id.get(page_key(id)) {
            Ok(Some(bytes)) => String::from_utf8(bytes.to_vec()).ok(),
            Ok(None) => None,
            Err(e) => {
                log::error!("transient store read failure resolving title for {id}: {e}");
                None
            }
        }
    }

    pub fn size_on_disk(&self) -> Result<u64> {
        self.db
            .size_on_disk()
            .map_err(|e| WikiwalkError::Transient(e.to_string()))
    }
}

/// The builder's write side: same logical trees, opened against a private
/// temp-path database that the caller renames into place only on success
/// (spec Invariant 5 — readers never observe a partial build).
pub struct WriteStore {
    db: sled::Db,
    redirects: sled::Tree,
    incoming: sled::Tree,
    outgoing: sled::Tree,
    titles: sled::Tree,
    titles_by_id: sled::Tree,
    metadata: sled::Tree,
}

impl WriteStore {
    pub fn create(path: &Path) -> Result<WriteStore> {
        let db = sled::Config::new()
            .path(path)
            .open()
            .map_err(|e| WikiwalkError::BuildFailure(e.to_string()))?;
        let open = |name: &str| -> Result<sled::Tree> {
            db.open_tree(name)
                .map_err(|e| WikiwalkError::BuildFailure(e.to_string()))
        };
        Ok(WriteStore {
            redirects: open(TREE_REDIRECTS)?,
            incoming: open(TREE_INCOMING)?,
            outgoing: open(TREE_OUTGOING)?,
            titles: open(TREE_TITLES)?,
            titles_by_id: open(TREE_TITLES_BY_ID)?,
            metadata: open(TREE_METADATA)?,
            db,
        })
    }

    pub fn set_metadata(&self, metadata: &Metadata) -> Result<()> {
        let set = |key: &str, value: &str| -> Result<()> {
            self.metadata
                .insert(key, value.as_bytes())
                .map_err(|e| WikiwalkError::BuildFailure(e.to_string()))?;
            Ok(())
        };
        set(KEY_DUMP_DATE, &metadata.dump_date)?;
        set(KEY_BUILD_DATE, &metadata.build_date)?;
        set(KEY_LANGUAGE_CODE, &metadata.language_code)?;
        set(KEY_LANGUAGE_NAME, &metadata.language_name)?;
        set(KEY_MAX_PAGE_ID, &metadata.max_page_id.to_string())?;
        Ok(())
    }

    pub fn put_redirect(&self, from: PageId, to: PageId) -> Result<()> {
        self.redirects
            .insert(page_key(from), &page_key(to))
            .map_err(|e| WikiwalkError::BuildFailure(e.to_string()))?;
        Ok(())
    }

    pub fn put_title(&self, normalized_title: &str, id: PageId) -> Result<()> {
        self.titles
            .insert(normalized_title, &page_key(id))
            .map_err(|e| WikiwalkError::BuildFailure(e.to_string()))?;
        self.titles_by_id
            .insert(page_key(id), normalized_title.as_bytes())
            .map_err(|e| WikiwalkError::BuildFailure(e.to_string()))?;
        Ok(())
    }

    pub fn put_incoming(&self, id: PageId, neighbors: HashSet<PageId>) -> Result<()> {
        self.incoming
            .insert(page_key(id), encode_adjacency(neighbors.into_iter().collect()))
            .map_err(|e| WikiwalkError::BuildFailure(e.to_string()))?;
        Ok(())
    }

    pub fn put_outgoing(&self, id: PageId, neighbors: HashSet<PageId>) -> Result<()> {
        self.outgoing
            .insert(page_key(id), encode_adjacency(neighbors.into_iter().collect()))
            .map_err(|e| WikiwalkError::BuildFailure(e.to_string()))?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| WikiwalkError::BuildFailure(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet as Set;

    #[test]
    fn adjacency_round_trip_is_set_equal_to_input() {
        let xs = vec![5u32, 2, 2, 9, 1, 5];
        let expected: Set<u32> = xs.iter().copied().collect();
        let encoded = encode_adjacency(xs);
        let decoded = decode_adjacency(&encoded).unwrap();
        let got: Set<u32> = decoded.into_iter().collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn decode_rejects_non_multiple_of_four() {
        let bytes = [0u8, 1, 2];
        assert!(matches!(
            decode_adjacency(&bytes),
            Err(WikiwalkError::Corruption(_))
        ));
    }

    #[test]
    fn write_then_read_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let store = WriteStore::create(&path).unwrap();
            store
                .set_metadata(&Metadata {
                    dump_date: "20240101".into(),
                    build_date: "20240102".into(),
                    language_code: "en".into(),
                    language_name: "English".into(),
                    max_page_id: 10,
                })
                .unwrap();
            store.put_redirect(1, 2).unwrap();
            store.put_outgoing(2, Set::from([3, 4])).unwrap();
            store.put_incoming(3, Set::from([2])).unwrap();
            store.put_title("Foo", 2).unwrap();
            store.flush().unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.metadata().language_code, "en");
        assert_eq!(store.metadata().max_page_id, 10);
        assert_eq!(store.redirect(1), Some(2));
        assert_eq!(store.redirect(2), None);
        let mut outgoing = store.outgoing(2).unwrap();
        outgoing.sort_unstable();
        assert_eq!(outgoing, vec![3, 4]);
        assert_eq!(store.incoming(3).unwrap(), vec![2]);
        assert_eq!(store.incoming(999).unwrap(), Vec::<u32>::new());
        assert_eq!(store.title_to_id("Foo"), Some(2));
        assert_eq!(store.title_for_id(2), Some("Foo".to_string()));
        assert_eq!(store.title_for_id(999), None);
    }
}
