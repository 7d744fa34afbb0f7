use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crossbeam::channel::bounded;

use crate::dump::{scan_dump, DumpKind, Tuple};
use crate::error::{Result, WikiwalkError};
use crate::redirect::resolve_redirects;
use crate::store::{Metadata, WriteStore};
use crate::types::PageId;

/// Build phases, in the order they run. Reported to the caller's progress
/// callback alongside a `0.0..=1.0` completion fraction within the phase;
/// purely informational, no correctness depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    IngestPages,
    IngestRedirects,
    ResolveRedirects,
    IngestPagelinks,
    Persist,
    Finalize,
}

/// Inputs for one build run: three readable dump paths plus the metadata
/// that downstream consumers need but the builder itself does not derive
/// (dump download and checksum verification are handled upstream).
pub struct BuildRequest {
    pub page_dump: PathBuf,
    pub redirect_dump: PathBuf,
    pub pagelinks_dump: PathBuf,
    pub output_dir: PathBuf,
    pub language_code: String,
    pub language_name: String,
    pub dump_date: String,
}

/// Streams all three dumps, resolves redirects, and writes a finished
/// database at `<output_dir>/<languageCode>-<dumpDate>.wikiwalkdb`, atomically.
///
/// `on_progress` is a lossy reporting channel: a dropped or slow consumer
/// never blocks the build.
pub fn build<F>(request: &BuildRequest, mut on_progress: F) -> Result<PathBuf>
where
    F: FnMut(Phase, f32),
{
    let final_path = request.output_dir.join(format!(
        "{}-{}.wikiwalkdb",
        request.language_code, request.dump_date
    ));
    let tmp_path = request.output_dir.join(format!(
        "{}-{}.wikiwalkdb.tmp",
        request.language_code, request.dump_date
    ));
    if tmp_path.exists() {
        std::fs::remove_dir_all(&tmp_path)
            .map_err(|e| WikiwalkError::BuildFailure(format!("clear stale tmp dir: {e}")))?;
    }

    match build_into(request, &tmp_path, &mut on_progress) {
        Ok(()) => {
            std::fs::rename(&tmp_path, &final_path)
                .map_err(|e| WikiwalkError::BuildFailure(format!("rename into place: {e}")))?;
            on_progress(Phase::Finalize, 1.0);
            log::info!("build complete: {}", final_path.display());
            Ok(final_path)
        }
        Err(e) => {
            log::error!("build failed, removing temporary database: {e}");
            let _ = std::fs::remove_dir_all(&tmp_path);
            Err(e)
        }
    }
}

fn build_into<F>(request: &BuildRequest, tmp_path: &Path, on_progress: &mut F) -> Result<()>
where
    F: FnMut(Phase, f32),
{
    log::info!("phase 1: ingesting pages from {}", request.page_dump.display());
    on_progress(Phase::IngestPages, 0.0);
    let (titler, max_page_id) = ingest_pages(&request.page_dump)?;
    log::info!("ingested {} pages, maxPageId={}", titler.len(), max_page_id);
    on_progress(Phase::IngestPages, 1.0);

    log::info!("phase 2: ingesting redirects from {}", request.redirect_dump.display());
    on_progress(Phase::IngestRedirects, 0.0);
    let raw_redirects = ingest_redirects(&request.redirect_dump, &titler)?;
    log::info!("ingested {} raw redirects", raw_redirects.len());
    on_progress(Phase::IngestRedirects, 1.0);

    log::info!("phase 3: resolving redirects transitively");
    on_progress(Phase::ResolveRedirects, 0.0);
    let redirects = resolve_redirects(raw_redirects);
    log::info!("resolved to {} terminal redirects", redirects.len());
    on_progress(Phase::ResolveRedirects, 1.0);

    log::info!("phase 4: ingesting pagelinks from {}", request.pagelinks_dump.display());
    on_progress(Phase::IngestPagelinks, 0.0);
    let (incoming, outgoing) =
        ingest_pagelinks(&request.pagelinks_dump, &titler, &redirects)?;
    log::info!("accumulated adjacency for {} source pages", outgoing.len());
    on_progress(Phase::IngestPagelinks, 1.0);

    log::info!("phase 5: persisting store to {}", tmp_path.display());
    on_progress(Phase::Persist, 0.0);
    let store = WriteStore::create(tmp_path)?;
    store.set_metadata(&Metadata {
        dump_date: request.dump_date.clone(),
        build_date: today_str(),
        language_code: request.language_code.clone(),
        language_name: request.language_name.clone(),
        max_page_id,
    })?;
    for (from, to) in &redirects {
        store.put_redirect(*from, *to)?;
    }
    for (title, id) in &titler {
        store.put_title(title, *id)?;
    }
    for (id, neighbors) in outgoing {
        store.put_outgoing(id, neighbors)?;
    }
    for (id, neighbors) in incoming {
        store.put_incoming(id, neighbors)?;
    }
    store.flush()?;
    on_progress(Phase::Persist, 1.0);

    Ok(())
}

fn today_str() -> String {
    chrono::Utc::now().format("%Y%m%d").to_string()
}

/// Phase 1: stream-parse the page dump into a title -> id map, tracking
/// the largest page id seen.
fn ingest_pages(path: &Path) -> Result<(HashMap<String, PageId>, PageId)> {
    let (tx, rx) = bounded::<Tuple>(4096);
    let scan_path = path.to_path_buf();
    let handle = std::thread::spawn(move || scan_dump(&scan_path, DumpKind::Page, tx));

    let mut titler = HashMap::new();
    let mut max_page_id: PageId = 0;
    for tuple in rx {
        max_page_id = max_page_id.max(tuple.id);
        titler.insert(tuple.title, tuple.id);
    }
    handle
        .join()
        .map_err(|_| WikiwalkError::BuildFailure("page scan thread panicked".into()))??;
    Ok((titler, max_page_id))
}

/// Phase 2: stream-parse the redirect dump; resolve each target title
/// against `titler`, dropping unknown titles and self-loops up front (the
/// remaining cycle-breaking work happens in [`resolve_redirects`]).
fn ingest_redirects(
    path: &Path,
    titler: &HashMap<String, PageId>,
) -> Result<HashMap<PageId, PageId>> {
    let (tx, rx) = bounded::<Tuple>(4096);
    let scan_path = path.to_path_buf();
    let handle = std::thread::spawn(move || scan_dump(&scan_path, DumpKind::Redirect, tx));

    let mut raw = HashMap::new();
    for tuple in rx {
        let Some(&to_id) = titler.get(&tuple.title) else {
            continue;
        };
        if tuple.id == to_id {
            continue;
        }
        raw.insert(tuple.id, to_id);
    }
    handle
        .join()
        .map_err(|_| WikiwalkError::BuildFailure("redirect scan thread panicked".into()))??;
    Ok(raw)
}

/// Phase 4: stream-parse the pagelinks dump, folding each endpoint through
/// `redirects` and dropping self-loops, accumulating both adjacency
/// directions entirely in memory.
fn ingest_pagelinks(
    path: &Path,
    titler: &HashMap<String, PageId>,
    redirects: &HashMap<PageId, PageId>,
) -> Result<(
    HashMap<PageId, HashSet<PageId>>,
    HashMap<PageId, HashSet<PageId>>,
)> {
    let (tx, rx) = bounded::<Tuple>(4096);
    let scan_path = path.to_path_buf();
    let handle = std::thread::spawn(move || scan_dump(&scan_path, DumpKind::Pagelinks, tx));

    let mut incoming: HashMap<PageId, HashSet<PageId>> = HashMap::new();
    let mut outgoing: HashMap<PageId, HashSet<PageId>> = HashMap::new();
    for tuple in rx {
        let Some(&target_title_id) = titler.get(&tuple.title) else {
            continue;
        };
        let s = redirects.get(&tuple.id).copied().unwrap_or(tuple.id);
        let t = redirects
            .get(&target_title_id)
            .copied()
            .unwrap_or(target_title_id);
        if s == t {
            continue;
        }
        outgoing.entry(s).or_default().insert(t);
        incoming.entry(t).or_default().insert(s);
    }
    handle
        .join()
        .map_err(|_| WikiwalkError::BuildFailure("pagelinks scan thread panicked".into()))??;
    Ok((incoming, outgoing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gz_insert(lines: &str) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(format!("INSERT INTO x VALUES {lines};\n").as_bytes())
            .unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn full_pipeline_produces_a_queryable_store() {
        let dir = tempfile::tempdir().unwrap();
        let page_dump = dir.path().join("page.sql.gz");
        let redirect_dump = dir.path().join("redirect.sql.gz");
        let pagelinks_dump = dir.path().join("pagelinks.sql.gz");
        let output_dir = dir.path().join("out");
        std::fs::create_dir_all(&output_dir).unwrap();

        std::fs::write(
            &page_dump,
            gz_insert(
                "(1,0,'A','',0,0,0.1,'x','x',0,0,'wikitext',NULL),\
                 (2,0,'B','',0,0,0.1,'x','x',0,0,'wikitext',NULL),\
                 (3,0,'C','',0,0,0.1,'x','x',0,0,'wikitext',NULL)",
            ),
        )
        .unwrap();
        std::fs::write(&redirect_dump, gz_insert("(1,0,'B','',0)")).unwrap();
        std::fs::write(&pagelinks_dump, gz_insert("(2,0,'C',0)")).unwrap();

        let request = BuildRequest {
            page_dump,
            redirect_dump,
            pagelinks_dump,
            output_dir,
            language_code: "en".into(),
            language_name: "English".into(),
            dump_date: "20240101".into(),
        };

        let mut phases_seen = Vec::new();
        let db_path = build(&request, |phase, frac| {
            if frac == 0.0 {
                phases_seen.push(phase);
            }
        })
        .unwrap();

        assert!(phases_seen.contains(&Phase::IngestPages));
        assert!(!db_path.to_string_lossy().ends_with(".tmp"));

        let store = crate::store::Store::open(&db_path).unwrap();
        assert_eq!(store.redirect(1), Some(2));
        assert_eq!(store.outgoing(2).unwrap(), vec![3]);
        assert_eq!(store.incoming(3).unwrap(), vec![2]);
    }
}
