use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use crossbeam::channel::{bounded, Receiver, Sender};
use flate2::read::GzDecoder;
use regex::bytes::Regex;

use crate::error::{Result, WikiwalkError};
use crate::types::{normalize_title, PageId};

/// Bytes read from the decompressed stream per refill, before the trailing
/// overlap from the previous chunk is prepended.
const WINDOW: usize = 8 * 1024 * 1024;

/// One parsed `(id, title)` tuple, shared by the page, redirect, and
/// pagelinks dumps alike — each dump's regex just picks different columns
/// out of the same row shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub id: PageId,
    pub title: String,
}

/// Which MediaWiki table a dump file holds; determines the tuple regex and
/// the required overlap (the longest row the dump can contain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    Page,
    Redirect,
    Pagelinks,
}

impl DumpKind {
    fn overlap(self) -> usize {
        match self {
            DumpKind::Page => 2048,
            DumpKind::Redirect => 1536,
            DumpKind::Pagelinks => 1024,
        }
    }

    fn regex(self) -> &'static Regex {
        match self {
            DumpKind::Page => &PAGE_RE,
            DumpKind::Redirect => &REDIRECT_RE,
            DumpKind::Pagelinks => &PAGELINKS_RE,
        }
    }
}

/// `(id,0,'title','',...,'wikitext',NULL)` — namespace 0, wikitext content
/// model, trailing NULL distinguishing a non-redirect page row.
static PAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((\d{1,10}),0,'((?:[^'\\]|\\.)*)','(?:[^'\\]|\\.)*',[^)]*?'wikitext',NULL\)")
        .expect("page tuple regex compiles")
});

/// `(from_id,0,'title',...)` — namespace 0 redirect source.
static REDIRECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((\d{1,10}),0,'((?:[^'\\]|\\.)*)'")
        .expect("redirect tuple regex compiles")
});

/// `(from_id,0,'title',0)` — namespace 0 source, namespace 0 target
/// (trailing `0` asserts the target's namespace).
static PAGELINKS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((\d{1,10}),0,'((?:[^'\\]|\\.)*)',0\)")
        .expect("pagelinks tuple regex compiles")
});

/// Streams one gzip-compressed SQL dump through a rolling window, dispatches
/// each window to a worker pool for regex scanning, and sends parsed tuples
/// to `tx`. Title normalization happens here, once, so every consumer of
/// this channel already sees canonical titles.
///
/// Ordering across tuples is not guaranteed and callers must not depend on
/// it; only that every tuple appears exactly once.
pub fn scan_dump(path: &Path, kind: DumpKind, tx: Sender<Tuple>) -> Result<()> {
    let file = File::open(path)
        .map_err(|e| WikiwalkError::BuildFailure(format!("open {}: {e}", path.display())))?;
    let mut decoder = GzDecoder::new(file);

    let overlap = kind.overlap();
    // Each chunk carries its skip-prefix length alongside the bytes: the
    // leading `skip` bytes are the previous chunk's tail, re-sent only so a
    // tuple split across the boundary still matches whole here. Any match
    // starting inside that prefix was already found (and fully contained)
    // in the previous chunk, so `scan_chunk` must not re-emit it.
    let (chunk_tx, chunk_rx): (Sender<(Vec<u8>, usize)>, Receiver<(Vec<u8>, usize)>) =
        bounded(64);

    let worker_count = num_cpus::get().max(1);
    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let chunk_rx = chunk_rx.clone();
        let tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            for (chunk, skip) in chunk_rx {
                scan_chunk(&chunk, skip, kind.regex(), &tx);
            }
        }));
    }
    drop(tx);

    let mut buf = vec![0u8; overlap + WINDOW];
    let mut carry = 0usize;
    loop {
        let read = read_fill(&mut decoder, &mut buf[carry..])
            .map_err(|e| WikiwalkError::BuildFailure(format!("read {}: {e}", path.display())))?;
        if read == 0 {
            if carry > 0 {
                let last = buf[..carry].to_vec();
                chunk_tx
                    .send((last, carry))
                    .map_err(|_| WikiwalkError::BuildFailure("chunk worker pool gone".into()))?;
            }
            break;
        }
        let filled = carry + read;
        chunk_tx
            .send((buf[..filled].to_vec(), carry))
            .map_err(|_| WikiwalkError::BuildFailure("chunk worker pool gone".into()))?;

        // Preserve the trailing `overlap` bytes so a tuple split across the
        // chunk boundary still matches whole in the next window.
        carry = overlap.min(filled);
        let tail_start = filled - carry;
        buf.copy_within(tail_start..filled, 0);
    }
    drop(chunk_tx);

    for worker in workers {
        worker
            .join()
            .map_err(|_| WikiwalkError::BuildFailure("dump worker panicked".into()))?;
    }
    Ok(())
}

fn read_fill(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn scan_chunk(chunk: &[u8], skip: usize, re: &Regex, tx: &Sender<Tuple>) {
    for caps in re.captures_iter(chunk) {
        let whole = caps.get(0).expect("group 0 always present on match");
        // A match fully contained in the carried prefix (end <= skip) was
        // already emitted by the previous chunk. A match starting inside
        // the prefix but ending past it straddles the boundary and is only
        // complete here, so it must still be kept.
        if whole.end() <= skip {
            continue;
        }
        let id_bytes = caps.get(1).expect("group 1 always present on match").as_bytes();
        let id_str = match std::str::from_utf8(id_bytes) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let id: PageId = match id_str.parse() {
            Ok(id) => id,
            Err(_) => continue,
        };
        let title_bytes = caps.get(2).expect("group 2 always present on match").as_bytes();
        let title_raw = match std::str::from_utf8(title_bytes) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let title = normalize_title(title_raw);
        if title.is_empty() || title.len() > 255 {
            continue;
        }
        let _ = tx.send(Tuple { id, title });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gz_bytes(plain: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(plain).unwrap();
        enc.finish().unwrap()
    }

    fn collect(path: &Path, kind: DumpKind) -> Vec<Tuple> {
        let (tx, rx) = bounded(1024);
        scan_dump(path, kind, tx).unwrap();
        rx.iter().collect()
    }

    #[test]
    fn parses_page_tuples_and_skips_non_wikitext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.sql.gz");
        let sql = b"INSERT INTO `page` VALUES (1,0,'Rust','',0,0,0.1,'20240101000000','20240101000000',0,0,'wikitext',NULL),(2,1,'Talk','',0,0,0.1,'20240101000000','20240101000000',0,0,'wikitext',NULL),(3,0,'Dog','',0,0,0.1,'20240101000000','20240101000000',0,0,'css',NULL);\n";
        std::fs::write(&path, gz_bytes(sql)).unwrap();
        let tuples = collect(&path, DumpKind::Page);
        assert_eq!(tuples, vec![Tuple { id: 1, title: "Rust".into() }]);
    }

    #[test]
    fn normalizes_escaped_quotes_and_underscores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redirect.sql.gz");
        let sql = b"INSERT INTO `redirect` VALUES (5,0,'Bob\\'s_Burgers','',0);\n";
        std::fs::write(&path, gz_bytes(sql)).unwrap();
        let tuples = collect(&path, DumpKind::Redirect);
        assert_eq!(tuples, vec![Tuple { id: 5, title: "Bob's Burgers".into() }]);
    }

    #[test]
    fn pagelinks_requires_target_namespace_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagelinks.sql.gz");
        let sql = b"INSERT INTO `pagelinks` VALUES (10,0,'Foo',0),(11,0,'Bar',1);\n";
        std::fs::write(&path, gz_bytes(sql)).unwrap();
        let tuples = collect(&path, DumpKind::Pagelinks);
        assert_eq!(tuples, vec![Tuple { id: 10, title: "Foo".into() }]);
    }

    #[test]
    fn tuple_split_across_window_boundary_still_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redirect.sql.gz");
        // Pad well past one WINDOW so the real tuple lands across a refill.
        let mut sql = Vec::new();
        sql.extend_from_slice(b"INSERT INTO `redirect` VALUES ");
        for i in 0..400_000 {
            sql.extend_from_slice(format!("({},0,'Filler{}','',0),", 1_000_000 + i, i).as_bytes());
        }
        sql.extend_from_slice(b"(42,0,'Needle','',0);\n");
        std::fs::write(&path, gz_bytes(&sql)).unwrap();
        let tuples = collect(&path, DumpKind::Redirect);
        assert!(tuples.iter().any(|t| t.id == 42 && t.title == "Needle"));

        // Every filler tuple lands in the overlap region of some chunk
        // boundary at least once; none should be double-counted.
        let mut ids: Vec<PageId> = tuples.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before, "a tuple was emitted more than once");
    }

    #[test]
    fn tuple_straddling_the_exact_chunk_boundary_is_emitted_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redirect.sql.gz");

        let header = b"INSERT INTO `redirect` VALUES ".to_vec();
        let needle = "(42,0,'Needle','',0)";
        // First chunk spans exactly [0, overlap + WINDOW) of the
        // decompressed stream; place the needle so it starts a few bytes
        // before that boundary and ends a few bytes after it, guaranteeing
        // no single chunk ever contains it whole.
        let first_fill = DumpKind::Redirect.overlap() + WINDOW;
        let straddle_at = first_fill - 10;
        let filler_len = straddle_at - header.len();

        let mut sql = header;
        sql.extend(std::iter::repeat(b'-').take(filler_len));
        sql.extend_from_slice(needle.as_bytes());
        sql.extend_from_slice(b";\n");
        assert!(sql.len() > first_fill, "needle must land after the boundary");

        std::fs::write(&path, gz_bytes(&sql)).unwrap();
        let tuples = collect(&path, DumpKind::Redirect);
        let matches: Vec<&Tuple> = tuples.iter().filter(|t| t.id == 42).collect();
        assert_eq!(matches.len(), 1, "straddling tuple must be emitted exactly once");
        assert_eq!(matches[0].title, "Needle");
    }
}
