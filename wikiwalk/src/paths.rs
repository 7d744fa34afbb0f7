use std::path::{Path, PathBuf};

/// Filename extension for a persisted database directory (see
/// [`crate::store`]).
pub const DB_EXTENSION: &str = "wikiwalkdb";

/// Layout of a databases directory: one entry per `<languageCode>-<dumpDate>`
/// build, discovered by listing the directory rather than tracked in a
/// side index.
#[derive(Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Paths { base: base.into() }
    }

    pub fn database_path(&self, language_code: &str, dump_date: &str) -> PathBuf {
        self.base
            .join(format!("{language_code}-{dump_date}.{DB_EXTENSION}"))
    }

    /// Lists `(languageCode, dumpDate)` pairs for every complete (non-`.tmp`)
    /// database under this directory.
    pub fn list_databases(&self) -> std::io::Result<Vec<(String, String)>> {
        let mut found = Vec::new();
        let entries = match std::fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(stem) = name.strip_suffix(&format!(".{DB_EXTENSION}")) else {
                continue;
            };
            let Some((language_code, dump_date)) = stem.rsplit_once('-') else {
                continue;
            };
            found.push((language_code.to_string(), dump_date.to_string()));
        }
        found.sort();
        Ok(found)
    }
}

/// Naming convention for one language edition's three raw dump files under
/// a dumps directory, mirroring the MediaWiki mirror layout:
/// `<wikiCode>wiki-<date>-<table>.sql.gz`.
#[derive(Clone)]
pub struct DumpPaths {
    pub base: PathBuf,
    pub wiki_code: String,
    pub date: String,
}

impl DumpPaths {
    pub fn new(base: impl Into<PathBuf>, wiki_code: &str, date: &str) -> Self {
        DumpPaths {
            base: base.into(),
            wiki_code: wiki_code.to_owned(),
            date: date.to_owned(),
        }
    }

    fn dump_path(&self, table: &str) -> PathBuf {
        let basename = format!(
            "{wiki}wiki-{date}-{table}.sql.gz",
            wiki = self.wiki_code,
            date = self.date
        );
        self.base.join(basename)
    }

    pub fn page(&self) -> PathBuf {
        self.dump_path("page")
    }

    pub fn redirect(&self) -> PathBuf {
        self.dump_path("redirect")
    }

    pub fn pagelinks(&self) -> PathBuf {
        self.dump_path("pagelinks")
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("wikiwalk")
}

pub fn ensure_exists(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}
