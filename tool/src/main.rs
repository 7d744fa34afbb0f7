use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wikiwalk::builder::{build, BuildRequest, Phase};
use wikiwalk::paths::{ensure_exists, DumpPaths};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a database from a set of downloaded dump files.
    Build {
        /// Directory containing the `<wikiCode>wiki-<date>-{page,redirect,pagelinks}.sql.gz` files.
        #[clap(long)]
        dumps_dir: PathBuf,

        /// Directory the finished `<languageCode>-<dumpDate>.wikiwalkdb` is written into.
        #[clap(long)]
        output_dir: PathBuf,

        /// Accepted for compatibility with the dump-fetching tooling that
        /// runs upstream of this command; unused here, since downloading
        /// and checksum verification are out of scope for the builder.
        #[clap(long)]
        mirror_url: Option<String>,

        /// Wiki code as it appears in dump filenames, e.g. `en`.
        #[clap(long)]
        language_code: String,

        /// Human-readable language name stored in the database metadata.
        #[clap(long)]
        language_name: String,

        /// Dump date as it appears in dump filenames, e.g. `20240101`.
        #[clap(long)]
        dump_date: String,

        /// Accepted for compatibility with callers that size worker pools
        /// off of available memory; the builder sizes its own pools off
        /// CPU count and does not currently act on this hint.
        #[clap(long)]
        memory_hint_mb: Option<u64>,
    },
}

fn main() {
    stderrlog::new()
        .module(module_path!())
        .quiet(false)
        .verbosity(4)
        .timestamp(stderrlog::Timestamp::Second)
        .init()
        .unwrap();

    let cli = Cli::parse();

    match cli.command {
        Command::Build {
            dumps_dir,
            output_dir,
            mirror_url: _,
            language_code,
            language_name,
            dump_date,
            memory_hint_mb: _,
        } => {
            log::info!("building {language_code}-{dump_date} from {}", dumps_dir.display());
            ensure_exists(&output_dir).expect("create output directory");

            let dump_paths = DumpPaths::new(&dumps_dir, &language_code, &dump_date);
            let request = BuildRequest {
                page_dump: dump_paths.page(),
                redirect_dump: dump_paths.redirect(),
                pagelinks_dump: dump_paths.pagelinks(),
                output_dir,
                language_code,
                language_name,
                dump_date,
            };

            let result = build(&request, |phase, frac| {
                log::info!("{}", phase_progress(phase, frac));
            });

            match result {
                Ok(path) => {
                    log::info!("build succeeded: {}", path.display());
                }
                Err(e) => {
                    log::error!("build failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

fn phase_progress(phase: Phase, frac: f32) -> String {
    let name = match phase {
        Phase::IngestPages => "ingest pages",
        Phase::IngestRedirects => "ingest redirects",
        Phase::ResolveRedirects => "resolve redirects",
        Phase::IngestPagelinks => "ingest pagelinks",
        Phase::Persist => "persist",
        Phase::Finalize => "finalize",
    };
    format!("{name}: {:.0}%", frac * 100.0)
}
