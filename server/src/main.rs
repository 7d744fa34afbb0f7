use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use fern::colors::{Color, ColoredLevelConfig};
use rand::Rng;
use serde::{Deserialize, Serialize};

use wikiwalk::paths::Paths;
use wikiwalk::{CancellationToken, Database, PageId, SearchOutcome, WikiwalkError};

/// One opened language database plus the metadata the `/api/list_databases`
/// response needs, which the `Database` handle itself doesn't carry.
struct LanguageEntry {
    database: Database,
    dump_date: String,
}

type Databases = HashMap<String, LanguageEntry>;

#[derive(Serialize)]
struct DatabaseListEntry {
    #[serde(rename = "languageCode")]
    language_code: String,
    #[serde(rename = "dumpDate")]
    dump_date: String,
}

#[get("/api/list_databases")]
async fn list_databases(databases: web::Data<Databases>) -> impl Responder {
    let mut entries: Vec<DatabaseListEntry> = databases
        .iter()
        .map(|(language_code, entry)| DatabaseListEntry {
            language_code: language_code.clone(),
            dump_date: entry.dump_date.clone(),
        })
        .collect();
    entries.sort_by(|a, b| a.language_code.cmp(&b.language_code));
    web::Json(entries)
}

#[derive(Deserialize)]
struct ShortestPathsQuery {
    #[serde(rename = "language-code")]
    language_code: String,
    source: String,
    target: String,
}

#[get("/api/shortest_paths")]
async fn shortest_paths(
    query: web::Query<ShortestPathsQuery>,
    databases: web::Data<Databases>,
) -> actix_web::Result<HttpResponse> {
    let entry = match databases.get(&query.language_code) {
        Some(entry) => entry,
        None => {
            return Ok(error_response(&WikiwalkError::not_found(format!(
                "no database for language {}",
                query.language_code
            ))))
        }
    };

    let source: PageId = match query.source.parse() {
        Ok(id) => id,
        Err(_) => {
            return Ok(error_response(&WikiwalkError::bad_request(
                "source is not a valid page id",
            )))
        }
    };
    let target: PageId = match query.target.parse() {
        Ok(id) => id,
        Err(_) => {
            return Ok(error_response(&WikiwalkError::bad_request(
                "target is not a valid page id",
            )))
        }
    };
    let max_page_id = entry.database.max_page_id();
    if source > max_page_id || target > max_page_id {
        return Ok(error_response(&WikiwalkError::bad_request(format!(
            "source/target must be <= {max_page_id}"
        ))));
    }

    log::info!(
        "shortest_paths language={} source={source} target={target}",
        query.language_code
    );

    let cancel = CancellationToken::new();
    // Held for the rest of this handler's future. If the client disconnects,
    // actix drops this future at the `web::block` await point below, which
    // drops `guard` and flips `cancel` so the blocking search notices and
    // gives up instead of running to completion unobserved.
    let mut guard = wikiwalk::CancelGuard::new(cancel.clone());

    let search_databases = databases.clone();
    let language_code = query.language_code.clone();
    let search_cancel = cancel.clone();
    let search_result = web::block(move || {
        let entry = search_databases
            .get(&language_code)
            .expect("language presence already validated above");
        entry.database.shortest_paths(source, target, &search_cancel)
    })
    .await;

    let outcome = match search_result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            log::error!("search failed: {e}");
            return Ok(error_response(&e));
        }
        Err(e) => {
            log::error!("search thread pool error: {e}");
            return Ok(error_response(&WikiwalkError::Transient(e.to_string())));
        }
    };
    guard.disarm();

    match outcome {
        SearchOutcome::Completed(graph) => Ok(HttpResponse::Ok().json(graph)),
        SearchOutcome::Cancelled => Ok(error_response(&WikiwalkError::Cancelled)),
    }
}

#[derive(Deserialize)]
struct RandomQuery {
    #[serde(rename = "language-code")]
    language_code: Option<String>,
}

#[derive(Serialize)]
struct RandomPage {
    #[serde(rename = "pageId")]
    page_id: PageId,
    title: String,
}

/// Optional endpoint: a random article in the chosen (or first available)
/// language. Retries a bounded number of times on a dangling id, since
/// `maxPageId` may exceed the number of actual titles.
#[get("/random")]
async fn random(
    query: web::Query<RandomQuery>,
    databases: web::Data<Databases>,
) -> actix_web::Result<HttpResponse> {
    let language_code = query
        .language_code
        .clone()
        .or_else(|| databases.keys().next().cloned());
    let Some(language_code) = language_code else {
        return Ok(error_response(&WikiwalkError::not_found(
            "no databases loaded",
        )));
    };
    let Some(entry) = databases.get(&language_code) else {
        return Ok(error_response(&WikiwalkError::not_found(format!(
            "no database for language {language_code}"
        ))));
    };

    let max_page_id = entry.database.max_page_id();
    for _ in 0..16 {
        let id: PageId = rand::thread_rng().gen_range(1..=max_page_id);
        if let Some(title) = entry.database.store().title_for_id(id) {
            return Ok(HttpResponse::Ok().json(RandomPage { page_id: id, title }));
        }
    }
    Ok(error_response(&WikiwalkError::NotFound(
        "could not find a random page after 16 attempts".into(),
    )))
}

fn error_response(error: &WikiwalkError) -> HttpResponse {
    match error {
        WikiwalkError::NotFound(msg) => HttpResponse::NotFound().body(msg.clone()),
        WikiwalkError::BadRequest(msg) => HttpResponse::BadRequest().body(msg.clone()),
        WikiwalkError::Cancelled => HttpResponse::RequestTimeout().body("cancelled"),
        WikiwalkError::Corruption(msg) => {
            log::error!("corrupt database: {msg}");
            HttpResponse::InternalServerError().body("internal error")
        }
        WikiwalkError::BuildFailure(msg) => {
            log::error!("unexpected build error surfaced at query time: {msg}");
            HttpResponse::InternalServerError().body("internal error")
        }
        WikiwalkError::Transient(msg) => {
            log::error!("transient store failure: {msg}");
            HttpResponse::InternalServerError().body("internal error")
        }
    }
}

fn init_logging() {
    let colors_line = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::White)
        .debug(Color::White)
        .trace(Color::BrightBlack);
    let colors_level = colors_line.info(Color::Green);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{color_line}[{target}] [{level}{color_line}] {message}\x1B[0m",
                color_line = format_args!(
                    "\x1B[{}m",
                    colors_line.get_color(&record.level()).to_fg_str()
                ),
                target = record.target(),
                level = colors_level.color(record.level()),
                message = message,
            ));
        })
        .level(log::LevelFilter::Debug)
        .level_for("sled", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()
        .expect("initialize logs");
}

/// Loads every database under `databases_dir`, keeping only the newest
/// `dumpDate` per language when more than one build is present.
fn load_databases(databases_dir: &PathBuf, cache_max_bytes: usize) -> Databases {
    let paths = Paths::new(databases_dir);
    let mut latest: HashMap<String, String> = HashMap::new();
    for (language_code, dump_date) in paths.list_databases().unwrap_or_default() {
        latest
            .entry(language_code)
            .and_modify(|existing| {
                if dump_date > *existing {
                    *existing = dump_date.clone();
                }
            })
            .or_insert(dump_date);
    }

    let mut databases = HashMap::new();
    for (language_code, dump_date) in latest {
        let path = paths.database_path(&language_code, &dump_date);
        match Database::open(&path, cache_max_bytes) {
            Ok(database) => {
                log::info!("loaded database {language_code}-{dump_date}");
                databases.insert(
                    language_code,
                    LanguageEntry {
                        database,
                        dump_date,
                    },
                );
            }
            Err(e) => {
                log::error!("failed to open database at {}: {e}", path.display());
            }
        }
    }
    databases
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_logging();

    let _sentry_guard = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let databases_dir = std::env::var("DATA_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| wikiwalk::paths::default_data_dir());
    let cache_max_bytes: usize = std::env::var("CACHE_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(256 * 1024 * 1024);

    log::info!("loading databases from {}", databases_dir.display());
    let databases = Arc::new(load_databases(&databases_dir, cache_max_bytes));
    log::info!("{} language database(s) loaded", databases.len());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8000);
    let bind_addr = std::env::var("ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string());

    let databases_data = web::Data::from(databases);

    HttpServer::new(move || {
        App::new()
            .wrap(sentry_actix::Sentry::new())
            .wrap(actix_web::middleware::Logger::default())
            .wrap(Cors::permissive())
            .app_data(databases_data.clone())
            .service(list_databases)
            .service(shortest_paths)
            .service(random)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
