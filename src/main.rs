use std::process::ExitCode;

use clap::Parser;
use serde_json::json;

use hostfully_import::api::ApiClient;
use hostfully_import::cli::{CliArgs, Command};
use hostfully_import::config::Settings;
use hostfully_import::core::{catalog, fatal, queue};
use hostfully_import::error::{AppError, AppResult};
use hostfully_import::logging::{log, setup_logging, ImportLog, LogLevel};
use hostfully_import::store::{FileBackend, Store};

fn main() -> ExitCode {
    setup_logging();

    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log(LogLevel::Error, &format!("Failed to start runtime: {e}"));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::Argument(message)) => {
            log(LogLevel::Error, &message);
            ExitCode::from(2)
        }
        Err(e) => {
            log(LogLevel::Error, &e.to_string());
            ExitCode::FAILURE
        }
    }
}

/// Structured results go to stdout; all logging stays on stderr.
fn print_json<T: serde::Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn client(settings: &Settings) -> AppResult<ApiClient> {
    if settings.api_key.is_empty() {
        return Err(AppError::Argument(
            "no API key configured; run `hostfully-import configure --api-key <KEY>` first"
                .to_string(),
        ));
    }
    ApiClient::new(&settings.base_url, &settings.api_key)
}

fn masked_key(api_key: &str) -> String {
    if api_key.len() <= 4 {
        "*".repeat(api_key.len())
    } else {
        format!("****{}", &api_key[api_key.len() - 4..])
    }
}

async fn run(args: CliArgs) -> AppResult<()> {
    let backend = FileBackend::new(&args.state_dir);
    let state_file = backend.state_file();
    let mut store = Store::open(Box::new(backend))?;
    let settings = Settings::load(&store);
    let mut import_log = ImportLog::new(settings.verbose_log);

    match args.command {
        Command::Configure {
            api_key,
            agency_uid,
            base_url,
            max_photos,
            bulk_limit,
            api_page_limit,
            allow_enrich_api,
            amenities_cache_hours,
            require_channel_flag,
            verbose_log,
        } => {
            let mut settings = settings;
            if let Some(v) = api_key {
                settings.api_key = v;
            }
            if let Some(v) = agency_uid {
                settings.agency_uid = v;
            }
            if let Some(v) = base_url {
                settings.base_url = v;
            }
            if let Some(v) = max_photos {
                settings.max_photos = v;
            }
            if let Some(v) = bulk_limit {
                settings.bulk_limit = v;
            }
            if let Some(v) = api_page_limit {
                settings.api_page_limit = v;
            }
            if let Some(v) = allow_enrich_api {
                settings.allow_enrich_api = v;
            }
            if let Some(v) = amenities_cache_hours {
                settings.amenities_cache_hours = v;
            }
            if let Some(v) = require_channel_flag {
                settings.require_channel_flag = v;
            }
            if let Some(v) = verbose_log {
                settings.verbose_log = v;
            }
            settings.sanitize();
            settings.save(&mut store)?;
            store.persist()?;
            log(LogLevel::Success, "Settings saved");
            print_json(&json!({
                "api_key": masked_key(&settings.api_key),
                "agency_uid": settings.agency_uid,
                "base_url": settings.base_url,
                "max_photos": settings.max_photos,
                "bulk_limit": settings.bulk_limit,
                "api_page_limit": settings.api_page_limit,
                "allow_enrich_api": settings.allow_enrich_api,
                "amenities_cache_hours": settings.amenities_cache_hours,
                "require_channel_flag": settings.require_channel_flag,
                "verbose_log": settings.verbose_log,
            }))
        }
        Command::SyncCatalog => {
            fatal::install(state_file);
            let api = client(&settings)?;
            let report = catalog::sync_catalog(&api, &mut store, &settings, &mut import_log).await?;
            store.persist()?;
            print_json(&report)
        }
        Command::ImportOne {
            uid,
            update_existing,
        } => {
            fatal::install(state_file);
            let api = client(&settings)?;
            let report = queue::import_single(
                &api,
                &mut store,
                &settings,
                &uid,
                update_existing,
                &mut import_log,
            )
            .await?;
            print_json(&report)
        }
        Command::BulkStart { update_existing } => {
            fatal::install(state_file);
            let api = client(&settings)?;
            let report =
                queue::start_bulk(&api, &mut store, &settings, update_existing, &mut import_log)
                    .await?;
            print_json(&report)
        }
        Command::Tick => {
            fatal::install(state_file);
            let api = client(&settings)?;
            let report = queue::advance_tick(&api, &mut store, &settings, &mut import_log).await?;
            print_json(&report)
        }
        Command::Status => print_json(&queue::status(&store)),
        Command::LastError => print_json(&json!({"last_error": queue::last_error(&store)})),
        Command::ClearError => {
            queue::clear_error(&mut store)?;
            print_json(&json!({"cleared": true}))
        }
    }
}
