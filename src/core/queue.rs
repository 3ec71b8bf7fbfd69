//! Durable bulk-import queue. Each tick imports exactly one listing and
//! persists before and after the work, so the caller can drive the run one
//! invocation at a time and a crash mid-import never replays a UID.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::fetchers::fetch_properties;
use crate::api::RemoteApi;
use crate::config::{Settings, META_PROPERTY_UID, OPT_LAST_ERROR, OPT_PROGRESS, OPT_QUEUE};
use crate::error::{AppError, AppResult};
use crate::logging::ImportLog;
use crate::store::{RecordId, RecordKind, Store};

use super::importer::{find_imported_listing, import_property};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub total: usize,
    pub done: usize,
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
    pub last: Option<String>,
    pub started_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct QueueState {
    uids: Vec<String>,
    update_existing: bool,
}

#[derive(Debug, Serialize)]
pub struct StartReport {
    pub total: usize,
    pub queued: Vec<String>,
    pub update_existing: bool,
    pub skipped_existing: usize,
}

#[derive(Debug, Serialize)]
pub struct TickReport {
    pub done: bool,
    pub uid: Option<String>,
    pub local_id: Option<RecordId>,
    pub remaining: usize,
    pub progress: Progress,
    pub last_error: Option<Value>,
    pub log: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SingleReport {
    pub uid: String,
    pub local_id: RecordId,
    pub created: bool,
    pub duration_ms: u64,
    pub last_error: Option<Value>,
    pub log: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub queue_remaining: usize,
    pub imported_listings: usize,
    pub progress: Option<Progress>,
    pub last_error: Option<Value>,
}

fn load_queue(store: &Store) -> QueueState {
    store
        .option(OPT_QUEUE)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

fn save_queue(store: &mut Store, queue: &QueueState) -> AppResult<()> {
    store.set_option(OPT_QUEUE, serde_json::to_value(queue)?);
    Ok(())
}

pub fn load_progress(store: &Store) -> Option<Progress> {
    store
        .option(OPT_PROGRESS)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn save_progress(store: &mut Store, progress: &Progress) -> AppResult<()> {
    store.set_option(OPT_PROGRESS, serde_json::to_value(progress)?);
    Ok(())
}

pub fn last_error(store: &Store) -> Option<Value> {
    store.option(OPT_LAST_ERROR).cloned()
}

pub fn clear_error(store: &mut Store) -> AppResult<()> {
    store.delete_option(OPT_LAST_ERROR);
    store.persist()
}

fn record_error(store: &mut Store, uid: Option<&str>, message: &str) {
    store.set_option(
        OPT_LAST_ERROR,
        json!({
            "message": message,
            "uid": uid,
            "at": chrono::Utc::now().timestamp(),
        }),
    );
}

/// Builds a fresh bulk queue from the remote property list. Already-imported
/// listings are skipped unless `update_existing` is set, and the queue is
/// capped at the configured bulk limit. Progress counters reset.
pub async fn start_bulk<R: RemoteApi>(
    api: &R,
    store: &mut Store,
    settings: &Settings,
    update_existing: bool,
    log: &mut ImportLog,
) -> AppResult<StartReport> {
    let properties = fetch_properties(api, &settings.agency_uid, settings.api_page_limit, log).await?;
    let imported = store.meta_values(RecordKind::Accommodation, META_PROPERTY_UID);

    let mut skipped_existing = 0;
    let mut uids: Vec<String> = Vec::new();
    for property in &properties {
        let Some(uid) = property.get("uid").and_then(Value::as_str) else {
            continue;
        };
        if !update_existing && imported.iter().any(|i| i == uid) {
            skipped_existing += 1;
            continue;
        }
        uids.push(uid.to_string());
        if uids.len() >= settings.bulk_limit {
            break;
        }
    }

    let queue = QueueState {
        uids: uids.clone(),
        update_existing,
    };
    let progress = Progress {
        total: uids.len(),
        started_at: chrono::Utc::now().timestamp(),
        ..Progress::default()
    };
    save_queue(store, &queue)?;
    save_progress(store, &progress)?;
    store.persist()?;

    log.push(format!(
        "Queued {} listing(s) for import ({skipped_existing} already imported)",
        uids.len()
    ));
    Ok(StartReport {
        total: uids.len(),
        queued: uids,
        update_existing,
        skipped_existing,
    })
}

/// Imports the next queued listing. The popped queue is persisted before the
/// import starts, so even a crash or panic mid-import consumes the UID.
/// Panics are caught and folded into the error counters.
pub async fn advance_tick<R: RemoteApi>(
    api: &R,
    store: &mut Store,
    settings: &Settings,
    log: &mut ImportLog,
) -> AppResult<TickReport> {
    let mut queue = load_queue(store);
    let mut progress = load_progress(store).unwrap_or_default();

    if queue.uids.is_empty() {
        return Ok(TickReport {
            done: true,
            uid: None,
            local_id: None,
            remaining: 0,
            progress,
            last_error: last_error(store),
            log: log.lines().to_vec(),
        });
    }

    let uid = queue.uids.remove(0);
    save_queue(store, &queue)?;
    store.persist()?;

    let import = std::panic::AssertUnwindSafe(import_property(api, store, settings, &uid, log))
        .catch_unwind()
        .await;

    let mut local_id = None;
    match import {
        Ok(Ok(outcome)) => {
            local_id = Some(outcome.record);
            if outcome.created {
                progress.created += 1;
            } else {
                progress.updated += 1;
            }
        }
        Ok(Err(e)) => {
            progress.errors += 1;
            log.push(format!("Import of {uid} failed: {e}"));
            record_error(store, Some(&uid), &e.to_string());
        }
        Err(panic) => {
            let message = panic_message(panic);
            progress.errors += 1;
            log.push(format!("Import of {uid} panicked: {message}"));
            record_error(store, Some(&uid), &message);
        }
    }

    progress.done += 1;
    progress.last = Some(uid.clone());
    save_progress(store, &progress)?;
    store.persist()?;

    Ok(TickReport {
        done: queue.uids.is_empty(),
        uid: Some(uid),
        local_id,
        remaining: queue.uids.len(),
        progress,
        last_error: last_error(store),
        log: log.lines().to_vec(),
    })
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Imports one listing by UID, outside any queue. Refuses to touch a listing
/// that is already imported unless `update_existing` is set. Panics are
/// caught like in `advance_tick` so the caller always gets a structured
/// failure back.
pub async fn import_single<R: RemoteApi>(
    api: &R,
    store: &mut Store,
    settings: &Settings,
    uid: &str,
    update_existing: bool,
    log: &mut ImportLog,
) -> AppResult<SingleReport> {
    if !update_existing && find_imported_listing(store, uid).is_some() {
        return Err(AppError::Argument(format!(
            "listing {uid} is already imported; pass --update-existing to reimport"
        )));
    }

    let started = std::time::Instant::now();
    let result = match std::panic::AssertUnwindSafe(import_property(api, store, settings, uid, log))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(AppError::Unexpected(format!(
            "panic: {}",
            panic_message(panic)
        ))),
    };
    match result {
        Ok(outcome) => {
            store.persist()?;
            Ok(SingleReport {
                uid: uid.to_string(),
                local_id: outcome.record,
                created: outcome.created,
                duration_ms: started.elapsed().as_millis() as u64,
                last_error: last_error(store),
                log: log.lines().to_vec(),
            })
        }
        Err(e) => {
            record_error(store, Some(uid), &e.to_string());
            store.persist()?;
            Err(e)
        }
    }
}

pub fn status(store: &Store) -> StatusReport {
    StatusReport {
        queue_remaining: load_queue(store).uids.len(),
        imported_listings: store.record_ids(RecordKind::Accommodation).len(),
        progress: load_progress(store),
        last_error: last_error(store),
    }
}
