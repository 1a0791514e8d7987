//! The run body: one full sweep of the remote namespace.
//!
//! Stage order follows the orchestrator's state machine: Scanning
//! (auth probe + traversal), Processing (per-item download, extraction,
//! classification, admission, relocation), CleaningFolders, then the
//! conditional index rebuild. Item-scoped failures quarantine the item and
//! the sweep continues; only an auth failure at the start or an unexpected
//! top-level error aborts the run.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use crate::classify::{self, DOCUMENTS, QUARANTINE};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::enumerate;
use crate::error::PipelineError;
use crate::extract;
use crate::index::{self, IndexSnapshot};
use crate::knowledge::KnowledgeStore;
use crate::ledger::DedupLedger;
use crate::models::{RunStage, SourceItem};
use crate::organize::Organizer;
use crate::remote::{RemoteError, RemoteStore};
use crate::service::StatusCell;

/// Run the full pipeline once. Returns the freshly built snapshot when new
/// knowledge was admitted, `None` when nothing changed.
#[allow(clippy::too_many_arguments)]
pub async fn run_once(
    store: &dyn RemoteStore,
    embedder: &dyn Embedder,
    config: &Config,
    ledger: &mut DedupLedger,
    knowledge: &mut KnowledgeStore,
    status: &StatusCell,
    cancel: &AtomicBool,
) -> Result<Option<IndexSnapshot>, PipelineError> {
    status.set_stage(RunStage::Scanning);

    // Auth failure at run start is the one remote failure fatal to the run.
    store
        .check_auth()
        .await
        .map_err(|e| PipelineError::Auth(e.to_string()))?;

    let traversal = enumerate::enumerate(store, &config.remote.root_id).await;
    status.with_log(|log| {
        log.scanned = traversal.files.len();
        log.errors.extend(traversal.errors.iter().cloned());
    });
    info!(
        files = traversal.files.len(),
        folders = traversal.folders.len(),
        "scan complete"
    );

    let histogram = classify::extension_histogram(&traversal.files);
    let mut organizer = Organizer::new(store, &config.remote.root_id);
    let mut new_knowledge: BTreeMap<String, String> = BTreeMap::new();
    let mut cancelled = false;

    status.set_stage(RunStage::Processing);
    for item in &traversal.files {
        // Cooperative cancellation, checked between items only.
        if cancel.load(Ordering::SeqCst) {
            info!("run cancelled by operator");
            cancelled = true;
            break;
        }

        match process_item(store, config, ledger, status, &histogram, item, &mut new_knowledge)
            .await
        {
            Ok(bucket) => {
                match relocate(&mut organizer, item, bucket).await {
                    Ok(()) => status.with_log(|log| log.record_move(bucket, &item.id)),
                    Err(e) => {
                        warn!(item = %item.name, error = %e, "relocation failed");
                        status.with_log(|log| log.record_error(&item.name, e.to_string()));
                        quarantine(&mut organizer, status, item).await;
                    }
                }
            }
            Err(e) if e.is_run_fatal() => return Err(e),
            Err(e) => {
                warn!(item = %item.name, error = %e, "item failed");
                status.with_log(|log| log.record_error(&item.name, e.to_string()));
                quarantine(&mut organizer, status, item).await;
            }
        }
    }

    if !cancelled {
        status.set_stage(RunStage::CleaningFolders);
        let cleanup_errors = organizer.cleanup_folders(&traversal.folders).await;
        status.with_log(|log| log.errors.extend(cleanup_errors));
    }

    let added = knowledge.merge(new_knowledge);
    // Knowledge first, ledger second. A ledger entry whose text never made
    // it to disk would mark the content as a permanent duplicate that can
    // never be indexed; a knowledge entry without its ledger record is
    // harmless because `merge` never overwrites on re-admission.
    knowledge
        .save()
        .map_err(|e| PipelineError::Fatal(format!("knowledge save failed: {}", e)))?;
    ledger
        .save()
        .map_err(|e| PipelineError::Fatal(format!("ledger save failed: {}", e)))?;

    if added == 0 {
        // Nothing admitted: the previous snapshot stays in place.
        return Ok(None);
    }

    info!(added, "rebuilding similarity index");
    let snapshot = index::build_snapshot(knowledge, embedder, config.embedding.batch_size)
        .await
        .map_err(|e| PipelineError::Fatal(format!("index rebuild failed: {}", e)))?;
    snapshot
        .save(&config.state.dir)
        .map_err(|e| PipelineError::Fatal(format!("index save failed: {}", e)))?;
    Ok(Some(snapshot))
}

/// Gate, fetch, extract, classify, and (for indexable items) admit one
/// item. Returns the destination bucket; the caller performs the move.
async fn process_item(
    store: &dyn RemoteStore,
    config: &Config,
    ledger: &mut DedupLedger,
    status: &StatusCell,
    histogram: &std::collections::HashMap<String, usize>,
    item: &SourceItem,
    new_knowledge: &mut BTreeMap<String, String>,
) -> Result<&'static str, PipelineError> {
    let limits = &config.limits;

    if item.size > limits.size_ceiling_bytes {
        return Err(PipelineError::SizeLimit {
            size: item.size,
            ceiling: limits.size_ceiling_bytes,
        });
    }

    let bucket = classify::categorize(&item.extension, histogram, limits.classify_threshold);

    if !extract::is_extractable(&item.extension) {
        // Nothing to read out of it; organization only.
        return Ok(bucket);
    }

    // Limbo items get a tighter wall-clock budget: their provenance is
    // unknown, so failures route to quarantine more aggressively.
    let mut budget = Duration::from_secs(limits.item_timeout_secs.max(1));
    if item.limbo {
        budget /= 4;
    }

    let text = tokio::time::timeout(budget, fetch_and_extract(store, item))
        .await
        .map_err(|_| PipelineError::Timeout)??;

    if text.trim().chars().count() < limits.min_text_len {
        return Err(PipelineError::Content);
    }

    if bucket == DOCUMENTS {
        // Check-and-set admission; a duplicate by content or name affects
        // indexing only, the item still moves to its classified bucket.
        if ledger.admit(&text, &item.name) {
            new_knowledge.insert(item.name.clone(), text);
        } else {
            status.with_log(|log| log.duplicates_skipped += 1);
        }
    }

    Ok(bucket)
}

async fn fetch_and_extract(
    store: &dyn RemoteStore,
    item: &SourceItem,
) -> Result<String, PipelineError> {
    let bytes = store.download(&item.id).await.map_err(|e| match e {
        RemoteError::Timeout { .. } => PipelineError::Timeout,
        other => PipelineError::TransientIo {
            attempts: 1,
            reason: other.to_string(),
        },
    })?;
    // Extraction is synchronous CPU work. Run it off the runtime so the
    // item budget wrapping this future can still elapse while a
    // pathological document grinds away on the blocking pool.
    let extension = item.extension.clone();
    tokio::task::spawn_blocking(move || extract::extract_text(&bytes, &extension))
        .await
        .map_err(|e| PipelineError::TransientIo {
            attempts: 1,
            reason: format!("extraction task failed: {}", e),
        })
}

async fn relocate(
    organizer: &mut Organizer<'_>,
    item: &SourceItem,
    bucket: &'static str,
) -> Result<(), PipelineError> {
    let bucket_id = organizer
        .ensure_bucket(bucket)
        .await
        .map_err(|e| PipelineError::TransientIo {
            attempts: 1,
            reason: format!("bucket creation failed: {}", e),
        })?;
    organizer.move_item(item, bucket, &bucket_id).await
}

/// Best-effort quarantine of a failed item. A failure here is logged and
/// the sweep still continues; the item stays where it was.
async fn quarantine(organizer: &mut Organizer<'_>, status: &StatusCell, item: &SourceItem) {
    match relocate(organizer, item, QUARANTINE).await {
        Ok(()) => status.with_log(|log| log.record_move(QUARANTINE, &item.id)),
        Err(e) => {
            warn!(item = %item.name, error = %e, "quarantine move failed");
            status.with_log(|log| {
                log.record_error(&item.name, format!("quarantine failed: {}", e))
            });
        }
    }
}
