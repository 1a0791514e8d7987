//! Long-lived orchestrator: run lifecycle, status reporting, and queries
//! against the atomically published index snapshot.
//!
//! Invariants the `Curator` upholds:
//! - at most one pipeline run in flight (compare-and-swap admission);
//! - the running flag and stage are always released when a run ends,
//!   whether it finished, failed, was cancelled, or panicked;
//! - queries read a single published snapshot and never block on a run.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::index::IndexSnapshot;
use crate::knowledge::KnowledgeStore;
use crate::ledger::DedupLedger;
use crate::models::{RunStage, RunLog, RunStatus};
use crate::pipeline;
use crate::remote::RemoteStore;

/// How much of an entry's text a query hit carries back.
const SNIPPET_CHARS: usize = 480;

// ============================================================
// Status cell
// ============================================================

/// Shared mutable run status. The pipeline writes through it while a run
/// is in flight; status readers get a point-in-time clone.
pub struct StatusCell(Mutex<RunStatus>);

impl StatusCell {
    pub fn new() -> Self {
        Self(Mutex::new(RunStatus::default()))
    }

    pub fn set_stage(&self, stage: RunStage) {
        self.0.lock().unwrap().stage = stage;
    }

    pub fn with_log<F: FnOnce(&mut RunLog)>(&self, f: F) {
        f(&mut self.0.lock().unwrap().log);
    }

    pub fn get(&self) -> RunStatus {
        self.0.lock().unwrap().clone()
    }

    fn begin_run(&self) {
        let mut status = self.0.lock().unwrap();
        status.running = true;
        status.stage = RunStage::Scanning;
        status.log = RunLog::default();
    }

    fn finish_run(&self) {
        let mut status = self.0.lock().unwrap();
        status.running = false;
        status.stage = RunStage::Idle;
        status.last_run = Some(Utc::now());
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Published snapshot
// ============================================================

/// What a query reads: the index plus the snippet text for every indexed
/// entry, captured at publish time so queries never race a running sweep.
pub struct PublishedSnapshot {
    pub snapshot: IndexSnapshot,
    pub previews: BTreeMap<String, String>,
}

impl PublishedSnapshot {
    fn empty() -> Self {
        Self {
            snapshot: IndexSnapshot::empty(),
            previews: BTreeMap::new(),
        }
    }

    fn from_parts(snapshot: IndexSnapshot, knowledge: &KnowledgeStore) -> Self {
        let previews = snapshot
            .ordered_ids
            .iter()
            .filter_map(|name| {
                knowledge
                    .get(name)
                    .map(|text| (name.clone(), snippet(text)))
            })
            .collect();
        Self { snapshot, previews }
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

// ============================================================
// Curator
// ============================================================

#[derive(Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Serialize)]
pub struct QueryHit {
    pub name: String,
    pub distance: f32,
    pub snippet: String,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("index not ready; run the pipeline first")]
    NotReady,
    #[error("query failed: {0}")]
    Internal(String),
}

struct Stores {
    ledger: DedupLedger,
    knowledge: KnowledgeStore,
}

struct Shared {
    running: AtomicBool,
    cancel: AtomicBool,
    status: StatusCell,
    snapshot: RwLock<Arc<PublishedSnapshot>>,
    stores: tokio::sync::Mutex<Stores>,
}

#[derive(Clone)]
pub struct Curator {
    config: Arc<Config>,
    store: Arc<dyn RemoteStore>,
    embedder: Arc<dyn Embedder>,
    shared: Arc<Shared>,
}

impl Curator {
    /// Load persisted state from the configured state directory and start
    /// with whatever snapshot the last successful run left behind.
    pub fn new(
        config: Config,
        store: Arc<dyn RemoteStore>,
        embedder: Arc<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        let ledger = DedupLedger::load(&config.state.dir)?;
        let knowledge = KnowledgeStore::load(&config.state.dir)?;
        let snapshot = IndexSnapshot::load(&config.state.dir)?;

        let published = if snapshot.is_empty() {
            PublishedSnapshot::empty()
        } else {
            PublishedSnapshot::from_parts(snapshot, &knowledge)
        };

        Ok(Self {
            config: Arc::new(config),
            store,
            embedder,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                cancel: AtomicBool::new(false),
                status: StatusCell::new(),
                snapshot: RwLock::new(Arc::new(published)),
                stores: tokio::sync::Mutex::new(Stores { ledger, knowledge }),
            }),
        })
    }

    pub fn status(&self) -> RunStatus {
        self.shared.status.get()
    }

    /// Request cancellation of the in-flight run. The pipeline honors it
    /// at the next between-item check; a no-op when nothing is running.
    pub fn cancel_run(&self) {
        self.shared.cancel.store(true, Ordering::SeqCst);
    }

    /// Trigger a run in the background. Returns immediately.
    pub fn start_run(&self) -> StartOutcome {
        if !self.try_begin() {
            return StartOutcome::AlreadyRunning;
        }
        let this = self.clone();
        tokio::spawn(async move { this.drive_run().await });
        StartOutcome::Started
    }

    /// Run the pipeline inline and wait for it to finish. Used by the CLI.
    pub async fn run_to_completion(&self) -> StartOutcome {
        if !self.try_begin() {
            return StartOutcome::AlreadyRunning;
        }
        self.drive_run().await;
        StartOutcome::Started
    }

    fn try_begin(&self) -> bool {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("run trigger ignored: a run is already in flight");
            return false;
        }
        self.shared.cancel.store(false, Ordering::SeqCst);
        self.shared.status.begin_run();
        true
    }

    /// Drive one admitted run to its end and release the run state no
    /// matter how the pipeline exits, panics included.
    async fn drive_run(&self) {
        let _guard = RunGuard {
            shared: Arc::clone(&self.shared),
        };

        // A separate task so an unexpected panic in the run body surfaces
        // as a JoinError here instead of taking down the caller.
        let this = self.clone();
        let handle = tokio::spawn(async move { this.run_pipeline().await });

        match handle.await {
            Ok(Ok(Some(published))) => {
                // Briefly held write lock; readers see either the old or
                // the new snapshot, never a mixture.
                *self.shared.snapshot.write().unwrap() = Arc::new(published);
                info!("new index snapshot published");
            }
            Ok(Ok(None)) => {
                info!("run finished with no new knowledge; snapshot unchanged");
            }
            Ok(Err(e)) => {
                error!(error = %e, "run aborted");
                self.shared
                    .status
                    .with_log(|log| log.record_error("(run)", e.to_string()));
            }
            Err(join_err) => {
                error!(error = %join_err, "run task panicked");
                self.shared
                    .status
                    .with_log(|log| log.record_error("(run)", "run task panicked"));
            }
        }
    }

    async fn run_pipeline(
        &self,
    ) -> Result<Option<PublishedSnapshot>, crate::error::PipelineError> {
        let mut stores = self.shared.stores.lock().await;
        let Stores { ledger, knowledge } = &mut *stores;

        let rebuilt = pipeline::run_once(
            self.store.as_ref(),
            self.embedder.as_ref(),
            &self.config,
            ledger,
            knowledge,
            &self.shared.status,
            &self.shared.cancel,
        )
        .await?;

        Ok(rebuilt.map(|snapshot| PublishedSnapshot::from_parts(snapshot, knowledge)))
    }

    /// Similarity query against the published snapshot.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>, QueryError> {
        let published = Arc::clone(&self.shared.snapshot.read().unwrap());
        if published.snapshot.is_empty() {
            return Err(QueryError::NotReady);
        }

        let embedded = self
            .embedder
            .embed(std::slice::from_ref(&text.to_string()))
            .await
            .map_err(|e| QueryError::Internal(e.to_string()))?;
        let query_vec = embedded
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::Internal("embedder returned no vector".into()))?;

        // A persisted index built under a different embedding width cannot
        // answer this query; searching it anyway would return garbage
        // distances.
        let index_dims = published.snapshot.index.dims();
        if query_vec.len() != index_dims {
            return Err(QueryError::Internal(format!(
                "query embedding has {} dims but the index was built with {}",
                query_vec.len(),
                index_dims
            )));
        }

        let hits = published
            .snapshot
            .search(&query_vec, k)
            .into_iter()
            .map(|(distance, name)| QueryHit {
                name: name.to_string(),
                distance,
                snippet: published.previews.get(name).cloned().unwrap_or_default(),
            })
            .collect();
        Ok(hits)
    }
}

/// Releases the run state when dropped. Runs on every exit path out of
/// `drive_run`, including cancellation of the driving future itself.
struct RunGuard {
    shared: Arc<Shared>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.shared.status.finish_run();
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        EmbeddingConfig, LimitsConfig, RemoteConfig, ServerConfig, StateConfig,
    };
    use crate::embedding::HashEmbedder;
    use crate::remote::memory::InMemoryRemote;

    fn test_config(state_dir: &std::path::Path) -> Config {
        // Fixtures are tiny; drop the population threshold so mapped
        // buckets apply.
        let limits = LimitsConfig {
            classify_threshold: 1,
            ..LimitsConfig::default()
        };
        Config {
            remote: RemoteConfig {
                base_url: "http://unused.invalid".to_string(),
                root_id: "root".to_string(),
            },
            state: StateConfig {
                dir: state_dir.to_path_buf(),
            },
            limits,
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
        }
    }

    fn curator_over(remote: InMemoryRemote, dir: &std::path::Path) -> Curator {
        Curator::new(
            test_config(dir),
            Arc::new(remote),
            Arc::new(HashEmbedder::new(64)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn query_before_any_run_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let curator = curator_over(InMemoryRemote::new(), dir.path());
        let err = curator.query("anything", 3).await.unwrap_err();
        assert!(matches!(err, QueryError::NotReady));
    }

    #[tokio::test]
    async fn run_indexes_documents_and_answers_queries() {
        let dir = tempfile::tempdir().unwrap();
        let remote = InMemoryRemote::new();
        remote.add_file(
            "notes.txt",
            b"quarterly revenue projections for the sales team",
            &["root"],
        );
        remote.add_file("recipe.md", b"how to bake sourdough bread at home", &["root"]);
        let curator = curator_over(remote, dir.path());

        assert_eq!(curator.run_to_completion().await, StartOutcome::Started);

        let status = curator.status();
        assert!(!status.running);
        assert_eq!(status.stage, RunStage::Idle);
        assert!(status.last_run.is_some());
        assert_eq!(status.log.scanned, 2);

        let hits = curator.query("sales revenue numbers", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "notes.txt");
        assert!(hits[0].snippet.contains("revenue"));
    }

    #[tokio::test]
    async fn second_trigger_while_running_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let curator = curator_over(InMemoryRemote::new(), dir.path());

        // Simulate an in-flight run holding the flag.
        assert!(curator.try_begin());
        assert_eq!(curator.start_run(), StartOutcome::AlreadyRunning);
        assert_eq!(
            curator.run_to_completion().await,
            StartOutcome::AlreadyRunning
        );

        // Release and the next trigger succeeds.
        drop(RunGuard {
            shared: Arc::clone(&curator.shared),
        });
        assert_eq!(curator.run_to_completion().await, StartOutcome::Started);
    }

    #[tokio::test]
    async fn auth_failure_releases_run_state() {
        let dir = tempfile::tempdir().unwrap();
        let remote = InMemoryRemote::new();
        remote.reject_auth();
        let curator = curator_over(remote, dir.path());

        curator.run_to_completion().await;

        let status = curator.status();
        assert!(!status.running);
        assert_eq!(status.stage, RunStage::Idle);
        assert!(status
            .log
            .errors
            .iter()
            .any(|e| e.item == "(run)"));
    }

    #[tokio::test]
    async fn query_under_a_reconfigured_embedding_width_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        {
            let remote = InMemoryRemote::new();
            remote.add_file("a.txt", b"contract terms and renewal clauses", &["root"]);
            let curator = curator_over(remote, dir.path());
            curator.run_to_completion().await;
        }

        // Same state directory, narrower embedder: the persisted index
        // cannot answer these queries and must say so instead of scanning.
        let curator = Curator::new(
            test_config(dir.path()),
            Arc::new(InMemoryRemote::new()),
            Arc::new(HashEmbedder::new(32)),
        )
        .unwrap();
        let err = curator.query("contract renewal", 1).await.unwrap_err();
        assert!(matches!(err, QueryError::Internal(_)));
        assert!(err.to_string().contains("dims"));
    }

    #[tokio::test]
    async fn snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let remote = InMemoryRemote::new();
            remote.add_file("a.txt", b"contract terms and renewal clauses", &["root"]);
            let curator = curator_over(remote, dir.path());
            curator.run_to_completion().await;
        }

        // Fresh curator over the same state directory.
        let curator = curator_over(InMemoryRemote::new(), dir.path());
        let hits = curator.query("contract renewal", 1).await.unwrap();
        assert_eq!(hits[0].name, "a.txt");
    }
}
