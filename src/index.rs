//! Similarity index construction and snapshot publishing.
//!
//! An [`IndexSnapshot`] pairs a flat L2 index with the explicit id array it
//! was built from: `ordered_ids[i]` names the entry backing `vectors[i]`
//! and the i-th element added to the index, so a search hit at position `i`
//! always resolves through `ordered_ids[i]`. Position-to-name mapping is
//! never inferred from a map's iteration order.
//!
//! Snapshots are immutable. A rebuild constructs the whole new snapshot off
//! to the side and the orchestrator publishes it with one pointer swap.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::embedding::Embedder;
use crate::knowledge::KnowledgeStore;

const INDEX_FILE: &str = "index.json";

/// A search hit: squared L2 distance plus the position in build order.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub distance: f32,
    pub position: usize,
}

/// Brute-force exact nearest-neighbor structure over fixed-length vectors.
///
/// Mirrors a flat L2 index: vectors are stored in insertion order and a
/// query scans all of them. Exact, deterministic, and plenty for the corpus
/// sizes the curator handles.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FlatIndex {
    dims: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn build(dims: usize, vectors: Vec<Vec<f32>>) -> Self {
        Self { dims, vectors }
    }

    /// Vector width the index was built with. Queries of any other width
    /// are meaningless and get rejected upstream.
    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The `k` nearest stored vectors by squared L2 distance, closest first.
    /// Ties break on position so results are deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Hit> {
        let mut hits: Vec<Hit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, v)| Hit {
                distance: squared_l2(query, v),
                position,
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);
        hits
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// An atomically published pairing of the similarity structure with its
/// id-order array. Never mutated after construction.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Knowledge entry names in build order; `ordered_ids[i]` backs the
    /// i-th vector and the i-th index element.
    pub ordered_ids: Vec<String>,
    pub index: FlatIndex,
}

impl IndexSnapshot {
    pub fn empty() -> Self {
        Self {
            ordered_ids: Vec::new(),
            index: FlatIndex::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_ids.is_empty()
    }

    /// Search and resolve each hit position to its entry name.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(f32, &str)> {
        self.index
            .search(query, k)
            .into_iter()
            .map(|hit| (hit.distance, self.ordered_ids[hit.position].as_str()))
            .collect()
    }

    /// Persist the artifact (id-order array + vectors) to the state dir.
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join(INDEX_FILE);
        let json = serde_json::to_string(self)?;
        // Temp file then rename so the artifact swap on disk is atomic.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Load the persisted artifact; absent file yields an empty snapshot.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(INDEX_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse index artifact at {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

/// Rebuild the snapshot wholesale from the knowledge store.
///
/// Filters out empty entries, embeds the remainder in one fixed (name)
/// order, and builds the index over those embeddings in that exact order.
/// The caller publishes the result only after this returns; a concurrent
/// reader never observes a partially built snapshot.
pub async fn build_snapshot(
    store: &KnowledgeStore,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<IndexSnapshot> {
    let entries: Vec<(&str, &str)> = store
        .iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .collect();

    if entries.is_empty() {
        return Ok(IndexSnapshot::empty());
    }

    let ordered_ids: Vec<String> = entries.iter().map(|(name, _)| name.to_string()).collect();

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(entries.len());
    for batch in entries.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|(_, text)| text.to_string()).collect();
        let mut embedded = embedder.embed(&texts).await?;
        if embedded.len() != texts.len() {
            anyhow::bail!(
                "Embedder returned {} vectors for {} texts",
                embedded.len(),
                texts.len()
            );
        }
        vectors.append(&mut embedded);
    }

    let index = FlatIndex::build(embedder.dims(), vectors);
    Ok(IndexSnapshot { ordered_ids, index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn store_with(entries: &[(&str, &str)]) -> KnowledgeStore {
        let tmp = TempDir::new().unwrap();
        let mut store = KnowledgeStore::load(tmp.path()).unwrap();
        store.merge(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        );
        store
    }

    #[test]
    fn search_is_closest_first_and_deterministic() {
        let index = FlatIndex::build(
            2,
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![5.0, 5.0]],
        );
        let hits = index.search(&[0.9, 0.0], 2);
        assert_eq!(hits[0].position, 1);
        assert_eq!(hits[1].position, 0);
    }

    #[test]
    fn search_k_larger_than_corpus_returns_everything() {
        let index = FlatIndex::build(1, vec![vec![0.0], vec![1.0]]);
        assert_eq!(index.search(&[0.0], 10).len(), 2);
    }

    #[tokio::test]
    async fn snapshot_positions_resolve_to_store_entries() {
        let store = store_with(&[
            ("alpha.txt", "rust cargo build tooling"),
            ("beta.txt", "python machine learning"),
            ("gamma.txt", "kubernetes deployment notes"),
        ]);
        let embedder = HashEmbedder::new(128);
        let snapshot = build_snapshot(&store, &embedder, 2).await.unwrap();

        assert_eq!(snapshot.ordered_ids.len(), 3);
        assert_eq!(snapshot.index.len(), 3);
        // Every searchable position must name an entry present in the store.
        let query = embedder.embed(&["rust build".to_string()]).await.unwrap();
        for (_, name) in snapshot.search(&query[0], 3) {
            assert!(store.contains(name));
        }
    }

    #[tokio::test]
    async fn empty_entries_are_filtered_out() {
        let store = store_with(&[("real.txt", "actual content here"), ("blank.txt", "   ")]);
        let embedder = HashEmbedder::new(64);
        let snapshot = build_snapshot(&store, &embedder, 8).await.unwrap();
        assert_eq!(snapshot.ordered_ids, vec!["real.txt".to_string()]);
    }

    #[tokio::test]
    async fn artifact_round_trips_through_disk() {
        let store = store_with(&[("doc.txt", "some indexed text body")]);
        let embedder = HashEmbedder::new(32);
        let snapshot = build_snapshot(&store, &embedder, 8).await.unwrap();

        let tmp = TempDir::new().unwrap();
        snapshot.save(tmp.path()).unwrap();
        let loaded = IndexSnapshot::load(tmp.path()).unwrap();
        assert_eq!(loaded.ordered_ids, snapshot.ordered_ids);
        assert_eq!(loaded.index.len(), 1);
    }

    #[test]
    fn absent_artifact_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let snapshot = IndexSnapshot::load(tmp.path()).unwrap();
        assert!(snapshot.is_empty());
    }
}
