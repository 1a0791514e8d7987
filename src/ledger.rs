//! Durable deduplication ledger.
//!
//! Records the SHA-256 content hashes and the names of everything ever
//! admitted into the knowledge store, so a piece of logical content is
//! admitted at most once across all runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const LEDGER_FILE: &str = "ledger.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerState {
    hashes: HashSet<String>,
    names: HashSet<String>,
}

/// Content-hash/name registry persisted across process restarts.
#[derive(Debug)]
pub struct DedupLedger {
    state: LedgerState,
    path: PathBuf,
}

impl DedupLedger {
    /// Load the ledger from the state directory, starting empty when the
    /// file does not exist yet (first run).
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(LEDGER_FILE);
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse ledger at {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerState::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        Ok(Self { state, path })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&self.state)?;
        // Temp file then rename; a crash mid-write never leaves a
        // truncated ledger behind.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Check-AND-set admission: returns true when the content is new and, in
    /// the same call, registers both its hash and its name.
    ///
    /// This is deliberately not a pure predicate. A second call with the
    /// same content or the same name — even from an interleaved caller that
    /// holds the same `&mut` borrow sequence — observes a duplicate, which
    /// is what guarantees at-most-one admission without a separate locking
    /// step. Do not split this into check-then-register across two calls.
    pub fn admit(&mut self, text: &str, name: &str) -> bool {
        let hash = content_hash(text);
        if self.state.hashes.contains(&hash) || self.state.names.contains(name) {
            return false;
        }
        self.state.hashes.insert(hash);
        self.state.names.insert(name.to_string());
        true
    }

    /// Cumulative number of admitted entries (survives across runs).
    pub fn len(&self) -> usize {
        self.state.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.names.is_empty()
    }
}

/// SHA-256 digest over the UTF-8 text, lowercase hex.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_admission_accepts_then_rejects() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = DedupLedger::load(tmp.path()).unwrap();

        assert!(ledger.admit("quarterly numbers", "q1.txt"));
        // Same content, different name: duplicate by hash.
        assert!(!ledger.admit("quarterly numbers", "q1-copy.txt"));
        // Different content, same name: duplicate by name.
        assert!(!ledger.admit("entirely new text", "q1.txt"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn admission_has_a_side_effect_even_without_save() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = DedupLedger::load(tmp.path()).unwrap();
        assert!(ledger.admit("abc", "a.txt"));
        assert!(!ledger.admit("abc", "b.txt"));
    }

    #[test]
    fn survives_reload() {
        let tmp = TempDir::new().unwrap();
        {
            let mut ledger = DedupLedger::load(tmp.path()).unwrap();
            assert!(ledger.admit("persisted content", "p.txt"));
            ledger.save().unwrap();
        }
        let mut reloaded = DedupLedger::load(tmp.path()).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(!reloaded.admit("persisted content", "other-name.txt"));
    }

    #[test]
    fn save_leaves_no_temp_artifacts() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = DedupLedger::load(tmp.path()).unwrap();
        assert!(ledger.admit("first body", "a.txt"));
        ledger.save().unwrap();
        assert!(ledger.admit("second body", "b.txt"));
        ledger.save().unwrap();

        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["ledger.json".to_string()]);
    }

    #[test]
    fn absent_file_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let ledger = DedupLedger::load(tmp.path()).unwrap();
        assert!(ledger.is_empty());
    }
}
