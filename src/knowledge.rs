//! Durable name→text map backing the similarity index.
//!
//! Entries grow monotonically: a run only ever adds new names, never
//! overwrites or removes existing ones.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const KNOWLEDGE_FILE: &str = "knowledge.json";

#[derive(Debug)]
pub struct KnowledgeStore {
    entries: BTreeMap<String, String>,
    path: PathBuf,
}

impl KnowledgeStore {
    /// Load the store from the state directory; absent file means empty.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(KNOWLEDGE_FILE);
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse knowledge store at {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        Ok(Self { entries, path })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&self.entries)?;
        // Temp file then rename, same as the ledger: readers of the state
        // directory never observe a half-written store.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Union-merge: new names are inserted, existing names keep their text.
    /// Returns the number of entries actually added.
    pub fn merge(&mut self, new_entries: BTreeMap<String, String>) -> usize {
        let mut added = 0;
        for (name, text) in new_entries {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.entries.entry(name) {
                slot.insert(text);
                added += 1;
            }
        }
        added
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries in name order. The index builder relies on this being a
    /// stable, explicit ordering rather than incidental map iteration.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
