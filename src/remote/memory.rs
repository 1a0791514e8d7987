//! In-memory [`RemoteStore`] implementation for tests and demos.
//!
//! Uses a `HashMap` behind `std::sync::Mutex`. Listings paginate with a
//! small page size so continuation-token handling is always exercised, and
//! failures can be injected per item or per folder: downloads that never
//! complete, listings that error out (subtree skip), relocations that ack
//! without taking effect (move verification), and a rejected auth probe.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{ItemKind, SourceItem};

use super::{ItemPage, RemoteError, RemoteStore};

const PAGE_SIZE: usize = 2;

#[derive(Debug, Clone)]
struct MemItem {
    name: String,
    kind: ItemKind,
    parents: Vec<String>,
    content: Vec<u8>,
    /// Reported size when it should differ from the stored content length.
    size_override: Option<u64>,
}

#[derive(Default)]
struct MemState {
    items: HashMap<String, MemItem>,
    auth_rejected: bool,
    listing_failures: HashSet<String>,
    never_complete: HashSet<String>,
    silent_move_noops: HashSet<String>,
}

/// In-memory remote namespace with failure injection.
#[derive(Default)]
pub struct InMemoryRemote {
    state: Mutex<MemState>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, name: &str, parents: &[&str]) -> String {
        self.insert(name, ItemKind::Folder, parents, Vec::new(), None)
    }

    pub fn add_file(&self, name: &str, content: &[u8], parents: &[&str]) -> String {
        self.insert(name, ItemKind::File, parents, content.to_vec(), None)
    }

    /// A file whose reported size differs from its stored content; used to
    /// exercise the size ceiling without allocating the bytes.
    pub fn add_file_sized(&self, name: &str, reported_size: u64, parents: &[&str]) -> String {
        self.insert(name, ItemKind::File, parents, Vec::new(), Some(reported_size))
    }

    fn insert(
        &self,
        name: &str,
        kind: ItemKind,
        parents: &[&str],
        content: Vec<u8>,
        size_override: Option<u64>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let mut state = self.state.lock().unwrap();
        state.items.insert(
            id.clone(),
            MemItem {
                name: name.to_string(),
                kind,
                parents: parents.iter().map(|p| p.to_string()).collect(),
                content,
                size_override,
            },
        );
        id
    }

    /// Make an existing folder a parent of another folder (cycles allowed).
    pub fn add_parent(&self, item_id: &str, parent_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(item) = state.items.get_mut(item_id) {
            item.parents.push(parent_id.to_string());
        }
    }

    pub fn reject_auth(&self) {
        self.state.lock().unwrap().auth_rejected = true;
    }

    /// Listing this folder's children fails with an I/O error.
    pub fn fail_listing(&self, folder_id: &str) {
        self.state
            .lock()
            .unwrap()
            .listing_failures
            .insert(folder_id.to_string());
    }

    /// Downloads of this item never complete within any retry budget.
    pub fn never_complete(&self, item_id: &str) {
        self.state
            .lock()
            .unwrap()
            .never_complete
            .insert(item_id.to_string());
    }

    /// Relocations of this item are acknowledged but silently dropped.
    pub fn silent_move_noop(&self, item_id: &str) {
        self.state
            .lock()
            .unwrap()
            .silent_move_noops
            .insert(item_id.to_string());
    }

    // ---- test inspection helpers ----

    pub fn names_in(&self, folder_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .items
            .values()
            .filter(|item| item.parents.iter().any(|p| p == folder_id))
            .map(|item| item.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn exists(&self, item_id: &str) -> bool {
        self.state.lock().unwrap().items.contains_key(item_id)
    }

    fn to_source_item(id: &str, item: &MemItem) -> SourceItem {
        SourceItem {
            id: id.to_string(),
            name: item.name.clone(),
            extension: SourceItem::extension_of(&item.name),
            size: item.size_override.unwrap_or(item.content.len() as u64),
            kind: item.kind,
            parents: item.parents.clone(),
            limbo: false,
        }
    }

    fn paginate(mut items: Vec<SourceItem>, page_token: Option<&str>) -> ItemPage {
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        let offset: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let next = offset + PAGE_SIZE;
        let next_page_token = if next < items.len() {
            Some(next.to_string())
        } else {
            None
        };
        ItemPage {
            items: items.into_iter().skip(offset).take(PAGE_SIZE).collect(),
            next_page_token,
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn check_auth(&self) -> Result<(), RemoteError> {
        if self.state.lock().unwrap().auth_rejected {
            return Err(RemoteError::Auth("token rejected".to_string()));
        }
        Ok(())
    }

    async fn list(
        &self,
        parent_id: &str,
        page_token: Option<&str>,
    ) -> Result<ItemPage, RemoteError> {
        let state = self.state.lock().unwrap();
        if state.listing_failures.contains(parent_id) {
            return Err(RemoteError::Io(format!(
                "listing of {} failed",
                parent_id
            )));
        }
        let items: Vec<SourceItem> = state
            .items
            .iter()
            .filter(|(_, item)| item.parents.iter().any(|p| p == parent_id))
            .map(|(id, item)| Self::to_source_item(id, item))
            .collect();
        Ok(Self::paginate(items, page_token))
    }

    async fn list_all(&self, page_token: Option<&str>) -> Result<ItemPage, RemoteError> {
        let state = self.state.lock().unwrap();
        let items: Vec<SourceItem> = state
            .items
            .iter()
            .map(|(id, item)| Self::to_source_item(id, item))
            .collect();
        Ok(Self::paginate(items, page_token))
    }

    async fn download(&self, item_id: &str) -> Result<Vec<u8>, RemoteError> {
        let state = self.state.lock().unwrap();
        if state.never_complete.contains(item_id) {
            return Err(RemoteError::Timeout { attempts: 20 });
        }
        state
            .items
            .get(item_id)
            .map(|item| item.content.clone())
            .ok_or_else(|| RemoteError::NotFound(item_id.to_string()))
    }

    async fn find_folder(&self, name: &str) -> Result<Option<String>, RemoteError> {
        let state = self.state.lock().unwrap();
        let mut matches: Vec<&String> = state
            .items
            .iter()
            .filter(|(_, item)| item.kind == ItemKind::Folder && item.name == name)
            .map(|(id, _)| id)
            .collect();
        matches.sort();
        Ok(matches.first().map(|id| id.to_string()))
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, RemoteError> {
        let parents: Vec<&str> = parent_id.into_iter().collect();
        Ok(self.insert(name, ItemKind::Folder, &parents, Vec::new(), None))
    }

    async fn parents_of(&self, item_id: &str) -> Result<Vec<String>, RemoteError> {
        let state = self.state.lock().unwrap();
        state
            .items
            .get(item_id)
            .map(|item| item.parents.clone())
            .ok_or_else(|| RemoteError::NotFound(item_id.to_string()))
    }

    async fn update_parents(
        &self,
        item_id: &str,
        add_parent: &str,
        remove_parents: &[String],
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        if state.silent_move_noops.contains(item_id) {
            // Acknowledged, dropped.
            return Ok(());
        }
        let item = state
            .items
            .get_mut(item_id)
            .ok_or_else(|| RemoteError::NotFound(item_id.to_string()))?;
        item.parents.retain(|p| !remove_parents.contains(p));
        if !item.parents.iter().any(|p| p == add_parent) {
            item.parents.push(add_parent.to_string());
        }
        Ok(())
    }

    async fn delete(&self, item_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state
            .items
            .remove(item_id)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(item_id.to_string()))
    }
}
