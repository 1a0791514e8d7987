//! Bucket management, item relocation, and the post-run folder sweep.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::classify::MANAGED_BUCKETS;
use crate::error::PipelineError;
use crate::models::{ItemError, SourceItem};
use crate::remote::{RemoteError, RemoteStore};

/// Creates buckets lazily and relocates items into them.
///
/// One organizer lives for one run; the bucket-id cache keeps find-or-create
/// idempotent within the run, and find-before-create keeps it idempotent
/// across runs.
pub struct Organizer<'a> {
    store: &'a dyn RemoteStore,
    root_id: &'a str,
    buckets: HashMap<&'static str, String>,
}

impl<'a> Organizer<'a> {
    pub fn new(store: &'a dyn RemoteStore, root_id: &'a str) -> Self {
        Self {
            store,
            root_id,
            buckets: HashMap::new(),
        }
    }

    /// Find-or-create a managed bucket. Never creates a duplicate: an
    /// existing folder with the bucket's name is always reused.
    pub async fn ensure_bucket(&mut self, name: &'static str) -> Result<String, RemoteError> {
        if let Some(id) = self.buckets.get(name) {
            return Ok(id.clone());
        }
        let id = match self.store.find_folder(name).await? {
            Some(id) => id,
            None => {
                debug!(bucket = name, "creating managed bucket");
                self.store.create_folder(name, Some(self.root_id)).await?
            }
        };
        self.buckets.insert(name, id.clone());
        Ok(id)
    }

    /// Relocate an item into a bucket and verify the move took effect.
    ///
    /// The store's ack alone is not trusted: a silent no-op relocation
    /// would strand the item, so the parent set is re-fetched and must
    /// contain the target bucket.
    pub async fn move_item(
        &self,
        item: &SourceItem,
        bucket_name: &str,
        bucket_id: &str,
    ) -> Result<(), PipelineError> {
        let remove: Vec<String> = item
            .parents
            .iter()
            .filter(|p| p.as_str() != bucket_id)
            .cloned()
            .collect();
        self.store
            .update_parents(&item.id, bucket_id, &remove)
            .await
            .map_err(|e| PipelineError::TransientIo {
                attempts: 1,
                reason: e.to_string(),
            })?;

        let parents = self
            .store
            .parents_of(&item.id)
            .await
            .map_err(|e| PipelineError::TransientIo {
                attempts: 1,
                reason: e.to_string(),
            })?;
        if !parents.iter().any(|p| p == bucket_id) {
            return Err(PipelineError::MoveNotVerified {
                bucket: bucket_name.to_string(),
            });
        }
        Ok(())
    }

    /// Delete folders discovered during this run's traversal that are not
    /// managed buckets and now have zero children. Bounded to exactly the
    /// visited set; folders outside traversal scope are never touched.
    pub async fn cleanup_folders(&self, visited: &[SourceItem]) -> Vec<ItemError> {
        let mut errors = Vec::new();
        for folder in visited {
            if MANAGED_BUCKETS.contains(&folder.name.as_str()) {
                continue;
            }
            let children = match self.store.list(&folder.id, None).await {
                Ok(page) => page,
                Err(e) => {
                    errors.push(ItemError {
                        item: folder.name.clone(),
                        reason: format!("cleanup listing failed: {}", e),
                    });
                    continue;
                }
            };
            if !children.items.is_empty() {
                continue;
            }
            if let Err(e) = self.store.delete(&folder.id).await {
                warn!(folder = %folder.name, error = %e, "empty folder deletion failed");
                errors.push(ItemError {
                    item: folder.name.clone(),
                    reason: format!("folder deletion failed: {}", e),
                });
            }
        }
        errors
    }
}
