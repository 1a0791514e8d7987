//! Cycle-safe, paginated traversal of the remote namespace.
//!
//! The remote folder graph is not guaranteed to be a tree, or even acyclic:
//! items can carry several parents and shared folders can loop back into
//! already-visited subtrees. The crawl is therefore iterative (unbounded
//! depth cannot overflow a stack) and keeps a seen-id set for the whole
//! traversal so every reachable item is emitted exactly once. A dedicated
//! second pass discovers items with no folder reference resolvable from the
//! root and merges them in flagged as limbo.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::models::{ItemError, ItemKind, SourceItem};
use crate::remote::RemoteStore;

/// Everything one traversal discovered.
#[derive(Debug, Default)]
pub struct Traversal {
    pub files: Vec<SourceItem>,
    /// Folders discovered this run, in discovery order. The cleanup sweep
    /// is bounded to exactly this set.
    pub folders: Vec<SourceItem>,
    /// Per-subtree failures; each one skipped a subtree without aborting
    /// the rest of the namespace.
    pub errors: Vec<ItemError>,
}

/// Walk the namespace from `root_id`, then sweep for limbo items.
pub async fn enumerate(store: &dyn RemoteStore, root_id: &str) -> Traversal {
    let mut traversal = Traversal::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = vec![root_id.to_string()];
    // Folder ids reachable from the root, used to resolve limbo provenance.
    let mut reachable_folders: HashSet<String> = HashSet::from([root_id.to_string()]);

    while let Some(current) = stack.pop() {
        let mut page_token: Option<String> = None;
        loop {
            let page = match store.list(&current, page_token.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(folder = %current, error = %e, "skipping subtree");
                    traversal
                        .errors
                        .push(ItemError {
                            item: current.clone(),
                            reason: format!("folder listing failed: {}", e),
                        });
                    break;
                }
            };

            for item in page.items {
                if !seen.insert(item.id.clone()) {
                    // Second parent path or a cycle; already emitted.
                    continue;
                }
                match item.kind {
                    ItemKind::Folder => {
                        reachable_folders.insert(item.id.clone());
                        stack.push(item.id.clone());
                        traversal.folders.push(item);
                    }
                    ItemKind::File => traversal.files.push(item),
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
    }

    merge_limbo_items(store, &mut traversal, &seen, &reachable_folders).await;

    debug!(
        files = traversal.files.len(),
        folders = traversal.folders.len(),
        errors = traversal.errors.len(),
        "enumeration complete"
    );
    traversal
}

/// Second pass: namespace-wide listing to find files the parent-scoped
/// crawl could never reach. A file is limbo when none of its parents (if it
/// has any) resolves to a folder reachable from the root; such items get
/// flagged so failures route them to quarantine more aggressively.
async fn merge_limbo_items(
    store: &dyn RemoteStore,
    traversal: &mut Traversal,
    seen: &HashSet<String>,
    reachable_folders: &HashSet<String>,
) {
    let mut page_token: Option<String> = None;
    loop {
        let page = match store.list_all(page_token.as_deref()).await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "limbo discovery pass failed");
                traversal.errors.push(ItemError {
                    item: "(limbo pass)".to_string(),
                    reason: format!("namespace listing failed: {}", e),
                });
                return;
            }
        };

        for mut item in page.items {
            if item.kind != ItemKind::File || seen.contains(&item.id) {
                continue;
            }
            let resolvable = item.parents.iter().any(|p| reachable_folders.contains(p));
            if resolvable {
                // Parent was discovered but its listing failed; the item
                // belongs to a skipped subtree, not to limbo.
                continue;
            }
            item.limbo = true;
            traversal.files.push(item);
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }
}
