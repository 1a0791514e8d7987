//! Remote store boundary.
//!
//! The pipeline consumes a small capability set — paginated listing,
//! chunked download, folder create/delete, and parent reassignment — and
//! never the wire protocol itself. [`http::HttpRemoteStore`] talks to a
//! real store; [`memory::InMemoryRemote`] backs the test suite.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::SourceItem;

/// Failures surfaced by a remote store implementation.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Credentials rejected or missing. Fatal to a run when seen at start.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A chunked download did not complete within the bounded retry budget.
    #[error("download did not complete within {attempts} attempts")]
    Timeout { attempts: u32 },

    /// Transient transport or protocol failure.
    #[error("remote I/O error: {0}")]
    Io(String),

    #[error("item not found: {0}")]
    NotFound(String),
}

/// One page of a listing plus the continuation token, if more pages exist.
#[derive(Debug, Default)]
pub struct ItemPage {
    pub items: Vec<SourceItem>,
    pub next_page_token: Option<String>,
}

/// The capability set the pipeline consumes from the remote store.
///
/// All calls are item- or folder-scoped; implementations decide transport,
/// authentication, and retry mechanics internally, reporting exhaustion
/// through [`RemoteError`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cheap credentials probe, called once at the start of a run.
    async fn check_auth(&self) -> Result<(), RemoteError>;

    /// List direct children of a folder, one page at a time.
    async fn list(
        &self,
        parent_id: &str,
        page_token: Option<&str>,
    ) -> Result<ItemPage, RemoteError>;

    /// List every item in the namespace regardless of parent, one page at a
    /// time. The enumerator uses this to discover unparented ("limbo")
    /// items the parent-scoped traversal can never reach.
    async fn list_all(&self, page_token: Option<&str>) -> Result<ItemPage, RemoteError>;

    /// Download an item's full content. Implementations retry transient
    /// chunk failures up to their configured budget.
    async fn download(&self, item_id: &str) -> Result<Vec<u8>, RemoteError>;

    /// Find a folder by exact name anywhere in the namespace.
    async fn find_folder(&self, name: &str) -> Result<Option<String>, RemoteError>;

    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, RemoteError>;

    /// Current parent set of an item, re-fetched from the store.
    async fn parents_of(&self, item_id: &str) -> Result<Vec<String>, RemoteError>;

    /// Add one parent and remove others in a single call. The ack does not
    /// guarantee the relocation took effect; callers verify via
    /// [`parents_of`](RemoteStore::parents_of).
    async fn update_parents(
        &self,
        item_id: &str,
        add_parent: &str,
        remove_parents: &[String],
    ) -> Result<(), RemoteError>;

    async fn delete(&self, item_id: &str) -> Result<(), RemoteError>;
}
