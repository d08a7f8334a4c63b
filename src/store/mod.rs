//! Ports to the hosted stores and to local durable storage.
//!
//! The hosted document database and the photo file store are black boxes
//! behind these traits; production code talks to the REST clients in
//! [`firestore`] and [`drive`], tests talk to the fakes in [`memory`].

pub mod drive;
pub mod firestore;
pub mod local;
pub mod memory;

use crate::core::{RecordStatus, Result, Shift};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

// ============================================================================
// Document store
// ============================================================================

/// Equality/range query over quality records. Exactly the shapes the
/// dashboard needs; anything fancier is out of scope for the store.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    /// Records whose `updatedAt` falls on this calendar date.
    pub date: Option<NaiveDate>,
    pub shift: Option<Shift>,
    pub status: Option<RecordStatus>,
    /// Prefix-range search on `codigo` or `lote`.
    pub code_prefix: Option<String>,
    /// Order by `updatedAt` descending when set (dashboard listing).
    pub newest_first: bool,
    pub limit: usize,
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub records: Vec<Value>,
    pub next_cursor: Option<String>,
}

/// Document database keyed by record id. Writes take fully normalized JSON;
/// the store rejects anything else (see the gateway's normalization pass).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Value>>;

    /// Create-or-replace. Idempotent, merge-safe: re-running the first write
    /// of a record id is harmless.
    async fn put(&self, id: &str, doc: &Value) -> Result<()>;

    /// Partial merge: present keys overwrite (explicit `null` clears),
    /// absent keys keep their stored value.
    async fn put_merge(&self, id: &str, doc: &Value) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn query(&self, query: &RecordQuery) -> Result<QueryPage>;
}

// ============================================================================
// Photo store
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPhoto {
    pub id: String,
    pub url: String,
}

/// Hierarchical file store for photo assets. All calls carry a bearer token;
/// implementations map 401-class responses to [`crate::core::QcError::AuthRequired`].
#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn find_folder(&self, name: &str, parent: Option<&str>) -> Result<Option<String>>;

    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<String>;

    async fn upload_multipart(
        &self,
        name: &str,
        mime: &str,
        bytes: Vec<u8>,
        parent: &str,
    ) -> Result<StoredPhoto>;

    /// Grants anyone-with-the-link read access. The store propagates this
    /// lazily; reads shortly after upload can still 403.
    async fn set_public_read_permission(&self, file_id: &str) -> Result<()>;

    async fn delete_file(&self, file_id: &str) -> Result<()>;
}

// ============================================================================
// Local durable storage
// ============================================================================

/// Fixed-key string slots in local durable storage. Backs the backup
/// snapshot and the persisted view-density preference.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Slot key for the at-most-one backup snapshot.
pub const BACKUP_SLOT_KEY: &str = "loteqc.backup";
/// Slot key for the dashboard view-density preference.
pub const VIEW_DENSITY_KEY: &str = "loteqc.view_density";
