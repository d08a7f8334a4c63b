//! In-memory fakes for the hosted stores. Used by the test suite and by any
//! caller that wants the full pipeline without network access.

use crate::core::{QcError, Result};
use crate::store::{DocumentStore, PhotoStore, QueryPage, RecordQuery, StoredPhoto};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

type PutProbe = Box<dyn Fn() + Send + Sync>;

// ============================================================================
// Document store fake
// ============================================================================

#[derive(Default)]
struct DocState {
    docs: HashMap<String, Value>,
    fail_next_put: Option<String>,
    put_count: u64,
    merge_count: u64,
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    state: Mutex<DocState>,
    put_probe: Mutex<Option<PutProbe>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next `put`/`put_merge` fails with a transient error carrying `msg`.
    pub fn fail_next_put(&self, msg: impl Into<String>) {
        self.state.lock().unwrap().fail_next_put = Some(msg.into());
    }

    /// Invoked at the instant a write call is issued, before it takes
    /// effect. Lets tests observe state "at the moment of the remote write".
    pub fn set_put_probe(&self, probe: PutProbe) {
        *self.put_probe.lock().unwrap() = Some(probe);
    }

    pub fn put_count(&self) -> u64 {
        self.state.lock().unwrap().put_count
    }

    pub fn merge_count(&self) -> u64 {
        self.state.lock().unwrap().merge_count
    }

    pub fn stored(&self, id: &str) -> Option<Value> {
        self.state.lock().unwrap().docs.get(id).cloned()
    }

    fn check_fault(&self) -> Result<()> {
        if let Some(probe) = self.put_probe.lock().unwrap().as_ref() {
            probe();
        }
        let mut state = self.state.lock().unwrap();
        if let Some(msg) = state.fail_next_put.take() {
            return Err(QcError::TransientRemote(msg));
        }
        Ok(())
    }
}

fn merge_into(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) if existing.is_object() && patch_value.is_object() => {
                        merge_into(existing, patch_value);
                    }
                    _ => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

fn doc_matches(doc: &Value, query: &RecordQuery) -> bool {
    if let Some(date) = query.date {
        let updated = doc
            .get("updatedAt")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<DateTime<Utc>>().ok());
        match updated {
            Some(ts) if ts.date_naive() == date => {}
            _ => return false,
        }
    }
    if let Some(shift) = query.shift
        && doc.get("turno").and_then(Value::as_str) != Some(shift.as_str())
    {
        return false;
    }
    if let Some(status) = query.status
        && doc.get("estado").and_then(Value::as_str) != Some(status.as_str())
    {
        return false;
    }
    if let Some(prefix) = &query.code_prefix {
        let hit = ["codigo", "lote"].iter().any(|field| {
            doc.get(*field)
                .and_then(Value::as_str)
                .is_some_and(|v| v.starts_with(prefix.as_str()))
        });
        if !hit {
            return false;
        }
    }
    true
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.state.lock().unwrap().docs.get(id).cloned())
    }

    async fn put(&self, id: &str, doc: &Value) -> Result<()> {
        self.check_fault()?;
        let mut state = self.state.lock().unwrap();
        state.put_count += 1;
        state.docs.insert(id.to_string(), doc.clone());
        Ok(())
    }

    async fn put_merge(&self, id: &str, doc: &Value) -> Result<()> {
        self.check_fault()?;
        let mut state = self.state.lock().unwrap();
        state.merge_count += 1;
        let entry = state
            .docs
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        merge_into(entry, doc);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.state.lock().unwrap().docs.remove(id);
        Ok(())
    }

    async fn query(&self, query: &RecordQuery) -> Result<QueryPage> {
        let state = self.state.lock().unwrap();
        let mut matches: Vec<Value> = state
            .docs
            .values()
            .filter(|doc| doc_matches(doc, query))
            .cloned()
            .collect();
        if query.newest_first {
            matches.sort_by(|a, b| {
                let key = |d: &Value| {
                    d.get("updatedAt")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string()
                };
                key(b).cmp(&key(a))
            });
        } else {
            matches.sort_by_key(|d| {
                d.get("id").and_then(Value::as_str).unwrap_or("").to_string()
            });
        }
        let offset: usize = query
            .cursor
            .as_deref()
            .map(|c| c.parse().map_err(|_| QcError::Validation("bad cursor".into())))
            .transpose()?
            .unwrap_or(0);
        let limit = if query.limit == 0 { usize::MAX } else { query.limit };
        let page: Vec<Value> = matches.iter().skip(offset).take(limit).cloned().collect();
        let consumed = offset + page.len();
        let next_cursor = (consumed < matches.len()).then(|| consumed.to_string());
        Ok(QueryPage { records: page, next_cursor })
    }
}

// ============================================================================
// Photo store fake
// ============================================================================

#[derive(Debug, Clone)]
pub struct FakeFolder {
    pub id: String,
    pub name: String,
    pub parent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FakeFile {
    pub id: String,
    pub name: String,
    pub mime: String,
    pub parent: String,
    pub public: bool,
}

#[derive(Default)]
struct PhotoState {
    folders: Vec<FakeFolder>,
    files: Vec<FakeFile>,
    fail_next_upload: Option<QcErrorKind>,
    permission_calls: u64,
}

#[derive(Debug, Clone, Copy)]
enum QcErrorKind {
    Transient,
    Auth,
}

#[derive(Default)]
pub struct MemoryPhotoStore {
    state: Mutex<PhotoState>,
    next_id: AtomicU64,
}

impl MemoryPhotoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_upload_transient(&self) {
        self.state.lock().unwrap().fail_next_upload = Some(QcErrorKind::Transient);
    }

    pub fn fail_next_upload_auth(&self) {
        self.state.lock().unwrap().fail_next_upload = Some(QcErrorKind::Auth);
    }

    pub fn folders(&self) -> Vec<FakeFolder> {
        self.state.lock().unwrap().folders.clone()
    }

    pub fn files(&self) -> Vec<FakeFile> {
        self.state.lock().unwrap().files.clone()
    }

    pub fn permission_calls(&self) -> u64 {
        self.state.lock().unwrap().permission_calls
    }

    fn mint_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl PhotoStore for MemoryPhotoStore {
    async fn find_folder(&self, name: &str, parent: Option<&str>) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .folders
            .iter()
            .find(|f| f.name == name && f.parent.as_deref() == parent)
            .map(|f| f.id.clone()))
    }

    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<String> {
        let id = self.mint_id("folder");
        self.state.lock().unwrap().folders.push(FakeFolder {
            id: id.clone(),
            name: name.to_string(),
            parent: parent.map(str::to_string),
        });
        Ok(id)
    }

    async fn upload_multipart(
        &self,
        name: &str,
        mime: &str,
        _bytes: Vec<u8>,
        parent: &str,
    ) -> Result<StoredPhoto> {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(kind) = state.fail_next_upload.take() {
                return Err(match kind {
                    QcErrorKind::Transient => {
                        QcError::TransientRemote("upload failed: network unreachable".into())
                    }
                    QcErrorKind::Auth => QcError::AuthRequired("401 invalid credentials".into()),
                });
            }
        }
        let id = self.mint_id("file");
        self.state.lock().unwrap().files.push(FakeFile {
            id: id.clone(),
            name: name.to_string(),
            mime: mime.to_string(),
            parent: parent.to_string(),
            public: false,
        });
        Ok(StoredPhoto {
            url: format!("https://photos.example/d/{id}"),
            id,
        })
    }

    async fn set_public_read_permission(&self, file_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.permission_calls += 1;
        if let Some(file) = state.files.iter_mut().find(|f| f.id == file_id) {
            file.public = true;
            Ok(())
        } else {
            Err(QcError::PermanentRemote(format!("file '{file_id}' not found")))
        }
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.state.lock().unwrap().files.retain(|f| f.id != file_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn merge_keeps_absent_keys_and_clears_explicit_nulls() {
        let store = MemoryDocumentStore::new();
        store
            .put("r1", &json!({"codigo": "C1", "lote": "L1", "talla": "M"}))
            .await
            .unwrap();
        store
            .put_merge("r1", &json!({"talla": null, "lote": "L2"}))
            .await
            .unwrap();
        let doc = store.stored("r1").unwrap();
        assert_eq!(doc["codigo"], "C1");
        assert_eq!(doc["lote"], "L2");
        assert!(doc["talla"].is_null());
    }

    #[tokio::test]
    async fn query_paginates_with_cursor() {
        let store = MemoryDocumentStore::new();
        for i in 0..5 {
            store
                .put(
                    &format!("r{i}"),
                    &json!({
                        "id": format!("r{i}"),
                        "codigo": "C1",
                        "updatedAt": format!("2026-08-0{}T10:00:00Z", i + 1),
                    }),
                )
                .await
                .unwrap();
        }
        let mut query = RecordQuery {
            newest_first: true,
            limit: 2,
            ..Default::default()
        };
        let first = store.query(&query).await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.records[0]["id"], "r4");
        query.cursor = first.next_cursor.clone();
        let second = store.query(&query).await.unwrap();
        assert_eq!(second.records[0]["id"], "r2");
    }
}
