//! Photo upload pipeline: turns a user-selected file into a durable remote
//! URL on a specific field of the draft, with zero perceived latency and
//! safe rollback.

pub mod preview;
pub mod retry;

use crate::auth::TokenProvider;
use crate::autosave::{SaveHook, UploadTracker};
use crate::core::{DraftRecord, PhotoConfig, PhotoField, QcError, Result};
use crate::photos::preview::{PreviewAllocator, PreviewLease};
use crate::store::{PhotoStore, drive};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A file as handed over by the capture widget.
#[derive(Debug, Clone)]
pub struct PhotoFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

pub struct PhotoUploadPipeline {
    photos: Arc<dyn PhotoStore>,
    previews: Arc<dyn PreviewAllocator>,
    tokens: Arc<dyn TokenProvider>,
    tracker: UploadTracker,
    config: PhotoConfig,
    save_hook: Option<Arc<dyn SaveHook>>,
    /// Resolved (codigo, lote) → folder id. Together with find-before-create
    /// this keeps folder resolution idempotent.
    folders: Mutex<HashMap<(String, String), String>>,
    root_folder: Option<String>,
}

impl PhotoUploadPipeline {
    pub fn new(
        photos: Arc<dyn PhotoStore>,
        previews: Arc<dyn PreviewAllocator>,
        tokens: Arc<dyn TokenProvider>,
        tracker: UploadTracker,
        config: PhotoConfig,
    ) -> Self {
        Self {
            photos,
            previews,
            tokens,
            tracker,
            config,
            save_hook: None,
            folders: Mutex::new(HashMap::new()),
            root_folder: None,
        }
    }

    /// Parent folder all batch folders are created under.
    pub fn with_root_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.root_folder = Some(folder_id.into());
        self
    }

    /// Downstream save triggered after a successful URL swap, so the new URL
    /// is durably recorded even if the user navigates away immediately.
    pub fn with_save_hook(mut self, hook: Arc<dyn SaveHook>) -> Self {
        self.save_hook = Some(hook);
        self
    }

    pub fn tracker(&self) -> &UploadTracker {
        &self.tracker
    }

    fn validate(&self, file: &PhotoFile) -> Result<()> {
        if file.bytes.len() > self.config.max_bytes {
            return Err(QcError::Validation(format!(
                "photo '{}' is {} bytes, over the {} byte limit",
                file.name,
                file.bytes.len(),
                self.config.max_bytes
            )));
        }
        if !self.config.allowed_mime.iter().any(|m| m == &file.mime) {
            return Err(QcError::Validation(format!(
                "unsupported photo type '{}'",
                file.mime
            )));
        }
        if self.config.warn_mime.iter().any(|m| m == &file.mime) {
            // Advisory only; some dashboards render these poorly.
            log::warn!("photo '{}' uses limited-compatibility format {}", file.name, file.mime);
        }
        Ok(())
    }

    /// Two-level folder path derived from (codigo, lote). Find-or-create at
    /// each level; a second capture for the same batch reuses the cached id
    /// and never duplicates folders.
    async fn resolve_folder(&self, codigo: &str, lote: &str) -> Result<String> {
        let cache_key = (codigo.to_string(), lote.to_string());
        if let Some(id) = self.folders.lock().unwrap().get(&cache_key) {
            return Ok(id.clone());
        }
        let code_folder = self
            .find_or_create(codigo, self.root_folder.as_deref())
            .await?;
        let lote_folder = self.find_or_create(lote, Some(&code_folder)).await?;
        self.folders
            .lock()
            .unwrap()
            .insert(cache_key, lote_folder.clone());
        Ok(lote_folder)
    }

    async fn find_or_create(&self, name: &str, parent: Option<&str>) -> Result<String> {
        if let Some(id) = self.photos.find_folder(name, parent).await? {
            return Ok(id);
        }
        self.photos.create_folder(name, parent).await
    }

    /// Uploads `file` into the slot addressed by `field`.
    ///
    /// The draft shows a local preview immediately; on success the preview
    /// is swapped for the remote URL, on any failure the field reverts to
    /// exactly its prior value. The preview URL is released on every exit
    /// path, once.
    pub async fn capture(
        &self,
        draft: &mut DraftRecord,
        field: &PhotoField,
        file: PhotoFile,
    ) -> Result<String> {
        // Rejected before any side effect.
        self.validate(&file)?;

        let previous_url = draft.photo_url(field).cloned();
        let lease = PreviewLease::allocate(self.previews.clone(), &file.name, &file.bytes)?;
        draft.set_photo_url(field, Some(lease.url().to_string()));
        let key = field.key();
        self.tracker.begin(&key);

        let outcome = self.upload(draft, &file).await;
        self.tracker.end(&key);

        match outcome {
            Ok(remote_url) => {
                draft.set_photo_url(field, Some(remote_url.clone()));
                draft.updated_at = Utc::now();
                drop(lease);
                if let Some(hook) = &self.save_hook
                    && let Err(e) = hook.save_now(draft).await
                {
                    // The URL swap stands; the next debounce cycle retries
                    // the save.
                    log::warn!("post-upload save failed for '{}': {}", draft.id, e);
                }
                Ok(remote_url)
            }
            Err(e) => {
                draft.set_photo_url(field, previous_url);
                drop(lease);
                log::warn!("photo capture failed on '{}': {}", key, e);
                Err(e)
            }
        }
    }

    async fn upload(&self, draft: &DraftRecord, file: &PhotoFile) -> Result<String> {
        // Token first: an expired session must abort before any store call.
        self.tokens.ensure_valid().await?;

        let folder = self.resolve_folder(&draft.codigo, &draft.lote).await?;
        let stored_name = format!(
            "{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S%3f"),
            file.name
        );
        let stored = self
            .photos
            .upload_multipart(&stored_name, &file.mime, file.bytes.clone(), &folder)
            .await?;
        // Public read so the dashboard can render it without a session.
        // Propagation is lazy; the display path handles early 403s.
        if let Err(e) = self.photos.set_public_read_permission(&stored.id).await {
            log::warn!("permission grant failed for '{}': {}", stored.id, e);
        }
        Ok(stored.url)
    }

    /// Removes the photo in `field`: deletes the remote file when the URL is
    /// a store URL, clears the field and records the clear downstream.
    pub async fn remove(&self, draft: &mut DraftRecord, field: &PhotoField) -> Result<()> {
        let Some(url) = draft.photo_url(field).cloned() else {
            return Ok(());
        };
        if let Some(file_id) = drive::file_id_from_url(&url) {
            self.tokens.ensure_valid().await?;
            self.photos.delete_file(&file_id).await?;
        }
        draft.set_photo_url(field, None);
        draft.updated_at = Utc::now();
        if let Some(hook) = &self.save_hook {
            hook.save_now(draft).await?;
        }
        Ok(())
    }
}

/// Per-class user-facing message for a failed capture.
pub fn user_message(err: &QcError) -> String {
    match err {
        QcError::Validation(msg) => format!("La foto no es válida: {msg}"),
        QcError::AuthRequired(_) => {
            "Sesión expirada. Vuelve a iniciar sesión para subir fotos.".to_string()
        }
        QcError::TransientRemote(_) => {
            "No se pudo subir la foto (problema de conexión). Intenta de nuevo.".to_string()
        }
        other => format!("No se pudo subir la foto: {other}"),
    }
}
