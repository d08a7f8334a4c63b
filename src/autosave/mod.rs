//! Auto-save engine: decides when a draft is persisted and guarantees a
//! local durable copy survives a failed remote write.
//!
//! Per-draft state machine: Idle → Pending (content diverges from the
//! last-saved baseline) → Saving (debounce window elapses) → Saved or Error;
//! any further change re-enters Pending and resets the timer. Saving always
//! writes the backup snapshot before the remote call. A failed save keeps
//! the snapshot and does not advance the baseline, so the next debounce
//! cycle retries naturally.
//!
//! Remote writes for one record id are last-write-wins; the system assumes a
//! single concurrent editor per record.

use crate::core::{AutoSaveConfig, BackupSnapshot, DraftRecord, QcError, Result};
use crate::gateway::{PersistenceGateway, normalized_payload};
use crate::store::{BACKUP_SLOT_KEY, DocumentStore, LocalStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

// ============================================================================
// Save state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Pending,
    Saving,
    Saved,
    Error,
}

/// Snapshot of the engine for the UI saved/error indicator.
#[derive(Debug, Clone)]
pub struct SaveStatus {
    pub state: SaveState,
    pub last_saved: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

// ============================================================================
// In-flight upload tracker
// ============================================================================

/// Set of photo fields with an upload in flight. Shared between the photo
/// pipeline (writer) and the auto-save guard and UI spinners (readers).
#[derive(Clone, Default)]
pub struct UploadTracker {
    fields: Arc<Mutex<HashSet<String>>>,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, field_key: &str) {
        self.fields.lock().unwrap().insert(field_key.to_string());
    }

    pub fn end(&self, field_key: &str) {
        self.fields.lock().unwrap().remove(field_key);
    }

    pub fn contains(&self, field_key: &str) -> bool {
        self.fields.lock().unwrap().contains(field_key)
    }

    pub fn any_in_flight(&self) -> bool {
        !self.fields.lock().unwrap().is_empty()
    }
}

// ============================================================================
// Engine
// ============================================================================

struct EngineInner {
    state: SaveState,
    /// Serialized form of the last successfully persisted draft. Change
    /// detection compares against this; it only advances on success.
    baseline: Option<String>,
    last_saved: Option<DateTime<Utc>>,
    error: Option<String>,
    /// Set after the first successful write of this record id. Session
    /// state only: recovery re-attempts create-or-replace, which the store
    /// treats idempotently.
    exists_remotely: bool,
    /// Bumped on every schedule/force; a sleeping debounce task whose
    /// generation no longer matches simply drops out.
    generation: u64,
}

pub struct AutoSaveEngine<D: DocumentStore, L: LocalStore> {
    gateway: Arc<PersistenceGateway<D>>,
    local: Arc<L>,
    config: AutoSaveConfig,
    uploads: UploadTracker,
    inner: Arc<Mutex<EngineInner>>,
    /// Serializes all save attempts. A debounced task re-checks its
    /// generation after acquiring this, so a forced save and a stale timer
    /// can never write concurrently.
    save_lock: Arc<tokio::sync::Mutex<()>>,
}

impl<D: DocumentStore, L: LocalStore> Clone for AutoSaveEngine<D, L> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            local: Arc::clone(&self.local),
            config: self.config.clone(),
            uploads: self.uploads.clone(),
            inner: Arc::clone(&self.inner),
            save_lock: Arc::clone(&self.save_lock),
        }
    }
}

impl<D, L> AutoSaveEngine<D, L>
where
    D: DocumentStore + 'static,
    L: LocalStore + 'static,
{
    pub fn new(
        gateway: Arc<PersistenceGateway<D>>,
        local: Arc<L>,
        uploads: UploadTracker,
        config: AutoSaveConfig,
    ) -> Self {
        Self {
            gateway,
            local,
            config,
            uploads,
            inner: Arc::new(Mutex::new(EngineInner {
                state: SaveState::Idle,
                baseline: None,
                last_saved: None,
                error: None,
                exists_remotely: false,
                generation: 0,
            })),
            save_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Adopts the current draft as already-persisted. Called when an editing
    /// session opens an existing record, so first mount never saves.
    pub fn adopt_baseline(&self, draft: &DraftRecord) -> Result<()> {
        let serialized = normalized_payload(draft)?.to_string();
        let mut inner = self.inner.lock().unwrap();
        inner.baseline = Some(serialized);
        inner.exists_remotely = true;
        inner.state = SaveState::Idle;
        Ok(())
    }

    pub fn status(&self) -> SaveStatus {
        let inner = self.inner.lock().unwrap();
        SaveStatus {
            state: inner.state,
            last_saved: inner.last_saved,
            error: inner.error.clone(),
        }
    }

    fn guard_blocks(&self, draft: &DraftRecord) -> bool {
        if self.uploads.any_in_flight() {
            log::debug!("auto-save disabled: photo upload in flight");
            return true;
        }
        if !draft.has_identity() {
            log::debug!("auto-save disabled: codigo/lote empty");
            return true;
        }
        false
    }

    /// Schedules a debounced save of `draft`. Idempotent: a newer call
    /// supersedes any pending one; there is never more than one queued save.
    /// Returns whether a save was actually scheduled.
    pub fn schedule(&self, draft: &DraftRecord) -> Result<bool> {
        if self.guard_blocks(draft) {
            return Ok(false);
        }
        let serialized = normalized_payload(draft)?.to_string();
        let generation = {
            let mut inner = self.inner.lock().unwrap();
            // Every call supersedes whatever timer is pending, including a
            // revert to the baseline: the user un-typed the change and the
            // superseded draft must never land.
            inner.generation += 1;
            if inner.baseline.as_deref() == Some(serialized.as_str()) {
                if inner.state == SaveState::Pending {
                    inner.state = SaveState::Idle;
                }
                return Ok(false);
            }
            inner.state = SaveState::Pending;
            inner.generation
        };

        let engine = self.clone();
        let draft = draft.clone();
        tokio::spawn(async move {
            tokio::time::sleep(engine.config.debounce).await;
            let _guard = engine.save_lock.lock().await;
            if engine.inner.lock().unwrap().generation != generation {
                return; // superseded by a newer edit or a forced save
            }
            if let Err(e) = engine.perform_save(&draft, serialized).await {
                log::warn!("auto-save failed for '{}': {}", draft.id, e);
            }
        });
        Ok(true)
    }

    /// Saves immediately, bypassing the debounce window. Still writes the
    /// backup snapshot first. Used before navigating away from the editor.
    /// Returns false when the guard blocked the write.
    pub async fn force_save(&self, draft: &DraftRecord) -> Result<bool> {
        if self.guard_blocks(draft) {
            return Ok(false);
        }
        let serialized = normalized_payload(draft)?.to_string();
        // Cancel any pending debounce task; this save supersedes it.
        self.inner.lock().unwrap().generation += 1;
        let _guard = self.save_lock.lock().await;
        self.perform_save(draft, serialized).await?;
        Ok(true)
    }

    async fn perform_save(&self, draft: &DraftRecord, serialized: String) -> Result<()> {
        let payload: Value = serde_json::from_str(&serialized)
            .map_err(|e| QcError::Serialization(format!("Failed to reparse draft: {}", e)))?;

        let exists = {
            let mut inner = self.inner.lock().unwrap();
            inner.state = SaveState::Saving;
            inner.exists_remotely
        };

        // Local durable copy before any remote attempt.
        let snapshot = BackupSnapshot::new(self.config.schema_version, payload);
        let encoded = serde_json::to_string(&snapshot)
            .map_err(|e| QcError::Serialization(format!("Failed to encode backup: {}", e)))?;
        self.local.set(BACKUP_SLOT_KEY, &encoded)?;

        let outcome = if exists {
            self.gateway.update(draft).await
        } else {
            self.gateway.save(draft).await
        };

        match outcome {
            Ok(()) => {
                self.local.remove(BACKUP_SLOT_KEY)?;
                let mut inner = self.inner.lock().unwrap();
                inner.state = SaveState::Saved;
                inner.baseline = Some(serialized);
                inner.last_saved = Some(Utc::now());
                inner.error = None;
                inner.exists_remotely = true;
                Ok(())
            }
            Err(e) => {
                // Snapshot stays; baseline stays, so the draft is still seen
                // as dirty and the next debounce cycle retries.
                let mut inner = self.inner.lock().unwrap();
                inner.state = SaveState::Error;
                inner.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Reads the backup snapshot. Returns `None` (and deletes the snapshot)
    /// on schema-version mismatch or when it is older than the retention
    /// window; otherwise the embedded payload, for the caller to rehydrate.
    pub fn recover(&self) -> Result<Option<Value>> {
        let Some(encoded) = self.local.get(BACKUP_SLOT_KEY)? else {
            return Ok(None);
        };
        let snapshot: BackupSnapshot = match serde_json::from_str(&encoded) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("discarding unreadable backup snapshot: {}", e);
                self.local.remove(BACKUP_SLOT_KEY)?;
                return Ok(None);
            }
        };
        if snapshot.version != self.config.schema_version {
            log::info!(
                "discarding backup snapshot: version {} != {}",
                snapshot.version,
                self.config.schema_version
            );
            self.local.remove(BACKUP_SLOT_KEY)?;
            return Ok(None);
        }
        let age = Utc::now().signed_duration_since(snapshot.timestamp);
        let retention = chrono::Duration::from_std(self.config.backup_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        if age > retention {
            log::info!("discarding backup snapshot older than retention window");
            self.local.remove(BACKUP_SLOT_KEY)?;
            return Ok(None);
        }
        Ok(Some(snapshot.payload))
    }
}

// ============================================================================
// Downstream save hook
// ============================================================================

/// One-shot durable save, triggered by the photo pipeline after a URL swap
/// so the new URL survives an immediate navigation.
#[async_trait]
pub trait SaveHook: Send + Sync {
    async fn save_now(&self, draft: &DraftRecord) -> Result<()>;
}

#[async_trait]
impl<D, L> SaveHook for AutoSaveEngine<D, L>
where
    D: DocumentStore + 'static,
    L: LocalStore + 'static,
{
    async fn save_now(&self, draft: &DraftRecord) -> Result<()> {
        self.force_save(draft).await.map(|_| ())
    }
}
