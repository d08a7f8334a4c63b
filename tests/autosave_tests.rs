use loteqc::gateway::normalized_payload;
use loteqc::store::local::MemoryLocalStore;
use loteqc::store::memory::MemoryDocumentStore;
use loteqc::{
    AutoSaveConfig, AutoSaveEngine, DraftRecord, PersistenceGateway, SaveState, UploadTracker,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

struct Harness {
    docs: Arc<MemoryDocumentStore>,
    local: Arc<MemoryLocalStore>,
    tracker: UploadTracker,
    engine: AutoSaveEngine<MemoryDocumentStore, MemoryLocalStore>,
}

fn harness() -> Harness {
    harness_with(AutoSaveConfig {
        debounce: Duration::from_millis(50),
        ..Default::default()
    })
}

fn harness_with(config: AutoSaveConfig) -> Harness {
    let docs = Arc::new(MemoryDocumentStore::new());
    let local = Arc::new(MemoryLocalStore::new());
    let tracker = UploadTracker::new();
    let gateway = Arc::new(PersistenceGateway::new(docs.clone()));
    let engine = AutoSaveEngine::new(gateway, local.clone(), tracker.clone(), config);
    Harness { docs, local, tracker, engine }
}

fn draft() -> DraftRecord {
    let mut d = DraftRecord::new("camaron", "ana");
    d.codigo = "C1".into();
    d.lote = "L1".into();
    d
}

#[tokio::test]
async fn rapid_edits_coalesce_into_one_save() {
    let h = harness();
    let mut d = draft();

    // user types C1, C12, C123 well inside the debounce window
    for code in ["C1", "C12", "C123"] {
        d.codigo = code.into();
        h.engine.schedule(&d).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.docs.put_count(), 1);
    let stored = h.docs.stored(&d.id).unwrap();
    assert_eq!(stored["codigo"], "C123");
    assert_eq!(h.engine.status().state, SaveState::Saved);
}

#[tokio::test]
async fn backup_exists_at_the_moment_of_the_remote_write() {
    let h = harness();
    let seen = Arc::new(AtomicBool::new(false));
    {
        let local = h.local.clone();
        let seen = seen.clone();
        h.docs.set_put_probe(Box::new(move || {
            use loteqc::LocalStore;
            if local.get(loteqc::store::BACKUP_SLOT_KEY).unwrap().is_some() {
                seen.store(true, Ordering::SeqCst);
            }
        }));
    }
    h.engine.force_save(&draft()).await.unwrap();
    assert!(seen.load(Ordering::SeqCst));
}

#[tokio::test]
async fn backup_cleared_on_success() {
    let h = harness();
    h.engine.force_save(&draft()).await.unwrap();
    assert!(h.engine.recover().unwrap().is_none());
}

#[tokio::test]
async fn backup_retained_on_failure_with_attempted_payload() {
    let h = harness();
    let d = draft();
    h.docs.fail_next_put("network down");

    let err = h.engine.force_save(&d).await.unwrap_err();
    assert!(err.is_transient());

    let recovered = h.engine.recover().unwrap().expect("backup must survive");
    assert_eq!(recovered, normalized_payload(&d).unwrap());

    let status = h.engine.status();
    assert_eq!(status.state, SaveState::Error);
    assert!(status.last_saved.is_none());
    assert!(status.error.as_deref().unwrap().contains("network down"));
}

#[tokio::test]
async fn failed_save_still_schedules_on_next_edit() {
    let h = harness();
    let mut d = draft();
    h.docs.fail_next_put("blip");
    let _ = h.engine.force_save(&d).await;

    // unrelated field edit; baseline never advanced, so this is dirty
    d.talla = "M".into();
    assert!(h.engine.schedule(&d).unwrap());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(h.docs.stored(&d.id).unwrap()["talla"], "M");
    assert!(h.engine.recover().unwrap().is_none());
}

#[tokio::test]
async fn first_write_creates_then_merges() {
    let h = harness();
    let mut d = draft();
    h.engine.force_save(&d).await.unwrap();
    assert_eq!((h.docs.put_count(), h.docs.merge_count()), (1, 0));

    d.talla = "L".into();
    h.engine.force_save(&d).await.unwrap();
    assert_eq!((h.docs.put_count(), h.docs.merge_count()), (1, 1));
}

#[tokio::test]
async fn guard_blocks_without_identity_or_during_upload() {
    let h = harness();
    let mut d = draft();
    d.codigo.clear();
    assert!(!h.engine.schedule(&d).unwrap());
    assert!(!h.engine.force_save(&d).await.unwrap());

    let d = draft();
    h.tracker.begin("analisis.0.fotoCalidad");
    assert!(!h.engine.schedule(&d).unwrap());
    assert!(!h.engine.force_save(&d).await.unwrap());
    h.tracker.end("analisis.0.fotoCalidad");
    assert!(h.engine.schedule(&d).unwrap());

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(h.docs.put_count(), 1);
}

#[tokio::test]
async fn opening_an_existing_record_does_not_save_on_mount() {
    let h = harness();
    let d = draft();
    h.engine.adopt_baseline(&d).unwrap();
    assert!(!h.engine.schedule(&d).unwrap());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(h.docs.put_count() + h.docs.merge_count(), 0);
}

#[tokio::test]
async fn recover_discards_version_mismatch() {
    let h = harness();
    let d = draft();
    h.docs.fail_next_put("down");
    let _ = h.engine.force_save(&d).await;

    // same slot, read back by an engine running a newer schema
    let newer = AutoSaveEngine::new(
        Arc::new(PersistenceGateway::new(h.docs.clone())),
        h.local.clone(),
        h.tracker.clone(),
        AutoSaveConfig {
            schema_version: 2,
            ..Default::default()
        },
    );
    assert!(newer.recover().unwrap().is_none());
    // and the stale snapshot was deleted, not left around
    assert!(h.engine.recover().unwrap().is_none());
}

#[tokio::test]
async fn recover_discards_snapshots_past_retention() {
    use loteqc::{BackupSnapshot, LocalStore};
    let h = harness();
    let mut snapshot = BackupSnapshot::new(1, serde_json::json!({"codigo": "C1"}));
    snapshot.timestamp = chrono::Utc::now() - chrono::Duration::hours(25);
    h.local
        .set(
            loteqc::store::BACKUP_SLOT_KEY,
            &serde_json::to_string(&snapshot).unwrap(),
        )
        .unwrap();
    assert!(h.engine.recover().unwrap().is_none());
}

#[tokio::test]
async fn reverting_to_the_baseline_cancels_the_pending_save() {
    let h = harness();
    let mut d = draft();
    h.engine.adopt_baseline(&d).unwrap();

    // user types C2, then deletes it again inside the debounce window
    d.codigo = "C2".into();
    assert!(h.engine.schedule(&d).unwrap());
    d.codigo = "C1".into();
    assert!(!h.engine.schedule(&d).unwrap());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.docs.put_count() + h.docs.merge_count(), 0);
    assert_eq!(h.engine.status().state, SaveState::Idle);
}

#[tokio::test]
async fn stale_timer_never_races_a_forced_save() {
    let h = harness();
    let d = draft();
    h.engine.schedule(&d).unwrap();
    h.engine.force_save(&d).await.unwrap();

    // if the debounced task still ran it would consume this failure, end in
    // Error and leave a backup snapshot behind
    h.docs.fail_next_put("late write");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.docs.put_count() + h.docs.merge_count(), 1);
    assert_eq!(h.engine.status().state, SaveState::Saved);
    assert!(h.engine.recover().unwrap().is_none());
}

#[tokio::test]
async fn force_save_supersedes_a_pending_debounce() {
    let h = harness_with(AutoSaveConfig {
        debounce: Duration::from_millis(60),
        ..Default::default()
    });
    let d = draft();
    h.engine.schedule(&d).unwrap();
    h.engine.force_save(&d).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    // the debounced task dropped out; only the forced write landed
    assert_eq!(h.docs.put_count() + h.docs.merge_count(), 1);
}
