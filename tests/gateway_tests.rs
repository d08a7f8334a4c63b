use loteqc::store::memory::MemoryDocumentStore;
use loteqc::{DraftRecord, PersistenceGateway, RecordStatus, Shift};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

fn record(id: &str, codigo: &str, shift: Shift, day: u32) -> DraftRecord {
    let mut d = DraftRecord::new("camaron", "ana");
    d.id = id.into();
    d.codigo = codigo.into();
    d.lote = format!("L-{codigo}");
    d.turno = shift;
    d.updated_at = Utc.with_ymd_and_hms(2026, 8, day, 10, 0, 0).unwrap();
    d
}

async fn seeded() -> PersistenceGateway<MemoryDocumentStore> {
    let gateway = PersistenceGateway::new(Arc::new(MemoryDocumentStore::new()));
    for d in [
        record("r1", "C100", Shift::Manana, 20),
        record("r2", "C200", Shift::Tarde, 20),
        record("r3", "C110", Shift::Manana, 21),
    ] {
        gateway.save(&d).await.unwrap();
    }
    gateway
}

#[tokio::test]
async fn filter_by_exact_date() {
    let gateway = seeded().await;
    let page = gateway
        .query_by_date(chrono::NaiveDate::from_ymd_opt(2026, 8, 20).unwrap())
        .await
        .unwrap();
    assert_eq!(page.records.len(), 2);
}

#[tokio::test]
async fn filter_by_date_and_shift() {
    let gateway = seeded().await;
    let page = gateway
        .query_by_date_and_shift(
            chrono::NaiveDate::from_ymd_opt(2026, 8, 20).unwrap(),
            Shift::Manana,
        )
        .await
        .unwrap();
    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0]["id"], "r1");
}

#[tokio::test]
async fn prefix_search_hits_codigo_and_lote() {
    let gateway = seeded().await;
    let page = gateway.search_prefix("C1", 10).await.unwrap();
    assert_eq!(page.records.len(), 2);

    // lote fields are prefixed L-; search matches those too
    let page = gateway.search_prefix("L-C2", 10).await.unwrap();
    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0]["id"], "r2");
}

#[tokio::test]
async fn status_page_walks_with_cursor() {
    let gateway = seeded().await;
    let first = gateway
        .query_by_status_page(RecordStatus::InProgress, 2, None)
        .await
        .unwrap();
    assert_eq!(first.records.len(), 2);
    let second = gateway
        .query_by_status_page(RecordStatus::InProgress, 2, first.next_cursor)
        .await
        .unwrap();
    assert_eq!(second.records.len(), 1);
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
async fn completed_records_filtered_from_in_progress_page() {
    let gateway = seeded().await;
    let mut done = record("r4", "C300", Shift::Noche, 22);
    done.complete();
    gateway.save(&done).await.unwrap();

    let page = gateway
        .query_by_status_page(RecordStatus::Completed, 10, None)
        .await
        .unwrap();
    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0]["id"], "r4");
}
