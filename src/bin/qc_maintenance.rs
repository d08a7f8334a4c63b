//! Maintenance tool: re-asserts the public-read permission on every photo of
//! a record, or of all records of a date, sequentially with a fixed delay
//! between calls so the photo store's rate limits are never tripped.

use anyhow::{Context, bail};
use clap::Parser;
use loteqc::store::drive::file_id_from_url;
use loteqc::store::memory::MemoryDocumentStore;
use loteqc::{
    DocumentStore, DriveStore, FirestoreStore, PersistenceGateway, PhotoStore,
    StaticTokenProvider,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "qc-maintenance", about = "Refresh public-read permissions on record photos")]
struct Args {
    /// Record id to refresh. Mutually exclusive with --date.
    record_id: Option<String>,

    /// Refresh every record of this date (YYYY-MM-DD).
    #[arg(long, conflicts_with = "record_id")]
    date: Option<chrono::NaiveDate>,

    /// Firestore project id.
    #[arg(long, env = "LOTEQC_PROJECT")]
    project: Option<String>,

    /// Firestore collection holding the records.
    #[arg(long, default_value = "registros")]
    collection: String,

    /// Bearer token for both stores.
    #[arg(long, env = "LOTEQC_TOKEN")]
    token: Option<String>,

    /// Delay between permission calls, in milliseconds.
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,

    /// Run against in-memory fakes instead of the hosted stores.
    #[arg(long, hide = true)]
    dry_run: bool,
}

fn photo_file_ids(doc: &Value) -> Vec<String> {
    let mut ids = Vec::new();
    let mut collect = |url: Option<&Value>| {
        if let Some(url) = url.and_then(Value::as_str)
            && let Some(id) = file_id_from_url(url)
        {
            ids.push(id);
        }
    };
    for entry in doc.get("analisis").and_then(Value::as_array).into_iter().flatten() {
        collect(entry.get("fotoCalidad"));
        for peso in entry.get("pesos").and_then(Value::as_array).into_iter().flatten() {
            collect(peso.get("foto"));
        }
    }
    ids
}

async fn refresh_record(
    doc: &Value,
    photos: &dyn PhotoStore,
    delay: Duration,
) -> anyhow::Result<usize> {
    let record_id = doc.get("id").and_then(Value::as_str).unwrap_or("<sin id>");
    let ids = photo_file_ids(doc);
    for file_id in &ids {
        photos
            .set_public_read_permission(file_id)
            .await
            .with_context(|| format!("refreshing '{file_id}' of record '{record_id}'"))?;
        tokio::time::sleep(delay).await;
    }
    println!("{record_id}: {} foto(s) refreshed", ids.len());
    Ok(ids.len())
}

async fn run<D: DocumentStore>(
    args: &Args,
    gateway: &PersistenceGateway<D>,
    photos: &dyn PhotoStore,
) -> anyhow::Result<()> {
    let delay = Duration::from_millis(args.delay_ms);
    let mut total = 0usize;

    if let Some(record_id) = &args.record_id {
        let doc = gateway
            .get_raw(record_id)
            .await?
            .with_context(|| format!("record '{record_id}' not found"))?;
        total += refresh_record(&doc, photos, delay).await?;
    } else if let Some(date) = args.date {
        let mut cursor = None;
        loop {
            let page = gateway
                .query(&loteqc::RecordQuery {
                    date: Some(date),
                    limit: 50,
                    cursor: cursor.clone(),
                    ..Default::default()
                })
                .await?;
            for doc in &page.records {
                total += refresh_record(doc, photos, delay).await?;
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
    } else {
        bail!("pass a record id or --date YYYY-MM-DD");
    }

    println!("done: {total} permission(s) re-asserted");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.dry_run {
        let gateway = PersistenceGateway::new(Arc::new(MemoryDocumentStore::new()));
        let photos = loteqc::store::memory::MemoryPhotoStore::new();
        return run(&args, &gateway, &photos).await;
    }

    let token = args
        .token
        .clone()
        .context("--token or LOTEQC_TOKEN is required")?;
    let project = args
        .project
        .clone()
        .context("--project or LOTEQC_PROJECT is required")?;
    let tokens = Arc::new(StaticTokenProvider::new(token));
    let gateway = PersistenceGateway::new(Arc::new(FirestoreStore::new(
        tokens.clone(),
        project,
        args.collection.clone(),
    )));
    let photos = DriveStore::new(tokens);
    run(&args, &gateway, &photos).await
}
