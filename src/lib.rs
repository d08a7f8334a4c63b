// ============================================================================
// loteqc: persistence core for the plant's quality-control data entry
// ============================================================================

pub mod auth;
pub mod autosave;
pub mod core;
pub mod gateway;
pub mod photos;
pub mod report;
pub mod store;
pub mod web;

// Re-export main types for convenience
pub use auth::{StaticTokenProvider, TokenProvider};
pub use autosave::{AutoSaveEngine, SaveHook, SaveState, SaveStatus, UploadTracker};
pub use crate::core::{
    AccessToken, AnalysisEntry, AutoSaveConfig, BackupSnapshot, DraftRecord, PhotoConfig,
    PhotoField, QcError, RecordStatus, Result, RetryPolicy, Shift, WeightMeasurement,
};
pub use gateway::PersistenceGateway;
pub use photos::retry::{DisplayAdvice, DisplayRetry};
pub use photos::{PhotoFile, PhotoUploadPipeline};
pub use store::drive::DriveStore;
pub use store::firestore::FirestoreStore;
pub use store::local::FileLocalStore;
pub use store::{DocumentStore, LocalStore, PhotoStore, QueryPage, RecordQuery, StoredPhoto};
