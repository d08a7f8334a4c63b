pub mod config;
pub mod error;
pub mod types;

pub use config::{AutoSaveConfig, PhotoConfig, RetryPolicy};
pub use error::{QcError, Result};
pub use types::{
    AccessToken, AnalysisEntry, BackupSnapshot, DraftRecord, PhotoField, RecordStatus, Shift,
    WeightMeasurement,
};
