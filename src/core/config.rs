//! Tunable policies. Debounce durations and retry bounds varied between the
//! original call sites, so they are configuration, not contract.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AutoSaveConfig {
    /// Delay after the last mutation before a save is attempted.
    pub debounce: Duration,
    /// Backup snapshots older than this are discarded by recovery.
    pub backup_retention: Duration,
    /// Snapshots written with a different version are discarded by recovery.
    pub schema_version: u32,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(800),
            backup_retention: Duration::from_secs(24 * 60 * 60),
            schema_version: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhotoConfig {
    pub max_bytes: usize,
    /// MIME types accepted for upload.
    pub allowed_mime: Vec<String>,
    /// Accepted but known-problematic formats; capture logs a warning and
    /// proceeds.
    pub warn_mime: Vec<String>,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            allowed_mime: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "image/heic".to_string(),
                "image/tiff".to_string(),
            ],
            warn_mime: vec!["image/heic".to_string(), "image/tiff".to_string()],
        }
    }
}

/// Bounded-retry policy for the photo display read path.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(400),
            max_jitter: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    /// Jittered backoff for the given attempt (1-based). Later attempts wait
    /// longer; the jitter spreads simultaneous clients apart.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.saturating_mul(attempt.max(1));
        let jitter_ms = if self.max_jitter.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..self.max_jitter.as_millis() as u64)
        };
        base + Duration::from_millis(jitter_ms)
    }
}
