//! Read-path recovery for previously-uploaded photos.
//!
//! The photo store propagates public-read permissions lazily, so an image
//! can 403 for a while right after upload. Instead of counters buried in
//! render handlers, a [`DisplayRetry`] object owns the per-field attempt
//! counts and a [`crate::core::RetryPolicy`] decides the bounds and backoff.

use crate::core::RetryPolicy;
use crate::photos::preview::is_preview_url;
use crate::store::PhotoStore;
use crate::store::drive::{alternate_content_url, content_url, file_id_from_url, viewer_url};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// What the display layer should do after an image failed to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayAdvice {
    /// Preview URLs are single-session; once broken there is nothing to
    /// retry. Show the "expired, retake" state.
    Expired,
    /// Try the alternate URL form for the same file id after the delay.
    TryAlternate { url: String, delay: Duration },
    /// Re-assert the public-read permission on the file, then retry the
    /// primary URL after the (longer) delay.
    ReassertAndRetry {
        file_id: String,
        url: String,
        delay: Duration,
    },
    /// Retries exhausted (or no session to re-assert with). Permanent
    /// display error; offer the direct link into the store's own UI.
    GiveUp { viewer_url: Option<String> },
}

pub struct DisplayRetry {
    policy: RetryPolicy,
    attempts: Mutex<HashMap<String, u32>>,
}

impl DisplayRetry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// A successful load clears the error state for the field.
    pub fn on_load_success(&self, field_key: &str) {
        self.attempts.lock().unwrap().remove(field_key);
    }

    /// Called when the image at `url` failed to load in `field_key`.
    /// Each call consumes one attempt.
    pub fn advise(&self, field_key: &str, url: &str, authenticated: bool) -> DisplayAdvice {
        if is_preview_url(url) {
            return DisplayAdvice::Expired;
        }
        let Some(file_id) = file_id_from_url(url) else {
            // Not a store URL either; nothing we know how to recover.
            return DisplayAdvice::GiveUp { viewer_url: None };
        };

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(field_key.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };

        if attempt > self.policy.max_attempts {
            return DisplayAdvice::GiveUp {
                viewer_url: Some(viewer_url(&file_id)),
            };
        }
        if attempt == 1 {
            return DisplayAdvice::TryAlternate {
                url: alternate_content_url(&file_id),
                delay: self.policy.backoff(attempt),
            };
        }
        if !authenticated {
            return DisplayAdvice::GiveUp {
                viewer_url: Some(viewer_url(&file_id)),
            };
        }
        DisplayAdvice::ReassertAndRetry {
            url: content_url(&file_id),
            // Longer wait: the permission grant itself needs to propagate.
            delay: self.policy.backoff(attempt + 1),
            file_id,
        }
    }

    /// Applies one piece of advice: waits out the delay, re-asserts the
    /// permission when asked to, and returns the URL to load next (or `None`
    /// when the field is done for).
    pub async fn apply(&self, advice: DisplayAdvice, photos: &dyn PhotoStore) -> Option<String> {
        match advice {
            DisplayAdvice::Expired | DisplayAdvice::GiveUp { .. } => None,
            DisplayAdvice::TryAlternate { url, delay } => {
                tokio::time::sleep(delay).await;
                Some(url)
            }
            DisplayAdvice::ReassertAndRetry { file_id, url, delay } => {
                if let Err(e) = photos.set_public_read_permission(&file_id).await {
                    log::warn!("permission re-assert failed for '{}': {}", file_id, e);
                }
                tokio::time::sleep(delay).await;
                Some(url)
            }
        }
    }
}
