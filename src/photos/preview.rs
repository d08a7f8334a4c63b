//! Optimistic local previews.
//!
//! A preview URL is an ownership loan from the allocator and must be
//! released exactly once. [`PreviewLease`] makes that structural: release
//! happens on drop, so every exit path of `capture` (success, rollback,
//! early abort) releases once and nothing can release twice.

use crate::core::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const PREVIEW_SCHEME: &str = "preview:";

/// Single-session local URL that cannot be recovered once it fails to load.
pub fn is_preview_url(url: &str) -> bool {
    url.starts_with(PREVIEW_SCHEME)
}

pub trait PreviewAllocator: Send + Sync {
    /// Allocates a local URL rendering `bytes` immediately, before any
    /// network round trip.
    fn allocate(&self, name: &str, bytes: &[u8]) -> Result<String>;

    fn release(&self, url: &str);
}

/// Loan of one preview URL. Dropping it releases the URL.
pub struct PreviewLease {
    allocator: Arc<dyn PreviewAllocator>,
    url: String,
}

impl PreviewLease {
    pub fn allocate(
        allocator: Arc<dyn PreviewAllocator>,
        name: &str,
        bytes: &[u8],
    ) -> Result<Self> {
        let url = allocator.allocate(name, bytes)?;
        Ok(Self { allocator, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for PreviewLease {
    fn drop(&mut self) {
        self.allocator.release(&self.url);
    }
}

/// In-memory allocator; the production UI shell supplies the real one.
/// Tracks live URLs so tests can assert the no-leak/no-double-free
/// invariant.
#[derive(Default)]
pub struct MemoryPreviews {
    live: Mutex<HashSet<String>>,
    allocated: Mutex<u64>,
    released: Mutex<u64>,
}

impl MemoryPreviews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn allocated_count(&self) -> u64 {
        *self.allocated.lock().unwrap()
    }

    pub fn released_count(&self) -> u64 {
        *self.released.lock().unwrap()
    }
}

impl PreviewAllocator for MemoryPreviews {
    fn allocate(&self, name: &str, _bytes: &[u8]) -> Result<String> {
        let url = format!("{PREVIEW_SCHEME}{}/{name}", Uuid::new_v4());
        self.live.lock().unwrap().insert(url.clone());
        *self.allocated.lock().unwrap() += 1;
        Ok(url)
    }

    fn release(&self, url: &str) {
        let was_live = self.live.lock().unwrap().remove(url);
        if was_live {
            *self.released.lock().unwrap() += 1;
        } else {
            // A release for a URL we never handed out (or already released)
            // is exactly the bug the lease exists to prevent.
            log::error!("double release of preview URL '{url}'");
        }
    }
}
