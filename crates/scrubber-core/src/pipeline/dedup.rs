//! Content dedup cache.
//!
//! Each content hash owns an async slot. A worker claims the slot before
//! deciding whether to transform, so two jobs with identical content in the
//! same session serialize on the hash: the first runs the transform and
//! publishes, the second wakes up, sees the published output and returns
//! without transforming. The map lock only covers finding or inserting the
//! slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{PipelineError, PipelineResult};
use crate::types::OutputRef;

type Slot = Arc<AsyncMutex<Option<OutputRef>>>;

/// Content-hash → output mapping for one session.
#[derive(Debug, Default)]
pub struct DedupCache {
    entries: Mutex<HashMap<String, Slot>>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking peek at a published output.
    ///
    /// Returns `None` on a miss and while another worker is still working on
    /// the hash.
    pub fn lookup(&self, hash: &str) -> Option<OutputRef> {
        let slot = self.lock().get(hash).cloned()?;
        let published = slot.try_lock().ok()?;
        published.clone()
    }

    /// Take exclusive ownership of `hash` until the claim is dropped.
    ///
    /// Waits while another worker holds the claim. Dropping a claim without
    /// publishing (the transform failed) leaves the hash a miss for the next
    /// waiter.
    pub async fn claim(&self, hash: &str) -> DedupClaim {
        let slot = self.lock().entry(hash.to_string()).or_default().clone();
        let guard = slot.lock_owned().await;
        DedupClaim {
            hash: hash.to_string(),
            guard,
        }
    }

    /// Number of hashes seen by this cache (published or not).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Exclusive right to resolve one content hash.
pub struct DedupClaim {
    hash: String,
    guard: OwnedMutexGuard<Option<OutputRef>>,
}

impl DedupClaim {
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Output published by an earlier claim, if any.
    pub fn existing(&self) -> Option<&OutputRef> {
        self.guard.as_ref()
    }

    /// Record the output for this hash and release the claim.
    ///
    /// Publishing over an existing entry means two transforms ran for the
    /// same content; that is reported as [`PipelineError::CacheRace`].
    pub fn publish(mut self, output: OutputRef) -> PipelineResult<OutputRef> {
        if let Some(existing) = self.guard.as_ref() {
            tracing::error!(
                hash = %self.hash,
                existing = %existing.location,
                rejected = %output.location,
                "Dedup cache already holds an output for this content"
            );
            return Err(PipelineError::CacheRace { hash: self.hash });
        }
        *self.guard = Some(output.clone());
        Ok(output)
    }
}
