//! Per-type serialization of tier updates

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async mutexes keyed by type row id.
///
/// Every implementation and deployment row belongs to exactly one type, so
/// two updates that share any tier row share the type row. Holding the type
/// lock for the read-modify-write therefore serializes every pair of
/// conflicting updates while unrelated types proceed in parallel.
#[derive(Debug, Default)]
pub struct TierLocks {
    slots: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl TierLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the lineage rooted at `type_id`.
    pub async fn lock(&self, type_id: i64) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(type_id).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of type rows seen so far.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
