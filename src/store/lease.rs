use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::WatchKey;

/// Held for the duration of one check cycle or registration on a key.
pub type Lease = OwnedMutexGuard<()>;

/// Per-key mutual exclusion for watch mutations. Distinct keys never contend.
#[derive(Debug, Default)]
pub struct KeyedLeases {
    slots: Mutex<HashMap<WatchKey, Arc<AsyncMutex<()>>>>,
}

impl KeyedLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder has `key`. The lease is released on drop,
    /// including when the holding future is cancelled.
    pub async fn acquire(&self, key: &WatchKey) -> Lease {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            // Drop slots nobody holds or waits on
            slots.retain(|k, slot| k == key || Arc::strong_count(slot) > 1);
            slots.entry(key.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub fn is_held(&self, key: &WatchKey) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .get(key)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }
}
