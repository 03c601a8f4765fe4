//! Trial window caching
//!
//! Filtering a block is the slow step of an extraction, so windows are kept
//! per `(epoch, offset, duration)` and reused until cleared.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::filter::TrialWindows;
use crate::DataError;

/// Cache key: epoch name plus the exact bit patterns of offset and duration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    epoch: String,
    from_offset: u64,
    duration: u64,
}

impl WindowKey {
    pub fn new(epoch: &str, from_offset: f64, duration: f64) -> Self {
        Self {
            epoch: epoch.to_string(),
            from_offset: from_offset.to_bits(),
            duration: duration.to_bits(),
        }
    }
}

/// Cache of filtered trial windows
#[derive(Default)]
pub struct WindowCache {
    windows: Arc<RwLock<AHashMap<WindowKey, Arc<TrialWindows>>>>,
}

impl WindowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &WindowKey) -> Option<Arc<TrialWindows>> {
        self.windows.read().get(key).cloned()
    }

    /// Return the cached windows for `key`, computing them with `f` on a miss
    pub fn get_or_try_insert_with<F>(&self, key: WindowKey, f: F) -> Result<Arc<TrialWindows>, DataError>
    where
        F: FnOnce() -> Result<TrialWindows, DataError>,
    {
        if let Some(windows) = self.get(&key) {
            return Ok(windows);
        }
        let windows = Arc::new(f()?);
        self.windows.write().insert(key, windows.clone());
        Ok(windows)
    }

    pub fn len(&self) -> usize {
        self.windows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.read().is_empty()
    }

    /// Clear the cache
    pub fn clear(&self) {
        self.windows.write().clear();
    }
}
