use crate::cache::entry::CacheEntry;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

/// Cache entries in most-recently-used order.
///
/// Unbounded unless a capacity is given, in which case idle entries are
/// evicted from the least recently used end.
#[derive(Debug)]
pub struct CacheManager {
    entries: Mutex<VecDeque<Arc<CacheEntry>>>,
    capacity: Option<usize>,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CacheManager {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<CacheEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The entry for `url` (fragment ignored), created on a miss. Either way
    /// it moves to the front.
    pub fn get_cache(&self, url: &Url) -> Arc<CacheEntry> {
        let mut key = url.clone();
        key.set_fragment(None);

        let mut entries = self.lock();
        if let Some(pos) = entries.iter().position(|e| e.url() == &key) {
            if let Some(entry) = entries.remove(pos) {
                entries.push_front(Arc::clone(&entry));
                return entry;
            }
        }

        tracing::trace!(url = %key, total = entries.len() + 1, "new cache entry");
        let entry = CacheEntry::new(key);
        entries.push_front(Arc::clone(&entry));
        if let Some(capacity) = self.capacity {
            evict(&mut entries, capacity);
        }
        entry
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every idle entry.
    pub fn clear(&self) {
        self.lock().retain(|e| e.is_busy());
    }
}

fn evict(entries: &mut VecDeque<Arc<CacheEntry>>, capacity: usize) {
    let mut i = entries.len();
    while entries.len() > capacity && i > 1 {
        i -= 1;
        if !entries[i].is_busy() {
            if let Some(entry) = entries.remove(i) {
                tracing::debug!(url = %entry.url(), "evicted cache entry");
            }
        }
    }
}
