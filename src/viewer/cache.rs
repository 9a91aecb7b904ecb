//! LRU cache of rendered pages

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::decode::Raster;

use super::session::HandleId;

/// Cache key for a rendered page
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub handle: HandleId,
    /// Page number (1-based)
    pub page: usize,
    /// Scale factor (stored as millionths for stable hashing)
    pub scale_millionths: u32,
}

impl CacheKey {
    #[must_use]
    pub fn new(handle: HandleId, page: usize, scale: f32) -> Self {
        Self {
            handle,
            page,
            scale_millionths: (scale * 1_000_000.0).round() as u32,
        }
    }
}

/// LRU cache shared between the scheduler and its worker
pub struct PageCache {
    cache: LruCache<CacheKey, Arc<Raster>>,
}

impl PageCache {
    /// Create a cache holding up to `capacity` rasters (at least one)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached raster, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<Raster>> {
        self.cache.get(key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    pub fn insert(&mut self, key: CacheKey, raster: Arc<Raster>) {
        self.cache.put(key, raster);
    }

    /// Drop every raster belonging to `handle`
    pub fn invalidate_handle(&mut self, handle: HandleId) {
        let keys: Vec<_> = self
            .cache
            .iter()
            .filter(|(k, _)| k.handle == handle)
            .map(|(k, _)| k.clone())
            .collect();

        for key in keys {
            self.cache.pop(&key);
        }
    }

    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(fill: u8) -> Arc<Raster> {
        Arc::new(Raster::new(vec![fill; 12], 2, 2).unwrap())
    }

    #[test]
    fn insert_and_get() {
        let mut cache = PageCache::new(4);
        let key = CacheKey::new(HandleId(1), 3, 1.5);
        cache.insert(key.clone(), raster(3));

        assert!(cache.contains(&key));
        assert_eq!(cache.get(&key).unwrap().pixels()[0], 3);
        assert!(!cache.contains(&CacheKey::new(HandleId(1), 3, 1.6)));
    }

    #[test]
    fn lru_eviction() {
        let mut cache = PageCache::new(2);
        for page in 1..=3 {
            cache.insert(CacheKey::new(HandleId(1), page, 1.0), raster(page as u8));
        }

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&CacheKey::new(HandleId(1), 1, 1.0)));
        assert!(cache.contains(&CacheKey::new(HandleId(1), 3, 1.0)));
    }

    #[test]
    fn invalidate_handle_keeps_other_documents() {
        let mut cache = PageCache::new(8);
        cache.insert(CacheKey::new(HandleId(1), 1, 1.0), raster(1));
        cache.insert(CacheKey::new(HandleId(1), 2, 1.0), raster(2));
        let other = CacheKey::new(HandleId(2), 1, 1.0);
        cache.insert(other.clone(), raster(9));

        cache.invalidate_handle(HandleId(1));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&other));

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_holds_one() {
        assert_eq!(PageCache::new(0).capacity(), 1);
    }
}
