//! Page-window cache with explicit invalidation
//!
//! Stores one value per page number (1-based), keeping only the pages that lie
//! within `window` pages of the current page. Moving the current page evicts
//! everything that falls outside the new window. Reloading the document bumps
//! the cache generation, so values produced by page loads that were started
//! before the reload can be recognised and dropped.

use std::collections::BTreeMap;

/// Generation counter, bumped on every invalidation
///
/// Page loads capture the generation when they start and hand it back on
/// insert; inserts from an older generation are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CacheGeneration(pub u64);

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of pages currently cached
    pub page_count: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of pages evicted because they left the window
    pub evictions: u64,

    /// Number of inserts rejected (outside window or stale generation)
    pub rejected: u64,

    /// Number of full invalidations
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded cache keyed by page number
///
/// # Example
///
/// ```
/// use pdf_annotator_cache::PageWindowCache;
///
/// let mut cache: PageWindowCache<&str> = PageWindowCache::new(1);
/// let generation = cache.generation();
///
/// cache.set_current_page(5);
/// assert!(cache.insert(generation, 4, "page four"));
/// assert!(!cache.insert(generation, 9, "too far away"));
///
/// cache.set_current_page(8);
/// assert!(cache.get(4).is_none());
/// ```
#[derive(Debug)]
pub struct PageWindowCache<V> {
    /// Cached values by page number
    pages: BTreeMap<u32, V>,

    /// Page the window is centred on
    current_page: u32,

    /// Number of pages retained on each side of the current page
    window: u32,

    /// Current generation
    generation: CacheGeneration,

    /// Statistics
    stats: CacheStats,
}

impl<V> PageWindowCache<V> {
    /// Create an empty cache centred on page 1
    pub fn new(window: u32) -> Self {
        Self {
            pages: BTreeMap::new(),
            current_page: 1,
            window,
            generation: CacheGeneration::default(),
            stats: CacheStats::default(),
        }
    }

    /// Page the window is centred on
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Number of pages retained on each side of the current page
    pub fn window(&self) -> u32 {
        self.window
    }

    /// Generation to capture before starting an asynchronous page load
    pub fn generation(&self) -> CacheGeneration {
        self.generation
    }

    /// Whether `page` lies inside the retained window
    pub fn in_window(&self, page: u32) -> bool {
        page.abs_diff(self.current_page) <= self.window
    }

    /// Re-centre the window, evicting pages that fall outside it
    pub fn set_current_page(&mut self, page: u32) {
        self.current_page = page.max(1);
        let before = self.pages.len();
        let (current, window) = (self.current_page, self.window);
        self.pages.retain(|&p, _| p.abs_diff(current) <= window);

        let evicted = before - self.pages.len();
        if evicted > 0 {
            tracing::debug!(current_page = current, evicted, "evicted pages outside window");
        }
        self.stats.evictions += evicted as u64;
        self.stats.page_count = self.pages.len();
    }

    /// Change the window size, evicting pages that no longer fit
    pub fn set_window(&mut self, window: u32) {
        self.window = window;
        self.set_current_page(self.current_page);
    }

    /// Store the value for `page`
    ///
    /// Returns `false` (and stores nothing) when the page is outside the
    /// window or the value was produced for an older generation.
    pub fn insert(&mut self, generation: CacheGeneration, page: u32, value: V) -> bool {
        if generation != self.generation {
            tracing::debug!(page, ?generation, current = ?self.generation, "dropping stale page insert");
            self.stats.rejected += 1;
            return false;
        }
        if !self.in_window(page) {
            self.stats.rejected += 1;
            return false;
        }

        self.pages.insert(page, value);
        self.stats.page_count = self.pages.len();
        true
    }

    /// Look up the value for `page`, recording a hit or miss
    pub fn get(&mut self, page: u32) -> Option<&V> {
        match self.pages.get(&page) {
            Some(value) => {
                self.stats.hits += 1;
                Some(value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Look up the value for `page` without touching statistics
    pub fn peek(&self, page: u32) -> Option<&V> {
        self.pages.get(&page)
    }

    /// Check whether `page` is cached
    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains_key(&page)
    }

    /// Remove a single page
    pub fn remove(&mut self, page: u32) -> Option<V> {
        let removed = self.pages.remove(&page);
        self.stats.page_count = self.pages.len();
        removed
    }

    /// Drop every cached page and start a new generation
    ///
    /// Called when the document is reloaded.
    pub fn invalidate(&mut self) -> CacheGeneration {
        self.pages.clear();
        self.generation = CacheGeneration(self.generation.0 + 1);
        self.stats.invalidations += 1;
        self.stats.page_count = 0;
        tracing::debug!(generation = self.generation.0, "page cache invalidated");
        self.generation
    }

    /// Cached page numbers in ascending order
    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl<V> Default for PageWindowCache<V> {
    /// Create a cache retaining three pages on each side
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut cache = PageWindowCache::new(2);
        let generation = cache.generation();

        assert!(cache.insert(generation, 1, 10));
        assert!(cache.insert(generation, 3, 30));

        assert_eq!(cache.get(1), Some(&10));
        assert_eq!(cache.get(3), Some(&30));
        assert!(cache.get(2).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.page_count, 2);
    }

    #[test]
    fn test_insert_outside_window_is_rejected() {
        let mut cache = PageWindowCache::new(1);
        let generation = cache.generation();

        assert!(!cache.insert(generation, 3, "far"));
        assert!(!cache.contains(3));
        assert_eq!(cache.stats().rejected, 1);
    }

    #[test]
    fn test_moving_window_evicts() {
        let mut cache = PageWindowCache::new(1);
        let generation = cache.generation();
        cache.insert(generation, 1, 'a');
        cache.insert(generation, 2, 'b');

        cache.set_current_page(3);

        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.pages().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_shrinking_window_evicts() {
        let mut cache = PageWindowCache::new(3);
        cache.set_current_page(5);
        let generation = cache.generation();
        for page in 2..=8 {
            assert!(cache.insert(generation, page, page));
        }

        cache.set_window(1);

        assert_eq!(cache.pages().collect::<Vec<_>>(), vec![4, 5, 6]);
    }

    #[test]
    fn test_invalidate_drops_stale_generation() {
        let mut cache = PageWindowCache::new(2);
        let before = cache.generation();
        cache.insert(before, 1, "old");

        let after = cache.invalidate();

        assert!(cache.peek(1).is_none());
        assert_ne!(before, after);
        // A load that began before the reload must not repopulate the cache
        assert!(!cache.insert(before, 1, "stale"));
        assert!(cache.insert(after, 1, "fresh"));
        assert_eq!(cache.peek(1), Some(&"fresh"));
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_current_page_is_clamped_to_one() {
        let mut cache: PageWindowCache<()> = PageWindowCache::new(0);
        cache.set_current_page(0);
        assert_eq!(cache.current_page(), 1);
    }
}
