//! Recency order for cache eviction.
//!
//! Tracks block handles from least to most recently touched. Unlike a
//! capacity-bounded LRU, this order never evicts on its own: the block cache
//! decides what may leave (resident, no dependents, not the newest) and asks
//! the order for candidates oldest first.

use std::collections::VecDeque;

use crate::arena::Handle;

/// Recency order, most recently used at the back.
#[derive(Debug, Default)]
pub struct LruOrder {
    entries: VecDeque<Handle>,
}

impl LruOrder {
    /// Create an empty order.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Record an access for a handle.
    pub fn touch(&mut self, handle: Handle) {
        // Remove existing entry if present
        self.entries.retain(|&h| h != handle);

        // Add at the back (most recently used)
        self.entries.push_back(handle);
    }

    /// Forget a handle.
    pub fn remove(&mut self, handle: Handle) {
        self.entries.retain(|&h| h != handle);
    }

    /// Most recently touched handle.
    pub fn newest(&self) -> Option<Handle> {
        self.entries.back().copied()
    }

    /// Handles from least to most recently touched.
    pub fn oldest_first(&self) -> impl Iterator<Item = Handle> + '_ {
        self.entries.iter().copied()
    }

    /// Drop every handle.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the order is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn test_lru_basic() {
        let mut arena = Arena::new();
        let handles: Vec<Handle> = (0..3).map(|i| arena.insert(i)).collect();
        let mut lru = LruOrder::new();
        assert!(lru.is_empty());

        for &h in &handles {
            lru.touch(h);
        }
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.newest(), Some(handles[2]));
        assert_eq!(lru.oldest_first().next(), Some(handles[0]));
    }

    #[test]
    fn test_lru_touch_existing() {
        let mut arena = Arena::new();
        let a = arena.insert(());
        let b = arena.insert(());
        let mut lru = LruOrder::new();
        lru.touch(a);
        lru.touch(b);
        lru.touch(a); // Touch again, should move to back
        assert_eq!(lru.len(), 2); // No duplicate
        assert_eq!(lru.oldest_first().collect::<Vec<_>>(), vec![b, a]);
    }

    #[test]
    fn test_remove() {
        let mut arena = Arena::new();
        let a = arena.insert(());
        let b = arena.insert(());
        let mut lru = LruOrder::new();
        lru.touch(a);
        lru.touch(b);
        lru.remove(b);
        assert_eq!(lru.newest(), Some(a));
        lru.clear();
        assert!(lru.is_empty());
    }
}
