//! # Bounded LRU
//!
//! An owned least-recently-used map: a hash index over an arena of nodes that
//! are threaded into a doubly-linked recency list. The head is the most
//! recently touched entry, the tail is the next eviction victim.
//!
//! The structure is not synchronised. [`MemoryCache`](super::MemoryCache)
//! wraps it in a mutex.

use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

pub struct LruMap<K, V> {
    index: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    head: usize,
    tail: usize,
    capacity: usize,
}

impl<K: Hash + Eq + Clone, V> LruMap<K, V> {
    /// Creates an empty map holding at most `capacity` entries.
    ///
    pub fn new(capacity: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Looks up `key` and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.move_to_front(slot);
        Some(&self.nodes[slot].value)
    }

    /// Inserts or refreshes `key`. Returns the evicted key, if any.
    ///
    /// A zero-capacity map stores nothing and hands `key` straight back.
    pub fn put(&mut self, key: K, value: V) -> Option<K> {
        if self.capacity == 0 {
            return Some(key);
        }
        if let Some(&slot) = self.index.get(&key) {
            self.nodes[slot].value = value;
            self.move_to_front(slot);
            return None;
        }

        if self.nodes.len() < self.capacity {
            let slot = self.nodes.len();
            self.nodes.push(Node {
                key: key.clone(),
                value,
                prev: NIL,
                next: NIL,
            });
            self.index.insert(key, slot);
            self.push_front(slot);
            return None;
        }

        // Full: recycle the tail slot for the new entry.
        let slot = self.tail;
        self.unlink(slot);
        let node = &mut self.nodes[slot];
        let evicted = std::mem::replace(&mut node.key, key.clone());
        node.value = value;
        self.index.remove(&evicted);
        self.index.insert(key, slot);
        self.push_front(slot);
        Some(evicted)
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while cursor != NIL {
            keys.push(self.nodes[cursor].key.clone());
            cursor = self.nodes[cursor].next;
        }
        keys
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == slot {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
        self.nodes[slot].prev = NIL;
        self.nodes[slot].next = NIL;
    }

    fn push_front(&mut self, slot: usize) {
        self.nodes[slot].prev = NIL;
        self.nodes[slot].next = self.head;
        if self.head != NIL {
            self.nodes[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_inserted() {
        let mut lru = LruMap::new(2);
        assert_eq!(lru.put("a", 1), None);
        assert_eq!(lru.put("b", 2), None);
        assert_eq!(lru.put("c", 3), Some("a"));
        assert!(!lru.contains(&"a"));
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let mut lru = LruMap::new(2);
        lru.put("a", 1);
        lru.put("b", 2);
        assert_eq!(lru.get(&"a"), Some(&1));
        assert_eq!(lru.put("c", 3), Some("b"));
        assert_eq!(lru.keys_by_recency(), vec!["c", "a"]);
    }

    #[test]
    fn test_put_existing_key_overwrites_without_eviction() {
        let mut lru = LruMap::new(2);
        lru.put("a", 1);
        lru.put("b", 2);
        assert_eq!(lru.put("a", 10), None);
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.get(&"a"), Some(&10));
        assert_eq!(lru.keys_by_recency(), vec!["a", "b"]);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut lru = LruMap::new(0);
        assert_eq!(lru.put(1, "x"), Some(1));
        assert_eq!(lru.put(2, "y"), Some(2));
        assert!(lru.is_empty());
        assert_eq!(lru.get(&1), None);
        assert!(lru.keys_by_recency().is_empty());
    }

    #[test]
    fn test_capacity_one() {
        let mut lru = LruMap::new(1);
        lru.put(1, "x");
        assert_eq!(lru.put(2, "y"), Some(1));
        assert_eq!(lru.get(&2), Some(&"y"));
        assert_eq!(lru.get(&1), None);
    }

    #[test]
    fn test_long_churn_keeps_size_bounded() {
        let mut lru = LruMap::new(8);
        for i in 0..1_000u32 {
            lru.put(i, i * 2);
            if i % 3 == 0 {
                let _ = lru.get(&(i / 2));
            }
        }
        assert_eq!(lru.len(), 8);
        assert_eq!(lru.keys_by_recency().len(), 8);
        assert_eq!(lru.get(&999), Some(&1998));
    }
}
