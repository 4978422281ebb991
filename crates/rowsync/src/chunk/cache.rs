//! Bounded LRU cache for per-table prepared statements.
//!
//! Readers interleave chunks from a handful of tables at a time, so a small
//! cache keyed by table id bounds the number of live server-side prepared
//! statements per worker regardless of how many tables a run configures.
//! Recency is a monotonic counter bumped on every hit; eviction removes the
//! entry with the lowest counter and hands its statements back to the
//! caller, which is responsible for closing them on the server.

/// LRU cache mapping a table id to a prepared-statement set `S`.
#[derive(Debug)]
pub struct StatementCache<S> {
    capacity: usize,
    tick: u64,
    entries: Vec<Entry<S>>,
}

#[derive(Debug)]
struct Entry<S> {
    table_id: usize,
    recency: u64,
    stmts: S,
}

impl<S> StatementCache<S> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: Vec::new(),
        }
    }

    /// Look up a table's statements, bumping recency on a hit.
    pub fn get(&mut self, table_id: usize) -> Option<&S> {
        self.tick += 1;
        let tick = self.tick;
        self.entries
            .iter_mut()
            .find(|e| e.table_id == table_id)
            .map(|e| {
                e.recency = tick;
                &e.stmts
            })
    }

    /// Insert a table's statements, returning the evicted set when full.
    pub fn insert(&mut self, table_id: usize, stmts: S) -> Option<S> {
        self.tick += 1;
        let evicted = if self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.recency)
                .map(|(i, _)| i);
            oldest.map(|i| self.entries.swap_remove(i).stmts)
        } else {
            None
        };
        self.entries.push(Entry {
            table_id,
            recency: self.tick,
            stmts,
        });
        evicted
    }

    /// Remove everything, for close-on-exit.
    pub fn drain(&mut self) -> Vec<S> {
        self.entries.drain(..).map(|e| e.stmts).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_bumps_recency() {
        let mut cache = StatementCache::new(2);
        assert_eq!(cache.insert(1, "one"), None);
        assert_eq!(cache.insert(2, "two"), None);

        // Touch 1 so 2 becomes the eviction victim.
        assert_eq!(cache.get(1), Some(&"one"));
        assert_eq!(cache.insert(3, "three"), Some("two"));
        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_none());
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn test_eviction_order_without_hits() {
        let mut cache = StatementCache::new(2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        assert_eq!(cache.insert(3, 30), Some(10));
        assert_eq!(cache.insert(4, 40), Some(20));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_drain_empties() {
        let mut cache = StatementCache::new(4);
        cache.insert(1, 10);
        cache.insert(2, 20);
        let mut drained = cache.drain();
        drained.sort();
        assert_eq!(drained, vec![10, 20]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut cache = StatementCache::new(0);
        assert_eq!(cache.insert(1, 10), None);
        assert_eq!(cache.insert(2, 20), Some(10));
    }
}
