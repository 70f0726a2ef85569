//! Bounded map from aligned region bases back to their raw allocations.
//!
//! The aligned base a region source hands out is generally not the pointer
//! that must be returned to the underlying allocator, so every source keeps
//! one of these. Lookups are a linear scan: region churn is bounded by the
//! shrink / teardown cadence, never by the block hot path, and the entry
//! count is bounded by the live slab count.

/// Upper bound on simultaneously live regions per source.
pub(crate) const REGISTRY_CAPACITY: usize = 1 << 15;

pub(crate) struct RegionRegistry<V> {
    entries: Vec<(usize, V)>,
}

impl<V> Default for RegionRegistry<V> {
    fn default() -> RegionRegistry<V> {
        RegionRegistry::new()
    }
}

impl<V> RegionRegistry<V> {
    pub fn new() -> RegionRegistry<V> {
        RegionRegistry {
            entries: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Records a newly acquired region.
    ///
    /// # Panics
    ///
    /// The registry is bounded; exhaustion is fatal.
    pub fn insert(&mut self, base: usize, value: V) {
        assert!(
            self.entries.len() < REGISTRY_CAPACITY,
            "region registry full ({REGISTRY_CAPACITY} live regions)"
        );
        self.entries.push((base, value));
    }

    /// Removes and returns the entry for `base`.
    ///
    /// # Panics
    ///
    /// Panics if `base` is not outstanding - releasing an unknown region
    /// means the bookkeeping has desynced.
    pub fn remove(&mut self, base: usize) -> V {
        match self.entries.iter().position(|&(b, _)| b == base) {
            Some(i) => self.entries.swap_remove(i).1,
            None => panic!("released unknown region {base:#x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_roundtrip() {
        let mut registry = RegionRegistry::new();
        registry.insert(0x1000, "a");
        registry.insert(0x2000, "b");
        registry.insert(0x3000, "c");
        assert_eq!(registry.len(), 3);

        assert_eq!(registry.remove(0x2000), "b");
        assert_eq!(registry.remove(0x1000), "a");
        assert_eq!(registry.remove(0x3000), "c");
        assert_eq!(registry.len(), 0);
    }

    #[test]
    #[should_panic(expected = "released unknown region")]
    fn remove_unknown_is_fatal() {
        let mut registry: RegionRegistry<()> = RegionRegistry::new();
        registry.insert(0x1000, ());
        registry.remove(0x2000);
    }

    #[test]
    #[should_panic(expected = "region registry full")]
    fn exhaustion_is_fatal() {
        let mut registry = RegionRegistry::new();
        for i in 0..REGISTRY_CAPACITY {
            registry.insert(0x1000 + i, ());
        }
        registry.insert(0xdead, ());
    }
}
