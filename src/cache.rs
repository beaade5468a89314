use std::cell::Cell;

use crate::utils::MyHash;

struct Slot<K, V> {
    stamp: u32,
    key: K,
    value: V,
}

/// Two-way operation cache (the "computed table").
///
/// Each bucket holds two slots probed in order. An insert into a full
/// bucket demotes the front entry and drops the back one, so a colliding
/// pair of hot operations can coexist; losing an entry costs a
/// recomputation, never correctness. Entries carry a generation stamp
/// and [`Cache::clear`] bumps the generation, so invalidation does not
/// touch the slots. Hit/miss counters are interior so lookups stay
/// `&self`.
pub struct Cache<K, V> {
    slots: Vec<Option<Slot<K, V>>>,
    bitmask: u64,
    generation: u32,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<K, V> Cache<K, V> {
    /// Create a cache with `2^bits` buckets of two slots each.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Bits should be in the range 0..=31");

        let buckets = 1usize << bits;
        Self {
            slots: std::iter::repeat_with(|| None).take(buckets * 2).collect(),
            bitmask: (buckets - 1) as u64,
            generation: 0,
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.get()
    }

    pub fn misses(&self) -> usize {
        self.misses.get()
    }

    /// Invalidates every entry by advancing the generation.
    pub fn clear(&mut self) {
        if self.generation == u32::MAX {
            // The stamp space is exhausted; purge for real.
            self.slots.fill_with(|| None);
            self.generation = 0;
        } else {
            self.generation += 1;
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: MyHash + Eq,
{
    fn bucket(&self, key: &K) -> usize {
        ((key.hash() & self.bitmask) as usize) << 1
    }

    fn live(&self, slot: &Option<Slot<K, V>>, key: &K) -> bool {
        matches!(slot, Some(s) if s.stamp == self.generation && &s.key == key)
    }

    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Copy,
    {
        let bucket = self.bucket(key);
        for slot in &self.slots[bucket..bucket + 2] {
            if let Some(s) = slot {
                if s.stamp == self.generation && &s.key == key {
                    self.hits.set(self.hits.get() + 1);
                    return Some(s.value);
                }
            }
        }
        self.misses.set(self.misses.get() + 1);
        None
    }

    pub fn insert(&mut self, key: K, value: V) {
        let bucket = self.bucket(&key);
        let stamp = self.generation;

        if self.live(&self.slots[bucket], &key) {
            self.slots[bucket] = Some(Slot { stamp, key, value });
            return;
        }
        if self.live(&self.slots[bucket + 1], &key) {
            // Refresh and promote to the front.
            self.slots[bucket + 1] = Some(Slot { stamp, key, value });
            self.slots.swap(bucket, bucket + 1);
            return;
        }

        let front_live = matches!(&self.slots[bucket], Some(s) if s.stamp == stamp);
        if front_live {
            // Demote the front entry; the back one is the oldest.
            let demoted = self.slots[bucket].take();
            self.slots[bucket + 1] = demoted;
        }
        self.slots[bucket] = Some(Slot { stamp, key, value });
    }
}
