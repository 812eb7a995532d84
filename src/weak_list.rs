//! Ordered list of non-owning tab references
//!
//! Slots hold stable keys, never the entities themselves. An entry whose
//! entity has gone away is turned into a tombstone instead of being removed
//! on the spot, so positions of the remaining entries stay stable until the
//! next mutating call compacts the list. Every index taken or returned by
//! this type counts live entries only.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot<K> {
    Live(K),
    Tombstone,
}

impl<K> Slot<K> {
    fn live(&self) -> Option<&K> {
        match self {
            Slot::Live(key) => Some(key),
            Slot::Tombstone => None,
        }
    }
}

/// Insertion-stable list of weak references keyed by `K`
#[derive(Debug, Clone)]
pub struct WeakRefList<K> {
    slots: Vec<Slot<K>>,
    tombstones: usize,
}

impl<K> Default for WeakRefList<K> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            tombstones: 0,
        }
    }
}

impl<K: Copy + Eq> WeakRefList<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn count(&self) -> usize {
        self.slots.len() - self.tombstones
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Live entry at `index`, `None` when out of bounds
    pub fn at(&self, index: usize) -> Option<K> {
        self.iter().nth(index)
    }

    /// Live index of `key`
    pub fn position(&self, key: &K) -> Option<usize> {
        self.iter().position(|candidate| candidate == *key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.position(key).is_some()
    }

    /// Live entries in order, dead slots skipped
    pub fn iter(&self) -> impl Iterator<Item = K> + '_ {
        self.slots.iter().filter_map(|slot| slot.live().copied())
    }

    pub fn to_vec(&self) -> Vec<K> {
        self.iter().collect()
    }

    pub fn last(&self) -> Option<K> {
        self.slots.iter().rev().find_map(|slot| slot.live().copied())
    }

    pub fn append(&mut self, key: K) {
        self.compact();
        self.slots.push(Slot::Live(key));
    }

    /// Insert at a live index, clamped to the end
    pub fn insert(&mut self, index: usize, key: K) {
        self.compact();
        let index = index.min(self.slots.len());
        self.slots.insert(index, Slot::Live(key));
    }

    /// Remove the live entry at `index`
    pub fn remove(&mut self, index: usize) -> Option<K> {
        self.compact();
        if index < self.slots.len() {
            self.slots.remove(index).live().copied()
        } else {
            None
        }
    }

    pub fn remove_all(&mut self) -> Vec<K> {
        let live = self.to_vec();
        self.slots.clear();
        self.tombstones = 0;
        live
    }

    /// Tombstone every entry for which `is_alive` is false.
    ///
    /// Returns the dead keys with the live index each had before the sweep,
    /// in ascending index order.
    pub fn sweep<F>(&mut self, mut is_alive: F) -> Vec<(usize, K)>
    where
        F: FnMut(&K) -> bool,
    {
        let mut dead = Vec::new();
        let mut live_index = 0;
        for slot in &mut self.slots {
            let Some(key) = slot.live().copied() else {
                continue;
            };
            if !is_alive(&key) {
                dead.push((live_index, key));
                *slot = Slot::Tombstone;
                self.tombstones += 1;
            }
            live_index += 1;
        }
        dead
    }

    /// Number of dead slots awaiting compaction
    pub fn tombstone_count(&self) -> usize {
        self.tombstones
    }

    fn compact(&mut self) {
        if self.tombstones > 0 {
            self.slots.retain(|slot| matches!(slot, Slot::Live(_)));
            self.tombstones = 0;
        }
    }
}

impl<K: Copy + Eq> FromIterator<K> for WeakRefList<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().map(Slot::Live).collect(),
            tombstones: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut list = WeakRefList::new();
        list.append(1);
        list.append(2);
        list.sweep(|key| *key != 1);
        list.append(3);
        assert_eq!(list.to_vec(), vec![2, 3]);
        assert_eq!(list.tombstone_count(), 0);
        assert_eq!(list.count(), 2);
        assert_eq!(list.last(), Some(3));
    }

    #[test]
    fn test_at_out_of_bounds() {
        let list: WeakRefList<u32> = [10, 20].into_iter().collect();
        assert_eq!(list.at(1), Some(20));
        assert_eq!(list.at(2), None);
    }

    #[test]
    fn test_insert_and_remove() {
        let mut list: WeakRefList<u32> = [1, 3].into_iter().collect();
        list.insert(1, 2);
        assert_eq!(list.to_vec(), vec![1, 2, 3]);
        list.insert(99, 4);
        assert_eq!(list.to_vec(), vec![1, 2, 3, 4]);
        assert_eq!(list.remove(0), Some(1));
        assert_eq!(list.remove(10), None);
        assert_eq!(list.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn test_tombstones_are_invisible() {
        let mut list: WeakRefList<u32> = [1, 2, 3].into_iter().collect();
        assert_eq!(list.sweep(|key| *key != 2), vec![(1, 2)]);
        assert_eq!(list.sweep(|key| *key != 2), vec![]);

        assert_eq!(list.count(), 2);
        assert_eq!(list.at(1), Some(3));
        assert_eq!(list.position(&3), Some(1));
        assert_eq!(list.tombstone_count(), 1);
    }

    #[test]
    fn test_mutation_compacts_lazily() {
        let mut list: WeakRefList<u32> = [1, 2, 3].into_iter().collect();
        list.sweep(|key| *key != 1);
        assert_eq!(list.tombstone_count(), 1);
        list.insert(1, 9);
        assert_eq!(list.tombstone_count(), 0);
        assert_eq!(list.to_vec(), vec![2, 9, 3]);
    }

    #[test]
    fn test_sweep_reports_pre_sweep_indices() {
        let mut list: WeakRefList<u32> = [1, 2, 3, 4].into_iter().collect();
        list.sweep(|key| *key != 1);
        let dead = list.sweep(|key| key % 2 == 1);
        assert_eq!(dead, vec![(0, 2), (2, 4)]);
        assert_eq!(list.to_vec(), vec![3]);
        assert!(!list.is_empty());
    }

    #[test]
    fn test_remove_all() {
        let mut list: WeakRefList<u32> = [1, 2].into_iter().collect();
        list.sweep(|key| *key != 2);
        assert_eq!(list.remove_all(), vec![1]);
        assert!(list.is_empty());
        assert_eq!(list.tombstone_count(), 0);
    }
}
