//! Sparse set over a fixed key-space `[0, capacity)`.
//!
//! Grounded on `Foundation/include/Containers/AxSparseSet.h`: O(1)
//! insert/remove/contains via a `sparse: key -> dense index` array and a
//! `dense: index -> key` array, with the classic swap-with-last removal
//! that does not preserve insertion order.

use crate::allocator::AllocatorHandle;
use crate::dynamic_array::DynamicArray;

const NOT_IN_SET: u32 = u32::MAX;

/// Sparse set of `u32` keys (entity ids, component-pool indices, ...).
pub struct SparseSet {
    capacity: u32,
    count: u32,
    sparse: DynamicArray<u32>,
    dense: DynamicArray<u32>,
}

impl SparseSet {
    pub fn new(allocator: AllocatorHandle, capacity: u32) -> Self {
        let mut sparse = DynamicArray::new(allocator.clone());
        sparse.resize(capacity as usize, NOT_IN_SET);
        let mut dense = DynamicArray::new(allocator);
        dense.resize(capacity as usize, 0);

        Self {
            capacity,
            count: 0,
            sparse,
            dense,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Extends the key-space to `new_capacity`, pre-filling the new `sparse`
    /// slots as empty. A no-op if `new_capacity <= capacity()`. Used by
    /// `apex_ecs::Registry` to grow a component pool geometrically once an
    /// entity id exceeds its current capacity.
    pub fn grow_capacity(&mut self, new_capacity: u32) {
        if new_capacity <= self.capacity {
            return;
        }
        self.sparse.resize(new_capacity as usize, NOT_IN_SET);
        self.dense.resize(new_capacity as usize, 0);
        self.capacity = new_capacity;
    }

    pub fn contains(&self, id: u32) -> bool {
        if id >= self.capacity {
            return false;
        }
        let dense_index = *self.sparse.get(id as usize).unwrap();
        dense_index < self.count && *self.dense.get(dense_index as usize).unwrap() == id
    }

    /// Index of `id` within the dense array, if present.
    pub fn index_of(&self, id: u32) -> Option<u32> {
        self.contains(id)
            .then(|| *self.sparse.get(id as usize).unwrap())
    }

    pub fn insert(&mut self, id: u32) {
        assert!(id < self.capacity, "id out of sparse-set capacity");
        assert!(!self.contains(id), "id already present in sparse set");
        self.insert_unchecked(id);
    }

    pub fn try_insert(&mut self, id: u32) -> bool {
        assert!(id < self.capacity);
        if self.contains(id) {
            return false;
        }
        self.insert_unchecked(id);
        true
    }

    fn insert_unchecked(&mut self, id: u32) {
        *self.dense.get_mut(self.count as usize).unwrap() = id;
        *self.sparse.get_mut(id as usize).unwrap() = self.count;
        self.count += 1;
    }

    pub fn remove(&mut self, id: u32) {
        assert!(id < self.capacity, "id out of sparse-set capacity");
        assert!(self.contains(id), "id not present in sparse set");
        self.remove_unchecked(id);
    }

    pub fn try_remove(&mut self, id: u32) -> bool {
        assert!(id < self.capacity);
        if !self.contains(id) {
            return false;
        }
        self.remove_unchecked(id);
        true
    }

    fn remove_unchecked(&mut self, id: u32) {
        self.count -= 1;
        let dense_index = *self.sparse.get(id as usize).unwrap();
        let last_id = *self.dense.get(self.count as usize).unwrap();
        *self.dense.get_mut(dense_index as usize).unwrap() = last_id;
        *self.sparse.get_mut(last_id as usize).unwrap() = dense_index;
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }

    pub fn ids(&self) -> &[u32] {
        &self.dense.as_slice()[..self.count as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_memory::MemoryManager;

    fn handle() -> AllocatorHandle {
        AllocatorHandle::new(MemoryManager::init_default().unwrap())
    }

    /// S6 - Sparse-set stability under remove (spec.md §8).
    #[test]
    fn s6_swap_with_last_on_remove() {
        let mut set = SparseSet::new(handle(), 16);
        for k in [1, 4, 2, 7, 9] {
            set.insert(k);
        }
        set.remove(4);
        assert_eq!(set.ids(), &[1, 9, 2, 7]);
    }

    /// Invariant 2 (spec.md §8): sparse/dense agreement after any sequence.
    #[test]
    fn invariant_2_sparse_dense_agreement() {
        let mut set = SparseSet::new(handle(), 32);
        for k in [3, 5, 8, 13, 21] {
            set.insert(k);
        }
        set.remove(5);
        set.insert(5);
        set.remove(3);

        for id in 0..32u32 {
            assert_eq!(set.contains(id), set.ids().contains(&id));
        }
        for (i, &id) in set.ids().iter().enumerate() {
            assert_eq!(set.index_of(id), Some(i as u32));
        }
    }

    #[test]
    fn insert_remove_is_a_no_op_on_contains() {
        let mut set = SparseSet::new(handle(), 8);
        assert!(!set.contains(5));
        set.insert(5);
        set.remove(5);
        assert!(!set.contains(5));
    }

    #[test]
    #[should_panic]
    fn double_insert_panics() {
        let mut set = SparseSet::new(handle(), 4);
        set.insert(1);
        set.insert(1);
    }
}
