//! Sparse map: a [`SparseSet`] plus a parallel dense value array.
//!
//! Grounded on `Foundation/include/Containers/AxSparseMap.h`. For
//! zero-sized `V` (tag components) the backing [`DynamicArray<V>`] stores no
//! bytes per element, which has the same effect as the original's "elements
//! array is elided" without a separate code path.

use crate::allocator::AllocatorHandle;
use crate::dynamic_array::DynamicArray;
use crate::sparse_set::SparseSet;

pub struct SparseMap<V> {
    keys: SparseSet,
    elements: DynamicArray<V>,
}

impl<V> SparseMap<V> {
    pub fn new(allocator: AllocatorHandle, capacity: u32) -> Self {
        Self {
            keys: SparseSet::new(allocator.clone(), capacity),
            elements: DynamicArray::new(allocator),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.keys.capacity()
    }

    pub fn count(&self) -> u32 {
        self.keys.count()
    }

    pub fn grow_capacity(&mut self, new_capacity: u32) {
        self.keys.grow_capacity(new_capacity);
    }

    pub fn contains(&self, id: u32) -> bool {
        self.keys.contains(id)
    }

    pub fn ids(&self) -> &[u32] {
        self.keys.ids()
    }

    pub fn get(&self, id: u32) -> Option<&V> {
        let index = self.keys.index_of(id)?;
        self.elements.get(index as usize)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut V> {
        let index = self.keys.index_of(id)?;
        self.elements.get_mut(index as usize)
    }

    pub fn insert(&mut self, id: u32, value: V) -> &mut V {
        assert!(!self.keys.contains(id), "id already present in sparse map");
        self.keys.insert(id);
        self.elements.push(value);
        self.elements.get_mut(self.elements.len() - 1).unwrap()
    }

    pub fn remove(&mut self, id: u32) {
        let index = self.keys.index_of(id).expect("id not present in sparse map");
        self.keys.remove(id);

        // Mirror the sparse-set's own swap-with-last so the elements array
        // stays index-aligned with the dense key array.
        let last = self.elements.len() - 1;
        if (index as usize) != last {
            self.elements.as_mut_slice().swap(index as usize, last);
        }
        self.elements.pop();
    }

    pub fn values(&self) -> &[V] {
        self.elements.as_slice()
    }

    pub fn values_mut(&mut self) -> &mut [V] {
        self.elements.as_mut_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_memory::MemoryManager;

    fn handle() -> AllocatorHandle {
        AllocatorHandle::new(MemoryManager::init_default().unwrap())
    }

    #[test]
    fn insert_get_remove_round_trip() {
        let mut map: SparseMap<&'static str> = SparseMap::new(handle(), 16);
        map.insert(2, "two");
        map.insert(5, "five");
        assert_eq!(map.get(2), Some(&"two"));
        assert_eq!(map.get(5), Some(&"five"));

        map.remove(2);
        assert_eq!(map.get(2), None);
        assert_eq!(map.get(5), Some(&"five"));
    }

    #[test]
    fn zero_sized_value_acts_as_tag_set() {
        let mut map: SparseMap<()> = SparseMap::new(handle(), 8);
        map.insert(3, ());
        assert!(map.contains(3));
        map.remove(3);
        assert!(!map.contains(3));
    }
}
