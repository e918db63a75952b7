//! Type-erased wrapper around a component's [`SparseMap`], so the registry
//! can hold heterogeneous pools in one collection keyed by component id.
//!
//! Grounded on `Engine/include/Apex/ECS/Registry.h`'s
//! `base_pool_type = AxSparseSet<entity_id>` / `pool_type<Component>`
//! split: a common, non-generic base used for untyped bookkeeping
//! (`contains`, `count`, growth), and a typed layer recovered via
//! downcasting where the actual component value is needed.

use std::any::Any;

use apex_containers::{AllocatorHandle, SparseMap};

pub(crate) trait ErasedPool: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn contains(&self, entity_id: u32) -> bool;
    fn count(&self) -> u32;
    fn capacity(&self) -> u32;
    fn grow_capacity(&mut self, new_capacity: u32);
    fn remove(&mut self, entity_id: u32);
}

pub(crate) struct TypedPool<T: 'static> {
    pub(crate) map: SparseMap<T>,
}

impl<T: 'static> TypedPool<T> {
    pub(crate) fn new(allocator: AllocatorHandle, capacity: u32) -> Self {
        Self {
            map: SparseMap::new(allocator, capacity),
        }
    }
}

impl<T: 'static> ErasedPool for TypedPool<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn contains(&self, entity_id: u32) -> bool {
        self.map.contains(entity_id)
    }

    fn count(&self) -> u32 {
        self.map.count()
    }

    fn capacity(&self) -> u32 {
        self.map.capacity()
    }

    fn grow_capacity(&mut self, new_capacity: u32) {
        self.map.grow_capacity(new_capacity);
    }

    fn remove(&mut self, entity_id: u32) {
        self.map.remove(entity_id);
    }
}
