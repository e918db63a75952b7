//! Contiguous growable array backed by the pool allocator.
//!
//! Grounded on `Foundation/include/Containers/AxArray.h`: growth relocates
//! into a new pool block (move-construct into the new storage, destroy the
//! old elements, release the old block) rather than growing in place.
//! Allocated capacity is whatever the chosen pool's block size actually
//! provides for `sizeof(T)`, which can exceed the capacity the caller asked
//! for - callers should prefer `capacity()` over assuming exact sizing.

use std::mem::size_of;
use std::ptr::{self, NonNull};

use apex_memory::PoolHandle;

use crate::allocator::AllocatorHandle;

pub struct DynamicArray<T> {
    allocator: AllocatorHandle,
    block: Option<PoolHandle>,
    ptr: Option<NonNull<T>>,
    len: usize,
    capacity: usize,
}

impl<T> DynamicArray<T> {
    pub fn new(allocator: AllocatorHandle) -> Self {
        Self {
            allocator,
            block: None,
            ptr: None,
            len: 0,
            capacity: 0,
        }
    }

    pub fn with_capacity(allocator: AllocatorHandle, capacity: usize) -> Self {
        let mut array = Self::new(allocator);
        if capacity > 0 {
            array.grow_to_at_least(capacity);
        }
        array
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[T] {
        match self.ptr {
            Some(ptr) => unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self.ptr {
            Some(ptr) => unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.len) },
            None => &mut [],
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(index)
    }

    pub fn push(&mut self, value: T) {
        if self.len == self.capacity {
            self.grow_to_at_least(self.capacity + 1);
        }
        unsafe {
            ptr::write(self.ptr.unwrap().as_ptr().add(self.len), value);
        }
        self.len += 1;
    }

    /// Grows (never shrinks) to `new_len`, pushing clones of `value` for
    /// every newly-created slot. Used by [`crate::SparseSet`]/[`crate::SparseMap`]
    /// to pre-size their index arrays the way `AxArray::resize` does.
    pub fn resize(&mut self, new_len: usize, value: T)
    where
        T: Clone,
    {
        while self.len < new_len {
            self.push(value.clone());
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(unsafe { ptr::read(self.ptr.unwrap().as_ptr().add(self.len)) })
    }

    /// Destroys every element in reverse order without releasing storage,
    /// matching `AxArray::clear`'s element-destruction behavior.
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }

    fn grow_to_at_least(&mut self, min_capacity: usize) {
        let requested_bytes = min_capacity
            .checked_mul(size_of::<T>())
            .expect("dynamic array size overflow");

        let (new_block, actual_bytes) = self
            .allocator
            .with(|mm| mm.allocate_with_actual_size(requested_bytes))
            .expect("DynamicArray growth allocation failed");
        let new_capacity = actual_bytes / size_of::<T>().max(1);
        let new_ptr = new_block.ptr.cast::<T>();

        if let Some(old_ptr) = self.ptr {
            unsafe {
                ptr::copy_nonoverlapping(old_ptr.as_ptr(), new_ptr.as_ptr(), self.len);
            }
            let old_block = self.block.take().unwrap();
            self.allocator.with(|mm| mm.free_handle(old_block));
        }

        self.ptr = Some(new_ptr);
        self.block = Some(new_block);
        self.capacity = new_capacity;
    }
}

impl<T> Drop for DynamicArray<T> {
    fn drop(&mut self) {
        self.clear();
        if let Some(block) = self.block.take() {
            self.allocator.with(|mm| mm.free_handle(block));
        }
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
    fn push_pop_round_trip() {
        let mut arr: DynamicArray<u32> = DynamicArray::new(handle());
        arr.push(1);
        arr.push(2);
        arr.push(3);
        assert_eq!(arr.as_slice(), &[1, 2, 3]);
        assert_eq!(arr.pop(), Some(3));
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn growth_preserves_existing_elements() {
        let mut arr: DynamicArray<u32> = DynamicArray::new(handle());
        for i in 0..500 {
            arr.push(i);
        }
        assert_eq!(arr.len(), 500);
        for i in 0..500 {
            assert_eq!(arr.get(i), Some(&(i as u32)));
        }
    }

    #[test]
    fn drop_runs_element_destructors() {
        use std::rc::Rc;
        let counter = Rc::new(std::cell::Cell::new(0));

        struct Dropper(Rc<std::cell::Cell<i32>>);
        impl Drop for Dropper {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        {
            let mut arr: DynamicArray<Dropper> = DynamicArray::new(handle());
            arr.push(Dropper(counter.clone()));
            arr.push(Dropper(counter.clone()));
        }

        assert_eq!(counter.get(), 2);
    }
}
