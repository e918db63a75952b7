//! Process-wide multi-pool memory manager.
//!
//! Grounded on `Foundation/src/MemoryManager.cpp` and
//! `Foundation/include/Memory/MemoryManager.h`: a fixed table of pools,
//! ordered by ascending block size, each one a [`PoolAllocator`]. Allocation
//! picks the smallest pool whose block size can hold the request; freeing
//! scans pools in table order and asks each one whether it owns the
//! pointer.

use std::ptr::NonNull;

use crate::pool::PoolAllocator;

/// One entry of the static pool-size table: `(block_size, block_count)`.
#[derive(Clone, Copy, Debug)]
pub struct PoolTableEntry {
    pub block_size: usize,
    pub block_count: usize,
}

impl PoolTableEntry {
    pub const fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            block_size,
            block_count,
        }
    }
}

/// Default pool table spanning 32 B up to 128 MiB in power-of-two steps, per
/// spec.md §3 ("spanning at least 32 B to 128 MiB"). Block counts favor
/// small, frequently-allocated sizes and taper off for the largest classes.
pub const DEFAULT_POOL_TABLE: &[PoolTableEntry] = &[
    PoolTableEntry::new(32, 4096),
    PoolTableEntry::new(64, 4096),
    PoolTableEntry::new(128, 2048),
    PoolTableEntry::new(256, 2048),
    PoolTableEntry::new(512, 1024),
    PoolTableEntry::new(1024, 1024),
    PoolTableEntry::new(2048, 512),
    PoolTableEntry::new(4096, 512),
    PoolTableEntry::new(8192, 256),
    PoolTableEntry::new(16384, 128),
    PoolTableEntry::new(32768, 64),
    PoolTableEntry::new(65536, 32),
    PoolTableEntry::new(131072, 16),
    PoolTableEntry::new(262144, 8),
    PoolTableEntry::new(1 << 20, 8),  // 1 MiB
    PoolTableEntry::new(4 << 20, 4),  // 4 MiB
    PoolTableEntry::new(16 << 20, 2), // 16 MiB
    PoolTableEntry::new(64 << 20, 1), // 64 MiB
    PoolTableEntry::new(128 << 20, 1),
];

/// Configuration passed to [`MemoryManager::init`]. Named the way the
/// original's `MemoryManagerDesc` is: a small value type, no config file
/// format behind it.
#[derive(Clone, Copy, Debug)]
pub struct MemoryManagerDesc {
    /// Governs the per-frame arena count. Arenas themselves are out of core
    /// scope (spec.md §4.1) but `frames_in_flight` is kept on the descriptor
    /// because it is part of the reservation sizing contract the original
    /// exposes, and a future arena layer shares this manager's reservation.
    pub frames_in_flight: u32,
    /// Must be a power of two; checked in [`MemoryManager::init`].
    pub frame_arena_size: usize,
}

impl Default for MemoryManagerDesc {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            frame_arena_size: 1 << 20,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MemoryError {
    #[error("requested allocation size {0} exceeds the largest pool block size")]
    RequestTooLarge(usize),
    #[error("pool for block size {block_size} is exhausted ({block_count} blocks in use)")]
    OutOfMemory {
        block_size: usize,
        block_count: usize,
    },
    #[error("frame_arena_size {0} is not a power of two")]
    InvalidFrameArenaSize(usize),
}

/// A pointer handed back by [`MemoryManager::allocate`], carrying the
/// owning pool's index so `free` need not re-scan - the Rust analogue of the
/// original's `AxHandle`.
#[derive(Clone, Copy)]
pub struct PoolHandle {
    pub ptr: NonNull<u8>,
    pub pool_index: u32,
    pub block_size: usize,
}

/// Process-wide pool-based allocator. Not thread-safe (spec.md §5); callers
/// serialize access externally if shared across threads.
pub struct MemoryManager {
    pools: Vec<PoolAllocator>,
    #[allow(dead_code)]
    desc: MemoryManagerDesc,
}

impl MemoryManager {
    /// `init` in spec.md's lifecycle table. `table` must be sorted by
    /// ascending `block_size`; this is asserted, not sorted for the caller,
    /// since a silently-resorted table would change which pool serves a
    /// given size relative to what the caller specified.
    pub fn init(
        desc: MemoryManagerDesc,
        table: &[PoolTableEntry],
    ) -> Result<MemoryManager, MemoryError> {
        if !desc.frame_arena_size.is_power_of_two() {
            return Err(MemoryError::InvalidFrameArenaSize(desc.frame_arena_size));
        }
        assert!(
            table.windows(2).all(|w| w[0].block_size < w[1].block_size),
            "pool table must be sorted by strictly ascending block_size"
        );

        let pools = table
            .iter()
            .map(|entry| PoolAllocator::new(entry.block_size, entry.block_count))
            .collect();

        log::debug!(
            "MemoryManager initialized with {} pools, {} frames in flight",
            table.len(),
            desc.frames_in_flight
        );

        Ok(MemoryManager { pools, desc })
    }

    pub fn init_default() -> Result<MemoryManager, MemoryError> {
        Self::init(MemoryManagerDesc::default(), DEFAULT_POOL_TABLE)
    }

    /// Index of the smallest pool whose block size is `>= size`.
    fn pool_for_size(&self, size: usize) -> Option<usize> {
        self.pools.iter().position(|p| p.block_size() >= size)
    }

    /// Index of the pool that owns `ptr`, found by linear address-range scan
    /// in table order (spec.md §4.1's "Algorithm - pool selection on free").
    fn pool_for_pointer(&self, ptr: *const u8) -> Option<usize> {
        self.pools.iter().position(|p| p.contains_pointer(ptr))
    }

    pub fn allocate(&mut self, size: usize) -> Result<PoolHandle, MemoryError> {
        let (handle, _actual) = self.allocate_with_actual_size(size)?;
        Ok(handle)
    }

    /// `allocate(size_inout)` in spec.md §4.1: also reports the actual block
    /// size served, so the caller can use the whole block.
    pub fn allocate_with_actual_size(
        &mut self,
        size: usize,
    ) -> Result<(PoolHandle, usize), MemoryError> {
        let pool_index = self
            .pool_for_size(size)
            .ok_or(MemoryError::RequestTooLarge(size))?;
        let pool = &mut self.pools[pool_index];
        let block_size = pool.block_size();
        let ptr = pool.allocate().ok_or(MemoryError::OutOfMemory {
            block_size,
            block_count: pool.block_count(),
        })?;

        Ok((
            PoolHandle {
                ptr,
                pool_index: pool_index as u32,
                block_size,
            },
            block_size,
        ))
    }

    /// No-op on null. Requires `check_managed(ptr) && can_free(ptr)`;
    /// violating that is a precondition violation (spec.md §7) and is
    /// reported as a debug assertion rather than silently freeing memory
    /// this manager doesn't recognize.
    pub fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        let pool_index = self.pool_for_pointer(ptr);
        debug_assert!(
            pool_index.is_some(),
            "free() called on a pointer not owned by this MemoryManager"
        );
        let Some(pool_index) = pool_index else {
            return;
        };

        let pool = &mut self.pools[pool_index];
        debug_assert!(
            pool.can_free(ptr),
            "free() called on a misaligned pointer within a managed pool"
        );
        if !pool.can_free(ptr) {
            return;
        }

        // SAFETY: `can_free` just confirmed `ptr` is a block boundary inside
        // this pool's reservation.
        pool.free(unsafe { NonNull::new_unchecked(ptr) });
    }

    /// Frees a handle returned by [`Self::allocate`] without re-scanning
    /// pools, using the pool index the handle already carries.
    pub fn free_handle(&mut self, handle: PoolHandle) {
        let pool = &mut self.pools[handle.pool_index as usize];
        debug_assert!(pool.can_free(handle.ptr.as_ptr()));
        pool.free(handle.ptr);
    }

    pub fn check_managed(&self, ptr: *const u8) -> bool {
        if ptr.is_null() {
            return false;
        }
        self.pool_for_pointer(ptr).is_some()
    }

    pub fn can_free(&self, ptr: *const u8) -> bool {
        match self.pool_for_pointer(ptr) {
            Some(index) => self.pools[index].can_free(ptr),
            None => false,
        }
    }

    pub fn total_capacity(&self) -> usize {
        self.pools.iter().map(|p| p.total_capacity()).sum()
    }

    pub fn allocated_size(&self) -> usize {
        self.pools.iter().map(|p| p.current_usage()).sum()
    }

    /// Consumes `self`, dropping every pool and freeing their reservations.
    /// Named explicitly because spec.md's lifecycle table names `shutdown`
    /// as the counterpart to `init`, even though `Drop` alone would do it.
    pub fn shutdown(self) {
        log::debug!("MemoryManager shutdown: freed {} bytes", self.allocated_size());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S1 - Pool round-trip (spec.md §8).
    #[test]
    fn s1_pool_round_trip() {
        let mut mm = MemoryManager::init_default().unwrap();
        let (handle, actual_size) = mm.allocate_with_actual_size(1000).unwrap();
        assert_eq!(actual_size, 1024);
        assert!(mm.allocated_size() >= 1024);

        mm.free_handle(handle);
        assert_eq!(mm.allocated_size(), 0);
    }

    #[test]
    fn invariant_1_check_managed_and_can_free_agree_with_origin_pool() {
        let mut mm = MemoryManager::init_default().unwrap();
        let handle = mm.allocate(100).unwrap();
        assert!(mm.check_managed(handle.ptr.as_ptr()));
        assert!(mm.can_free(handle.ptr.as_ptr()));
        assert_eq!(
            mm.pool_for_pointer(handle.ptr.as_ptr()),
            Some(handle.pool_index as usize)
        );
        mm.free_handle(handle);
    }

    #[test]
    fn unmanaged_pointer_is_rejected() {
        let mm = MemoryManager::init_default().unwrap();
        let stray = 0x1234usize as *const u8;
        assert!(!mm.check_managed(stray));
        assert!(!mm.can_free(stray));
    }

    #[test]
    fn request_larger_than_largest_pool_fails() {
        let mut mm = MemoryManager::init_default().unwrap();
        let result = mm.allocate(1 << 30);
        assert!(matches!(result, Err(MemoryError::RequestTooLarge(_))));
    }

    #[test]
    fn non_power_of_two_arena_size_is_rejected() {
        let desc = MemoryManagerDesc {
            frames_in_flight: 2,
            frame_arena_size: 3,
        };
        let result = MemoryManager::init(desc, DEFAULT_POOL_TABLE);
        assert!(matches!(result, Err(MemoryError::InvalidFrameArenaSize(3))));
    }
}
