//! Process-wide pool memory manager: one contiguous reservation per fixed
//! block-size class, pointer-range ownership queries, no per-block headers.
//!
//! Grounded on `Foundation/include/Memory/{PoolAllocator.h,MemoryManager.h}`
//! and `Foundation/src/MemoryManager.cpp` in the original C++ engine.

mod manager;
mod pool;

pub use manager::{MemoryError, MemoryManager, MemoryManagerDesc, PoolHandle, PoolTableEntry};
pub use manager::DEFAULT_POOL_TABLE;
pub use pool::PoolAllocator;
