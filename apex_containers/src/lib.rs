//! Containers built over [`apex_memory`]'s pool allocator: a relocating
//! dynamic array, a sparse set, a sparse map, and a predicate view.
//!
//! Grounded on `Foundation/include/Containers/{AxArray.h,AxSparseSet.h,
//! AxSparseMap.h}` in the original C++ engine.

mod allocator;
mod dynamic_array;
mod sparse_map;
mod sparse_set;
mod view;

pub use allocator::AllocatorHandle;
pub use dynamic_array::DynamicArray;
pub use sparse_map::SparseMap;
pub use sparse_set::SparseSet;
pub use view::View;
