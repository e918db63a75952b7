//! Per-type component identity.
//!
//! The original assigns each component type a monotonically-increasing
//! index at compile time (`TypeIndex<Component>::value()`). Rust has no
//! direct compile-time counter, but a generic function's local `static` is
//! monomorphized once per distinct type argument, so reading a
//! `OnceLock<u32>` inside a generic `component_id::<T>()` gives every `T`
//! its own lazily-initialized, globally-unique id fed from one shared
//! `AtomicU32` - dense and unique within the process, matching spec.md
//! §9's resolution (a).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

static NEXT_COMPONENT_ID: AtomicU32 = AtomicU32::new(0);

/// Returns the process-unique, dense id for component type `T`. The first
/// call for a given `T` assigns its id; subsequent calls are a single
/// atomic-free load.
pub fn component_id<T: 'static>() -> u32 {
    static ID: OnceLock<u32> = OnceLock::new();
    *ID.get_or_init(|| NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn ids_are_stable_and_distinct_per_type() {
        let a1 = component_id::<A>();
        let b1 = component_id::<B>();
        let a2 = component_id::<A>();

        assert_eq!(a1, a2);
        assert_ne!(a1, b1);
    }
}
