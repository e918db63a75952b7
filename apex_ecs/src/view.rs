//! Multi-component views.
//!
//! Grounded on `Apex/Engine/include/Apex/ECS/View.h`: the view picks the
//! smallest of its pools once at construction (`selectSmallest`), then
//! iterates that pool's dense entity list, testing `contains` on every
//! other pool before invoking the callback - never the other way around.
//! Rust has no argument-deduction equivalent to the original's
//! `apex::ecs::invoke`, so each arity gets its own `each` that always hands
//! back the entity plus every requested component reference.

use apex_containers::SparseMap;

use crate::entity::Entity;

pub struct View1<'a, A> {
    pool: &'a SparseMap<A>,
}

impl<'a, A> View1<'a, A> {
    pub(crate) fn new(pool: &'a SparseMap<A>) -> Self {
        Self { pool }
    }

    pub fn count(&self) -> u32 {
        self.pool.count()
    }

    pub fn each(&self, mut f: impl FnMut(Entity, &A)) {
        for &id in self.pool.ids() {
            let entity = Entity::from_identifier(id, 0);
            f(entity, self.pool.get(id).unwrap());
        }
    }
}

pub struct View2<'a, A, B> {
    a: &'a SparseMap<A>,
    b: &'a SparseMap<B>,
}

impl<'a, A, B> View2<'a, A, B> {
    pub(crate) fn new(a: &'a SparseMap<A>, b: &'a SparseMap<B>) -> Self {
        Self { a, b }
    }

    /// Dense ids of whichever pool currently holds fewer entities.
    fn driver_ids(&self) -> &'a [u32] {
        if self.a.count() <= self.b.count() {
            self.a.ids()
        } else {
            self.b.ids()
        }
    }

    pub fn contains(&self, entity: Entity) -> bool {
        let id = entity.identifier();
        self.a.contains(id) && self.b.contains(id)
    }

    pub fn each(&self, mut f: impl FnMut(Entity, &A, &B)) {
        for &id in self.driver_ids() {
            if !(self.a.contains(id) && self.b.contains(id)) {
                continue;
            }
            let entity = Entity::from_identifier(id, 0);
            f(entity, self.a.get(id).unwrap(), self.b.get(id).unwrap());
        }
    }
}

pub struct View3<'a, A, B, C> {
    a: &'a SparseMap<A>,
    b: &'a SparseMap<B>,
    c: &'a SparseMap<C>,
}

impl<'a, A, B, C> View3<'a, A, B, C> {
    pub(crate) fn new(a: &'a SparseMap<A>, b: &'a SparseMap<B>, c: &'a SparseMap<C>) -> Self {
        Self { a, b, c }
    }

    fn driver_ids(&self) -> &'a [u32] {
        let mut smallest = self.a.ids();
        if self.b.count() < (smallest.len() as u32) {
            smallest = self.b.ids();
        }
        if self.c.count() < (smallest.len() as u32) {
            smallest = self.c.ids();
        }
        smallest
    }

    pub fn contains(&self, entity: Entity) -> bool {
        let id = entity.identifier();
        self.a.contains(id) && self.b.contains(id) && self.c.contains(id)
    }

    pub fn each(&self, mut f: impl FnMut(Entity, &A, &B, &C)) {
        for &id in self.driver_ids() {
            if !(self.a.contains(id) && self.b.contains(id) && self.c.contains(id)) {
                continue;
            }
            let entity = Entity::from_identifier(id, 0);
            f(
                entity,
                self.a.get(id).unwrap(),
                self.b.get(id).unwrap(),
                self.c.get(id).unwrap(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_containers::AllocatorHandle;
    use apex_memory::MemoryManager;

    fn handle() -> AllocatorHandle {
        AllocatorHandle::new(MemoryManager::init_default().unwrap())
    }

    /// Invariant 4 (spec.md §8): view visits exactly the intersection.
    #[test]
    fn invariant_4_view2_visits_exact_intersection() {
        let mut a: SparseMap<u32> = SparseMap::new(handle(), 32);
        let mut b: SparseMap<u32> = SparseMap::new(handle(), 32);

        for id in [0, 1, 2, 3, 4] {
            a.insert(id, id);
        }
        for id in [2, 3, 4, 5] {
            b.insert(id, id * 10);
        }

        let view = View2::new(&a, &b);
        let mut visited = Vec::new();
        view.each(|e, _, _| visited.push(e.identifier()));
        visited.sort();
        assert_eq!(visited, vec![2, 3, 4]);
    }
}
