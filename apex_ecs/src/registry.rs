//! Entity allocation and per-component sparse-map storage.
//!
//! Grounded on `Engine/include/Apex/ECS/Registry.h`: entities are allocated
//! monotonically, component pools are created lazily at a minimum size and
//! grown geometrically keyed off the entity id being inserted, and the pool
//! registry itself (indexed by component id) grows geometrically on a
//! cold-miss the same way.

use apex_containers::{AllocatorHandle, SparseMap};

use crate::component_id::component_id;
use crate::entity::{Entity, MAX_ENTITY_ID};
use crate::pool::{ErasedPool, TypedPool};
use crate::view::{View1, View2, View3};

const MIN_POOL_SIZE: u32 = 8;
const COMPONENT_POOL_GROWTH_RATE: u32 = 2;

pub struct Registry {
    allocator: AllocatorHandle,
    entity_count: u32,
    pools: SparseMap<Box<dyn ErasedPool>>,
}

impl Registry {
    pub fn new(allocator: AllocatorHandle) -> Self {
        let pools = SparseMap::new(allocator.clone(), MIN_POOL_SIZE);
        Self {
            allocator,
            entity_count: 0,
            pools,
        }
    }

    pub fn create_entity(&mut self) -> Entity {
        assert!(self.entity_count < MAX_ENTITY_ID, "entity id space exhausted");
        let identifier = self.entity_count;
        self.entity_count += 1;
        Entity::from_identifier(identifier, 0)
    }

    /// Ensures a pool for `T` exists, creating and registering one at
    /// `MIN_POOL_SIZE` on first use, growing the pool-registry's own
    /// capacity geometrically if `T`'s component id doesn't fit yet.
    fn assure_pool<T: 'static>(&mut self) -> u32 {
        let id = component_id::<T>();

        if id >= self.pools.capacity() {
            let grown = (id as u64 * 3 / 2).max(id as u64 + 1) as u32;
            self.pools.grow_capacity(grown);
        }

        if !self.pools.contains(id) {
            self.pools
                .insert(id, Box::new(TypedPool::<T>::new(self.allocator.clone(), MIN_POOL_SIZE)));
        }

        id
    }

    fn typed_pool<T: 'static>(&self, id: u32) -> Option<&TypedPool<T>> {
        self.pools.get(id)?.as_any().downcast_ref::<TypedPool<T>>()
    }

    fn typed_pool_mut<T: 'static>(&mut self, id: u32) -> Option<&mut TypedPool<T>> {
        self.pools
            .get_mut(id)?
            .as_any_mut()
            .downcast_mut::<TypedPool<T>>()
    }

    pub fn add<T: 'static>(&mut self, entity: Entity, component: T) -> &mut T {
        let id = self.assure_pool::<T>();
        let entity_index = entity.identifier();

        let pool = self.pools.get_mut(id).unwrap();
        if pool.capacity() <= entity_index {
            pool.grow_capacity((entity_index as u64 * COMPONENT_POOL_GROWTH_RATE as u64) as u32);
        }

        let typed = self.typed_pool_mut::<T>(id).unwrap();
        typed.map.insert(entity_index, component)
    }

    pub fn get<T: 'static>(&self, entity: Entity) -> Option<&T> {
        let id = component_id::<T>();
        let pool = self.typed_pool::<T>(id)?;
        if pool.map.capacity() <= entity.identifier() {
            return None;
        }
        pool.map.get(entity.identifier())
    }

    pub fn get_mut<T: 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        let id = component_id::<T>();
        let pool = self.typed_pool_mut::<T>(id)?;
        if pool.map.capacity() <= entity.identifier() {
            return None;
        }
        pool.map.get_mut(entity.identifier())
    }

    pub fn has<T: 'static>(&self, entity: Entity) -> bool {
        let id = component_id::<T>();
        match self.pools.get(id) {
            Some(pool) => pool.contains(entity.identifier()),
            None => false,
        }
    }

    pub fn remove<T: 'static>(&mut self, entity: Entity) {
        let id = component_id::<T>();
        if let Some(pool) = self.pools.get_mut(id) {
            pool.remove(entity.identifier());
        }
    }

    pub fn view1<A: 'static>(&self) -> View1<'_, A> {
        let id = component_id::<A>();
        let pool = self
            .typed_pool::<A>(id)
            .expect("view requested over a component type with no pool yet");
        View1::new(&pool.map)
    }

    pub fn view2<A: 'static, B: 'static>(&self) -> View2<'_, A, B> {
        let a = self
            .typed_pool::<A>(component_id::<A>())
            .expect("view requested over a component type with no pool yet");
        let b = self
            .typed_pool::<B>(component_id::<B>())
            .expect("view requested over a component type with no pool yet");
        View2::new(&a.map, &b.map)
    }

    pub fn view3<A: 'static, B: 'static, C: 'static>(&self) -> View3<'_, A, B, C> {
        let a = self
            .typed_pool::<A>(component_id::<A>())
            .expect("view requested over a component type with no pool yet");
        let b = self
            .typed_pool::<B>(component_id::<B>())
            .expect("view requested over a component type with no pool yet");
        let c = self
            .typed_pool::<C>(component_id::<C>())
            .expect("view requested over a component type with no pool yet");
        View3::new(&a.map, &b.map, &c.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_memory::MemoryManager;

    fn handle() -> AllocatorHandle {
        AllocatorHandle::new(MemoryManager::init_default().unwrap())
    }

    struct Position(f32, f32);
    struct Velocity(f32);
    struct Tag;

    #[test]
    fn add_get_remove_round_trip() {
        let mut registry = Registry::new(handle());
        let e = registry.create_entity();

        registry.add(e, Position(1.0, 2.0));
        assert!(registry.has::<Position>(e));
        assert_eq!(registry.get::<Position>(e).unwrap().0, 1.0);

        registry.remove::<Position>(e);
        assert!(registry.get::<Position>(e).is_none());
    }

    /// S2 - Registry view (spec.md §8).
    #[test]
    fn s2_registry_view() {
        let mut registry = Registry::new(handle());
        let entities: Vec<Entity> = (0..20).map(|_| registry.create_entity()).collect();

        for &e in &entities {
            registry.add(e, Position(0.0, 0.0));
        }
        for (i, &e) in entities.iter().enumerate() {
            if i % 2 == 0 {
                registry.add(e, Velocity(1.0));
            }
            if i % 3 == 0 {
                registry.add(e, Tag);
            }
        }

        let mut ab_visited = Vec::new();
        registry.view2::<Position, Velocity>().each(|entity, _, _| {
            ab_visited.push(entity.identifier());
        });
        ab_visited.sort();
        assert_eq!(ab_visited, vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);

        let mut ac_visited = Vec::new();
        registry.view2::<Position, Tag>().each(|entity, _, _| {
            ac_visited.push(entity.identifier());
        });
        ac_visited.sort();
        assert_eq!(ac_visited, vec![0, 3, 6, 9, 12, 15, 18]);
    }
}
