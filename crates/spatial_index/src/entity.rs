//! Entity storage (C3, §4.4): id → content/position/bounds/locations.

use std::collections::HashMap;
use std::hash::Hash;

use hashbrown::HashSet;

use crate::error::{Result, SpatialError};
use crate::geometry::Aabb;
use crate::vec3::Point3;

/// One indexed entity, owned by [`EntityStore`] for its whole life.
#[derive(Debug, Clone)]
pub struct Entity<Content, K> {
    pub content: Content,
    pub position: Point3,
    pub bounds: Option<Aabb>,
    pub locations: HashSet<K>,
}

/// Maps entity ids to their stored content, position, bounds and the
/// set of node-store keys currently referencing them.
///
/// Mirrors the `SparseMap` indirection pattern used elsewhere in this
/// crate, but keyed by the caller-visible `Id` rather than an
/// internal generational slot: entity ids must remain stable and
/// externally reusable across `remove`/`insert`, which a generational
/// key is deliberately built to prevent.
#[derive(Debug)]
pub struct EntityStore<Id, Content, K> {
    entities: HashMap<Id, Entity<Content, K>>,
}

impl<Id, Content, K> EntityStore<Id, Content, K>
where
    Id: Eq + Hash + Clone,
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }

    /// Inserts a brand-new entity. Fails with `DuplicateEntity` if
    /// `id` is already live.
    pub fn insert(
        &mut self,
        id: Id,
        content: Content,
        position: Point3,
        bounds: Option<Aabb>,
    ) -> Result<()> {
        if self.entities.contains_key(&id) {
            return Err(SpatialError::DuplicateEntity);
        }
        self.entities.insert(
            id,
            Entity {
                content,
                position,
                bounds,
                locations: HashSet::new(),
            },
        );
        Ok(())
    }

    /// Inserts if absent, otherwise updates content/position/bounds
    /// in place. `locations` is left untouched either way; the
    /// caller (the spatial index) is responsible for reconciling
    /// node-store membership.
    pub fn create_or_update(
        &mut self,
        id: Id,
        content: Content,
        position: Point3,
        bounds: Option<Aabb>,
    ) {
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.content = content;
                entity.position = position;
                entity.bounds = bounds;
            }
            None => {
                self.entities.insert(
                    id,
                    Entity {
                        content,
                        position,
                        bounds,
                        locations: HashSet::new(),
                    },
                );
            }
        }
    }

    pub fn remove(&mut self, id: &Id) -> Option<Entity<Content, K>> {
        self.entities.remove(id)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.entities.contains_key(id)
    }

    pub fn get(&self, id: &Id) -> Option<&Entity<Content, K>> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &Id) -> Option<&mut Entity<Content, K>> {
        self.entities.get_mut(id)
    }

    pub fn get_content(&self, id: &Id) -> Option<&Content> {
        self.entities.get(id).map(|e| &e.content)
    }

    pub fn get_position(&self, id: &Id) -> Option<Point3> {
        self.entities.get(id).map(|e| e.position)
    }

    pub fn get_bounds(&self, id: &Id) -> Option<Aabb> {
        self.entities.get(id).and_then(|e| e.bounds)
    }

    pub fn span_count(&self, id: &Id) -> usize {
        self.entities.get(id).map_or(0, |e| e.locations.len())
    }

    pub fn add_location(&mut self, id: &Id, key: K) -> Result<()> {
        let entity = self.entities.get_mut(id).ok_or(SpatialError::UnknownEntity)?;
        entity.locations.insert(key);
        Ok(())
    }

    pub fn remove_location(&mut self, id: &Id, key: &K) -> Result<()> {
        let entity = self.entities.get_mut(id).ok_or(SpatialError::UnknownEntity)?;
        entity.locations.remove(key);
        Ok(())
    }

    pub fn clear_locations(&mut self, id: &Id) -> Result<()> {
        let entity = self.entities.get_mut(id).ok_or(SpatialError::UnknownEntity)?;
        entity.locations.clear();
        Ok(())
    }

    pub fn locations(&self, id: &Id) -> Option<&HashSet<K>> {
        self.entities.get(id).map(|e| &e.locations)
    }

    pub fn all_positions(&self) -> impl Iterator<Item = (&Id, Point3)> {
        self.entities.iter().map(|(id, e)| (id, e.position))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<Id, Content, K> Default for EntityStore<Id, Content, K>
where
    Id: Eq + Hash + Clone,
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> EntityStore<u64, &'static str, u64> {
        EntityStore::new()
    }

    #[test]
    fn insert_then_duplicate_fails() {
        let mut s = store();
        s.insert(1, "a", Point3::ZERO, None).unwrap();
        assert_eq!(s.insert(1, "b", Point3::ZERO, None), Err(SpatialError::DuplicateEntity));
    }

    #[test]
    fn locations_round_trip() {
        let mut s = store();
        s.insert(1, "a", Point3::ZERO, None).unwrap();
        s.add_location(&1, 7).unwrap();
        s.add_location(&1, 8).unwrap();
        assert_eq!(s.span_count(&1), 2);
        s.remove_location(&1, &7).unwrap();
        assert_eq!(s.span_count(&1), 1);
        s.clear_locations(&1).unwrap();
        assert_eq!(s.span_count(&1), 0);
    }

    #[test]
    fn location_mutation_on_unknown_id_errors() {
        let mut s: EntityStore<u64, &'static str, u64> = store();
        assert_eq!(s.add_location(&99, 1), Err(SpatialError::UnknownEntity));
    }

    #[test]
    fn remove_returns_entity() {
        let mut s = store();
        s.insert(1, "a", Point3::ZERO, None).unwrap();
        let removed = s.remove(&1).unwrap();
        assert_eq!(removed.content, "a");
        assert!(!s.contains(&1));
    }
}
