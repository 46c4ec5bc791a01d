//! The spatial index (C5, §4.6): composition of the entity store and
//! node store behind a single reader-writer lock (§5).

use std::hash::Hash;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::config::{Config, IdGenerator};
use crate::entity::EntityStore;
use crate::error::{Result, SpatialError};
use crate::geometry::Aabb;
use crate::node::{Node, NodePool, NodeStore};
use crate::tree::Tree;
use crate::vec3::Point3;

struct Inner<T: Tree, Id, Content, G> {
    entities: EntityStore<Id, Content, T::Key>,
    nodes: NodeStore<T::Key, Id>,
    pool: NodePool<Id>,
    id_gen: G,
}

/// A thread-safe spatial index over either decomposition, generic
/// over the tree algebra `T`, the caller's entity id `Id`, the
/// opaque payload `Content`, and the id generator `G`.
pub struct SpatialIndex<T: Tree, Id, Content, G = crate::config::MonotonicU64> {
    config: Config,
    inner: RwLock<Inner<T, Id, Content, G>>,
}

impl<T, Id, Content, G> SpatialIndex<T, Id, Content, G>
where
    T: Tree,
    Id: Eq + Hash + Clone,
    G: IdGenerator<Id>,
{
    pub fn new(config: Config, id_gen: G) -> Self {
        let bulk_defaults = crate::config::BulkConfig::default();
        Self {
            config,
            inner: RwLock::new(Inner {
                entities: EntityStore::new(),
                nodes: NodeStore::new(),
                pool: NodePool::new(
                    bulk_defaults.node_pool_initial_size,
                    bulk_defaults.node_pool_max_size,
                    bulk_defaults.node_pool_growth_factor,
                ),
                id_gen,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn keys_for(&self, position: &Point3, level: u8, bounds: Option<&Aabb>) -> Result<Vec<T::Key>> {
        self.config.validate_level(level)?;
        if self.config.spanning_enabled() {
            if let Some(bounds) = bounds {
                return enumerate_intersecting::<T>(bounds, level);
            }
        }
        Ok(vec![T::key_for_position(position, level)?])
    }

    /// Auto-generates an id.
    pub fn insert(&self, position: Point3, level: u8, content: Content) -> Result<Id> {
        self.insert_with_bounds(position, level, content, None)
    }

    pub fn insert_with_bounds(
        &self,
        position: Point3,
        level: u8,
        content: Content,
        bounds: Option<Aabb>,
    ) -> Result<Id> {
        let mut inner = self.inner.write();
        let id = inner.id_gen.next();
        self.insert_locked(&mut inner, id.clone(), position, level, content, bounds)?;
        Ok(id)
    }

    /// Inserts under a caller-supplied id.
    pub fn insert_with_id(
        &self,
        id: Id,
        position: Point3,
        level: u8,
        content: Content,
        bounds: Option<Aabb>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.entities.contains(&id) {
            return Err(SpatialError::DuplicateEntity);
        }
        self.insert_locked(&mut inner, id, position, level, content, bounds)
    }

    fn insert_locked(
        &self,
        inner: &mut Inner<T, Id, Content, G>,
        id: Id,
        position: Point3,
        level: u8,
        content: Content,
        bounds: Option<Aabb>,
    ) -> Result<()> {
        if !position.is_finite() || !position.is_non_negative() {
            return Err(SpatialError::InvalidCoordinate);
        }
        self.config.validate_level(level)?;

        let keys = self.keys_for(&position, level, bounds.as_ref())?;
        inner.entities.insert(id.clone(), content, position, bounds)?;
        for key in &keys {
            place_entity(&mut inner.nodes, &mut inner.pool, key, id.clone(), self.config.max_entities_per_node);
            inner.entities.add_location(&id, key.clone())?;
        }
        trace!(locations = keys.len(), "inserted entity");
        Ok(())
    }

    pub fn remove(&self, id: &Id) -> bool {
        let mut inner = self.inner.write();
        if !inner.entities.contains(id) {
            return false;
        }
        let locations: Vec<T::Key> = inner
            .entities
            .locations(id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();

        for key in &locations {
            self.unlink_entity_from_node(&mut inner, id, key);
            let _ = inner.entities.remove_location(id, key);
        }
        inner.entities.remove(id);
        debug!("removed entity");
        true
    }

    pub fn update(&self, id: &Id, new_position: Point3, level: u8) -> Result<()>
    where
        Content: Clone,
    {
        if !new_position.is_finite() || !new_position.is_non_negative() {
            return Err(SpatialError::InvalidCoordinate);
        }
        let mut inner = self.inner.write();
        let Some(content) = inner.entities.get_content(id).cloned() else {
            return Err(SpatialError::UnknownEntity);
        };
        self.config.validate_level(level)?;

        let bounds = inner.entities.get_bounds(id);
        let old_locations: Vec<T::Key> = inner
            .entities
            .locations(id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();

        for key in &old_locations {
            self.unlink_entity_from_node(&mut inner, id, key);
        }
        inner.entities.clear_locations(id)?;

        let new_keys = self.keys_for(&new_position, level, bounds.as_ref())?;
        for key in &new_keys {
            place_entity(&mut inner.nodes, &mut inner.pool, key, id.clone(), self.config.max_entities_per_node);
            inner.entities.add_location(id, key.clone())?;
        }
        inner.entities.create_or_update(id.clone(), content, new_position, bounds);
        Ok(())
    }

    /// Removes `id` from the node at `key`, clearing its subdivision
    /// candidate marking if it no longer exceeds the threshold, then
    /// prunes the node if it's now empty and childless.
    fn unlink_entity_from_node(&self, inner: &mut Inner<T, Id, Content, G>, id: &Id, key: &T::Key) {
        let should_unmark = if let Some(node) = inner.nodes.get_mut(key) {
            node.remove_entity(id);
            node.entity_count() as u32 <= self.config.max_entities_per_node
        } else {
            false
        };
        if should_unmark {
            inner.nodes.unmark_candidate(key);
        }
        inner.nodes.prune_if_empty(key, Some(&mut inner.pool));
    }

    /// Drains up to `cap` deferred-subdivision candidates (I5a),
    /// largest `entity_count` first (§4.8 finalize phase), splitting
    /// each via [`Tree::children`]. Returns the number actually
    /// processed. Entities move into whichever child's cell contains
    /// their stored position; a candidate whose children all collapse
    /// onto the same child is still unmarked afterward, satisfying
    /// I5b ("subdivision has been attempted and found not to
    /// separate the entities").
    pub fn finalize_subdivisions(&self, cap: usize) -> usize {
        let mut inner = self.inner.write();
        let candidates = inner.nodes.candidates_sorted_by_entity_count();
        let max_depth = self.config.max_depth;
        let max_entities_per_node = self.config.max_entities_per_node;

        candidates
            .into_iter()
            .take(cap)
            .filter(|key| subdivide_node::<T, Id, Content, G>(&mut inner, key, max_depth, max_entities_per_node))
            .count()
    }

    /// Snapshot of every live entity's current position, materialized
    /// under the read lock.
    pub fn all_positions(&self) -> Vec<(Id, Point3)>
    where
        Id: Clone,
    {
        self.inner
            .read()
            .entities
            .all_positions()
            .map(|(id, p)| (id.clone(), p))
            .collect()
    }

    /// Whether the cell at `(position, level)` is currently marked as
    /// a subdivision candidate (I5a).
    pub fn is_subdivision_candidate(&self, position: &Point3, level: u8) -> Result<bool> {
        if !position.is_finite() || !position.is_non_negative() {
            return Err(SpatialError::InvalidCoordinate);
        }
        self.config.validate_level(level)?;
        let key = T::key_for_position(position, level)?;
        let inner = self.inner.read();
        Ok(inner
            .nodes
            .get(&key)
            .map(Node::is_subdivision_candidate)
            .unwrap_or(false))
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.inner.read().entities.contains(id)
    }

    pub fn get_position(&self, id: &Id) -> Option<Point3> {
        self.inner.read().entities.get_position(id)
    }

    pub fn get_bounds(&self, id: &Id) -> Option<Aabb> {
        self.inner.read().entities.get_bounds(id)
    }

    pub fn get_content(&self, id: &Id) -> Option<Content>
    where
        Content: Clone,
    {
        self.inner.read().entities.get_content(id).cloned()
    }

    pub fn lookup(&self, position: &Point3, level: u8) -> Result<Vec<Id>>
    where
        Id: Clone,
    {
        if !position.is_finite() || !position.is_non_negative() {
            return Err(SpatialError::InvalidCoordinate);
        }
        self.config.validate_level(level)?;
        let key = T::key_for_position(position, level)?;
        let inner = self.inner.read();
        Ok(inner
            .nodes
            .get(&key)
            .map(|n| n.entity_ids().to_vec())
            .unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.inner.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entities.is_empty()
    }

    pub(crate) fn with_read<R>(&self, f: impl FnOnce(&EntityStore<Id, Content, T::Key>, &NodeStore<T::Key, Id>, &Config) -> R) -> R {
        let inner = self.inner.read();
        f(&inner.entities, &inner.nodes, &self.config)
    }
}

fn place_entity<K, Id>(
    nodes: &mut NodeStore<K, Id>,
    pool: &mut NodePool<Id>,
    key: &K,
    id: Id,
    max_entities_per_node: u32,
) where
    K: Ord + Hash + Eq + Clone,
    Id: Eq,
{
    let node: &mut Node<Id> = nodes.get_or_create(key, Some(pool));
    let should_split = node.add_entity(id, max_entities_per_node);
    // Live-mode subdivision is the implementer's choice (§4.6); this
    // index always defers, marking the node a subdivision candidate
    // (I5a) for `finalize_subdivisions` to drain later.
    if should_split {
        nodes.mark_candidate(key);
    }
}

/// Splits the oversized node at `key` into its children (§4.8),
/// redistributing its entities by which child cell actually contains
/// each one's stored position. No-op (returns `false`) once `key` is
/// already at `max_depth`, has no live node, or has no entities left
/// to redistribute.
fn subdivide_node<T, Id, Content, G>(
    inner: &mut Inner<T, Id, Content, G>,
    key: &T::Key,
    max_depth: u8,
    max_entities_per_node: u32,
) -> bool
where
    T: Tree,
    Id: Eq + Hash + Clone,
{
    if T::level(key) >= max_depth {
        return false;
    }
    let Ok(children) = T::children(key) else {
        return false;
    };
    let Some(node) = inner.nodes.get(key) else {
        inner.nodes.unmark_candidate(key);
        return false;
    };
    let entity_ids: Vec<Id> = node.entity_ids().to_vec();
    if entity_ids.is_empty() {
        inner.nodes.unmark_candidate(key);
        return false;
    }

    for id in &entity_ids {
        let Some(position) = inner.entities.get_position(id) else {
            continue;
        };
        let target = children
            .iter()
            .find(|child| T::cell_contains_point(child, &position).unwrap_or(false))
            .cloned()
            .unwrap_or_else(|| children[0].clone());

        if let Some(parent_node) = inner.nodes.get_mut(key) {
            parent_node.remove_entity(id);
        }
        let _ = inner.entities.remove_location(id, key);

        let child_node = inner.nodes.get_or_create(&target, Some(&mut inner.pool));
        let should_split = child_node.add_entity(id.clone(), max_entities_per_node);
        if should_split {
            inner.nodes.mark_candidate(&target);
        }
        let _ = inner.entities.add_location(id, target.clone());
    }

    for (bit, child) in children.iter().enumerate() {
        if inner.nodes.contains(child) {
            if let Some(parent_node) = inner.nodes.get_mut(key) {
                parent_node.set_child_bit(bit as u8);
            }
        }
    }

    inner.nodes.prune_if_empty(key, Some(&mut inner.pool));
    inner.nodes.unmark_candidate(key);
    true
}

/// Enumerate every cell at `level` whose cube/tet intersects `aabb`:
/// flood-fill outward from the conservative key-range seeds, growing
/// through axis/face neighbors only while they still intersect
/// `aabb`, with a precise geometric filter at every step (§4.6, §4.8
/// spanning).
fn enumerate_intersecting<T: Tree>(aabb: &Aabb, level: u8) -> Result<Vec<T::Key>> {
    let (lo, hi) = T::conservative_key_range(aabb, level)?;
    let mut out = Vec::new();
    let mut frontier = vec![lo.clone(), hi.clone()];
    let mut seen = std::collections::HashSet::new();
    seen.insert(lo);
    seen.insert(hi);
    while let Some(key) = frontier.pop() {
        if T::cell_intersects_aabb(&key, aabb)? {
            out.push(key.clone());
            for n in T::neighbors(&key) {
                if seen.insert(n.clone()) {
                    frontier.push(n);
                }
            }
        }
    }
    if out.is_empty() {
        out.push(T::key_for_position(&aabb.center(), level)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonotonicU64;
    use crate::tree::Octree;

    fn index() -> SpatialIndex<Octree, u64, &'static str> {
        let config = Config::new(2, 5).unwrap();
        SpatialIndex::new(config, MonotonicU64::new())
    }

    #[test]
    fn insert_then_lookup() {
        let idx = index();
        let p = Point3::new(100.0, 100.0, 100.0);
        let id = idx.insert(p, 5, "A").unwrap();
        assert_eq!(idx.lookup(&p, 5).unwrap(), vec![id]);
        assert_eq!(idx.get_content(&id), Some("A"));
    }

    #[test]
    fn remove_is_idempotent() {
        let idx = index();
        let p = Point3::new(1.0, 1.0, 1.0);
        let id = idx.insert(p, 5, "A").unwrap();
        assert!(idx.remove(&id));
        assert!(!idx.remove(&id));
    }

    #[test]
    fn update_moves_entity() {
        let idx = index();
        let p1 = Point3::new(1.0, 1.0, 1.0);
        let p2 = Point3::new(500.0, 500.0, 500.0);
        let id = idx.insert(p1, 5, "A").unwrap();
        idx.update(&id, p2, 5).unwrap();
        assert_eq!(idx.lookup(&p1, 5).unwrap(), Vec::<u64>::new());
        assert_eq!(idx.lookup(&p2, 5).unwrap(), vec![id]);
    }

    #[test]
    fn negative_coordinate_is_rejected() {
        let idx = index();
        assert_eq!(
            idx.insert(Point3::new(-1.0, 0.0, 0.0), 5, "A"),
            Err(SpatialError::InvalidCoordinate)
        );
        assert_eq!(idx.len(), 0);
    }

    #[test]
    fn duplicate_id_insert_fails() {
        let idx = index();
        let p = Point3::new(1.0, 1.0, 1.0);
        idx.insert_with_id(1, p, 5, "A", None).unwrap();
        assert_eq!(
            idx.insert_with_id(1, p, 5, "B", None),
            Err(SpatialError::DuplicateEntity)
        );
    }

    #[test]
    fn overfull_node_is_marked_a_subdivision_candidate() {
        let idx = index();
        let p = Point3::new(100.0, 100.0, 100.0);
        idx.insert(p, 5, "A").unwrap();
        idx.insert(p, 5, "B").unwrap();
        assert!(!idx.is_subdivision_candidate(&p, 5).unwrap());
        idx.insert(p, 5, "C").unwrap();
        assert!(idx.is_subdivision_candidate(&p, 5).unwrap());
    }

    #[test]
    fn removing_back_under_threshold_clears_the_candidate_marking() {
        let idx = index();
        let p = Point3::new(100.0, 100.0, 100.0);
        idx.insert_with_id(1, p, 5, "A", None).unwrap();
        idx.insert_with_id(2, p, 5, "B", None).unwrap();
        idx.insert_with_id(3, p, 5, "C", None).unwrap();
        assert!(idx.is_subdivision_candidate(&p, 5).unwrap());

        idx.remove(&3);
        assert!(!idx.is_subdivision_candidate(&p, 5).unwrap());
    }

    #[test]
    fn finalize_subdivisions_splits_candidates_across_children() {
        let idx = index();
        let a = Point3::new(10.0, 10.0, 10.0);
        let b = Point3::new(900.0, 900.0, 900.0);
        idx.insert(a, 5, "A").unwrap();
        idx.insert(a, 5, "B").unwrap();
        idx.insert(a, 5, "C").unwrap();
        idx.insert(b, 5, "D").unwrap();
        assert!(idx.is_subdivision_candidate(&a, 5).unwrap());

        let processed = idx.finalize_subdivisions(usize::MAX);
        assert_eq!(processed, 1);
        assert!(!idx.is_subdivision_candidate(&a, 5).unwrap());
        assert_eq!(idx.lookup(&a, 5).unwrap().len(), 0);
        assert_eq!(idx.len(), 4);
    }

    #[test]
    fn all_positions_reflects_current_entity_state() {
        let idx = index();
        let p = Point3::new(3.0, 4.0, 5.0);
        let id = idx.insert(p, 5, "A").unwrap();
        let positions = idx.all_positions();
        assert_eq!(positions, vec![(id, p)]);
    }
}
