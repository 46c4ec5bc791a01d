//! Query engines (C6, §4.7): k-NN, ranged enumeration, ray, sphere,
//! plane, AABB, frustum, and batch queries. All read operations
//! materialize their result inside the read lock before returning
//! (§5 "Coroutines / lazy sequences").

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::hash::Hash;

use crate::config::IdGenerator;
use crate::error::{Result, SpatialError};
use crate::geometry::{Aabb, Frustum, Plane, Ray, Sphere};
use crate::index::SpatialIndex;
use crate::node::NodeStore;
use crate::tree::Tree;
use crate::vec3::Point3;

struct DistanceEntry<Id> {
    distance: f32,
    id: Id,
}

impl<Id: PartialEq> PartialEq for DistanceEntry<Id> {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.id == other.id
    }
}

impl<Id: Eq> Eq for DistanceEntry<Id> {}

impl<Id: Eq> PartialOrd for DistanceEntry<Id> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Id: Eq> Ord for DistanceEntry<Id> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

impl<T, Id, Content, G> SpatialIndex<T, Id, Content, G>
where
    T: Tree,
    Id: Eq + Hash + Clone,
    G: IdGenerator<Id>,
{
    /// k-nearest-neighbor search (§4.7): bounded BFS expansion from
    /// the cell containing `query`, visiting neighbor cells while
    /// the heap is not yet full or a closer hit may still exist.
    pub fn k_nearest(&self, query: &Point3, k: usize, max_distance: f32) -> Result<Vec<Id>> {
        if !query.is_finite() || !query.is_non_negative() {
            return Err(SpatialError::InvalidCoordinate);
        }
        if !(max_distance.is_finite() && max_distance > 0.0) {
            return Err(SpatialError::InvalidVolume);
        }

        self.with_read(|entities, nodes, config| {
            let seed = T::key_for_position(query, config.max_depth)?;

            let mut visited_keys = HashSet::new();
            let mut queue = VecDeque::new();
            if nodes.contains(&seed) {
                visited_keys.insert(seed.clone());
                queue.push_back(seed);
            } else {
                for key in nodes.keys() {
                    if visited_keys.insert(key.clone()) {
                        queue.push_back(key.clone());
                    }
                }
            }

            let mut visited_entities = HashSet::new();
            let mut heap: BinaryHeap<DistanceEntry<Id>> = BinaryHeap::new();

            while let Some(key) = queue.pop_front() {
                if let Some(node) = nodes.get(&key) {
                    for id in node.entity_ids() {
                        if visited_entities.insert(id.clone()) {
                            if let Some(pos) = entities.get_position(id) {
                                let distance = pos.distance(query);
                                if distance <= max_distance {
                                    heap.push(DistanceEntry {
                                        distance,
                                        id: id.clone(),
                                    });
                                    if heap.len() > k {
                                        heap.pop();
                                    }
                                }
                            }
                        }
                    }
                }

                let worst = heap.peek().map(|e| e.distance).unwrap_or(f32::INFINITY);
                let cell_distance = T::distance_squared_to_point(&key, query)?.sqrt();
                if heap.len() < k || cell_distance < worst {
                    for neighbor in T::neighbors(&key) {
                        if visited_keys.insert(neighbor.clone()) {
                            queue.push_back(neighbor);
                        }
                    }
                }
            }

            Ok(heap.into_sorted_vec().into_iter().map(|e| e.id).collect())
        })
    }

    /// Every live cell whose cube/tet is fully contained in `volume`
    /// (§4.7 "Ranged enumeration": derive a key range per level
    /// present in the index, scan `NodeStore::range` over it, then
    /// filter precisely).
    pub fn bounded_by(&self, volume: &Aabb) -> Result<Vec<(T::Key, Vec<Id>)>> {
        self.with_read(|_entities, nodes, _config| ranged_scan::<T, Id>(nodes, volume, T::cell_contains_aabb))
    }

    /// Every live cell whose cube/tet intersects `volume`, via the
    /// same ranged-enumeration scan as [`bounded_by`](Self::bounded_by).
    pub fn bounding(&self, volume: &Aabb) -> Result<Vec<(T::Key, Vec<Id>)>> {
        self.with_read(|_entities, nodes, _config| ranged_scan::<T, Id>(nodes, volume, T::cell_intersects_aabb))
    }

    /// The smallest live cell fully containing `volume`, preferring
    /// the deepest (finest) matching level.
    pub fn enclosing(&self, volume: &Aabb) -> Result<Option<(T::Key, Vec<Id>)>> {
        self.with_read(|_entities, nodes, _config| {
            let mut best: Option<(T::Key, Vec<Id>)> = None;
            for (key, node) in nodes.iter() {
                if T::cell_contains_aabb(key, volume)? {
                    let better = match &best {
                        Some((current, _)) => T::level(key) > T::level(current),
                        None => true,
                    };
                    if better {
                        best = Some((*key, node.entity_ids().to_vec()));
                    }
                }
            }
            Ok(best)
        })
    }

    /// Cells hit by `ray`, sorted ascending by entry parameter `t`.
    pub fn ray_query(&self, ray: &Ray) -> Result<Vec<(T::Key, f32, Vec<Id>)>> {
        self.with_read(|_entities, nodes, _config| {
            let mut hits = Vec::new();
            for (key, node) in nodes.iter() {
                if let Some(t) = T::intersects_ray(key, ray)? {
                    hits.push((*key, t, node.entity_ids().to_vec()));
                }
            }
            hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
            Ok(hits)
        })
    }

    /// Cells intersecting `sphere`.
    pub fn sphere_query(&self, sphere: &Sphere) -> Result<Vec<(T::Key, Vec<Id>)>> {
        self.with_read(|_entities, nodes, _config| {
            let mut out = Vec::new();
            for (key, node) in nodes.iter() {
                let aabb = T::cell_aabb(key)?;
                if aabb.intersects_sphere(sphere) {
                    out.push((*key, node.entity_ids().to_vec()));
                }
            }
            Ok(out)
        })
    }

    /// Cells on the positive side of or straddling `plane`.
    pub fn plane_query(&self, plane: &Plane) -> Result<Vec<(T::Key, Vec<Id>)>> {
        use crate::geometry::PlaneSide;
        self.with_read(|_entities, nodes, _config| {
            let mut out = Vec::new();
            for (key, node) in nodes.iter() {
                let aabb = T::cell_aabb(key)?;
                if !matches!(plane.classify_aabb(&aabb), PlaneSide::Outside) {
                    out.push((*key, node.entity_ids().to_vec()));
                }
            }
            Ok(out)
        })
    }

    /// Cells inside or straddling `frustum`.
    pub fn frustum_query(&self, frustum: &Frustum) -> Result<Vec<(T::Key, Vec<Id>)>> {
        use crate::geometry::PlaneSide;
        self.with_read(|_entities, nodes, _config| {
            let mut out = Vec::new();
            for (key, node) in nodes.iter() {
                let aabb = T::cell_aabb(key)?;
                if !matches!(frustum.classify_aabb(&aabb), PlaneSide::Outside) {
                    out.push((*key, node.entity_ids().to_vec()));
                }
            }
            Ok(out)
        })
    }

    /// Runs [`bounding`](Self::bounding) once per volume, one read
    /// lock acquisition per volume (§4.7 "Batch query").
    pub fn batch_bounding(&self, volumes: &[Aabb]) -> Result<Vec<Vec<(T::Key, Vec<Id>)>>> {
        volumes.iter().map(|v| self.bounding(v)).collect()
    }
}

/// §4.7 "Ranged enumeration": for each distinct level currently
/// present among live nodes, derive a conservative key range via
/// `T::conservative_key_range` and scan only that slice of the node
/// store's ordered keys, applying `predicate` as the precise
/// geometric filter. A key from a different level can still fall
/// inside another level's range (the key types don't sort levels
/// into disjoint bands), so `predicate` — not the range — is what
/// keeps results correct; the per-level ranges are what keep this
/// cheaper than a full scan.
fn ranged_scan<T, Id>(
    nodes: &NodeStore<T::Key, Id>,
    volume: &Aabb,
    predicate: impl Fn(&T::Key, &Aabb) -> Result<bool>,
) -> Result<Vec<(T::Key, Vec<Id>)>>
where
    T: Tree,
    Id: Clone,
{
    let mut levels: Vec<u8> = nodes.keys().map(T::level).collect();
    levels.sort_unstable();
    levels.dedup();

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for level in levels {
        let (lo, hi) = T::conservative_key_range(volume, level)?;
        for key in nodes.range(&lo, &hi) {
            if !seen.insert(*key) {
                continue;
            }
            if predicate(key, volume)? {
                if let Some(node) = nodes.get(key) {
                    out.push((*key, node.entity_ids().to_vec()));
                }
            }
        }
    }
    Ok(out)
}
