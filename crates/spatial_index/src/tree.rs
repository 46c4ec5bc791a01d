//! The shared abstract contract between Octree and Tetree (§9
//! "Dynamic dispatch"): a trait with two zero-sized implementations,
//! rather than a virtual inheritance hierarchy. [`SpatialIndex`] and
//! the query engines in `query.rs` are generic over `T: Tree`.

use std::fmt::Debug;
use std::hash::Hash;

use sfc3d::tetree::Tet;

use crate::error::Result;
use crate::geometry::{Aabb, Ray};
use crate::octree::{self, OctreeKey};
use crate::tet_index;
use crate::vec3::Point3;

/// The abstract contract shared by both spatial decompositions. Only
/// the key algebra and a small set of geometric hooks vary.
pub trait Tree: Sized {
    type Key: Ord + Hash + Eq + Clone + Debug + Copy;

    fn key_for_position(position: &Point3, level: u8) -> Result<Self::Key>;
    fn level(key: &Self::Key) -> u8;
    fn parent(key: &Self::Key) -> Result<Self::Key>;
    fn children(key: &Self::Key) -> Result<Vec<Self::Key>>;
    fn neighbors(key: &Self::Key) -> Vec<Self::Key>;

    fn cell_aabb(key: &Self::Key) -> Result<Aabb>;
    fn cell_contains_point(key: &Self::Key, p: &Point3) -> Result<bool>;
    fn cell_intersects_aabb(key: &Self::Key, aabb: &Aabb) -> Result<bool>;
    fn cell_contains_aabb(key: &Self::Key, aabb: &Aabb) -> Result<bool>;
    fn conservative_key_range(aabb: &Aabb, level: u8) -> Result<(Self::Key, Self::Key)>;
    fn distance_squared_to_point(key: &Self::Key, p: &Point3) -> Result<f32>;
    fn intersects_ray(key: &Self::Key, ray: &Ray) -> Result<Option<f32>>;
}

/// Cubic cells on a 3D Morton curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Octree;

impl Tree for Octree {
    type Key = OctreeKey;

    fn key_for_position(position: &Point3, level: u8) -> Result<Self::Key> {
        octree::key_for_position(position, level)
    }

    fn level(key: &Self::Key) -> u8 {
        key.level()
    }

    fn parent(key: &Self::Key) -> Result<Self::Key> {
        octree::parent(key)
    }

    fn children(key: &Self::Key) -> Result<Vec<Self::Key>> {
        (0..8u8).map(|octant| octree::child(key, octant)).collect()
    }

    fn neighbors(key: &Self::Key) -> Vec<Self::Key> {
        octree::axis_neighbors(key)
    }

    fn cell_aabb(key: &Self::Key) -> Result<Aabb> {
        Ok(octree::cube_of(key)?.aabb())
    }

    fn cell_contains_point(key: &Self::Key, p: &Point3) -> Result<bool> {
        Ok(octree::cube_of(key)?.contains_point(p))
    }

    fn cell_intersects_aabb(key: &Self::Key, aabb: &Aabb) -> Result<bool> {
        Ok(octree::cube_of(key)?.intersects_aabb(aabb))
    }

    fn cell_contains_aabb(key: &Self::Key, aabb: &Aabb) -> Result<bool> {
        Ok(octree::cube_of(key)?.contains_aabb(aabb))
    }

    fn conservative_key_range(aabb: &Aabb, level: u8) -> Result<(Self::Key, Self::Key)> {
        octree::conservative_key_range(aabb, level)
    }

    fn distance_squared_to_point(key: &Self::Key, p: &Point3) -> Result<f32> {
        Ok(octree::cube_of(key)?.aabb().distance_squared_to_point(p))
    }

    fn intersects_ray(key: &Self::Key, ray: &Ray) -> Result<Option<f32>> {
        Ok(octree::cube_of(key)?.intersects_ray(ray))
    }
}

/// Bey-refined tetrahedral cells on the tetrahedral SFC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tetree;

impl Tree for Tetree {
    type Key = Tet;

    fn key_for_position(position: &Point3, level: u8) -> Result<Self::Key> {
        tet_index::tet_for_position(position, level)
    }

    fn level(key: &Self::Key) -> u8 {
        key.level
    }

    fn parent(key: &Self::Key) -> Result<Self::Key> {
        tet_index::parent(key)
    }

    fn children(key: &Self::Key) -> Result<Vec<Self::Key>> {
        (0..8u8).map(|i| tet_index::child(key, i)).collect()
    }

    fn neighbors(key: &Self::Key) -> Vec<Self::Key> {
        tet_index::face_neighbors(key)
    }

    fn cell_aabb(key: &Self::Key) -> Result<Aabb> {
        Ok(tet_index::tet_of(key).aabb())
    }

    fn cell_contains_point(key: &Self::Key, p: &Point3) -> Result<bool> {
        Ok(tet_index::tet_of(key).contains_point(p))
    }

    fn cell_intersects_aabb(key: &Self::Key, aabb: &Aabb) -> Result<bool> {
        Ok(tet_index::tet_of(key).intersects_aabb(aabb))
    }

    fn cell_contains_aabb(key: &Self::Key, aabb: &Aabb) -> Result<bool> {
        Ok(tet_index::tet_of(key).contains_aabb(aabb))
    }

    fn conservative_key_range(aabb: &Aabb, level: u8) -> Result<(Self::Key, Self::Key)> {
        tet_index::conservative_key_range(aabb, level)
    }

    fn distance_squared_to_point(key: &Self::Key, p: &Point3) -> Result<f32> {
        Ok(tet_index::tet_of(key).distance_squared_to_point(p))
    }

    fn intersects_ray(key: &Self::Key, ray: &Ray) -> Result<Option<f32>> {
        Ok(tet_index::tet_of(key).intersects_ray(ray))
    }
}
