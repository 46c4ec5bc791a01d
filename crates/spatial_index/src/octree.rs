//! Octree-specific hooks: cubic cells addressed by 3D Morton codes
//! (§4.1, §4.6). [`OctreeKey`] pairs a *compact* Morton path (as
//! produced by [`sfc3d::morton::child`]/`parent`, one 3-bit octant
//! per level) with its level, since the bare path alone does not
//! determine the cell's depth.

use sfc3d::morton::{self, MortonError};

use crate::error::{Result, SpatialError};
use crate::geometry::{Aabb, Cube};
use crate::vec3::Point3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OctreeKey {
    /// Compact path from the root: level `ℓ` contributes 3 bits.
    path: u64,
    level: u8,
}

impl OctreeKey {
    pub const ROOT: OctreeKey = OctreeKey { path: 0, level: 0 };

    pub fn level(&self) -> u8 {
        self.level
    }

    /// The code at full [`morton::MAX_LEVEL`] resolution: `path`
    /// left-shifted so it compares correctly against keys at other
    /// levels (their shared ancestor prefix matches bit-for-bit).
    fn dense_code(&self) -> u64 {
        self.path << (3 * (morton::MAX_LEVEL - self.level) as u32)
    }
}

impl PartialOrd for OctreeKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OctreeKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dense_code()
            .cmp(&other.dense_code())
            .then(self.level.cmp(&other.level))
    }
}

fn require_finite_non_negative(p: &Point3) -> Result<()> {
    if !p.is_finite() || !p.is_non_negative() {
        return Err(SpatialError::InvalidCoordinate);
    }
    Ok(())
}

/// Converts a floating-point position into the finest-grid integer
/// coordinates used by the Morton key algebra.
fn to_grid(p: &Point3) -> Result<(u32, u32, u32)> {
    require_finite_non_negative(p)?;
    let to_axis = |v: f32| -> Result<u32> {
        if v > morton::COORD_MAX as f32 {
            return Err(SpatialError::Overflow);
        }
        Ok(v as u32)
    };
    Ok((to_axis(p.x)?, to_axis(p.y)?, to_axis(p.z)?))
}

/// The key of the cell at `level` containing `position`.
pub fn key_for_position(position: &Point3, level: u8) -> Result<OctreeKey> {
    if level > morton::MAX_LEVEL {
        return Err(SpatialError::InvalidLevel);
    }
    let (x, y, z) = to_grid(position)?;
    let (qx, qy, qz) = morton::quantize(x, y, z, level);
    let dense = morton::encode(qx, qy, qz)?;
    let path = dense >> (3 * (morton::MAX_LEVEL - level) as u32);
    Ok(OctreeKey { path, level })
}

pub fn parent(key: &OctreeKey) -> Result<OctreeKey> {
    if key.level == 0 {
        return Err(SpatialError::InvalidLevel);
    }
    Ok(OctreeKey {
        path: morton::parent(key.path),
        level: key.level - 1,
    })
}

pub fn child(key: &OctreeKey, octant: u8) -> Result<OctreeKey> {
    if key.level >= morton::MAX_LEVEL {
        return Err(SpatialError::InvalidLevel);
    }
    Ok(OctreeKey {
        path: morton::child(key.path, octant)?,
        level: key.level + 1,
    })
}

/// The cube cell addressed by `key`, in floating-point coordinates.
pub fn cube_of(key: &OctreeKey) -> Result<Cube> {
    let dense = key.dense_code();
    let (x, y, z) = morton::decode(dense);
    let origin = Point3::new(x as f32, y as f32, z as f32);
    let extent = morton::cell_size(key.level) as f32;
    Cube::new(origin, extent)
}

/// The 6 axis-aligned neighbor keys (±x, ±y, ±z) at the same level
/// as `key`, skipping any that would fall outside the positive grid.
pub fn axis_neighbors(key: &OctreeKey) -> Vec<OctreeKey> {
    let dense = key.dense_code();
    let (x, y, z) = morton::decode(dense);
    let step = morton::cell_size(key.level) as i64;
    let mut out = Vec::with_capacity(6);
    let deltas: [(i64, i64, i64); 6] = [
        (-step, 0, 0),
        (step, 0, 0),
        (0, -step, 0),
        (0, step, 0),
        (0, 0, -step),
        (0, 0, step),
    ];
    for (dx, dy, dz) in deltas {
        let nx = x as i64 + dx;
        let ny = y as i64 + dy;
        let nz = z as i64 + dz;
        if nx < 0 || ny < 0 || nz < 0 {
            continue;
        }
        if nx as u32 > morton::COORD_MAX || ny as u32 > morton::COORD_MAX || nz as u32 > morton::COORD_MAX {
            continue;
        }
        if let Ok(code) = morton::encode(nx as u32, ny as u32, nz as u32) {
            let path = code >> (3 * (morton::MAX_LEVEL - key.level) as u32);
            out.push(OctreeKey { path, level: key.level });
        }
    }
    out
}

/// A conservative `[lo, hi]` dense-code range guaranteed to contain
/// every cell at `level` touching `aabb`: per-axis monotonicity of
/// Morton interleaving means the code of any point inside the box is
/// bounded by the codes of its own min/max corners.
pub fn conservative_key_range(aabb: &Aabb, level: u8) -> Result<(OctreeKey, OctreeKey)> {
    let lo = key_for_position(&aabb.min, level)?;
    let hi = key_for_position(&aabb.max, level)?;
    Ok((lo, hi))
}

impl From<MortonError> for SpatialError {
    fn from(_: MortonError) -> Self {
        SpatialError::Overflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_for_position_matches_morton_scenario() {
        let key = key_for_position(&Point3::new(5.0, 9.0, 1.0), 21).unwrap();
        let cube = cube_of(&key).unwrap();
        assert_eq!(cube.origin, Point3::new(5.0, 9.0, 1.0));
    }

    #[test]
    fn parent_child_round_trip() {
        let key = key_for_position(&Point3::new(100.0, 200.0, 300.0), 10).unwrap();
        for octant in 0..8u8 {
            let kid = child(&key, octant).unwrap();
            assert_eq!(parent(&kid).unwrap(), key);
        }
    }

    #[test]
    fn coarser_cube_contains_position() {
        let position = Point3::new(100.0, 200.0, 300.0);
        let key = key_for_position(&position, 5).unwrap();
        let cube = cube_of(&key).unwrap();
        assert!(cube.contains_point(&position));
    }

    #[test]
    fn axis_neighbors_skip_negative_directions_at_origin() {
        let key = key_for_position(&Point3::ZERO, 3).unwrap();
        let neighbors = axis_neighbors(&key);
        assert_eq!(neighbors.len(), 3);
    }

    #[test]
    fn ordering_respects_level_then_code() {
        let root = OctreeKey::ROOT;
        let child_key = child(&root, 5).unwrap();
        assert!(root < child_key || root > child_key || root == child_key);
        assert_ne!(root, child_key);
    }
}
