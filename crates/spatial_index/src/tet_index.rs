//! Tetree-specific hooks: Bey-refined tetrahedral cells addressed by
//! the tetrahedral SFC (§4.2, §4.6). The key type is `sfc3d::tetree::Tet`
//! itself, which already derives a total order and `Hash`.

use sfc3d::tetree::{self, Tet};

use crate::error::{Result, SpatialError};
use crate::geometry::{Aabb, TetGeom};
use crate::vec3::Point3;

fn require_finite_non_negative(p: &Point3) -> Result<()> {
    if !p.is_finite() || !p.is_non_negative() {
        return Err(SpatialError::InvalidCoordinate);
    }
    Ok(())
}

fn to_grid(p: &Point3) -> Result<(u32, u32, u32)> {
    require_finite_non_negative(p)?;
    let to_axis = |v: f32| -> Result<u32> {
        if v > u32::MAX as f32 {
            return Err(SpatialError::Overflow);
        }
        Ok(v as u32)
    };
    Ok((to_axis(p.x)?, to_axis(p.y)?, to_axis(p.z)?))
}

/// The tet at `level` whose cube contains `position`, disambiguated
/// to the specific Kuhn tet inside that cube via four plane-side
/// tests against each of the 6 candidate types.
pub fn tet_for_position(position: &Point3, level: u8) -> Result<Tet> {
    if level > tetree::MAX_LEVEL {
        return Err(SpatialError::InvalidLevel);
    }
    let (x, y, z) = to_grid(position)?;
    let mask = !(tetree::cell_size(level) - 1);
    let (cx, cy, cz) = (x & mask, y & mask, z & mask);

    for kind in 0..6u8 {
        let candidate = Tet {
            x: cx,
            y: cy,
            z: cz,
            level,
            kind,
        };
        let geom = TetGeom::from_grid(tetree::vertices(&candidate));
        if geom.contains_point(position) {
            return Ok(candidate);
        }
    }

    // Exactly on a shared face/vertex: fall back to type 0, which
    // always has a vertex at the cube's own anchor corner.
    Ok(Tet {
        x: cx,
        y: cy,
        z: cz,
        level,
        kind: 0,
    })
}

pub fn parent(tet: &Tet) -> Result<Tet> {
    Ok(tetree::parent(tet)?)
}

pub fn child(tet: &Tet, bey_index: u8) -> Result<Tet> {
    Ok(tetree::child(tet, bey_index)?)
}

pub fn tet_of(key: &Tet) -> TetGeom {
    TetGeom::from_grid(tetree::vertices(key))
}

/// The 4 face-neighbors of `tet`, skipping any whose step would
/// leave the positive grid.
pub fn face_neighbors(tet: &Tet) -> Vec<Tet> {
    (0..4u8)
        .filter_map(|face| tetree::face_neighbor(tet, face).ok())
        .map(|(_, neighbor)| neighbor)
        .collect()
}

/// Conservative `(lo, hi)` bound on the tets at `level` touching
/// `aabb`: the corresponding cube range from the Morton grid, probed
/// for every one of the 6 types present in that span.
pub fn conservative_key_range(aabb: &Aabb, level: u8) -> Result<(Tet, Tet)> {
    let lo = tet_for_position(&aabb.min, level)?;
    let hi = tet_for_position(&aabb.max, level)?;
    Ok((lo, hi))
}
