//! Property-based coverage of the universally-quantified claims in
//! P1, P2, P6, P7 and P10, generated with `proptest` rather than a
//! handful of hand-picked cases.

use proptest::prelude::*;
use sfc3d::morton;
use sfc3d::tetree::{self, Tet};
use spatial_index::{Config, MonotonicU64, Octree, Point3, SpatialError, SpatialIndex};

proptest! {
    /// P1 (Octree half): `decode(encode(x, y, z)) == (x, y, z)` for
    /// every coordinate representable in 21 bits.
    #[test]
    fn p1_morton_round_trips(x in 0u32..=morton::COORD_MAX, y in 0u32..=morton::COORD_MAX, z in 0u32..=morton::COORD_MAX) {
        let code = morton::encode(x, y, z).unwrap();
        prop_assert_eq!(morton::decode(code), (x, y, z));
    }

    /// P2 (Octree half): `parent(child(code, octant)) == code`.
    #[test]
    fn p2_morton_child_parent_is_inverse(x in 0u32..=morton::COORD_MAX, y in 0u32..=morton::COORD_MAX, z in 0u32..=morton::COORD_MAX, octant in 0u8..8) {
        let code = morton::encode(x, y, z).unwrap();
        let kid = morton::child(code, octant).unwrap();
        prop_assert_eq!(morton::parent(kid), code);
    }

    /// P1/P2 (Tetree half): `index_of(tet_of(index, level)) == index`
    /// and parent/child are mutual inverses. `index` drives the walk
    /// rather than an independently-chosen `(position, kind)` pair,
    /// since only indices reachable by a root-down descent name an
    /// actual tet (`level_of` only recovers `level` for an index whose
    /// leading 3-bit group is nonzero, so it is not asserted here).
    #[test]
    fn p1_p2_tetree_round_trips(raw_index in 0u64..(1u64 << 24), bey in 0u8..8) {
        let level = 8u8;
        let index = raw_index & ((1u64 << (3 * level)) - 1);
        let tet = tetree::tet_of(index, level).unwrap();

        prop_assert_eq!(tet.level, level);
        prop_assert_eq!(tetree::index_of(&tet).unwrap(), index);

        let child = tetree::child(&tet, bey).unwrap();
        prop_assert_eq!(tetree::parent(&child).unwrap(), tet);
    }

    /// P10: every public mutating operation rejects a negative
    /// coordinate and performs no mutation.
    #[test]
    fn p10_negative_coordinates_are_always_rejected(nx in -1000.0f32..-0.001, y in 0.0f32..1000.0, z in 0.0f32..1000.0) {
        let config = Config::new(10, 10).unwrap();
        let index: SpatialIndex<Octree, u64, i32> = SpatialIndex::new(config, MonotonicU64::new());

        let result = index.insert(Point3::new(nx, y, z), 5, 1);
        prop_assert_eq!(result, Err(SpatialError::InvalidCoordinate));
        prop_assert_eq!(index.len(), 0);
    }

    /// P6: remove is idempotent — the second call returns `false` and
    /// leaves the index exactly as the first call left it.
    #[test]
    fn p6_remove_is_idempotent(x in 0.0f32..1000.0, y in 0.0f32..1000.0, z in 0.0f32..1000.0) {
        let config = Config::new(10, 10).unwrap();
        let index: SpatialIndex<Octree, u64, i32> = SpatialIndex::new(config, MonotonicU64::new());
        let id = index.insert(Point3::new(x, y, z), 5, 1).unwrap();

        prop_assert!(index.remove(&id));
        prop_assert!(!index.remove(&id));
        prop_assert_eq!(index.len(), 0);
    }

    /// P7: a round-trip update (p -> p' -> p) leaves the index
    /// indistinguishable from its state before the first update.
    #[test]
    fn p7_round_trip_update_restores_lookup(
        x in 0.0f32..500.0, y in 0.0f32..500.0, z in 0.0f32..500.0,
        x2 in 500.0f32..1000.0, y2 in 500.0f32..1000.0, z2 in 500.0f32..1000.0,
    ) {
        let config = Config::new(10, 10).unwrap();
        let index: SpatialIndex<Octree, u64, i32> = SpatialIndex::new(config, MonotonicU64::new());
        let p = Point3::new(x, y, z);
        let p2 = Point3::new(x2, y2, z2);
        let id = index.insert(p, 8, 1).unwrap();

        index.update(&id, p2, 8).unwrap();
        index.update(&id, p, 8).unwrap();

        prop_assert_eq!(index.lookup(&p, 8).unwrap(), vec![id]);
        prop_assert_eq!(index.get_position(&id), Some(p));
    }
}
