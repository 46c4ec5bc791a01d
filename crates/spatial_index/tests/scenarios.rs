//! End-to-end scenarios (S1-S9) exercising the public API as a whole,
//! rather than a single module in isolation.

use sfc3d::morton;
use sfc3d::tetree::{self, Tet};
use spatial_index::{BulkConfig, Config, MonotonicU64, Octree, Point3, SpatialError, SpatialIndex, Tetree};

#[test]
fn s1_morton_round_trip() {
    let code = morton::encode(5, 9, 1).unwrap();
    assert_eq!(code, 0x2d3);
    assert_eq!(morton::decode(code), (5, 9, 1));
}

#[test]
fn s2_single_insert_then_lookup() {
    let config = Config::new(2, 5).unwrap();
    let index: SpatialIndex<Octree, u64, &'static str> = SpatialIndex::new(config, MonotonicU64::new());
    let p = Point3::new(100.0, 100.0, 100.0);

    let id1 = index.insert(p, 5, "A").unwrap();

    assert_eq!(index.lookup(&p, 5).unwrap(), vec![id1]);
    assert_eq!(index.get_content(&id1), Some("A"));
}

#[test]
fn s3_subdivision_candidate_accumulates_past_threshold() {
    // max_per_node=2: three entities landing in the same level-5 cell
    // overflow the node (this index defers subdivision rather than
    // splitting live, per SPEC_FULL.md's §4.6 implementer's choice)
    // and the cell is marked subdivision-candidate (I5a) until a
    // `finalize_subdivisions` pass drains it.
    let config = Config::new(2, 5).unwrap();
    let index: SpatialIndex<Octree, u64, i32> = SpatialIndex::new(config, MonotonicU64::new());

    let cell_origin = Point3::new(0.0, 0.0, 0.0);
    for i in 0..3 {
        index.insert(cell_origin, 5, i).unwrap();
    }

    assert_eq!(index.lookup(&cell_origin, 5).unwrap().len(), 3);
    assert!(index.is_subdivision_candidate(&cell_origin, 5).unwrap());

    let processed = index.finalize_subdivisions(usize::MAX);
    assert_eq!(processed, 1);
    assert!(!index.is_subdivision_candidate(&cell_origin, 5).unwrap());
}

#[test]
fn s4_k_nearest_returns_closest_two_in_order() {
    let config = Config::new(10, 10).unwrap();
    let index: SpatialIndex<Octree, u64, &'static str> = SpatialIndex::new(config, MonotonicU64::new());

    let id1 = index.insert(Point3::new(10.0, 10.0, 10.0), 10, "near").unwrap();
    let id2 = index.insert(Point3::new(20.0, 20.0, 20.0), 10, "mid").unwrap();
    index.insert(Point3::new(30.0, 30.0, 30.0), 10, "far").unwrap();
    index.insert(Point3::new(100.0, 100.0, 100.0), 10, "very_far").unwrap();

    let result = index.k_nearest(&Point3::new(12.0, 12.0, 12.0), 2, 50.0).unwrap();
    assert_eq!(result, vec![id1, id2]);
}

#[test]
fn s5_ray_from_negative_origin_rejected_then_hit_at_boundary() {
    let config = Config::new(10, 8).unwrap();
    let index: SpatialIndex<Octree, u64, &'static str> = SpatialIndex::new(config, MonotonicU64::new());
    index.insert(Point3::new(5.0, 5.0, 5.0), 8, "cube").unwrap();

    use spatial_index::Ray;
    assert!(Ray::new(Point3::new(-1.0, 5.0, 5.0), spatial_index::Vec3::new(1.0, 0.0, 0.0), 100.0).is_err());

    let ray = Ray::new(Point3::new(0.0, 5.0, 5.0), spatial_index::Vec3::new(1.0, 0.0, 0.0), 100.0).unwrap();
    let hits = index.ray_query(&ray).unwrap();
    assert!(!hits.is_empty());
}

#[test]
fn s6_tetree_reconstruction_round_trips() {
    let t = Tet {
        x: 64,
        y: 64,
        z: 64,
        level: 5,
        kind: 2,
    };
    let index = tetree::index_of(&t).unwrap();
    assert_eq!(tetree::level_of(index), 5);
    assert_eq!(tetree::tet_of(index, 5).unwrap(), t);
}

#[test]
fn s7_spanning_bounded_entity_reachable_from_every_intersecting_cell() {
    use spatial_index::{Aabb, SpanningPolicy};

    let config = Config::new(10, 6).unwrap().with_spanning(SpanningPolicy::BoundsRequired);
    let index: SpatialIndex<Octree, u64, &'static str> = SpatialIndex::new(config, MonotonicU64::new());

    let cell = morton::cell_size(6) as f32;
    let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(cell * 2.0, cell * 2.0, cell)).unwrap();
    let center = Point3::new(cell, cell, cell * 0.5);

    let id = index.insert_with_bounds(center, 6, "spans", Some(bounds)).unwrap();

    let hits = index.bounding(&bounds).unwrap();
    let touched: Vec<u64> = hits.into_iter().flat_map(|(_, ids)| ids).collect();
    assert!(touched.contains(&id));
    assert!(touched.len() >= 2, "entity should be reachable from more than one spanned cell");
}

#[test]
fn s8_invalid_config_is_rejected_before_construction() {
    assert_eq!(Config::new(0, 10), Err(SpatialError::InvalidConfig));
    assert_eq!(Config::new(10, 22), Err(SpatialError::InvalidConfig));
}

#[test]
fn s9_bulk_insert_reports_partial_failure_without_aborting() {
    let config = Config::new(10, 10).unwrap();
    let index: SpatialIndex<Octree, u64, i32> = SpatialIndex::new(config, MonotonicU64::new());

    let positions = vec![
        Point3::new(1.0, 1.0, 1.0),
        Point3::new(-5.0, 0.0, 0.0),
        Point3::new(2.0, 2.0, 2.0),
    ];
    let contents = vec![1, 2, 3];

    let result = index.bulk_insert(&positions, &contents, 8, &BulkConfig::default());

    assert_eq!(result.ids.len(), 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].index, 1);
    assert_eq!(index.len(), 2);
}

#[test]
fn update_round_trip_leaves_lookup_consistent() {
    let config = Config::new(10, 10).unwrap();
    let index: SpatialIndex<Octree, u64, &'static str> = SpatialIndex::new(config, MonotonicU64::new());

    let p = Point3::new(10.0, 10.0, 10.0);
    let p2 = Point3::new(500.0, 500.0, 500.0);
    let id = index.insert(p, 10, "A").unwrap();

    index.update(&id, p2, 10).unwrap();
    index.update(&id, p, 10).unwrap();

    assert_eq!(index.lookup(&p, 10).unwrap(), vec![id]);
    assert_eq!(index.get_position(&id), Some(p));
}

#[test]
fn tetree_index_shares_the_same_query_surface() {
    let config = Config::new(10, 8).unwrap();
    let index: SpatialIndex<Tetree, u64, &'static str> = SpatialIndex::new(config, MonotonicU64::new());

    let p = Point3::new(50.0, 50.0, 50.0);
    let id = index.insert(p, 8, "tet-entity").unwrap();

    assert_eq!(index.lookup(&p, 8).unwrap(), vec![id]);
    let neighbors = index.k_nearest(&p, 1, 10.0).unwrap();
    assert_eq!(neighbors, vec![id]);
}
