//! A 3D spatial index over positive coordinates, supporting two
//! interchangeable hierarchical decompositions: an Octree on a 3D
//! Morton curve, and a Tetree on Bey-refined tetrahedra (see
//! [`sfc3d`] for the underlying key algebra).

pub mod bulk;
pub mod config;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod index;
pub mod node;
pub mod octree;
pub mod query;
pub mod tet_index;
pub mod tree;
pub mod vec3;

pub use config::{BulkConfig, Config, IdGenerator, MonotonicU64, SpanningPolicy};
pub use error::{BulkEntityError, Result, SpatialError};
pub use index::SpatialIndex;
pub use tree::{Octree, Tetree, Tree};
pub use vec3::{Point3, Vec3};

pub use geometry::{Aabb, Cube, Frustum, Plane, PlaneSide, Ray, Sphere, SphereClass, TetGeom, EPS};
pub use octree::OctreeKey;
pub use sfc3d::tetree::Tet;
