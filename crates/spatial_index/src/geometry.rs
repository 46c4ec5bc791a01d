//! Geometric primitives shared by the Octree and Tetree query
//! engines (C2, §4.3). All arithmetic is `f32`; a single tolerance
//! [`EPS`] governs ray-triangle parallelism and boundary membership.

use crate::error::{Result, SpatialError};
use crate::vec3::{Point3, Vec3};

/// Tolerance used for ray-triangle parallelism and plane-side
/// boundary membership.
pub const EPS: f32 = 1e-6;

fn require_finite_non_negative(p: &Point3) -> Result<()> {
    if !p.is_finite() || !p.is_non_negative() {
        return Err(SpatialError::InvalidCoordinate);
    }
    Ok(())
}

/// An axis-aligned bounding box, `min < max` elementwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    pub fn new(min: Point3, max: Point3) -> Result<Self> {
        require_finite_non_negative(&min)?;
        require_finite_non_negative(&max)?;
        if min.x >= max.x || min.y >= max.y || min.z >= max.z {
            return Err(SpatialError::InvalidVolume);
        }
        Ok(Self { min, max })
    }

    pub fn center(&self) -> Point3 {
        (self.min + self.max) * 0.5
    }

    pub fn contains_point(&self, p: &Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn intersects_aabb(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// `true` iff `other` is fully contained within `self`.
    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(&other.min),
            max: self.max.max(&other.max),
        }
    }

    /// Squared distance from `p` to the box; `0` if `p` is inside.
    pub fn distance_squared_to_point(&self, p: &Point3) -> f32 {
        let clamp = |v: f32, lo: f32, hi: f32| v.max(lo).min(hi);
        let closest = Point3::new(
            clamp(p.x, self.min.x, self.max.x),
            clamp(p.y, self.min.y, self.max.y),
            clamp(p.z, self.min.z, self.max.z),
        );
        closest.distance_squared(p)
    }

    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.distance_squared_to_point(&sphere.center) <= sphere.radius * sphere.radius
    }
}

/// A cube cell: `origin` is the minimum corner, `extent` the side
/// length (> 0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cube {
    pub origin: Point3,
    pub extent: f32,
}

impl Cube {
    pub fn new(origin: Point3, extent: f32) -> Result<Self> {
        require_finite_non_negative(&origin)?;
        if !extent.is_finite() || extent <= 0.0 {
            return Err(SpatialError::InvalidVolume);
        }
        Ok(Self { origin, extent })
    }

    pub fn max(&self) -> Point3 {
        self.origin + Vec3::splat(self.extent)
    }

    pub fn aabb(&self) -> Aabb {
        Aabb {
            min: self.origin,
            max: self.max(),
        }
    }

    pub fn contains_point(&self, p: &Point3) -> bool {
        self.aabb().contains_point(p)
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.aabb().intersects_aabb(aabb)
    }

    pub fn contains_aabb(&self, aabb: &Aabb) -> bool {
        self.aabb().contains_aabb(aabb)
    }

    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        let aabb = self.aabb();
        let mut dist_sq = 0.0f32;
        for axis in [aabb.min.x, aabb.min.y, aabb.min.z]
            .into_iter()
            .zip([aabb.max.x, aabb.max.y, aabb.max.z])
            .zip([sphere.center.x, sphere.center.y, sphere.center.z])
        {
            let ((lo, hi), c) = axis;
            if c < lo {
                dist_sq += (lo - c) * (lo - c);
            } else if c > hi {
                dist_sq += (c - hi) * (c - hi);
            }
        }
        dist_sq <= sphere.radius * sphere.radius
    }

    pub fn intersects_plane(&self, plane: &Plane) -> bool {
        plane.classify_aabb(&self.aabb()) == PlaneSide::Intersecting
    }

    /// Slab-method ray/box intersection; returns the entry `t` if
    /// the ray hits within `[0, max_distance]`.
    pub fn intersects_ray(&self, ray: &Ray) -> Option<f32> {
        let aabb = self.aabb();
        let mut t_min = 0.0f32;
        let mut t_max = ray.max_distance;

        for axis in 0..3u8 {
            let origin = ray.origin.axis(axis);
            let dir = ray.direction.axis(axis);
            let lo = aabb.min.axis(axis);
            let hi = aabb.max.axis(axis);

            if dir.abs() < EPS {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / dir;
            let mut t0 = (lo - origin) * inv;
            let mut t1 = (hi - origin) * inv;
            if t0 > t1 {
                core::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min.max(0.0))
    }

    /// Triangles of the six faces, wound consistently for
    /// Möller-Trumbore testing.
    pub fn triangles(&self) -> [[Point3; 3]; 12] {
        let o = self.origin;
        let e = self.extent;
        let v = [
            o,
            o + Vec3::new(e, 0.0, 0.0),
            o + Vec3::new(e, e, 0.0),
            o + Vec3::new(0.0, e, 0.0),
            o + Vec3::new(0.0, 0.0, e),
            o + Vec3::new(e, 0.0, e),
            o + Vec3::new(e, e, e),
            o + Vec3::new(0.0, e, e),
        ];
        [
            [v[0], v[1], v[2]],
            [v[0], v[2], v[3]],
            [v[4], v[6], v[5]],
            [v[4], v[7], v[6]],
            [v[0], v[4], v[5]],
            [v[0], v[5], v[1]],
            [v[3], v[2], v[6]],
            [v[3], v[6], v[7]],
            [v[0], v[3], v[7]],
            [v[0], v[7], v[4]],
            [v[1], v[5], v[6]],
            [v[1], v[6], v[2]],
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Point3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Point3, radius: f32) -> Result<Self> {
        require_finite_non_negative(&center)?;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(SpatialError::InvalidVolume);
        }
        Ok(Self { center, radius })
    }

    pub fn contains_point(&self, p: &Point3) -> bool {
        self.center.distance_squared(p) <= self.radius * self.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3,
    pub direction: Vec3,
    pub max_distance: f32,
}

impl Ray {
    pub fn new(origin: Point3, direction: Vec3, max_distance: f32) -> Result<Self> {
        require_finite_non_negative(&origin)?;
        if !max_distance.is_finite() || max_distance <= 0.0 {
            return Err(SpatialError::InvalidVolume);
        }
        let direction = direction.normalized().ok_or(SpatialError::InvalidVolume)?;
        Ok(Self {
            origin,
            direction,
            max_distance,
        })
    }

    pub fn at(&self, t: f32) -> Point3 {
        self.origin + self.direction * t
    }

    /// Möller-Trumbore ray/triangle intersection. Returns
    /// `(t, u, v)` on hit.
    pub fn intersects_triangle(&self, tri: &[Point3; 3]) -> Option<(f32, f32, f32)> {
        let edge1 = tri[1] - tri[0];
        let edge2 = tri[2] - tri[0];
        let h = self.direction.cross(&edge2);
        let a = edge1.dot(&h);
        if a.abs() < EPS {
            return None;
        }
        let f = 1.0 / a;
        let s = self.origin - tri[0];
        let u = f * s.dot(&h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(&edge1);
        let v = f * self.direction.dot(&q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = f * edge2.dot(&q);
        if t <= EPS || t > self.max_distance {
            return None;
        }
        Some((t, u, v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaneSide {
    Inside,
    Outside,
    Intersecting,
}

/// `a*x + b*y + c*z + d = 0`, with `(a, b, c)` a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
}

impl Plane {
    pub fn from_point_normal(point: &Point3, normal: &Vec3) -> Result<Self> {
        let n = normal.normalized().ok_or(SpatialError::InvalidVolume)?;
        let d = -n.dot(point);
        Ok(Self {
            a: n.x,
            b: n.y,
            c: n.z,
            d,
        })
    }

    pub fn distance(&self, p: &Point3) -> f32 {
        self.a * p.x + self.b * p.y + self.c * p.z + self.d
    }

    /// Positive/negative vertex trick: classify an AABB against this
    /// plane by testing only its two extremal corners.
    pub fn classify_aabb(&self, aabb: &Aabb) -> PlaneSide {
        let pick = |lo: f32, hi: f32, comp: f32| if comp >= 0.0 { hi } else { lo };
        let positive = Point3::new(
            pick(aabb.min.x, aabb.max.x, self.a),
            pick(aabb.min.y, aabb.max.y, self.b),
            pick(aabb.min.z, aabb.max.z, self.c),
        );
        let negative = Point3::new(
            pick(aabb.max.x, aabb.min.x, self.a),
            pick(aabb.max.y, aabb.min.y, self.b),
            pick(aabb.max.z, aabb.min.z, self.c),
        );

        let dp = self.distance(&positive);
        let dn = self.distance(&negative);

        if dp < 0.0 {
            PlaneSide::Outside
        } else if dn >= 0.0 {
            PlaneSide::Inside
        } else {
            PlaneSide::Intersecting
        }
    }
}

/// Six half-space planes, normals pointing inward.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    pub fn classify_aabb(&self, aabb: &Aabb) -> PlaneSide {
        let mut intersecting = false;
        for plane in &self.planes {
            match plane.classify_aabb(aabb) {
                PlaneSide::Outside => return PlaneSide::Outside,
                PlaneSide::Intersecting => intersecting = true,
                PlaneSide::Inside => {}
            }
        }
        if intersecting {
            PlaneSide::Intersecting
        } else {
            PlaneSide::Inside
        }
    }
}

/// A tetrahedron's four vertices, in finest-level global
/// coordinates converted to `f32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TetGeom {
    pub vertices: [Point3; 4],
}

impl TetGeom {
    pub fn from_grid(vertices: [(u32, u32, u32); 4]) -> Self {
        let to_point = |(x, y, z): (u32, u32, u32)| Point3::new(x as f32, y as f32, z as f32);
        Self {
            vertices: vertices.map(to_point),
        }
    }

    pub fn aabb(&self) -> Aabb {
        let mut min = self.vertices[0];
        let mut max = self.vertices[0];
        for v in &self.vertices[1..] {
            min = min.min(v);
            max = max.max(v);
        }
        // Degenerate (zero-size) tets at level 0 fall back to a
        // minimal epsilon box so `Aabb::new` still validates.
        if min == max {
            max = max + Vec3::splat(EPS);
        }
        Aabb { min, max }
    }

    /// The four faces, as vertex-index triples opposite each vertex.
    fn faces(&self) -> [[Point3; 3]; 4] {
        let v = self.vertices;
        [
            [v[1], v[2], v[3]],
            [v[0], v[2], v[3]],
            [v[0], v[1], v[3]],
            [v[0], v[1], v[2]],
        ]
    }

    /// Signed volume orientation helper for point-in-tet.
    fn signed_volume(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> f32 {
        let ab = *b - *a;
        let ac = *c - *a;
        let ad = *d - *a;
        ab.cross(&ac).dot(&ad)
    }

    /// Point-in-tet via four plane-side orientation tests: `p` is
    /// inside iff it is on the same side of every face as the
    /// opposite vertex.
    pub fn contains_point(&self, p: &Point3) -> bool {
        let v = self.vertices;
        let refs = [
            (v[1], v[2], v[3], v[0]),
            (v[0], v[2], v[3], v[1]),
            (v[0], v[1], v[3], v[2]),
            (v[0], v[1], v[2], v[3]),
        ];
        refs.iter().all(|(a, b, c, opposite)| {
            let vol_p = Self::signed_volume(a, b, c, p);
            let vol_ref = Self::signed_volume(a, b, c, opposite);
            vol_p * vol_ref >= -EPS
        })
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.aabb().intersects_aabb(aabb)
    }

    pub fn contains_aabb(&self, aabb: &Aabb) -> bool {
        self.contains_point(&aabb.min) && self.contains_point(&aabb.max)
    }

    /// Four face triangles, smallest positive ray parameter `t`.
    pub fn intersects_ray(&self, ray: &Ray) -> Option<f32> {
        self.faces()
            .iter()
            .filter_map(|tri| ray.intersects_triangle(tri))
            .map(|(t, _, _)| t)
            .fold(None, |best, t| match best {
                Some(b) if b <= t => Some(b),
                _ => Some(t),
            })
    }

    /// Minimum squared distance from `p` to the tetrahedron body; 0
    /// if `p` is inside.
    pub fn distance_squared_to_point(&self, p: &Point3) -> f32 {
        if self.contains_point(p) {
            return 0.0;
        }
        self.faces()
            .iter()
            .map(|tri| closest_point_on_triangle(p, tri).distance_squared(p))
            .fold(f32::INFINITY, f32::min)
    }

    pub fn classify_sphere(&self, sphere: &Sphere) -> SphereClass {
        let min_dist_sq = self.distance_squared_to_point(&sphere.center);
        let r2 = sphere.radius * sphere.radius;
        if self.vertices.iter().all(|v| sphere.contains_point(v)) {
            SphereClass::CompletelyInside
        } else if min_dist_sq > r2 {
            SphereClass::CompletelyOutside
        } else {
            SphereClass::Intersecting
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SphereClass {
    CompletelyInside,
    CompletelyOutside,
    Intersecting,
}

fn closest_point_on_triangle(p: &Point3, tri: &[Point3; 3]) -> Point3 {
    // Standard barycentric clamp (Ericson, "Real-Time Collision
    // Detection" 5.1.5), kept simple since triangles here are small
    // and this is only used for distance classification.
    let (a, b, c) = (tri[0], tri[1], tri[2]);
    let ab = b - a;
    let ac = c - a;
    let ap = *p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = *p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = *p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_ray_hit_at_origin() {
        let cube = Cube::new(Point3::ZERO, 10.0).unwrap();
        let ray = Ray::new(Point3::new(0.0, 5.0, 5.0), Vec3::new(1.0, 0.0, 0.0), 100.0).unwrap();
        let t = cube.intersects_ray(&ray).unwrap();
        assert!(t.abs() < 1e-4);
    }

    #[test]
    fn ray_rejects_negative_origin() {
        assert_eq!(
            Ray::new(Point3::new(-1.0, 5.0, 5.0), Vec3::new(1.0, 0.0, 0.0), 100.0),
            Err(SpatialError::InvalidCoordinate)
        );
    }

    #[test]
    fn sphere_cube_intersection() {
        let cube = Cube::new(Point3::new(10.0, 10.0, 10.0), 10.0).unwrap();
        let sphere = Sphere::new(Point3::new(5.0, 15.0, 15.0), 6.0).unwrap();
        assert!(cube.intersects_sphere(&sphere));
        let far = Sphere::new(Point3::new(0.0, 0.0, 0.0), 1.0).unwrap();
        assert!(!cube.intersects_sphere(&far));
    }

    #[test]
    fn aabb_containment_is_strict() {
        let outer = Aabb::new(Point3::ZERO, Point3::splat(10.0)).unwrap();
        let inner = Aabb::new(Point3::splat(1.0), Point3::splat(9.0)).unwrap();
        assert!(outer.contains_aabb(&inner));
        assert!(!inner.contains_aabb(&outer));
    }

    #[test]
    fn plane_splits_aabb() {
        let plane = Plane::from_point_normal(&Point3::new(5.0, 0.0, 0.0), &Vec3::new(1.0, 0.0, 0.0))
            .unwrap();
        let straddling = Aabb::new(Point3::ZERO, Point3::splat(10.0)).unwrap();
        assert_eq!(plane.classify_aabb(&straddling), PlaneSide::Intersecting);

        let inside = Aabb::new(Point3::new(6.0, 0.0, 0.0), Point3::splat(10.0)).unwrap();
        assert_eq!(plane.classify_aabb(&inside), PlaneSide::Inside);
    }

    #[test]
    fn tet_contains_own_centroid() {
        let tet = TetGeom::from_grid([(0, 0, 0), (10, 0, 0), (10, 10, 0), (10, 10, 10)]);
        let centroid = (tet.vertices[0] + tet.vertices[1] + tet.vertices[2] + tet.vertices[3])
            * 0.25;
        assert!(tet.contains_point(&centroid));
    }

    #[test]
    fn tet_rejects_far_point() {
        let tet = TetGeom::from_grid([(0, 0, 0), (10, 0, 0), (10, 10, 0), (10, 10, 10)]);
        assert!(!tet.contains_point(&Point3::new(1000.0, 1000.0, 1000.0)));
    }
}
