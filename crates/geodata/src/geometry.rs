// Collision geometry primitives - ray/box, ray/triangle, box distance
// Total functions: non-finite inputs flow through the arithmetic and land
// in the output (or fall out as a miss), they never panic

use serde::Serialize;

use crate::math::{AaBox, Vec3};

/// Tolerance for parallel-ray and on-face tests
pub const GEOM_EPSILON: f32 = 1e-6;

/// Result of a successful ray/box intersection
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RayHit {
    /// Parametric entry distance along the ray direction
    pub distance: f32,
    /// World-space entry point
    pub point: Vec3,
    /// Outward normal of the face the entry point lies on
    pub normal: Vec3,
}

/// Slab-method ray/AABB intersection.
///
/// Per axis: a near-zero direction component requires the origin to already
/// lie inside that slab; otherwise entry/exit distances narrow a running
/// `[tmin, tmax]` window, rejecting as soon as it inverts. Boxes entirely
/// behind the origin are a miss; an origin inside the box hits at distance 0.
pub fn ray_box_intersect(origin: Vec3, dir: Vec3, bounds: &AaBox) -> Option<RayHit> {
    let mut tmin = f32::NEG_INFINITY;
    let mut tmax = f32::INFINITY;

    for axis in 0..3 {
        let o = origin.axis(axis);
        let d = dir.axis(axis);
        let lo = bounds.min.axis(axis);
        let hi = bounds.max.axis(axis);

        if d.abs() < GEOM_EPSILON {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }

        let inv = 1.0 / d;
        let mut t1 = (lo - o) * inv;
        let mut t2 = (hi - o) * inv;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        if t1 > tmin {
            tmin = t1;
        }
        if t2 < tmax {
            tmax = t2;
        }
        if tmin > tmax {
            return None;
        }
    }

    if tmax < 0.0 {
        return None;
    }
    let distance = if tmin < 0.0 { 0.0 } else { tmin };
    let point = origin.add(dir.scale(distance));
    Some(RayHit {
        distance,
        point,
        normal: face_normal(bounds, point),
    })
}

/// Outward normal of the box face the point lies closest to.
fn face_normal(bounds: &AaBox, point: Vec3) -> Vec3 {
    let mut best = f32::INFINITY;
    let mut normal = Vec3::new(0.0, 0.0, 1.0);
    for axis in 0..3 {
        for (corner, sign) in [(bounds.min, -1.0f32), (bounds.max, 1.0)] {
            let d = (point.axis(axis) - corner.axis(axis)).abs();
            if d < best {
                best = d;
                normal = Vec3::ZERO;
                match axis {
                    0 => normal.x = sign,
                    1 => normal.y = sign,
                    _ => normal.z = sign,
                }
            }
        }
    }
    normal
}

/// Moller-Trumbore ray/triangle intersection, returning the parametric hit
/// distance. Rays parallel to the triangle plane, barycentric coordinates
/// outside the triangle, and hits at or behind the origin are all misses.
pub fn ray_triangle_intersect(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let edge1 = b.sub(a);
    let edge2 = c.sub(a);
    let pvec = dir.cross(edge2);
    let det = edge1.dot(pvec);
    if det.abs() < GEOM_EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let tvec = origin.sub(a);
    let u = tvec.dot(pvec) * inv_det;
    if u < 0.0 || u > 1.0 {
        return None;
    }

    let qvec = tvec.cross(edge1);
    let v = dir.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(qvec) * inv_det;
    if t <= GEOM_EPSILON {
        return None;
    }
    Some(t)
}

/// Closest point inside the box to `p` (equal to `p` when inside).
pub fn nearest_point_in_box(bounds: &AaBox, p: Vec3) -> Vec3 {
    Vec3::new(
        p.x.clamp(bounds.min.x, bounds.max.x),
        p.y.clamp(bounds.min.y, bounds.max.y),
        p.z.clamp(bounds.min.z, bounds.max.z),
    )
}

/// Distance from a point to the box surface, 0 when inside. This is the
/// sphere/box overlap test: a sphere of radius r intersects the box iff
/// the returned distance is <= r.
pub fn distance_to_box(bounds: &AaBox, p: Vec3) -> f32 {
    nearest_point_in_box(bounds, p).sub(p).length()
}
