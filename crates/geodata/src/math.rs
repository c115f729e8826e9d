// Vec3 / AaBox - float-triple math shared by every parser and query
// No parse-time invariant enforcement: malformed files may produce
// inverted boxes and these must flow through without panicking

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    pub fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        self.sub(other).length()
    }

    /// Distance in the XY plane, ignoring height
    pub fn distance_2d(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Component by split-axis index (0 = x, 1 = y, 2 = z)
    pub fn axis(self, axis: usize) -> f32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AaBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl AaBox {
    pub const ZERO: AaBox = AaBox {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    pub fn merge(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Overlap test, boundary-touching counts as intersecting
    pub fn intersects(&self, other: &AaBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Whether (x, y) falls inside the box footprint, any height
    pub fn contains_xy(&self, x: f32, y: f32) -> bool {
        x >= self.min.x && x <= self.max.x && y >= self.min.y && y <= self.max.y
    }

    pub fn center(&self) -> Vec3 {
        self.min.add(self.max).scale(0.5)
    }

    /// Height of the box's horizontal midplane
    pub fn midplane_z(&self) -> f32 {
        (self.min.z + self.max.z) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_ops() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 6.0, 3.0);
        assert_eq!(a.add(b), Vec3::new(5.0, 8.0, 6.0));
        assert_eq!(b.sub(a), Vec3::new(3.0, 4.0, 0.0));
        assert_eq!(a.scale(2.0), Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(a.distance(b), 5.0);
        assert_eq!(a.distance_2d(b), 5.0);
    }

    #[test]
    fn test_cross_is_orthogonal() {
        let a = Vec3::new(1.0, 0.0, 0.0);
        let b = Vec3::new(0.0, 1.0, 0.0);
        let c = a.cross(b);
        assert_eq!(c, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(c.dot(a), 0.0);
    }

    #[test]
    fn test_box_merge_and_intersect() {
        let mut b = AaBox::from_point(Vec3::new(1.0, 1.0, 1.0));
        b.merge(Vec3::new(-1.0, 3.0, 0.0));
        assert_eq!(b.min, Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 3.0, 1.0));

        let other = AaBox::new(Vec3::new(0.5, 2.0, 0.5), Vec3::new(5.0, 5.0, 5.0));
        assert!(b.intersects(&other));
        let disjoint = AaBox::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 1.0, 1.0));
        assert!(!b.intersects(&disjoint));
    }

    #[test]
    fn test_box_contains() {
        let b = AaBox::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        assert!(b.contains(Vec3::new(1.0, 1.0, 1.0)));
        assert!(b.contains(Vec3::new(2.0, 2.0, 2.0)));
        assert!(!b.contains(Vec3::new(1.0, 1.0, 2.1)));
        assert!(b.contains_xy(1.5, 0.0));
        assert!(!b.contains_xy(-0.1, 1.0));
    }

    #[test]
    fn test_midplane() {
        let b = AaBox::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(1.0, 1.0, 30.0));
        assert_eq!(b.midplane_z(), 20.0);
        assert_eq!(b.center(), Vec3::new(0.5, 0.5, 20.0));
    }
}
