use std::ops::{Add, Mul, Neg, Sub};

// ─────────────────────────────────────────────────────────────────────────────
// Vec3
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const X: Self = Self::new(1.0, 0.0, 0.0);
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub const fn from_array([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    #[must_use]
    pub const fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[must_use]
    pub const fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector, or `None` when the length is zero or not finite.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        (len.is_finite() && len > 0.0).then(|| self * len.recip())
    }

    /// Like [`normalized`](Self::normalized) but falls back to [`Vec3::ZERO`].
    /// A zero normal passes an angle test only when the tolerance exceeds 90°.
    #[must_use]
    pub fn normalized_or_zero(self) -> Self {
        self.normalized().unwrap_or(Self::ZERO)
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + -rhs
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Point3
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub const fn from_array([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Position vector from the origin.
    #[must_use]
    pub const fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// Coordinate along `axis` (0 = x, 1 = y, anything else = z).
    #[must_use]
    pub const fn axis(self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    #[must_use]
    pub fn min(self, rhs: Self) -> Self {
        Self::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    #[must_use]
    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }

    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        (self - other).length()
    }

    #[must_use]
    pub fn distance_squared_to(self, other: Self) -> f64 {
        let d = self - other;
        d.dot(d)
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
    }
}

impl From<Vec3> for Point3 {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl Add<Vec3> for Point3 {
    type Output = Self;
    fn add(self, v: Vec3) -> Self {
        Self::new(self.x + v.x, self.y + v.y, self.z + v.z)
    }
}

impl Sub for Point3 {
    type Output = Vec3;
    fn sub(self, rhs: Self) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BBox
// ─────────────────────────────────────────────────────────────────────────────

/// Axis-aligned bounding box.
///
/// [`BBox::EMPTY`] (min = +inf, max = -inf) is the identity for
/// [`union`](Self::union) and is infinitely far from every point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min: Point3,
    pub max: Point3,
}

impl BBox {
    pub const EMPTY: Self = Self::new(
        Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
        Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
    );

    #[must_use]
    pub const fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// True when min > max on some axis.
    #[must_use]
    pub fn is_empty(self) -> bool {
        (0..3).any(|axis| self.min.axis(axis) > self.max.axis(axis))
    }

    #[must_use]
    pub fn center(self) -> Point3 {
        Point3::from((self.min.to_vec3() + self.max.to_vec3()) * 0.5)
    }

    #[must_use]
    pub fn extent(self) -> Vec3 {
        self.max - self.min
    }

    /// Zero for empty boxes.
    #[must_use]
    pub fn surface_area(self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let e = self.extent();
        2.0 * (e.x * e.y + e.y * e.z + e.z * e.x)
    }

    /// 0 = x, 1 = y, 2 = z. Ties go to the lower axis.
    #[must_use]
    pub fn largest_axis(self) -> usize {
        let e = self.extent().to_array();
        (1..3).fold(0, |best, axis| if e[axis] > e[best] { axis } else { best })
    }

    /// Inclusive on every face.
    #[must_use]
    pub fn contains_point(self, p: Point3) -> bool {
        (0..3).all(|axis| (self.min.axis(axis)..=self.max.axis(axis)).contains(&p.axis(axis)))
    }

    /// Every box contains an empty box.
    #[must_use]
    pub fn contains_bbox(self, other: Self) -> bool {
        other.is_empty() || (self.contains_point(other.min) && self.contains_point(other.max))
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Squared distance from `p` to the box, 0 inside and +inf for an empty box.
    #[must_use]
    pub fn distance_squared_to_point(self, p: Point3) -> f64 {
        (0..3)
            .map(|axis| {
                let c = p.axis(axis);
                let d = (self.min.axis(axis) - c).max(c - self.max.axis(axis)).max(0.0);
                d * d
            })
            .sum()
    }
}

impl Default for BBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operators() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Vec3::new(3.0, 3.0, 3.0));
        assert_eq!(a * 2.0, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(-a, Vec3::new(-1.0, -2.0, -3.0));

        let p = Point3::new(1.0, 2.0, 3.0);
        let q = Point3::new(4.0, 5.0, 6.0);
        assert_eq!(p + Vec3::X, Point3::new(2.0, 2.0, 3.0));
        assert_eq!(q - p, Vec3::new(3.0, 3.0, 3.0));
        assert_eq!(p.distance_squared_to(q), 27.0);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(Vec3::X.cross(Vec3::new(0.0, 1.0, 0.0)), Vec3::Z);
        let n = Vec3::new(0.0, 3.0, 4.0).normalized().expect("non-zero");
        assert!((n.length() - 1.0).abs() < 1e-15);
        assert!(Vec3::ZERO.normalized().is_none());
        assert_eq!(Vec3::new(f64::NAN, 0.0, 0.0).normalized_or_zero(), Vec3::ZERO);
    }

    #[test]
    fn test_bbox_queries() {
        let bbox = BBox::new(Point3::ORIGIN, Point3::new(2.0, 4.0, 6.0));
        assert_eq!(bbox.center(), Point3::new(1.0, 2.0, 3.0));
        assert_eq!(bbox.surface_area(), 2.0 * (8.0 + 24.0 + 12.0));
        assert_eq!(bbox.largest_axis(), 2);
        assert!(bbox.contains_point(Point3::new(2.0, 0.0, 6.0)));
        assert!(!bbox.contains_point(Point3::new(3.0, 1.0, 1.0)));

        let cube = BBox::new(Point3::new(1.0, 1.0, 1.0), Point3::new(2.0, 2.0, 2.0));
        assert_eq!(cube.largest_axis(), 0);
    }

    #[test]
    fn test_empty_bbox() {
        let bbox = BBox::new(Point3::new(-1.0, 0.0, 2.0), Point3::new(1.0, 3.0, 5.0));
        assert_eq!(BBox::EMPTY.union(bbox), bbox);
        assert_eq!(bbox.union(BBox::default()), bbox);
        assert!(BBox::EMPTY.is_empty());
        assert_eq!(BBox::EMPTY.surface_area(), 0.0);
        assert!(bbox.contains_bbox(BBox::EMPTY));
        assert_eq!(BBox::EMPTY.distance_squared_to_point(Point3::ORIGIN), f64::INFINITY);
    }

    #[test]
    fn test_point_to_bbox_distance() {
        let bbox = BBox::new(Point3::ORIGIN, Point3::new(1.0, 1.0, 1.0));
        assert_eq!(bbox.distance_squared_to_point(Point3::new(0.5, 0.5, 0.5)), 0.0);
        assert_eq!(bbox.distance_squared_to_point(Point3::new(1.0, 0.0, 1.0)), 0.0);
        assert_eq!(bbox.distance_squared_to_point(Point3::new(3.0, -2.0, 0.5)), 8.0);
        assert_eq!(bbox.distance_squared_to_point(Point3::new(-1.0, 0.5, 2.0)), 2.0);
    }
}
