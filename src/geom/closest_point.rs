//! Exact closest point on a triangle.
//!
//! The query is classified into one of the seven Voronoi regions of the
//! triangle (three vertices, three edges, interior) using only sign tests on
//! dot products, following Ericson, *Real-Time Collision Detection* §5.1.5.
//! There are no tolerances: degenerate (zero-area) triangles are always caught
//! by a vertex or edge branch before the interior formula divides.

use super::triangle::Triangle;
use super::{Point3, Vec3};

/// Barycentric weights of a point with respect to a triangle's `(p0, p1, p2)`.
///
/// For points produced by [`closest_point_on_triangle`] every weight is in
/// `[0, 1]` and the weights sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Barycentric {
    /// Weight of `p0`.
    pub u: f64,
    /// Weight of `p1`.
    pub v: f64,
    /// Weight of `p2`.
    pub w: f64,
}

impl Barycentric {
    #[must_use]
    pub const fn new(u: f64, v: f64, w: f64) -> Self {
        Self { u, v, w }
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.u, self.v, self.w]
    }

    #[must_use]
    pub fn sum(self) -> f64 {
        self.u + self.v + self.w
    }

    /// Point `u * p0 + v * p1 + w * p2`.
    #[must_use]
    pub fn evaluate(self, p0: Point3, p1: Point3, p2: Point3) -> Point3 {
        let v = p0.to_vec3() * self.u + p1.to_vec3() * self.v + p2.to_vec3() * self.w;
        Point3::from(v)
    }
}

/// Closest point on `tri` to `p`, with its barycentric weights.
#[must_use]
pub fn closest_point_on_triangle(p: Point3, tri: &Triangle) -> (Point3, Barycentric) {
    let ab = tri.p1 - tri.p0;
    let ac = tri.p2 - tri.p0;

    // Vertex region p0.
    let ap = p - tri.p0;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (tri.p0, Barycentric::new(1.0, 0.0, 0.0));
    }

    // Vertex region p1.
    let bp = p - tri.p1;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (tri.p1, Barycentric::new(0.0, 1.0, 0.0));
    }

    // Vertex region p2.
    let cp = p - tri.p2;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (tri.p2, Barycentric::new(0.0, 0.0, 1.0));
    }

    // Edge region p0-p1.
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3);
        return (tri.p0 + ab * t, Barycentric::new(1.0 - t, t, 0.0));
    }

    // Edge region p0-p2.
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6);
        return (tri.p0 + ac * t, Barycentric::new(1.0 - t, 0.0, t));
    }

    // Edge region p1-p2.
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        let bc: Vec3 = tri.p2 - tri.p1;
        return (tri.p1 + bc * t, Barycentric::new(0.0, 1.0 - t, t));
    }

    // Interior.
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    (tri.p0 + ab * v + ac * w, Barycentric::new(1.0 - v - w, v, w))
}
