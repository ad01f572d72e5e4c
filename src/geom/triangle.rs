//! Triangle soup and its per-triangle derived data.
//!
//! A [`TriangleSet`] owns the triangles a hierarchy is built over together
//! with the bounding box, center and unit normal of each triangle. The derived
//! arrays are computed once at ingestion and never change afterwards; building
//! over a changed mesh means creating a new set.

use thiserror::Error;

use super::{BBox, Point3, Vec3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Errors raised while turning an indexed mesh into a [`TriangleSet`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshError {
    #[error("triangle index buffer length {len} is not a multiple of 3")]
    IndexCountNotTriangles { len: usize },
    #[error("triangle {triangle} references vertex {index}, but the mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },
    #[error("vertex {vertex} has non-finite coordinates")]
    NonFinitePosition { vertex: usize },
}

/// Vertex order that defines the front face of a triangle.
///
/// The normal of `(p0, p1, p2)` is `normalize(cross(p1 - p0, p2 - p0))` for
/// [`Winding::CounterClockwise`] and its negation for [`Winding::Clockwise`].
/// Vertex order, and therefore barycentric order, is never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Winding {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub p0: Point3,
    pub p1: Point3,
    pub p2: Point3,
}

impl Triangle {
    #[must_use]
    pub const fn new(p0: Point3, p1: Point3, p2: Point3) -> Self {
        Self { p0, p1, p2 }
    }

    #[must_use]
    pub fn bbox(&self) -> BBox {
        BBox::new(
            self.p0.min(self.p1).min(self.p2),
            self.p0.max(self.p1).max(self.p2),
        )
    }

    /// Arithmetic mean of the three vertices.
    #[must_use]
    pub fn center(&self) -> Point3 {
        Point3::new(
            (self.p0.x + self.p1.x + self.p2.x) / 3.0,
            (self.p0.y + self.p1.y + self.p2.y) / 3.0,
            (self.p0.z + self.p1.z + self.p2.z) / 3.0,
        )
    }

    /// Unit normal for the given winding; zero for degenerate triangles.
    #[must_use]
    pub fn normal(&self, winding: Winding) -> Vec3 {
        let n = (self.p1 - self.p0).cross(self.p2 - self.p0).normalized_or_zero();
        match winding {
            Winding::CounterClockwise => n,
            Winding::Clockwise => -n,
        }
    }

    /// Vertices as an array `[p0, p1, p2]`.
    #[must_use]
    pub const fn vertices(&self) -> [Point3; 3] {
        [self.p0, self.p1, self.p2]
    }
}

/// Triangles plus the parallel bounding-box, center and normal arrays used
/// by the builder and by queries.
#[derive(Debug, Clone, Default)]
pub struct TriangleSet {
    triangles: Vec<Triangle>,
    bboxes: Vec<BBox>,
    centers: Vec<Point3>,
    normals: Vec<Vec3>,
    winding: Winding,
}

impl TriangleSet {
    /// Counter-clockwise triangles.
    #[must_use]
    pub fn new(triangles: Vec<Triangle>) -> Self {
        Self::with_winding(triangles, Winding::CounterClockwise)
    }

    #[must_use]
    pub fn with_winding(triangles: Vec<Triangle>, winding: Winding) -> Self {
        let derived = precompute(&triangles, winding);

        let mut bboxes = Vec::with_capacity(derived.len());
        let mut centers = Vec::with_capacity(derived.len());
        let mut normals = Vec::with_capacity(derived.len());
        for (bbox, center, normal) in derived {
            bboxes.push(bbox);
            centers.push(center);
            normals.push(normal);
        }

        Self {
            triangles,
            bboxes,
            centers,
            normals,
            winding,
        }
    }

    /// Build a set from a vertex array and a flat `[a, b, c, a, b, c, ...]`
    /// triangle index list.
    pub fn from_indexed(
        positions: &[Point3],
        indices: &[u32],
        winding: Winding,
    ) -> Result<Self, MeshError> {
        Ok(Self::with_winding(triangles_from_indexed(positions, indices)?, winding))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    #[must_use]
    pub const fn winding(&self) -> Winding {
        self.winding
    }

    #[must_use]
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    #[must_use]
    pub fn bboxes(&self) -> &[BBox] {
        &self.bboxes
    }

    #[must_use]
    pub fn centers(&self) -> &[Point3] {
        &self.centers
    }

    #[must_use]
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }
}

/// Resolve a flat `[a, b, c, ...]` index list against `positions`.
pub fn triangles_from_indexed(positions: &[Point3], indices: &[u32]) -> Result<Vec<Triangle>, MeshError> {
    if indices.len() % 3 != 0 {
        return Err(MeshError::IndexCountNotTriangles { len: indices.len() });
    }
    if let Some(vertex) = positions.iter().position(|p| !p.is_finite()) {
        return Err(MeshError::NonFinitePosition { vertex });
    }

    let mut triangles = Vec::with_capacity(indices.len() / 3);
    for (triangle, corners) in indices.chunks_exact(3).enumerate() {
        let mut points = [Point3::ORIGIN; 3];
        for (slot, &index) in points.iter_mut().zip(corners) {
            *slot = *positions
                .get(index as usize)
                .ok_or(MeshError::IndexOutOfRange {
                    triangle,
                    index,
                    vertex_count: positions.len(),
                })?;
        }
        triangles.push(Triangle::new(points[0], points[1], points[2]));
    }
    Ok(triangles)
}

#[cfg(feature = "parallel")]
fn precompute(triangles: &[Triangle], winding: Winding) -> Vec<(BBox, Point3, Vec3)> {
    triangles
        .par_iter()
        .map(|tri| derive(tri, winding))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn precompute(triangles: &[Triangle], winding: Winding) -> Vec<(BBox, Point3, Vec3)> {
    triangles.iter().map(|tri| derive(tri, winding)).collect()
}

fn derive(tri: &Triangle, winding: Winding) -> (BBox, Point3, Vec3) {
    (tri.bbox(), tri.center(), tri.normal(winding))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_data() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 1.5),
        );
        let set = TriangleSet::new(vec![tri]);

        assert_eq!(set.len(), 1);
        assert_eq!(set.bboxes()[0].min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(set.bboxes()[0].max, Point3::new(3.0, 3.0, 1.5));
        assert_eq!(set.centers()[0], Point3::new(1.0, 1.0, 0.5));
        assert!((set.normals()[0].length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_triangle_has_zero_normal() {
        let p = Point3::new(1.0, 2.0, 3.0);
        let tri = Triangle::new(p, p, p);
        assert_eq!(tri.normal(Winding::CounterClockwise), Vec3::ZERO);
    }

    #[test]
    fn test_clockwise_flips_normal_only() {
        let tri = Triangle::new(Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0));
        let set = TriangleSet::with_winding(vec![tri], Winding::Clockwise);
        assert_eq!(set.normals()[0], -Vec3::Z);
        assert_eq!(set.triangles()[0], tri);
        assert_eq!(set.winding(), Winding::Clockwise);
        assert_eq!(TriangleSet::new(vec![tri]).winding(), Winding::CounterClockwise);
    }
}
