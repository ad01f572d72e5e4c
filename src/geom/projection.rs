//! Closest point on a mesh under a normal-direction constraint.
//!
//! A triangle is a candidate for a query only when the angle between its unit
//! normal and the query normal is within the tolerance. Among the candidates
//! the one with the smallest Euclidean distance to the query point wins; ties
//! keep the first triangle found in traversal order.
//!
//! [`MeshIndex`] bundles a [`TriangleSet`] with the [`Bvh`] built over it and
//! answers single and batched queries. It is immutable after construction and
//! can be shared across threads behind an `Arc`; rebuilding produces a new
//! index that the owner swaps in.

use std::f64::consts::PI;

use thiserror::Error;

use super::bvh::{Bvh, BvhError};
use super::bvh_builder::BvhBuildOptions;
use super::closest_point::{Barycentric, closest_point_on_triangle};
use super::metrics::{GeomMetrics, TimingBucket};
use super::triangle::{Triangle, TriangleSet, Winding};
use super::{Point3, Vec3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("angle tolerance must be a non-negative number of radians, got {radians}")]
    InvalidAngle { radians: f64 },
    #[error("{points} query points but {normals} query normals")]
    LengthMismatch { points: usize, normals: usize },
}

/// Maximum angle, in radians, between a triangle normal and the query normal.
///
/// Any value of π or more disables the normal filter entirely, including for
/// degenerate triangles whose normal is zero.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct AngleTolerance(f64);

impl AngleTolerance {
    /// Rejects NaN and negative angles.
    pub fn from_radians(radians: f64) -> Result<Self, ProjectionError> {
        if radians.is_nan() || radians < 0.0 {
            return Err(ProjectionError::InvalidAngle { radians });
        }
        Ok(Self(radians))
    }

    pub fn from_degrees(degrees: f64) -> Result<Self, ProjectionError> {
        Self::from_radians(degrees.to_radians())
    }

    /// Tolerance that accepts every triangle.
    #[must_use]
    pub const fn unconstrained() -> Self {
        Self(PI)
    }

    #[must_use]
    pub const fn radians(self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn is_unconstrained(self) -> bool {
        self.0 >= PI
    }

    /// Smallest accepted `dot(query_normal, triangle_normal)`.
    ///
    /// Below `-1` when unconstrained so that zero normals, and rounding just
    /// past `-1`, still pass.
    #[must_use]
    pub fn cos_threshold(self) -> f64 {
        if self.is_unconstrained() {
            -2.0
        } else {
            self.0.cos()
        }
    }
}

impl Default for AngleTolerance {
    /// 60 degrees.
    fn default() -> Self {
        Self(PI / 3.0)
    }
}

/// Outcome of one constrained closest-point query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionResult {
    /// Closest point on the winning triangle. Meaningless without a match.
    pub point: Point3,
    /// Index of the winning triangle, `None` when no triangle passed the
    /// normal filter.
    pub triangle: Option<usize>,
    /// Weights of the winning triangle's `(p0, p1, p2)`.
    pub barycentric: Barycentric,
    /// Squared distance from the query point to `point`; infinite without a match.
    pub distance_squared: f64,
}

impl ProjectionResult {
    /// Sentinel used for the triangle index in flat exports.
    pub const INVALID_INDEX: u32 = u32::MAX;

    pub const NO_MATCH: Self = Self {
        point: Point3::ORIGIN,
        triangle: None,
        barycentric: Barycentric::new(0.0, 0.0, 0.0),
        distance_squared: f64::INFINITY,
    };

    #[must_use]
    pub const fn is_match(&self) -> bool {
        self.triangle.is_some()
    }

    #[must_use]
    pub fn distance(&self) -> f64 {
        self.distance_squared.sqrt()
    }

    /// Triangle index as a `u32`, or [`Self::INVALID_INDEX`].
    #[must_use]
    pub fn triangle_index_or_invalid(&self) -> u32 {
        self.triangle
            .and_then(|t| u32::try_from(t).ok())
            .unwrap_or(Self::INVALID_INDEX)
    }

    /// Re-evaluate the stored barycentric weights on a (possibly moved)
    /// triangle.
    #[must_use]
    pub fn evaluate(&self, tri: &Triangle) -> Option<Point3> {
        self.triangle?;
        Some(self.barycentric.evaluate(tri.p0, tri.p1, tri.p2))
    }
}

impl Default for ProjectionResult {
    fn default() -> Self {
        Self::NO_MATCH
    }
}

/// Closest point to `query_point` on any triangle of `triangles` whose normal
/// is within `tolerance` of `query_normal`.
///
/// `bvh` must have been built over `triangles`. The query normal is
/// normalized before comparison; a zero query normal, like a degenerate
/// triangle, only matches tolerances wider than 90 degrees.
#[must_use]
pub fn closest_point_with_normal(
    bvh: &Bvh,
    triangles: &TriangleSet,
    query_point: Point3,
    query_normal: Vec3,
    tolerance: AngleTolerance,
) -> ProjectionResult {
    let cos_tol = tolerance.cos_threshold();
    let query_normal = query_normal.normalized_or_zero();
    let tris = triangles.triangles();
    let normals = triangles.normals();

    let mut best = ProjectionResult::NO_MATCH;
    bvh.closest_point(
        f64::INFINITY,
        |node| node.bbox.distance_squared_to_point(query_point),
        |ids| {
            for &id in ids {
                let i = id as usize;
                // Cheap rejection before the exact projection.
                if query_normal.dot(normals[i]) < cos_tol {
                    continue;
                }
                let (point, barycentric) = closest_point_on_triangle(query_point, &tris[i]);
                let distance_squared = point.distance_squared_to(query_point);
                if distance_squared < best.distance_squared {
                    best = ProjectionResult {
                        point,
                        triangle: Some(i),
                        barycentric,
                        distance_squared,
                    };
                }
            }
            best.distance_squared
        },
    );
    best
}

/// A triangle set and the hierarchy built over it.
#[derive(Debug, Clone)]
pub struct MeshIndex {
    triangles: TriangleSet,
    bvh: Bvh,
    options: BvhBuildOptions,
}

impl MeshIndex {
    #[must_use]
    pub fn build(triangles: TriangleSet, options: &BvhBuildOptions) -> Self {
        let bvh = Bvh::build_triangles(&triangles, options);
        Self {
            triangles,
            bvh,
            options: *options,
        }
    }

    /// Like [`MeshIndex::build`], recording precompute and build time in `metrics`.
    #[must_use]
    pub fn build_with_metrics(
        triangles: Vec<Triangle>,
        winding: Winding,
        options: &BvhBuildOptions,
        metrics: &mut GeomMetrics,
    ) -> Self {
        let triangles = metrics.time(TimingBucket::TrianglePrecompute, || {
            TriangleSet::with_winding(triangles, winding)
        });
        let bvh = metrics.time(TimingBucket::BvhBuild, || {
            Bvh::build_triangles(&triangles, options)
        });
        Self {
            triangles,
            bvh,
            options: *options,
        }
    }

    /// Pair a previously built (e.g. deserialized) hierarchy with its triangles.
    ///
    /// The hierarchy must index exactly `triangles.len()` primitives and its
    /// leaf boxes must enclose their triangles.
    pub fn from_parts(triangles: TriangleSet, bvh: Bvh) -> Result<Self, BvhError> {
        if bvh.primitive_count() != triangles.len() {
            return Err(BvhError::TriangleCountMismatch {
                primitive_count: bvh.primitive_count(),
                triangle_count: triangles.len(),
            });
        }
        bvh.validate_bounds(triangles.bboxes())?;
        Ok(Self {
            triangles,
            bvh,
            options: BvhBuildOptions::default(),
        })
    }

    /// New index over `triangles` built with the same options as `self`.
    ///
    /// `self` is left untouched, so queries running against it are unaffected.
    #[must_use]
    pub fn rebuild(&self, triangles: TriangleSet) -> Self {
        Self::build(triangles, &self.options)
    }

    #[must_use]
    pub const fn triangles(&self) -> &TriangleSet {
        &self.triangles
    }

    #[must_use]
    pub const fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    #[must_use]
    pub const fn options(&self) -> &BvhBuildOptions {
        &self.options
    }

    #[must_use]
    pub fn closest_point(
        &self,
        query_point: Point3,
        query_normal: Vec3,
        tolerance: AngleTolerance,
    ) -> ProjectionResult {
        closest_point_with_normal(&self.bvh, &self.triangles, query_point, query_normal, tolerance)
    }

    /// One query per `(point, normal)` pair, in input order.
    pub fn bind_points(
        &self,
        points: &[Point3],
        normals: &[Vec3],
        tolerance: AngleTolerance,
    ) -> Result<Vec<ProjectionResult>, ProjectionError> {
        if points.len() != normals.len() {
            return Err(ProjectionError::LengthMismatch {
                points: points.len(),
                normals: normals.len(),
            });
        }

        log::debug!(
            "binding {} points against {} triangles",
            points.len(),
            self.triangles.len()
        );

        #[cfg(feature = "parallel")]
        let results = points
            .par_iter()
            .zip(normals.par_iter())
            .map(|(&p, &n)| self.closest_point(p, n, tolerance))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let results = points
            .iter()
            .zip(normals)
            .map(|(&p, &n)| self.closest_point(p, n, tolerance))
            .collect();

        Ok(results)
    }
}

/// Evaluate stored bindings on a deformed copy of the indexed mesh.
///
/// `positions` and `indices` describe the mesh in the same vertex and triangle
/// order the bindings were made against. Entries without a match, or whose
/// triangle no longer exists, evaluate to `None`.
#[must_use]
pub fn evaluate_bindings(
    bindings: &[ProjectionResult],
    positions: &[Point3],
    indices: &[u32],
) -> Vec<Option<Point3>> {
    bindings
        .iter()
        .map(|binding| {
            let t = binding.triangle?;
            let first = t.checked_mul(3)?;
            let corners = indices.get(first..first.checked_add(3)?)?;
            let p0 = *positions.get(corners[0] as usize)?;
            let p1 = *positions.get(corners[1] as usize)?;
            let p2 = *positions.get(corners[2] as usize)?;
            binding.evaluate(&Triangle::new(p0, p1, p2))
        })
        .collect()
}
