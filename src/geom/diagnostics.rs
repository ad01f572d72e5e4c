//! Shape statistics for a built hierarchy.
//!
//! ```ignore
//! use cpom_engine::geom::{Bvh, BvhBuildOptions, TriangleSet};
//!
//! let bvh = Bvh::build_triangles(&set, &BvhBuildOptions::default());
//! let diagnostics = bvh.diagnostics();
//! println!("{diagnostics}");
//! ```

use std::fmt;

use super::bvh::{Bvh, MAX_TREE_DEPTH};
use super::metrics::GeomTimingReport;
use super::projection::MeshIndex;
use super::Vec3;

/// Node, leaf and cost statistics for a [`Bvh`].
///
/// `sah_cost` is the surface-area-heuristic cost of the whole tree relative to
/// the root box, with an inner-node traversal costing 1 and each primitive
/// test costing 1. It is 0 for an empty hierarchy or a flat root box.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BvhDiagnostics {
    pub node_count: usize,
    pub inner_count: usize,
    pub leaf_count: usize,
    pub primitive_count: usize,
    pub depth: usize,
    pub min_leaf_size: usize,
    pub max_leaf_size: usize,
    pub avg_leaf_size: f64,
    pub sah_cost: f64,
    /// Triangles with a zero normal. Only filled in by [`MeshIndex::diagnostics`].
    pub degenerate_triangle_count: usize,
    pub warnings: Vec<String>,
    pub timing: Option<GeomTimingReport>,
}

impl BvhDiagnostics {
    /// True when the tree has no warnings and no degenerate triangles.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.degenerate_triangle_count == 0
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// One-line summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} nodes ({} leaves), {} primitives, depth {}, leaf size {}..={} (avg {:.2}), SAH {:.3}",
            self.node_count,
            self.leaf_count,
            self.primitive_count,
            self.depth,
            self.min_leaf_size,
            self.max_leaf_size,
            self.avg_leaf_size,
            self.sah_cost,
        )
    }
}

impl fmt::Display for BvhDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BVH Diagnostics:")?;
        writeln!(f, "  Nodes: {} ({} inner, {} leaves)", self.node_count, self.inner_count, self.leaf_count)?;
        writeln!(f, "  Primitives: {}", self.primitive_count)?;
        writeln!(f, "  Depth: {}", self.depth)?;
        writeln!(
            f,
            "  Leaf size: min {}, max {}, avg {:.2}",
            self.min_leaf_size, self.max_leaf_size, self.avg_leaf_size
        )?;
        writeln!(f, "  SAH cost: {:.3}", self.sah_cost)?;

        if self.degenerate_triangle_count > 0 {
            writeln!(f, "  Degenerate triangles: {}", self.degenerate_triangle_count)?;
        }

        if !self.warnings.is_empty() {
            writeln!(f, "  Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "    - {warning}")?;
            }
        }

        if let Some(ref timing) = self.timing {
            writeln!(f, "  Timing: {} ms total", timing.total_ms())?;
        }

        writeln!(f, "  Status: {}", if self.is_clean() { "CLEAN" } else { "ISSUES DETECTED" })?;
        Ok(())
    }
}

impl Bvh {
    #[must_use]
    pub fn diagnostics(&self) -> BvhDiagnostics {
        let mut diag = BvhDiagnostics {
            node_count: self.node_count(),
            primitive_count: self.primitive_count(),
            depth: self.depth(),
            min_leaf_size: usize::MAX,
            ..Default::default()
        };

        let root_area = self.root().bbox.surface_area();
        let mut cost = 0.0;
        for node in self.nodes() {
            let area = node.bbox.surface_area();
            match node.primitive_range() {
                Some(range) => {
                    diag.leaf_count += 1;
                    diag.min_leaf_size = diag.min_leaf_size.min(range.len());
                    diag.max_leaf_size = diag.max_leaf_size.max(range.len());
                    cost += area * range.len() as f64;
                }
                None => {
                    diag.inner_count += 1;
                    cost += area;
                }
            }
        }

        if diag.leaf_count == 0 {
            diag.min_leaf_size = 0;
        }
        diag.avg_leaf_size = diag.primitive_count as f64 / diag.leaf_count.max(1) as f64;
        if root_area > 0.0 {
            diag.sah_cost = cost / root_area;
        }

        if diag.depth >= MAX_TREE_DEPTH {
            diag.add_warning(format!("depth {} reaches the traversal limit", diag.depth));
        }
        diag
    }
}

impl MeshIndex {
    /// Hierarchy diagnostics plus the number of degenerate triangles.
    #[must_use]
    pub fn diagnostics(&self) -> BvhDiagnostics {
        let mut diag = self.bvh().diagnostics();
        diag.degenerate_triangle_count = self
            .triangles()
            .normals()
            .iter()
            .filter(|n| **n == Vec3::ZERO)
            .count();
        if diag.degenerate_triangle_count > 0 {
            log::debug!("{} degenerate triangles indexed", diag.degenerate_triangle_count);
        }
        diag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hierarchy() {
        let diag = Bvh::empty().diagnostics();
        assert_eq!(diag.node_count, 1);
        assert_eq!(diag.leaf_count, 1);
        assert_eq!(diag.primitive_count, 0);
        assert_eq!(diag.min_leaf_size, 0);
        assert_eq!(diag.sah_cost, 0.0);
        assert!(diag.is_clean());
        assert!(diag.summary().starts_with("1 nodes (1 leaves), 0 primitives, depth 1"));
    }

    #[test]
    fn test_display_reports_warnings() {
        let mut diag = BvhDiagnostics::default();
        diag.add_warning("something odd");
        let text = diag.to_string();
        assert!(text.contains("something odd"));
        assert!(text.contains("ISSUES DETECTED"));
    }
}
