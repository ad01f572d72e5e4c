//! Top-down binned SAH construction of a [`Bvh`].
//!
//! Each node bins its primitives by centroid along all three axes and takes
//! the split plane with the lowest surface-area cost
//! `area(left) * count(left) + area(right) * count(right)`. A node becomes a
//! leaf when no split beats `area(node) * (count - traversal_cost)` and it is
//! small enough, or when the depth cap is reached.
//!
//! Subtrees are built independently and stitched together afterwards, which
//! lets large ranges fork onto the rayon pool (feature `parallel`). Below
//! [`BvhBuildOptions::parallel_threshold`] everything runs on the calling
//! thread.
//!
//! For a fixed input and options the resulting hierarchy is the same whether
//! or not the build ran in parallel.

use super::bvh::{Bvh, BvhNode, MAX_TREE_DEPTH, NodeKind};
use super::triangle::TriangleSet;
use super::{BBox, Point3};

/// Number of SAH bins evaluated per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildQuality {
    /// 8 bins per axis.
    Low,
    /// 16 bins per axis.
    Medium,
    /// 64 bins per axis. Used by queries unless configured otherwise.
    #[default]
    High,
}

impl BuildQuality {
    #[must_use]
    pub const fn bin_count(self) -> usize {
        match self {
            Self::Low => 8,
            Self::Medium => 16,
            Self::High => 64,
        }
    }
}

/// Options controlling hierarchy construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhBuildOptions {
    /// Split-plane resolution.
    pub quality: BuildQuality,
    /// Ranges of at most this many primitives always become leaves.
    pub min_leaf_size: usize,
    /// Ranges of more than this many primitives are always split.
    pub max_leaf_size: usize,
    /// Cost of visiting an inner node relative to testing one primitive.
    pub traversal_cost: f64,
    /// Ranges at least this large build their two halves in parallel.
    pub parallel_threshold: usize,
    /// Maximum root-to-leaf node count; clamped to [`MAX_TREE_DEPTH`].
    pub max_depth: usize,
}

impl Default for BvhBuildOptions {
    fn default() -> Self {
        Self {
            quality: BuildQuality::High,
            min_leaf_size: 1,
            max_leaf_size: 8,
            traversal_cost: 1.0,
            parallel_threshold: 1024,
            max_depth: MAX_TREE_DEPTH,
        }
    }
}

impl BvhBuildOptions {
    /// Fast build with 8 bins per axis.
    #[must_use]
    pub fn low() -> Self {
        Self {
            quality: BuildQuality::Low,
            ..Default::default()
        }
    }

    /// 16 bins per axis.
    #[must_use]
    pub fn medium() -> Self {
        Self {
            quality: BuildQuality::Medium,
            ..Default::default()
        }
    }

    /// 64 bins per axis (the default).
    #[must_use]
    pub fn high() -> Self {
        Self::default()
    }

    /// Same options with leaf size bounds replaced.
    #[must_use]
    pub fn with_leaf_size(self, min_leaf_size: usize, max_leaf_size: usize) -> Self {
        Self {
            min_leaf_size,
            max_leaf_size,
            ..self
        }
    }

    /// Same options built entirely on the calling thread.
    #[must_use]
    pub fn sequential(self) -> Self {
        Self {
            parallel_threshold: usize::MAX,
            ..self
        }
    }
}

impl Bvh {
    /// Build over the triangles of `set`.
    #[must_use]
    pub fn build_triangles(set: &TriangleSet, options: &BvhBuildOptions) -> Self {
        Self::build(set.bboxes(), set.centers(), options)
    }

    /// Build over primitives described by their bounding boxes and centers.
    ///
    /// # Panics
    ///
    /// Panics when `bboxes` and `centers` differ in length or when there are
    /// more than `u32::MAX` primitives.
    #[must_use]
    pub fn build(bboxes: &[BBox], centers: &[Point3], options: &BvhBuildOptions) -> Self {
        assert_eq!(
            bboxes.len(),
            centers.len(),
            "every primitive needs both a bounding box and a center"
        );
        assert!(
            u32::try_from(bboxes.len()).is_ok(),
            "primitive count {} does not fit in 32-bit ids",
            bboxes.len()
        );

        if bboxes.is_empty() {
            log::debug!("building BVH over 0 primitives: single empty leaf");
            return Self::empty();
        }

        let ctx = BuildContext::new(bboxes, centers, options);
        let mut prim_ids: Vec<u32> = (0..bboxes.len() as u32).collect();
        let nodes = ctx.build_subtree(&mut prim_ids, 0, 1);
        let bvh = Self::from_parts_unchecked(nodes, prim_ids);

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "built BVH over {} primitives: {} nodes, depth {}, {} bins/axis",
                bboxes.len(),
                bvh.node_count(),
                bvh.depth(),
                ctx.bin_count
            );
        }
        bvh
    }
}

/// Normalized options plus the shared read-only inputs of one build.
struct BuildContext<'a> {
    bboxes: &'a [BBox],
    centers: &'a [Point3],
    bin_count: usize,
    min_leaf_size: usize,
    max_leaf_size: usize,
    traversal_cost: f64,
    parallel_threshold: usize,
    max_depth: usize,
}

#[derive(Debug, Clone, Copy)]
struct Bin {
    bbox: BBox,
    count: usize,
}

impl Default for Bin {
    fn default() -> Self {
        Self {
            bbox: BBox::EMPTY,
            count: 0,
        }
    }
}

/// Chosen split: primitives whose centroid falls in bins `0..=last_left_bin`
/// along `axis` go left.
#[derive(Debug, Clone, Copy)]
struct Split {
    axis: usize,
    last_left_bin: usize,
    origin: f64,
    scale: f64,
    cost: f64,
}

impl Split {
    fn goes_left(&self, center: Point3, bin_count: usize) -> bool {
        bin_index(center.axis(self.axis), self.origin, self.scale, bin_count) <= self.last_left_bin
    }
}

impl<'a> BuildContext<'a> {
    fn new(bboxes: &'a [BBox], centers: &'a [Point3], options: &BvhBuildOptions) -> Self {
        let min_leaf_size = options.min_leaf_size.max(1);
        Self {
            bboxes,
            centers,
            bin_count: options.quality.bin_count(),
            min_leaf_size,
            max_leaf_size: options.max_leaf_size.max(min_leaf_size),
            traversal_cost: options.traversal_cost.max(0.0),
            parallel_threshold: options.parallel_threshold.max(2),
            max_depth: options.max_depth.clamp(1, MAX_TREE_DEPTH),
        }
    }

    /// Build the subtree over `ids`, which start at `offset` in the final
    /// primitive id array. Node 0 of the result is the subtree root and all
    /// child indices are local to the returned vector.
    fn build_subtree(&self, ids: &mut [u32], offset: usize, depth: usize) -> Vec<BvhNode> {
        let bbox = ids
            .iter()
            .fold(BBox::EMPTY, |acc, &id| acc.union(self.bboxes[id as usize]));
        let count = ids.len();

        if count <= self.min_leaf_size {
            return vec![leaf_node(bbox, offset, count)];
        }
        if depth >= self.max_depth {
            if count > self.max_leaf_size {
                log::warn!(
                    "BVH depth cap {} reached; forcing a leaf with {count} primitives",
                    self.max_depth
                );
            }
            return vec![leaf_node(bbox, offset, count)];
        }

        let leaf_cost = bbox.surface_area() * (count as f64 - self.traversal_cost);
        let split = self.find_split(ids);
        let must_split = count > self.max_leaf_size;

        let mid = match split {
            Some(split) if split.cost < leaf_cost || must_split => {
                let mid = partition(ids, |id| {
                    split.goes_left(self.centers[id as usize], self.bin_count)
                });
                if mid == 0 || mid == count {
                    self.median_split(ids, split.axis)
                } else {
                    mid
                }
            }
            None if must_split => {
                let axis = bbox.largest_axis();
                self.median_split(ids, axis)
            }
            _ => return vec![leaf_node(bbox, offset, count)],
        };

        let (left_ids, right_ids) = ids.split_at_mut(mid);
        let (left, right) = join(
            count >= self.parallel_threshold,
            || self.build_subtree(left_ids, offset, depth + 1),
            || self.build_subtree(right_ids, offset + mid, depth + 1),
        );

        merge_subtrees(bbox, left, right)
    }

    /// Lowest-cost binned split over all three axes, if any axis has a
    /// non-zero centroid extent.
    fn find_split(&self, ids: &[u32]) -> Option<Split> {
        let (cmin, cmax) = ids.iter().fold(
            (
                Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
                Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            ),
            |(lo, hi), &id| {
                let c = self.centers[id as usize];
                (lo.min(c), hi.max(c))
            },
        );

        let bin_count = self.bin_count;
        let mut best: Option<Split> = None;
        let mut bins = vec![Bin::default(); bin_count];
        let mut right_areas = vec![0.0; bin_count];
        let mut right_counts = vec![0usize; bin_count];

        for axis in 0..3 {
            let origin = cmin.axis(axis);
            let extent = cmax.axis(axis) - origin;
            if !extent.is_finite() || extent <= 0.0 {
                continue;
            }
            let scale = bin_count as f64 / extent;

            bins.fill(Bin::default());
            for &id in ids {
                let c = self.centers[id as usize].axis(axis);
                let bin = &mut bins[bin_index(c, origin, scale, bin_count)];
                bin.bbox = bin.bbox.union(self.bboxes[id as usize]);
                bin.count += 1;
            }

            // Suffix sweep: right side of the plane after bin i covers i+1..
            let mut acc = Bin::default();
            for i in (1..bin_count).rev() {
                acc.bbox = acc.bbox.union(bins[i].bbox);
                acc.count += bins[i].count;
                right_areas[i - 1] = acc.bbox.surface_area();
                right_counts[i - 1] = acc.count;
            }

            let mut left = Bin::default();
            for i in 0..bin_count - 1 {
                left.bbox = left.bbox.union(bins[i].bbox);
                left.count += bins[i].count;
                if left.count == 0 || right_counts[i] == 0 {
                    continue;
                }
                let cost = left.bbox.surface_area() * left.count as f64
                    + right_areas[i] * right_counts[i] as f64;
                if best.is_none_or(|b| cost < b.cost) {
                    best = Some(Split {
                        axis,
                        last_left_bin: i,
                        origin,
                        scale,
                        cost,
                    });
                }
            }
        }

        best
    }

    /// Object-median split along `axis`; always yields two non-empty halves.
    fn median_split(&self, ids: &mut [u32], axis: usize) -> usize {
        let mid = ids.len() / 2;
        ids.select_nth_unstable_by(mid, |a, b| {
            let ca = self.centers[*a as usize].axis(axis);
            let cb = self.centers[*b as usize].axis(axis);
            ca.total_cmp(&cb)
        });
        mid
    }
}

fn bin_index(value: f64, origin: f64, scale: f64, bin_count: usize) -> usize {
    // Float-to-int casts saturate, so NaN and negatives land in bin 0.
    (((value - origin) * scale) as usize).min(bin_count - 1)
}

fn leaf_node(bbox: BBox, offset: usize, count: usize) -> BvhNode {
    BvhNode::leaf(bbox, offset as u32, count as u32)
}

/// Reorder `ids` so every id satisfying `goes_left` comes first; returns the
/// number of such ids.
fn partition(ids: &mut [u32], mut goes_left: impl FnMut(u32) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..ids.len() {
        if goes_left(ids[i]) {
            ids.swap(i, mid);
            mid += 1;
        }
    }
    mid
}

/// Stitch two locally indexed subtrees under a new root.
///
/// Layout: `[root, left_root, right_root, left[1..], right[1..]]`, so the
/// two subtree roots form the contiguous child pair of the new root.
fn merge_subtrees(bbox: BBox, left: Vec<BvhNode>, right: Vec<BvhNode>) -> Vec<BvhNode> {
    let left_len = left.len();
    let map_left = |i: usize| if i == 0 { 1 } else { i + 2 };
    let map_right = |j: usize| if j == 0 { 2 } else { left_len + 1 + j };

    let mut nodes = Vec::with_capacity(1 + left.len() + right.len());
    nodes.push(BvhNode::inner(bbox, 1));
    nodes.push(relocate(left[0], map_left));
    nodes.push(relocate(right[0], map_right));
    nodes.extend(left[1..].iter().map(|&node| relocate(node, map_left)));
    nodes.extend(right[1..].iter().map(|&node| relocate(node, map_right)));
    nodes
}

fn relocate(node: BvhNode, map: impl Fn(usize) -> usize) -> BvhNode {
    match node.kind {
        NodeKind::Inner { first_child } => {
            BvhNode::inner(node.bbox, map(first_child as usize) as u32)
        }
        NodeKind::Leaf { .. } => node,
    }
}

#[cfg(feature = "parallel")]
fn join<A, B, RA, RB>(parallel: bool, a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    if parallel { rayon::join(a, b) } else { (a(), b()) }
}

#[cfg(not(feature = "parallel"))]
fn join<A, B, RA, RB>(_parallel: bool, a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA,
    B: FnOnce() -> RB,
{
    (a(), b())
}
