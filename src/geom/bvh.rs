use std::ops::Range;

use thiserror::Error;

use super::BBox;
use super::stack::SmallStack;

/// Deepest hierarchy (root-to-leaf node count) that traversal supports.
///
/// The builder never exceeds it and deserialization rejects deeper trees.
pub const MAX_TREE_DEPTH: usize = 64;

/// Structural problems found by [`Bvh::validate`] and [`Bvh::validate_bounds`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BvhError {
    #[error("hierarchy has no nodes")]
    EmptyNodeArray,
    #[error("node {node} points at children {first_child} and {second_child}, but there are {node_count} nodes")]
    ChildOutOfRange {
        node: usize,
        first_child: usize,
        second_child: usize,
        node_count: usize,
    },
    #[error("node {node} is reachable more than once or points back at the root")]
    SharedNode { node: usize },
    #[error("{unreachable} nodes are not reachable from the root")]
    UnreachableNodes { unreachable: usize },
    #[error("leaf {node} covers primitives {start}..{end}, but there are {primitive_count} primitive ids")]
    PrimitiveRangeOutOfRange {
        node: usize,
        start: usize,
        end: usize,
        primitive_count: usize,
    },
    #[error("leaf ranges cover {covered} of {primitive_count} primitive ids")]
    PrimitiveCoverage { covered: usize, primitive_count: usize },
    #[error("leaf {node} holds no primitives")]
    EmptyLeaf { node: usize },
    #[error("primitive id {id} appears more than once")]
    DuplicatePrimitive { id: u32 },
    #[error("primitive id {id} is out of range for {triangle_count} triangles")]
    PrimitiveIdOutOfRange { id: u32, triangle_count: usize },
    #[error("hierarchy indexes {primitive_count} primitives, but {triangle_count} triangles were supplied")]
    TriangleCountMismatch {
        primitive_count: usize,
        triangle_count: usize,
    },
    #[error("node {node} does not enclose its contents")]
    NotEnclosed { node: usize },
    #[error("hierarchy depth {depth} exceeds the supported maximum of {max}")]
    TooDeep { depth: usize, max: usize },
}

/// Payload of a [`BvhNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Two children stored next to each other at `first_child` and
    /// `first_child + 1`.
    Inner { first_child: u32 },
    /// `primitive_count` entries of the primitive id array starting at
    /// `first_primitive`. Only the root of an empty hierarchy has a count of 0.
    Leaf {
        first_primitive: u32,
        primitive_count: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhNode {
    pub bbox: BBox,
    pub kind: NodeKind,
}

impl BvhNode {
    #[must_use]
    pub const fn leaf(bbox: BBox, first_primitive: u32, primitive_count: u32) -> Self {
        Self {
            bbox,
            kind: NodeKind::Leaf {
                first_primitive,
                primitive_count,
            },
        }
    }

    #[must_use]
    pub const fn inner(bbox: BBox, first_child: u32) -> Self {
        Self {
            bbox,
            kind: NodeKind::Inner { first_child },
        }
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Indices of both children, or `None` for a leaf.
    #[must_use]
    pub const fn children(&self) -> Option<(usize, usize)> {
        match self.kind {
            NodeKind::Inner { first_child } => {
                Some((first_child as usize, first_child as usize + 1))
            }
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Range into [`Bvh::prim_ids`], or `None` for an inner node.
    #[must_use]
    pub const fn primitive_range(&self) -> Option<Range<usize>> {
        match self.kind {
            NodeKind::Leaf {
                first_primitive,
                primitive_count,
            } => Some(
                first_primitive as usize..first_primitive as usize + primitive_count as usize,
            ),
            NodeKind::Inner { .. } => None,
        }
    }
}

/// Immutable bounding volume hierarchy.
///
/// `nodes[0]` is the root. `prim_ids` maps leaf ranges back to the indices of
/// the primitives the hierarchy was built over; for a built hierarchy it is a
/// permutation of `0..primitive_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    prim_ids: Vec<u32>,
}

impl Bvh {
    /// Hierarchy over zero primitives: a single empty leaf.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            nodes: vec![BvhNode::leaf(BBox::EMPTY, 0, 0)],
            prim_ids: Vec::new(),
        }
    }

    /// Assemble a hierarchy from raw parts and check it with [`Bvh::validate`].
    pub fn from_parts(nodes: Vec<BvhNode>, prim_ids: Vec<u32>) -> Result<Self, BvhError> {
        let bvh = Self { nodes, prim_ids };
        bvh.validate()?;
        Ok(bvh)
    }

    pub(crate) const fn from_parts_unchecked(nodes: Vec<BvhNode>, prim_ids: Vec<u32>) -> Self {
        Self { nodes, prim_ids }
    }

    #[must_use]
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    #[must_use]
    pub fn prim_ids(&self) -> &[u32] {
        &self.prim_ids
    }

    #[must_use]
    pub fn root(&self) -> &BvhNode {
        &self.nodes[0]
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn primitive_count(&self) -> usize {
        self.prim_ids.len()
    }

    /// Original primitive indices stored in a leaf; empty for inner nodes.
    #[must_use]
    pub fn leaf_primitives(&self, node: &BvhNode) -> &[u32] {
        match node.primitive_range() {
            Some(range) => &self.prim_ids[range],
            None => &[],
        }
    }

    /// Number of nodes on the longest root-to-leaf path.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 1usize)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Some((left, right)) = self.nodes[idx].children() {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        max_depth
    }

    /// Branch-and-bound nearest search.
    ///
    /// `lower_bound(node)` must never exceed the true distance from the query
    /// to anything inside `node`. `evaluate_leaf(prim_ids)` inspects the
    /// primitives of one leaf and returns the best distance found so far; it
    /// may only shrink from call to call. Both sides must use the same
    /// distance measure (e.g. squared distance).
    ///
    /// Descends into the nearer child first and defers the farther child on a
    /// fixed-size stack. Any subtree whose lower bound is not strictly below
    /// the current best distance is skipped, so every leaf that could hold a
    /// closer primitive is evaluated and no other. Returns the final best
    /// distance (`max_dist` when nothing closer was found).
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn closest_point<D, L>(&self, max_dist: f64, mut lower_bound: D, mut evaluate_leaf: L) -> f64
    where
        D: FnMut(&BvhNode) -> f64,
        L: FnMut(&[u32]) -> f64,
    {
        let mut best_dist = max_dist;
        let Some(root) = self.nodes.first() else {
            return best_dist;
        };

        let root_dist = lower_bound(root);
        if !(root_dist < best_dist) {
            return best_dist;
        }

        let mut stack: SmallStack<(u32, f64), MAX_TREE_DEPTH> = SmallStack::new();
        stack.push((0, root_dist));

        while let Some((mut top, top_dist)) = stack.pop() {
            // The best distance may have improved since this entry was pushed.
            if !(top_dist < best_dist) {
                continue;
            }

            loop {
                let node = &self.nodes[top as usize];
                let NodeKind::Inner { first_child } = node.kind else {
                    best_dist = evaluate_leaf(self.leaf_primitives(node));
                    break;
                };

                let mut near = first_child;
                let mut far = first_child + 1;
                let mut near_dist = lower_bound(&self.nodes[near as usize]);
                let mut far_dist = lower_bound(&self.nodes[far as usize]);
                if far_dist < near_dist {
                    std::mem::swap(&mut near, &mut far);
                    std::mem::swap(&mut near_dist, &mut far_dist);
                }

                if !(near_dist < best_dist) {
                    break;
                }
                if far_dist < best_dist {
                    stack.push((far, far_dist));
                }
                top = near;
            }
        }

        best_dist
    }

    /// Copy the subtree rooted at `node_index` into a standalone hierarchy.
    ///
    /// Nodes and primitive ids are compacted; the ids keep referring to the
    /// primitives of the original hierarchy. Returns `None` when the index is
    /// out of range.
    #[must_use]
    pub fn extract_subtree(&self, node_index: usize) -> Option<Self> {
        self.nodes.get(node_index)?;

        let mut nodes = vec![self.nodes[node_index]];
        let mut prim_ids = Vec::new();
        let mut stack = vec![(node_index, 0usize)];

        while let Some((src, dst)) = stack.pop() {
            let src_node = self.nodes[src];
            match src_node.kind {
                NodeKind::Leaf { .. } => {
                    let ids = self.leaf_primitives(&src_node);
                    nodes[dst] = BvhNode::leaf(src_node.bbox, prim_ids.len() as u32, ids.len() as u32);
                    prim_ids.extend_from_slice(ids);
                }
                NodeKind::Inner { first_child } => {
                    let first = nodes.len();
                    nodes[dst] = BvhNode::inner(src_node.bbox, first as u32);
                    nodes.push(self.nodes[first_child as usize]);
                    nodes.push(self.nodes[first_child as usize + 1]);
                    // Left first, so nodes and ids keep the builder's order.
                    stack.push((first_child as usize + 1, first + 1));
                    stack.push((first_child as usize, first));
                }
            }
        }

        Some(Self { nodes, prim_ids })
    }

    /// Check the structural invariants every query relies on:
    /// - every node is reachable from the root exactly once,
    /// - depth is at most [`MAX_TREE_DEPTH`],
    /// - only the root of an empty hierarchy is an empty leaf,
    /// - leaf ranges are in bounds and together cover every primitive id once,
    /// - primitive ids are distinct,
    /// - every inner node's box encloses both children's boxes.
    pub fn validate(&self) -> Result<(), BvhError> {
        if self.nodes.is_empty() {
            return Err(BvhError::EmptyNodeArray);
        }

        let node_count = self.nodes.len();
        let primitive_count = self.prim_ids.len();
        let mut visited = vec![false; node_count];
        visited[0] = true;
        let mut covered = 0usize;
        let mut stack = vec![(0usize, 1usize)];

        while let Some((idx, depth)) = stack.pop() {
            if depth > MAX_TREE_DEPTH {
                return Err(BvhError::TooDeep {
                    depth,
                    max: MAX_TREE_DEPTH,
                });
            }

            let node = self.nodes[idx];
            match node.kind {
                NodeKind::Leaf { .. } => {
                    let range = node.primitive_range().unwrap_or(0..0);
                    if range.is_empty() && !(idx == 0 && primitive_count == 0) {
                        return Err(BvhError::EmptyLeaf { node: idx });
                    }
                    if range.end > primitive_count {
                        return Err(BvhError::PrimitiveRangeOutOfRange {
                            node: idx,
                            start: range.start,
                            end: range.end,
                            primitive_count,
                        });
                    }
                    covered += range.len();
                }
                NodeKind::Inner { first_child } => {
                    let left = first_child as usize;
                    let right = left + 1;
                    if right >= node_count {
                        return Err(BvhError::ChildOutOfRange {
                            node: idx,
                            first_child: left,
                            second_child: right,
                            node_count,
                        });
                    }
                    for child in [left, right] {
                        if visited[child] {
                            return Err(BvhError::SharedNode { node: child });
                        }
                        visited[child] = true;
                        if !node.bbox.contains_bbox(self.nodes[child].bbox) {
                            return Err(BvhError::NotEnclosed { node: idx });
                        }
                        stack.push((child, depth + 1));
                    }
                }
            }
        }

        let unreachable = visited.iter().filter(|seen| !**seen).count();
        if unreachable > 0 {
            return Err(BvhError::UnreachableNodes { unreachable });
        }

        // Disjoint leaf ranges covering the id array sum to exactly its length;
        // an overlap would make the sum exceed it or leave an id uncovered.
        if covered != primitive_count || !self.leaf_ranges_disjoint() {
            return Err(BvhError::PrimitiveCoverage {
                covered,
                primitive_count,
            });
        }

        let mut sorted = self.prim_ids.clone();
        sorted.sort_unstable();
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(BvhError::DuplicatePrimitive { id: pair[0] });
        }

        Ok(())
    }

    /// Check that every primitive id indexes into `bboxes` and that each leaf
    /// box encloses the boxes of its primitives.
    pub fn validate_bounds(&self, bboxes: &[BBox]) -> Result<(), BvhError> {
        for (idx, node) in self.nodes.iter().enumerate() {
            for &id in self.leaf_primitives(node) {
                let Some(prim_bbox) = bboxes.get(id as usize) else {
                    return Err(BvhError::PrimitiveIdOutOfRange {
                        id,
                        triangle_count: bboxes.len(),
                    });
                };
                if !node.bbox.contains_bbox(*prim_bbox) {
                    return Err(BvhError::NotEnclosed { node: idx });
                }
            }
        }
        Ok(())
    }

    fn leaf_ranges_disjoint(&self) -> bool {
        let mut ranges: Vec<Range<usize>> = self
            .nodes
            .iter()
            .filter_map(BvhNode::primitive_range)
            .filter(|range| !range.is_empty())
            .collect();
        ranges.sort_unstable_by_key(|range| range.start);
        ranges.windows(2).all(|pair| pair[0].end <= pair[1].start)
    }
}
