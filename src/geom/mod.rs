mod bvh;
mod bvh_builder;
mod closest_point;
mod core;
mod diagnostics;
mod metrics;
mod projection;
mod serialize;
mod stack;
mod triangle;

pub use bvh::{Bvh, BvhError, BvhNode, MAX_TREE_DEPTH, NodeKind};
pub use bvh_builder::{BuildQuality, BvhBuildOptions};
pub use closest_point::{Barycentric, closest_point_on_triangle};
pub use core::{BBox, Point3, Vec3};
pub use diagnostics::BvhDiagnostics;
pub use metrics::{GeomMetrics, GeomTimingReport, TimingBucket};
pub use projection::{
    AngleTolerance, MeshIndex, ProjectionError, ProjectionResult, closest_point_with_normal,
    evaluate_bindings,
};
pub use serialize::{
    BvhFormatError, HEADER_SIZE, NODE_RECORD_SIZE, deserialize_bvh, from_bytes, serialize_bvh,
    serialized_len, to_bytes,
};
pub use stack::SmallStack;
pub use triangle::{MeshError, Triangle, TriangleSet, Winding, triangles_from_indexed};

#[cfg(test)]
mod tests;
