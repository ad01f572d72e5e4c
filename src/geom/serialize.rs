//! Binary layout for persisting a built [`Bvh`].
//!
//! All values are little-endian:
//!
//! | Field | Type |
//! |---|---|
//! | node count | `u64` |
//! | primitive id count | `u64` |
//! | nodes, each: | |
//! | &nbsp;&nbsp;bbox min x, y, z | 3 × `f64` |
//! | &nbsp;&nbsp;bbox max x, y, z | 3 × `f64` |
//! | &nbsp;&nbsp;kind tag (0 = inner, 1 = leaf) | `u32` |
//! | &nbsp;&nbsp;first child / first primitive | `u32` |
//! | &nbsp;&nbsp;primitive count (0 for inner nodes) | `u32` |
//! | primitive ids | count × `u32` |
//!
//! A node record is therefore [`NODE_RECORD_SIZE`] bytes. Deserialization
//! validates the result with [`Bvh::validate`], so a hierarchy read back is
//! always safe to traverse.

use std::io::{self, Read, Write};

use thiserror::Error;

use super::bvh::{Bvh, BvhError, BvhNode, NodeKind};
use super::{BBox, Point3};

/// Bytes per serialized node.
pub const NODE_RECORD_SIZE: usize = 6 * 8 + 3 * 4;

/// Bytes before the first node record.
pub const HEADER_SIZE: usize = 2 * 8;

const TAG_INNER: u32 = 0;
const TAG_LEAF: u32 = 1;

/// Largest node or primitive-id count a stream may declare.
const MAX_COUNT: u64 = u32::MAX as u64;

/// Records pre-allocated before any data has been read.
const MAX_PREALLOCATION: usize = 1 << 16;

#[derive(Debug, Error)]
pub enum BvhFormatError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("input ended before the hierarchy was complete")]
    Truncated,
    #[error("declared {what} count {count} exceeds the supported maximum")]
    CountTooLarge { what: &'static str, count: u64 },
    #[error("node {node} has unknown kind tag {tag}")]
    InvalidNodeKind { node: usize, tag: u32 },
    #[error("{remaining} unread bytes after the hierarchy")]
    TrailingBytes { remaining: usize },
    #[error("decoded hierarchy is invalid: {0}")]
    Invalid(#[from] BvhError),
}

/// Exact number of bytes [`serialize_bvh`] writes for `bvh`.
#[must_use]
pub fn serialized_len(bvh: &Bvh) -> usize {
    HEADER_SIZE + bvh.node_count() * NODE_RECORD_SIZE + bvh.primitive_count() * 4
}

pub fn serialize_bvh<W: Write>(bvh: &Bvh, mut writer: W) -> io::Result<()> {
    writer.write_all(&(bvh.node_count() as u64).to_le_bytes())?;
    writer.write_all(&(bvh.primitive_count() as u64).to_le_bytes())?;

    for node in bvh.nodes() {
        for value in node.bbox.min.to_array().into_iter().chain(node.bbox.max.to_array()) {
            writer.write_all(&value.to_le_bytes())?;
        }
        let (tag, first, count) = match node.kind {
            NodeKind::Inner { first_child } => (TAG_INNER, first_child, 0),
            NodeKind::Leaf {
                first_primitive,
                primitive_count,
            } => (TAG_LEAF, first_primitive, primitive_count),
        };
        writer.write_all(&tag.to_le_bytes())?;
        writer.write_all(&first.to_le_bytes())?;
        writer.write_all(&count.to_le_bytes())?;
    }

    for id in bvh.prim_ids() {
        writer.write_all(&id.to_le_bytes())?;
    }
    writer.flush()
}

#[must_use]
pub fn to_bytes(bvh: &Bvh) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(serialized_len(bvh));
    // Writing into a Vec cannot fail.
    let _ = serialize_bvh(bvh, &mut bytes);
    bytes
}

/// Read one hierarchy from `reader`. Bytes after it are left unread.
pub fn deserialize_bvh<R: Read>(mut reader: R) -> Result<Bvh, BvhFormatError> {
    let node_count = read_count(&mut reader, "node")?;
    let prim_count = read_count(&mut reader, "primitive id")?;

    let mut nodes = Vec::with_capacity(node_count.min(MAX_PREALLOCATION));
    for node in 0..node_count {
        let min = Point3::new(read_f64(&mut reader)?, read_f64(&mut reader)?, read_f64(&mut reader)?);
        let max = Point3::new(read_f64(&mut reader)?, read_f64(&mut reader)?, read_f64(&mut reader)?);
        let tag = read_u32(&mut reader)?;
        let first = read_u32(&mut reader)?;
        let count = read_u32(&mut reader)?;
        let bbox = BBox::new(min, max);
        nodes.push(match tag {
            TAG_INNER => BvhNode::inner(bbox, first),
            TAG_LEAF => BvhNode::leaf(bbox, first, count),
            _ => return Err(BvhFormatError::InvalidNodeKind { node, tag }),
        });
    }

    let mut prim_ids = Vec::with_capacity(prim_count.min(MAX_PREALLOCATION));
    for _ in 0..prim_count {
        prim_ids.push(read_u32(&mut reader)?);
    }

    let bvh = Bvh::from_parts(nodes, prim_ids)?;
    log::debug!(
        "deserialized hierarchy: {} nodes, {} primitives",
        bvh.node_count(),
        bvh.primitive_count()
    );
    Ok(bvh)
}

/// Read a hierarchy that must occupy all of `bytes`.
pub fn from_bytes(bytes: &[u8]) -> Result<Bvh, BvhFormatError> {
    let mut rest = bytes;
    let bvh = deserialize_bvh(&mut rest)?;
    if !rest.is_empty() {
        return Err(BvhFormatError::TrailingBytes {
            remaining: rest.len(),
        });
    }
    Ok(bvh)
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N], BvhFormatError> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => BvhFormatError::Truncated,
        _ => BvhFormatError::Io(err),
    })?;
    Ok(buf)
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, BvhFormatError> {
    read_array(reader).map(u32::from_le_bytes)
}

fn read_f64<R: Read>(reader: &mut R) -> Result<f64, BvhFormatError> {
    read_array(reader).map(f64::from_le_bytes)
}

fn read_count<R: Read>(reader: &mut R, what: &'static str) -> Result<usize, BvhFormatError> {
    let count = read_array(reader).map(u64::from_le_bytes)?;
    if count > MAX_COUNT {
        return Err(BvhFormatError::CountTooLarge { what, count });
    }
    usize::try_from(count).map_err(|_| BvhFormatError::CountTooLarge { what, count })
}
