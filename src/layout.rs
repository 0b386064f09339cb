//! On-block layout: serialization of a vertex segment into a single byte
//! stream, split across its blocks in order (§4.5).
//!
//! Stream shape, in order:
//!   1. 24-byte header (`num_blocks`, `num_lightweight_edges`,
//!      `property_bytes`, `unused_bytes`);
//!   2. `num_blocks - 1` overflow-block locators (8 bytes each);
//!   3. the lightweight edge table (`ceil(num_lightweight_edges / 8)`
//!      edge blocks of 80 bytes each);
//!   4. the property list payload (`property_bytes` bytes).
//!
//! The layout is homogeneous-cluster: no magic, no checksum, no
//! endianness marker (§6). Everything is little-endian by convention of
//! this implementation.

use crate::edges::EDGE_BLOCK_BYTES;
use crate::locator::Locator;

/// Size in bytes of the fixed vertex header.
pub const VERTEX_HEADER_BYTES: u32 = 24;

/// Fixed header prefixing every vertex segment's byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexHeader {
    /// Number of blocks (primary + overflow) making up this segment.
    pub num_blocks: u32,
    /// Number of lightweight edge slots currently stored (post-shrink
    /// once committed; may include tombstones between commits).
    pub num_lightweight_edges: u32,
    /// Bytes of property-list payload.
    pub property_bytes: u64,
    /// Bytes of that payload currently marked as `EMPTY` holes (P6).
    pub unused_bytes: u64,
}

impl VertexHeader {
    /// Serializes the header to its fixed 24-byte wire form.
    pub fn to_bytes(&self) -> [u8; VERTEX_HEADER_BYTES as usize] {
        let mut buf = [0u8; VERTEX_HEADER_BYTES as usize];
        buf[0..4].copy_from_slice(&self.num_blocks.to_le_bytes());
        buf[4..8].copy_from_slice(&self.num_lightweight_edges.to_le_bytes());
        buf[8..16].copy_from_slice(&self.property_bytes.to_le_bytes());
        buf[16..24].copy_from_slice(&self.unused_bytes.to_le_bytes());
        buf
    }

    /// Parses a header from its fixed 24-byte wire form.
    pub fn from_bytes(buf: &[u8]) -> VertexHeader {
        VertexHeader {
            num_blocks: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            num_lightweight_edges: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            property_bytes: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            unused_bytes: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
        }
    }

    /// Byte length of the edge table region implied by this header.
    pub fn edge_table_bytes(&self) -> u64 {
        num_edge_blocks(self.num_lightweight_edges) as u64 * EDGE_BLOCK_BYTES as u64
    }

    /// Total stream length (header + overflow locators + edges + properties).
    pub fn stream_len(&self) -> u64 {
        VERTEX_HEADER_BYTES as u64
            + (self.num_blocks.saturating_sub(1) as u64) * 8
            + self.edge_table_bytes()
            + self.property_bytes
    }
}

/// Number of 80-byte edge blocks needed to hold `num_edges` slots.
pub fn num_edge_blocks(num_edges: u32) -> u32 {
    (num_edges + 7) / 8
}

/// Computes the number of blocks required to hold a stream of
/// `total_bytes`, per I3: `ceil(total_bytes / block_size)`.
pub fn blocks_required(total_bytes: u64, block_size_bytes: u32) -> u32 {
    let block_size_bytes = block_size_bytes as u64;
    (((total_bytes + block_size_bytes - 1) / block_size_bytes).max(1)) as u32
}

/// Assembles the full logical byte stream for a vertex segment.
pub fn assemble_stream(
    header: &VertexHeader,
    overflow_locators: &[Locator],
    edge_bytes: &[u8],
    property_bytes: &[u8],
) -> Vec<u8> {
    let mut stream = Vec::with_capacity(header.stream_len() as usize);
    stream.extend_from_slice(&header.to_bytes());
    for locator in overflow_locators {
        stream.extend_from_slice(&locator.as_u64().to_le_bytes());
    }
    stream.extend_from_slice(edge_bytes);
    stream.extend_from_slice(property_bytes);
    stream
}

/// Splits a logical stream into fixed-size blocks, zero-padding the last.
pub fn split_into_blocks(stream: &[u8], block_size_bytes: u32) -> Vec<Vec<u8>> {
    let block_size_bytes = block_size_bytes as usize;
    let mut blocks = Vec::new();
    let mut offset = 0;
    while offset < stream.len() {
        let end = (offset + block_size_bytes).min(stream.len());
        let mut block = vec![0u8; block_size_bytes];
        block[..end - offset].copy_from_slice(&stream[offset..end]);
        blocks.push(block);
        offset += block_size_bytes;
    }
    if blocks.is_empty() {
        blocks.push(vec![0u8; block_size_bytes]);
    }
    blocks
}

/// The three parsed regions of a vertex segment's stream, plus the
/// overflow locators read out of it.
pub struct ParsedSegment {
    /// Parsed header.
    pub header: VertexHeader,
    /// Overflow block locators, in block order.
    pub overflow_locators: Vec<Locator>,
    /// Raw lightweight edge table bytes.
    pub edge_bytes: Vec<u8>,
    /// Raw property list payload bytes.
    pub property_bytes: Vec<u8>,
}

/// Parses a concatenated multi-block stream (as produced by joining
/// `header.num_blocks` fetched blocks in order) into its regions.
pub fn parse_stream(stream: &[u8]) -> ParsedSegment {
    let header = VertexHeader::from_bytes(&stream[0..VERTEX_HEADER_BYTES as usize]);
    let mut offset = VERTEX_HEADER_BYTES as usize;

    let num_overflow = header.num_blocks.saturating_sub(1) as usize;
    let mut overflow_locators = Vec::with_capacity(num_overflow);
    for _ in 0..num_overflow {
        let raw = u64::from_le_bytes(stream[offset..offset + 8].try_into().unwrap());
        overflow_locators.push(Locator::from_u64(raw));
        offset += 8;
    }

    let edge_len = header.edge_table_bytes() as usize;
    let edge_bytes = stream[offset..offset + edge_len].to_vec();
    offset += edge_len;

    let property_len = header.property_bytes as usize;
    let property_bytes = stream[offset..offset + property_len].to_vec();

    ParsedSegment {
        header,
        overflow_locators,
        edge_bytes,
        property_bytes,
    }
}
