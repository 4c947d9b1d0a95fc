//! Byte encoding for shipping a snapshot to an out-of-process JIT.
//!
//! # Format
//!
//! ```text
//! TransportHeader   magic "OJTS", format version, size_of::<SnapshotRecord>()
//! (SnapshotId, SnapshotArena)   bincode-encoded root and arena
//! ```
//!
//! The header is checked before the payload is decoded so that a peer built
//! with a different record layout is rejected with
//! [`TransportError::LayoutMismatch`] rather than misread. A decoded arena is
//! always run through [`SnapshotArena::validate`].

use serde::{Deserialize, Serialize};

use crate::arena::to_u32;
use crate::ids::SnapshotId;
use crate::record::SnapshotRecord;
use crate::validate::ShapeError;
use crate::SnapshotArena;

/// Magic tag at the start of every encoded snapshot.
pub const MAGIC: [u8; 4] = *b"OJTS";

/// Bumped whenever a record gains, loses or reorders a field.
pub const FORMAT_VERSION: u16 = 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct TransportHeader {
    magic: [u8; 4],
    version: u16,
    record_size: u32,
}

impl TransportHeader {
    fn current() -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            record_size: to_u32(std::mem::size_of::<SnapshotRecord>(), "record size"),
        }
    }
}

/// Errors from encoding or decoding a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode snapshot: {0}")]
    Decode(#[source] bincode::Error),

    #[error("not an encoded snapshot (magic {found:?})")]
    BadMagic { found: [u8; 4] },

    #[error("snapshot format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("snapshot record layout is {found} bytes, this build expects {expected}")]
    LayoutMismatch { found: u32, expected: u32 },

    #[error("decoded snapshot is malformed: {0}")]
    Shape(#[from] ShapeError),
}

/// Encode the snapshot rooted at `root`.
pub fn encode(arena: &SnapshotArena, root: SnapshotId) -> Result<Vec<u8>, TransportError> {
    let mut bytes =
        bincode::serialize(&TransportHeader::current()).map_err(TransportError::Encode)?;
    let payload = bincode::serialize(&(root, arena)).map_err(TransportError::Encode)?;
    bytes.extend_from_slice(&payload);
    tracing::trace!(
        nodes = arena.len(),
        bytes = bytes.len(),
        "encoded snapshot"
    );
    Ok(bytes)
}

/// Decode and validate a snapshot produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<(SnapshotArena, SnapshotId), TransportError> {
    let header: TransportHeader = bincode::deserialize(bytes).map_err(TransportError::Decode)?;
    let expected = TransportHeader::current();
    if header.magic != expected.magic {
        return Err(TransportError::BadMagic {
            found: header.magic,
        });
    }
    if header.version != expected.version {
        return Err(TransportError::UnsupportedVersion {
            found: header.version,
            expected: expected.version,
        });
    }
    if header.record_size != expected.record_size {
        return Err(TransportError::LayoutMismatch {
            found: header.record_size,
            expected: expected.record_size,
        });
    }

    let header_len = bincode::serialized_size(&header).map_err(TransportError::Decode)?;
    let payload = usize::try_from(header_len)
        .ok()
        .and_then(|offset| bytes.get(offset..))
        .unwrap_or_default();
    let (root, arena): (SnapshotId, SnapshotArena) =
        bincode::deserialize(payload).map_err(TransportError::Decode)?;

    let reachable = arena.validate(root)?;
    tracing::trace!(nodes = reachable, "decoded snapshot");
    Ok((arena, root))
}
