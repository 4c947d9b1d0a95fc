//! Ori JIT IR - JIT-time function snapshots
//!
//! This crate contains the data model a background or out-of-process JIT
//! compiles from:
//! - Opaque identifiers for things that live in the owning process
//!   ([`RemoteAddr`], [`PropertyId`], ...)
//! - [`SnapshotRecord`], one per captured function instance, and its side
//!   records ([`BodyRecord`], [`RuntimeRecord`], [`ProfileRecord`],
//!   [`TypeSpecRecord`])
//! - [`SnapshotArena`], which owns every record of one snapshot
//! - Shape validation for snapshots received across a process boundary
//!
//! # Design Philosophy
//!
//! - **Flatten Everything**: records link through `u32` arena indices, never
//!   through references, so a snapshot is one relocatable value.
//! - **Never Dereference**: foreign addresses are [`RemoteAddr`] integers.
//! - **Immutable After Build**: the builder is the only writer; afterwards
//!   the arena is shared read-only and needs no synchronisation.

/// Compile-time assertion that a type has a specific size.
///
/// Used to pin the layout of records shared between the snapshot producer
/// and its consumers.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

mod arena;
mod ids;
mod record;
#[cfg(feature = "transport")]
pub mod transport;
mod validate;

pub use arena::SnapshotArena;
pub use ids::{
    AddrRange, BodyId, FunctionNumber, GuardRange, InlineCacheIndex, LocalFunctionId, ProfileId,
    ProfileSlotId, PropertyId, RemoteAddr, RuntimeId, SlotRange, SnapshotId, SourceContextId,
    TypeSpecRange,
};
pub use record::{
    BodyFlags, BodyRecord, NodeFlags, ProfileRecord, RuntimeRecord, SnapshotRecord,
    TypeSpecRecord,
};
pub use validate::ShapeError;
