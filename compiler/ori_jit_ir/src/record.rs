//! Snapshot records.
//!
//! A snapshot is a tree of [`SnapshotRecord`]s, one per captured function
//! instance (the root, every call-site and field-access inlinee, and every
//! polymorphic successor). Records refer to each other and to their side
//! lists only through arena indices, so a whole snapshot can be moved or
//! shipped as one value.

use bitflags::bitflags;

use crate::ids::{
    AddrRange, BodyId, FunctionNumber, GuardRange, LocalFunctionId, ProfileSlotId, RemoteAddr,
    RuntimeId, SlotRange, SnapshotId, SourceContextId, TypeSpecRange,
};

bitflags! {
    /// Inlining flags copied from the code-gen context.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    #[cfg_attr(feature = "transport", derive(serde::Serialize, serde::Deserialize))]
    pub struct NodeFlags: u8 {
        /// Aggressive inlining was enabled when the decision tree was built.
        const AGGRESSIVE_INLINING = 1 << 0;
        /// The function was already inlined somewhere upstream.
        const INLINED = 1 << 1;
    }
}

bitflags! {
    /// Static properties of a function body that compilation policy reads.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    #[cfg_attr(feature = "transport", derive(serde::Serialize, serde::Deserialize))]
    pub struct BodyFlags: u8 {
        /// The body is a generator (resumable frame).
        const GENERATOR = 1 << 0;
        /// The body contains exception-handling regions.
        const HAS_TRY = 1 << 1;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for BodyFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// One captured function instance.
///
/// Producer and consumer share this layout byte-for-byte: it is `#[repr(C)]`
/// and its size is pinned below with
/// [`static_assert_size!`](crate::static_assert_size). The 8-byte addresses
/// come first so there is no interior padding.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
#[cfg_attr(feature = "transport", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct SnapshotRecord {
    /// Identity address of the source function. Compared, never followed.
    pub function_info_addr: RemoteAddr,
    /// Address of the weak reference to the function object.
    pub weak_func_ref: RemoteAddr,
    /// Opaque bitvector marking the call sites considered for inlining.
    pub inlinees_bv: RemoteAddr,
    /// Entry point call counter; only captured for inlinees with profile data.
    pub calls_count_addr: RemoteAddr,
    /// Static body data, `None` when the function has no compiled body.
    pub body: Option<BodyId>,
    /// Runtime data; present exactly when `body` is.
    pub runtime: Option<RuntimeId>,
    /// Shared property guards drained from the entry point.
    pub shared_guards: GuardRange,
    /// One slot per profiled call site.
    pub inlinees: SlotRange,
    /// One slot per inline cache.
    pub field_inlinees: SlotRange,
    /// Per-inline-cache type-specialization records (empty or one per cache).
    pub type_specs: TypeSpecRange,
    /// Call-site independent type-specialization records.
    pub global_type_specs: TypeSpecRange,
    /// Next candidate observed at the same call site or slot.
    pub next: Option<SnapshotId>,
    pub local_function_id: LocalFunctionId,
    pub flags: NodeFlags,
}

crate::static_assert_size!(SnapshotRecord, 104);

/// Static per-body data supplied by the code-gen context.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
#[cfg_attr(feature = "transport", derive(serde::Serialize, serde::Deserialize))]
pub struct BodyRecord {
    /// Address of the live function body.
    pub addr: RemoteAddr,
    pub source_context_id: SourceContextId,
    pub function_number: FunctionNumber,
    /// Number of profiled call sites; the length of every call-site list.
    pub profiled_call_site_count: u16,
    /// Number of inline caches; the length of every per-cache list.
    pub inline_cache_count: u32,
    pub flags: BodyFlags,
    pub display_name: String,
    /// Profile slot attached by the builder when the body has profile data.
    pub profile: Option<ProfileSlotId>,
}

impl BodyRecord {
    #[inline]
    pub fn is_generator(&self) -> bool {
        self.flags.contains(BodyFlags::GENERATOR)
    }

    #[inline]
    pub fn has_try(&self) -> bool {
        self.flags.contains(BodyFlags::HAS_TRY)
    }
}

/// Runtime data captured for a node with a body.
///
/// `cloned_inline_caches` is only filled for inlinee targets whose runtime
/// context holds cloned caches; otherwise the record exists but is empty.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
#[cfg_attr(feature = "transport", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeRecord {
    pub cloned_inline_caches: AddrRange,
}

/// Profile data for one body, as laid out by the profile materializer.
///
/// The payload is opaque at this layer.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
#[cfg_attr(feature = "transport", derive(serde::Serialize, serde::Deserialize))]
pub struct ProfileRecord {
    pub words: Vec<u64>,
}

/// Type-specialization descriptor for one access site, as laid out by the
/// type-specialization materializer.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
#[cfg_attr(feature = "transport", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeSpecRecord {
    pub words: Vec<u64>,
}
