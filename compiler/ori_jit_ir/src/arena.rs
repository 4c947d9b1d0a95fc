//! Snapshot arena.
//!
//! [`SnapshotArena`] owns every record of one snapshot: the node records,
//! their body/runtime/profile side records, and the flat lists that the
//! range types index. Everything is released together when the arena is
//! dropped; there is no per-node freeing.
//!
//! # Index Spaces
//!
//! - `nodes`: indexed by [`SnapshotId`]
//! - `bodies` / `runtimes` / `profiles`: indexed by [`BodyId`] /
//!   [`RuntimeId`] / [`ProfileSlotId`]
//! - `slots`: flat `Vec<Option<SnapshotId>>` indexed by [`SlotRange`]
//! - `addrs`: indexed by [`AddrRange`]
//! - `guards`: indexed by [`GuardRange`]
//! - `type_specs`: indexed by [`TypeSpecRange`]

use crate::ids::{
    AddrRange, BodyId, GuardRange, ProfileSlotId, PropertyId, RemoteAddr, RuntimeId, SlotRange,
    SnapshotId, TypeSpecRange,
};
use crate::record::{BodyRecord, ProfileRecord, RuntimeRecord, SnapshotRecord, TypeSpecRecord};

/// Convert an arena length to a `u32` index.
///
/// Exceeding `u32::MAX` entries is a capacity violation the snapshot format
/// cannot represent.
#[inline]
pub(crate) fn to_u32(len: usize, what: &str) -> u32 {
    match u32::try_from(len) {
        Ok(value) => value,
        Err(_) => panic!("snapshot arena overflow: {what} count {len} exceeds u32::MAX"),
    }
}

/// Arena owning one JIT-time snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "transport", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapshotArena {
    nodes: Vec<SnapshotRecord>,
    bodies: Vec<BodyRecord>,
    runtimes: Vec<RuntimeRecord>,
    profiles: Vec<ProfileRecord>,
    /// Inlinee slots for call sites and inline caches.
    slots: Vec<Option<SnapshotId>>,
    /// Cloned inline-cache addresses.
    addrs: Vec<RemoteAddr>,
    /// Shared property-guard ids.
    guards: Vec<PropertyId>,
    /// Per-slot and global type-specialization records.
    type_specs: Vec<Option<TypeSpecRecord>>,
}

impl SnapshotArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an arena sized for roughly `nodes` captured functions.
    ///
    /// Slots are estimated at four per node (call sites plus inline caches).
    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(nodes),
            bodies: Vec::with_capacity(nodes),
            runtimes: Vec::with_capacity(nodes),
            profiles: Vec::new(),
            slots: Vec::with_capacity(nodes * 4),
            addrs: Vec::new(),
            guards: Vec::new(),
            type_specs: Vec::new(),
        }
    }

    /// Drop every record, keeping the allocations for the next build.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.bodies.clear();
        self.runtimes.clear();
        self.profiles.clear();
        self.slots.clear();
        self.addrs.clear();
        self.guards.clear();
        self.type_specs.clear();
    }

    // Nodes

    /// Allocate a zero-initialised node record, returning its ID.
    pub fn alloc_node(&mut self) -> SnapshotId {
        let id = SnapshotId::new(to_u32(self.nodes.len(), "snapshot nodes"));
        self.nodes.push(SnapshotRecord::default());
        id
    }

    /// Overwrite a previously allocated node record.
    #[inline]
    pub fn set_node(&mut self, id: SnapshotId, record: SnapshotRecord) {
        self.nodes[id.index()] = record;
    }

    /// Get a node record.
    #[inline]
    pub fn node(&self, id: SnapshotId) -> &SnapshotRecord {
        &self.nodes[id.index()]
    }

    /// Get a node record if `id` is in bounds.
    #[inline]
    pub fn try_node(&self, id: SnapshotId) -> Option<&SnapshotRecord> {
        self.nodes.get(id.index())
    }

    /// Number of node records.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no node has been allocated.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // Side records

    /// Store a body record, returning its ID.
    pub fn push_body(&mut self, body: BodyRecord) -> BodyId {
        let id = BodyId::new(to_u32(self.bodies.len(), "bodies"));
        self.bodies.push(body);
        id
    }

    #[inline]
    pub fn body(&self, id: BodyId) -> &BodyRecord {
        &self.bodies[id.index()]
    }

    #[inline]
    pub fn try_body(&self, id: BodyId) -> Option<&BodyRecord> {
        self.bodies.get(id.index())
    }

    /// Store a runtime record, returning its ID.
    pub fn push_runtime(&mut self, runtime: RuntimeRecord) -> RuntimeId {
        let id = RuntimeId::new(to_u32(self.runtimes.len(), "runtime records"));
        self.runtimes.push(runtime);
        id
    }

    #[inline]
    pub fn runtime(&self, id: RuntimeId) -> &RuntimeRecord {
        &self.runtimes[id.index()]
    }

    #[inline]
    pub fn try_runtime(&self, id: RuntimeId) -> Option<&RuntimeRecord> {
        self.runtimes.get(id.index())
    }

    /// Store a profile record, returning its slot ID.
    pub fn push_profile(&mut self, profile: ProfileRecord) -> ProfileSlotId {
        let id = ProfileSlotId::new(to_u32(self.profiles.len(), "profiles"));
        self.profiles.push(profile);
        id
    }

    #[inline]
    pub fn profile(&self, id: ProfileSlotId) -> &ProfileRecord {
        &self.profiles[id.index()]
    }

    #[inline]
    pub fn try_profile(&self, id: ProfileSlotId) -> Option<&ProfileRecord> {
        self.profiles.get(id.index())
    }

    // Lists

    /// Allocate a contiguous list of inlinee slots.
    pub fn push_slots(&mut self, slots: &[Option<SnapshotId>]) -> SlotRange {
        if slots.is_empty() {
            return SlotRange::EMPTY;
        }
        let start = to_u32(self.slots.len(), "inlinee slots");
        self.slots.extend_from_slice(slots);
        SlotRange::new(start, to_u32(slots.len(), "inlinee slot list"))
    }

    /// Get inlinee slots from a range.
    pub fn slots(&self, range: SlotRange) -> &[Option<SnapshotId>] {
        if range.is_empty() {
            return &[];
        }
        let start = range.start as usize;
        &self.slots[start..start + range.len()]
    }

    /// Allocate a contiguous list of cloned inline-cache addresses.
    pub fn push_addrs(&mut self, addrs: &[RemoteAddr]) -> AddrRange {
        if addrs.is_empty() {
            return AddrRange::EMPTY;
        }
        let start = to_u32(self.addrs.len(), "inline cache addresses");
        self.addrs.extend_from_slice(addrs);
        AddrRange::new(start, to_u32(addrs.len(), "inline cache address list"))
    }

    /// Get addresses from a range.
    pub fn addrs(&self, range: AddrRange) -> &[RemoteAddr] {
        if range.is_empty() {
            return &[];
        }
        let start = range.start as usize;
        &self.addrs[start..start + range.len()]
    }

    /// Allocate a contiguous list of shared property-guard ids.
    pub fn push_guards(&mut self, guards: &[PropertyId]) -> GuardRange {
        if guards.is_empty() {
            return GuardRange::EMPTY;
        }
        let start = to_u32(self.guards.len(), "shared guards");
        self.guards.extend_from_slice(guards);
        GuardRange::new(start, to_u32(guards.len(), "shared guard list"))
    }

    /// Get guard ids from a range.
    pub fn guards(&self, range: GuardRange) -> &[PropertyId] {
        if range.is_empty() {
            return &[];
        }
        let start = range.start as usize;
        &self.guards[start..start + range.len()]
    }

    /// Move a list of type-specialization records into the arena.
    pub fn push_type_specs(&mut self, specs: Vec<Option<TypeSpecRecord>>) -> TypeSpecRange {
        if specs.is_empty() {
            return TypeSpecRange::EMPTY;
        }
        let start = to_u32(self.type_specs.len(), "type-spec records");
        let len = to_u32(specs.len(), "type-spec list");
        self.type_specs.extend(specs);
        TypeSpecRange::new(start, len)
    }

    /// Get type-specialization records from a range.
    pub fn type_specs(&self, range: TypeSpecRange) -> &[Option<TypeSpecRecord>] {
        if range.is_empty() {
            return &[];
        }
        let start = range.start as usize;
        &self.type_specs[start..start + range.len()]
    }

    /// Flat list lengths, used when checking ranges from an untrusted arena.
    pub(crate) fn list_lens(&self) -> ListLens {
        ListLens {
            slots: self.slots.len() as u64,
            addrs: self.addrs.len() as u64,
            guards: self.guards.len() as u64,
            type_specs: self.type_specs.len() as u64,
        }
    }

    /// All node records in allocation order.
    pub(crate) fn nodes(&self) -> &[SnapshotRecord] {
        &self.nodes
    }

    /// All body records in allocation order.
    pub(crate) fn bodies(&self) -> &[BodyRecord] {
        &self.bodies
    }
}

/// Lengths of the flat lists.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ListLens {
    pub slots: u64,
    pub addrs: u64,
    pub guards: u64,
    pub type_specs: u64,
}
