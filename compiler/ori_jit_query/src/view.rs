//! Borrowed views over a built snapshot.
//!
//! [`FunctionSnapshot`] is what the code generator navigates: a `Copy`
//! handle pairing an arena with one node. Every lookup is checked against
//! the counts recorded in the node's body. A snapshot built in this process
//! agrees with those counts by construction, so a disagreement means the
//! producer and consumer are out of sync and the lookup panics. Snapshots
//! from elsewhere go through [`SnapshotArena::validate`] first.

use std::fmt;
use std::iter::FusedIterator;

use ori_jit_ir::{
    BodyFlags, BodyRecord, FunctionNumber, InlineCacheIndex, LocalFunctionId, NodeFlags,
    ProfileId, ProfileRecord, PropertyId, RemoteAddr, RuntimeRecord, SnapshotArena, SnapshotId,
    SnapshotRecord, SourceContextId, TypeSpecRecord,
};

/// One captured function instance.
#[derive(Copy, Clone)]
pub struct FunctionSnapshot<'a> {
    arena: &'a SnapshotArena,
    id: SnapshotId,
    record: &'a SnapshotRecord,
}

impl<'a> FunctionSnapshot<'a> {
    /// View node `id` of `arena`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a node of `arena`.
    pub fn new(arena: &'a SnapshotArena, id: SnapshotId) -> Self {
        Self {
            arena,
            id,
            record: arena.node(id),
        }
    }

    #[inline]
    pub fn id(self) -> SnapshotId {
        self.id
    }

    #[inline]
    pub fn arena(self) -> &'a SnapshotArena {
        self.arena
    }

    #[inline]
    fn at(self, id: SnapshotId) -> Self {
        Self::new(self.arena, id)
    }

    // Identity and flags

    #[inline]
    pub fn function_info_addr(self) -> RemoteAddr {
        self.record.function_info_addr
    }

    #[inline]
    pub fn weak_func_ref(self) -> RemoteAddr {
        self.record.weak_func_ref
    }

    #[inline]
    pub fn local_function_id(self) -> LocalFunctionId {
        self.record.local_function_id
    }

    #[inline]
    pub fn is_aggressive_inlining_enabled(self) -> bool {
        self.record.flags.contains(NodeFlags::AGGRESSIVE_INLINING)
    }

    #[inline]
    pub fn is_inlined(self) -> bool {
        self.record.flags.contains(NodeFlags::INLINED)
    }

    #[inline]
    pub fn inlinees_bv(self) -> RemoteAddr {
        self.record.inlinees_bv
    }

    /// Entry point call counter; `NULL` unless this node was built as an
    /// inlinee with profile data.
    #[inline]
    pub fn calls_count_addr(self) -> RemoteAddr {
        self.record.calls_count_addr
    }

    // Body

    #[inline]
    pub fn has_body(self) -> bool {
        self.record.body.is_some()
    }

    pub fn body(self) -> Option<BodyView<'a>> {
        self.record.body.map(|id| BodyView {
            arena: self.arena,
            record: self.arena.body(id),
        })
    }

    /// The body, for queries that are meaningless without one.
    pub(crate) fn body_or_panic(self, query: &str) -> BodyView<'a> {
        match self.body() {
            Some(body) => body,
            None => panic!("{query} on node {:?}, which has no body", self.id),
        }
    }

    /// # Panics
    ///
    /// Panics if the function has no body.
    pub fn source_context_id(self) -> SourceContextId {
        self.body_or_panic("source_context_id").source_context_id()
    }

    /// # Panics
    ///
    /// Panics if the function has no body.
    pub fn display_name(self) -> &'a str {
        self.body_or_panic("display_name").display_name()
    }

    /// Materialized profile data, if the body had any.
    pub fn profile(self) -> Option<&'a ProfileRecord> {
        self.body().and_then(BodyView::profile)
    }

    // Structure

    /// Number of call-site slots (the body's profiled call-site count).
    #[inline]
    pub fn inlinee_count(self) -> u32 {
        self.record.inlinees.len
    }

    /// Whether the node has any field-access slots.
    #[inline]
    pub fn is_field_inlinee_present(self) -> bool {
        !self.record.field_inlinees.is_empty()
    }

    /// First inlining candidate at `call_site`.
    ///
    /// # Panics
    ///
    /// Panics if the function has no body or `call_site` is not below the
    /// body's profiled call-site count.
    pub fn inlinee(self, call_site: ProfileId) -> Option<Self> {
        let count = self.body_or_panic("inlinee").profiled_call_site_count();
        assert!(
            call_site.raw() < count,
            "call site {call_site} out of range: node {:?} records {count} profiled call sites",
            self.id
        );
        self.arena.slots(self.record.inlinees)[call_site.index()].map(|id| self.at(id))
    }

    /// First inlining candidate at inline cache `cache`.
    ///
    /// # Panics
    ///
    /// Panics if the function has no body or `cache` is not below the body's
    /// inline-cache count.
    pub fn field_inlinee(self, cache: InlineCacheIndex) -> Option<Self> {
        let count = self.body_or_panic("field_inlinee").inline_cache_count();
        assert!(
            cache.raw() < count,
            "inline cache {cache} out of range: node {:?} records {count} inline caches",
            self.id
        );
        self.arena.slots(self.record.field_inlinees)[cache.index()].map(|id| self.at(id))
    }

    /// Next candidate in this node's polymorphic chain.
    #[inline]
    pub fn next(self) -> Option<Self> {
        self.record.next.map(|id| self.at(id))
    }

    /// This node followed by its polymorphic successors, in upstream order.
    pub fn chain(self) -> Chain<'a> {
        Chain { next: Some(self) }
    }

    /// Whether the call site's first candidate has a successor.
    ///
    /// An empty slot is not polymorphic.
    ///
    /// # Panics
    ///
    /// Same conditions as [`inlinee`](Self::inlinee).
    pub fn is_polymorphic_call_site(self, call_site: ProfileId) -> bool {
        self.inlinee(call_site)
            .is_some_and(|first| first.record.next.is_some())
    }

    /// Walk the chain starting at `self` for the candidate with identity
    /// address `addr`.
    pub fn find_by_function_info_addr(self, addr: RemoteAddr) -> Option<Self> {
        self.chain()
            .find(|candidate| candidate.function_info_addr() == addr)
    }

    // Runtime data

    pub fn runtime_info(self) -> Option<RuntimeInfo<'a>> {
        self.record.runtime.map(|id| RuntimeInfo {
            arena: self.arena,
            record: self.arena.runtime(id),
        })
    }

    pub fn inlinee_runtime_info(self, call_site: ProfileId) -> Option<RuntimeInfo<'a>> {
        self.inlinee(call_site).and_then(Self::runtime_info)
    }

    pub fn field_inlinee_runtime_info(self, cache: InlineCacheIndex) -> Option<RuntimeInfo<'a>> {
        self.field_inlinee(cache).and_then(Self::runtime_info)
    }

    /// Runtime data of the candidate at `call_site` whose body lives at
    /// `body_addr`.
    ///
    /// Candidates are matched by body address, not identity address.
    ///
    /// # Panics
    ///
    /// Panics if no candidate in the call site's chain has that body; the
    /// caller only asks for targets it found in this snapshot.
    pub fn inlinee_runtime_info_for_target(
        self,
        call_site: ProfileId,
        body_addr: RemoteAddr,
    ) -> Option<RuntimeInfo<'a>> {
        let target = self.inlinee(call_site).and_then(|first| {
            first
                .chain()
                .find(|candidate| candidate.body().is_some_and(|body| body.addr() == body_addr))
        });
        match target {
            Some(target) => target.runtime_info(),
            None => panic!(
                "no candidate at call site {call_site} of node {:?} has body {body_addr:?}",
                self.id
            ),
        }
    }

    // Type specialization

    /// Type-spec record for inline cache `cache`; `None` when the node has
    /// no per-cache list or the entry was empty.
    ///
    /// # Panics
    ///
    /// Panics if a list is present and `cache` is not below the body's
    /// inline-cache count.
    pub fn type_spec_info(self, cache: InlineCacheIndex) -> Option<&'a TypeSpecRecord> {
        if self.record.type_specs.is_empty() {
            return None;
        }
        let count = self.body_or_panic("type_spec_info").inline_cache_count();
        assert!(
            cache.raw() < count,
            "inline cache {cache} out of range: node {:?} records {count} inline caches",
            self.id
        );
        self.arena.type_specs(self.record.type_specs)[cache.index()].as_ref()
    }

    /// # Panics
    ///
    /// Panics if `index` is not below
    /// [`global_type_spec_info_count`](Self::global_type_spec_info_count).
    pub fn global_type_spec_info(self, index: u32) -> Option<&'a TypeSpecRecord> {
        let count = self.global_type_spec_info_count();
        assert!(
            index < count,
            "global type-spec {index} out of range: node {:?} records {count}",
            self.id
        );
        self.arena.type_specs(self.record.global_type_specs)[index as usize].as_ref()
    }

    #[inline]
    pub fn global_type_spec_info_count(self) -> u32 {
        self.record.global_type_specs.len
    }

    // Shared property guards

    #[inline]
    pub fn has_shared_property_guards(self) -> bool {
        !self.record.shared_guards.is_empty()
    }

    /// Linear scan; guard sets are a handful of ids.
    pub fn has_shared_property_guard(self, id: PropertyId) -> bool {
        self.shared_property_guards().contains(&id)
    }

    /// Guard ids in the order they were drained.
    pub fn shared_property_guards(self) -> &'a [PropertyId] {
        self.arena.guards(self.record.shared_guards)
    }
}

impl PartialEq for FunctionSnapshot<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.arena, other.arena) && self.id == other.id
    }
}

impl Eq for FunctionSnapshot<'_> {}

impl fmt::Debug for FunctionSnapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSnapshot")
            .field("id", &self.id)
            .field("function_info_addr", &self.record.function_info_addr)
            .field("has_body", &self.has_body())
            .finish()
    }
}

/// Iterator over a polymorphic chain.
#[derive(Clone, Debug)]
pub struct Chain<'a> {
    next: Option<FunctionSnapshot<'a>>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = FunctionSnapshot<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.next();
        Some(current)
    }
}

impl FusedIterator for Chain<'_> {}

/// Static data of a function body.
#[derive(Copy, Clone)]
pub struct BodyView<'a> {
    arena: &'a SnapshotArena,
    record: &'a BodyRecord,
}

impl<'a> BodyView<'a> {
    #[inline]
    pub fn addr(self) -> RemoteAddr {
        self.record.addr
    }

    #[inline]
    pub fn source_context_id(self) -> SourceContextId {
        self.record.source_context_id
    }

    #[inline]
    pub fn function_number(self) -> FunctionNumber {
        self.record.function_number
    }

    #[inline]
    pub fn profiled_call_site_count(self) -> u16 {
        self.record.profiled_call_site_count
    }

    #[inline]
    pub fn inline_cache_count(self) -> u32 {
        self.record.inline_cache_count
    }

    #[inline]
    pub fn flags(self) -> BodyFlags {
        self.record.flags
    }

    #[inline]
    pub fn is_generator(self) -> bool {
        self.record.is_generator()
    }

    #[inline]
    pub fn has_try(self) -> bool {
        self.record.has_try()
    }

    pub fn display_name(self) -> &'a str {
        &self.record.display_name
    }

    pub fn profile(self) -> Option<&'a ProfileRecord> {
        self.record.profile.map(|id| self.arena.profile(id))
    }
}

/// Runtime data of one captured function.
#[derive(Copy, Clone)]
pub struct RuntimeInfo<'a> {
    arena: &'a SnapshotArena,
    record: &'a RuntimeRecord,
}

impl<'a> RuntimeInfo<'a> {
    #[inline]
    pub fn has_cloned_inline_caches(self) -> bool {
        !self.record.cloned_inline_caches.is_empty()
    }

    #[inline]
    pub fn cloned_inline_cache_count(self) -> u32 {
        self.record.cloned_inline_caches.len
    }

    /// # Panics
    ///
    /// Panics if `cache` is not below
    /// [`cloned_inline_cache_count`](Self::cloned_inline_cache_count).
    pub fn cloned_inline_cache(self, cache: InlineCacheIndex) -> RemoteAddr {
        let count = self.cloned_inline_cache_count();
        assert!(
            cache.raw() < count,
            "inline cache {cache} out of range: runtime records {count} cloned caches"
        );
        self.cloned_inline_caches()[cache.index()]
    }

    pub fn cloned_inline_caches(self) -> &'a [RemoteAddr] {
        self.arena.addrs(self.record.cloned_inline_caches)
    }
}

impl fmt::Debug for BodyView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.record, f)
    }
}

/// Two views are equal when they show the same record.
impl PartialEq for RuntimeInfo<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.record, other.record)
    }
}

impl Eq for RuntimeInfo<'_> {}

impl fmt::Debug for RuntimeInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeInfo")
            .field("cloned_inline_caches", &self.cloned_inline_caches())
            .finish()
    }
}
