//! Recursive snapshot construction.
//!
//! [`SnapshotBuilder`] replays an inlining decision tree that was already
//! computed upstream and copies everything the JIT needs into a
//! [`SnapshotArena`]. It makes no decisions of its own: every child, chain
//! link and list length mirrors the source exactly.
//!
//! # Algorithm
//!
//! For each captured function:
//!
//! 1. Allocate a zeroed node and copy the scalar identity/flag fields.
//! 2. If the function has a body:
//!    - with profile data, let the [`Materializer`] fill a profile slot; an
//!      inlinee also records its entry point's call counter and drains the
//!      entry point's shared property guards;
//!    - build one slot per profiled call site, recursing into each candidate;
//!    - allocate the runtime record, with cloned inline caches for inlinees;
//!    - build one slot per inline cache, plus the per-cache type-spec list;
//!    - materialize the global type-spec list;
//!    - recurse into the polymorphic successor.
//! 3. Return the node id.
//!
//! # Runtime data source
//!
//! When the node being built is an inlinee, its children's runtime data is
//! read from the node's own runtime context. Otherwise it comes from the
//! tables the body keeps for its inlinees. Children are always built with
//! `is_inlinee = false`, so below the first level the body tables are what
//! gets read.
//!
//! # Concurrency
//!
//! Building may run on a background thread while the owning thread keeps
//! profiling the same functions. Guard sets and second-level runtime tables
//! are read in one best-effort pass; the result need not match any single
//! moment of the source. The arena is only written by the builder and is
//! immutable once [`SnapshotBuilder::build`] returns.

use smallvec::SmallVec;

use ori_jit_ir::{
    GuardRange, InlineCacheIndex, NodeFlags, ProfileId, ProfileRecord, PropertyId, RemoteAddr,
    RuntimeRecord, SnapshotArena, SnapshotId, SnapshotRecord, TypeSpecRange, TypeSpecRecord,
};

use crate::source::{
    CodeGenSource, FunctionBodySource, Materializer, RuntimeSource, SharedGuardSet,
};
use crate::stack::ensure_sufficient_stack;

/// Counters for one or more builds into the same arena.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Node records allocated.
    pub nodes: usize,
    /// Nodes that had a compiled body.
    pub bodies: usize,
    /// Profile slots filled by the materializer.
    pub profiles: usize,
    /// Shared property guards drained.
    pub guards: usize,
    /// Type-spec records the materializer produced (non-empty entries).
    pub type_specs: usize,
}

/// Builds snapshot trees into a caller-owned arena.
pub struct SnapshotBuilder<'a> {
    arena: &'a mut SnapshotArena,
    materializer: &'a mut dyn Materializer,
    stats: BuildStats,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(arena: &'a mut SnapshotArena, materializer: &'a mut dyn Materializer) -> Self {
        Self {
            arena,
            materializer,
            stats: BuildStats::default(),
        }
    }

    /// Build the snapshot of one compilation unit and return its root.
    ///
    /// `runtime` must be present when `is_inlinee` is set. A missing child
    /// context anywhere in the tree leaves an empty slot.
    pub fn build(
        &mut self,
        codegen: &dyn CodeGenSource,
        runtime: Option<&dyn RuntimeSource>,
        is_inlinee: bool,
    ) -> SnapshotId {
        let before = self.stats;
        let root = self.build_node(codegen, runtime, is_inlinee);
        tracing::debug!(
            root = root.raw(),
            nodes = self.stats.nodes - before.nodes,
            profiles = self.stats.profiles - before.profiles,
            guards = self.stats.guards - before.guards,
            "built JIT-time snapshot"
        );
        root
    }

    /// Counters accumulated over every [`build`](Self::build) so far.
    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    fn build_node(
        &mut self,
        codegen: &dyn CodeGenSource,
        runtime: Option<&dyn RuntimeSource>,
        is_inlinee: bool,
    ) -> SnapshotId {
        ensure_sufficient_stack(|| self.build_node_inner(codegen, runtime, is_inlinee))
    }

    fn build_node_inner(
        &mut self,
        codegen: &dyn CodeGenSource,
        runtime: Option<&dyn RuntimeSource>,
        is_inlinee: bool,
    ) -> SnapshotId {
        let id = self.arena.alloc_node();
        self.stats.nodes += 1;

        let mut flags = NodeFlags::empty();
        flags.set(
            NodeFlags::AGGRESSIVE_INLINING,
            codegen.is_aggressive_inlining_enabled(),
        );
        flags.set(NodeFlags::INLINED, codegen.is_inlined());

        let mut record = SnapshotRecord {
            function_info_addr: codegen.function_info_addr(),
            weak_func_ref: codegen.weak_func_ref(),
            inlinees_bv: codegen.inlinees_bv(),
            local_function_id: codegen.local_function_id(),
            flags,
            ..SnapshotRecord::default()
        };

        if let Some(body) = codegen.body() {
            self.fill_body(&mut record, codegen, body, runtime, is_inlinee);
        }

        tracing::trace!(
            node = id.raw(),
            function_info = record.function_info_addr.raw(),
            has_body = record.body.is_some(),
            is_inlinee,
            "captured function"
        );
        self.arena.set_node(id, record);
        id
    }

    fn fill_body(
        &mut self,
        record: &mut SnapshotRecord,
        codegen: &dyn CodeGenSource,
        body: &dyn FunctionBodySource,
        runtime: Option<&dyn RuntimeSource>,
        is_inlinee: bool,
    ) {
        debug_assert!(
            !is_inlinee || runtime.is_some(),
            "inlinee snapshot requested without runtime data"
        );
        self.stats.bodies += 1;

        // Only an inlinee reads its children's runtime data from its own
        // runtime context; everything else reads the body's tables.
        let inlinee_runtime = if is_inlinee { runtime } else { None };

        let mut body_record = body.static_data();
        body_record.profile = None;
        if body.has_dynamic_profile_info() {
            let mut profile = ProfileRecord::default();
            self.materializer.fill_profile(body, &mut profile);
            body_record.profile = Some(self.arena.push_profile(profile));
            self.stats.profiles += 1;

            if is_inlinee {
                let entry_point = body.default_entry_point();
                record.calls_count_addr = entry_point.calls_count_addr();
                if let Some(guards) = entry_point.shared_property_guards() {
                    record.shared_guards = self.drain_guards(guards);
                }
            }
        }
        let call_sites = body_record.profiled_call_site_count;
        let caches = body_record.inline_cache_count;
        record.body = Some(self.arena.push_body(body_record));

        if call_sites > 0 {
            let mut slots: SmallVec<[Option<SnapshotId>; 8]> =
                SmallVec::with_capacity(usize::from(call_sites));
            for i in 0..call_sites {
                let call_site = ProfileId::new(i);
                let child = codegen.inlinee(call_site).map(|child| {
                    let child_runtime = match inlinee_runtime {
                        Some(runtime) => runtime.inlinee(call_site),
                        None => body.inlinee_runtime_data(call_site),
                    };
                    self.build_node(child, child_runtime, false)
                });
                slots.push(child);
            }
            record.inlinees = self.arena.push_slots(&slots);
        }

        let mut runtime_record = RuntimeRecord::default();
        if let Some(runtime) = inlinee_runtime {
            if runtime.has_cloned_inline_caches() {
                let addrs: SmallVec<[RemoteAddr; 16]> = (0..caches)
                    .map(|j| runtime.cloned_inline_cache(InlineCacheIndex::new(j)))
                    .collect();
                runtime_record.cloned_inline_caches = self.arena.push_addrs(&addrs);
            }
        }
        record.runtime = Some(self.arena.push_runtime(runtime_record));

        if caches > 0 {
            if let Some(sources) = codegen.type_spec_sources() {
                record.type_specs = self.materialize_type_specs(sources, caches as usize);
            }

            let mut slots: SmallVec<[Option<SnapshotId>; 8]> =
                SmallVec::with_capacity(caches as usize);
            for i in 0..caches {
                let cache = InlineCacheIndex::new(i);
                let child = codegen.field_inlinee(cache).map(|child| {
                    let child_runtime = match inlinee_runtime {
                        Some(runtime) => runtime.field_inlinee(cache),
                        None => body.field_inlinee_runtime_data(cache),
                    };
                    self.build_node(child, child_runtime, false)
                });
                slots.push(child);
            }
            record.field_inlinees = self.arena.push_slots(&slots);
        }

        let global_sources = codegen.global_type_spec_sources();
        if !global_sources.is_empty() {
            record.global_type_specs =
                self.materialize_type_specs(global_sources, global_sources.len());
        }

        if let Some(next) = codegen.next() {
            let next_runtime = match inlinee_runtime {
                Some(runtime) => runtime.next(),
                None => body.polymorphic_runtime_data(),
            };
            record.next = Some(self.build_node(next, next_runtime, false));
        }
    }

    /// Copy the guard ids out of a set that may be changing underneath us.
    ///
    /// One pass, in iteration order. The count is only used to size the
    /// buffer; if the pass yields a different number of ids, the ids seen
    /// are what gets recorded.
    fn drain_guards(&mut self, guards: &dyn SharedGuardSet) -> GuardRange {
        let expected = guards.count_hint();
        let mut drained: SmallVec<[PropertyId; 8]> = SmallVec::with_capacity(expected);
        guards.for_each_guard(&mut |id| drained.push(id));
        if drained.len() != expected {
            tracing::debug!(
                expected,
                drained = drained.len(),
                "shared guard set changed while draining"
            );
        }
        self.stats.guards += drained.len();
        self.arena.push_guards(&drained)
    }

    fn materialize_type_specs(
        &mut self,
        sources: &[Option<RemoteAddr>],
        count: usize,
    ) -> TypeSpecRange {
        assert!(
            sources.len() >= count,
            "type-spec source list has {} entries, expected at least {count}",
            sources.len()
        );
        let mut specs: Vec<Option<TypeSpecRecord>> = vec![None; count];
        self.materializer.fill_type_specs(&sources[..count], &mut specs);
        self.stats.type_specs += specs.iter().filter(|spec| spec.is_some()).count();
        self.arena.push_type_specs(specs)
    }
}

/// Build a snapshot into a fresh arena.
///
/// Convenience for callers that compile one unit per arena.
pub fn build_snapshot(
    codegen: &dyn CodeGenSource,
    runtime: Option<&dyn RuntimeSource>,
    is_inlinee: bool,
    materializer: &mut dyn Materializer,
) -> (SnapshotArena, SnapshotId, BuildStats) {
    let mut arena = SnapshotArena::new();
    let (root, stats) = {
        let mut builder = SnapshotBuilder::new(&mut arena, materializer);
        let root = builder.build(codegen, runtime, is_inlinee);
        (root, builder.stats())
    };
    (arena, root, stats)
}

#[cfg(test)]
mod tests;
