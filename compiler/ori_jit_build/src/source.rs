//! Read-only views of the live runtime that a snapshot is built from.
//!
//! The owning runtime implements these traits over its own function bodies,
//! code-gen decision tree and profiling tables. The builder only ever reads
//! through them; it never holds on to a returned reference past the build.
//!
//! Two trees run in parallel:
//!
//! - [`CodeGenSource`] is the inlining decision tree computed at code-gen
//!   time: one node per candidate, with per-call-site and per-inline-cache
//!   children and a `next` link for polymorphic alternatives.
//! - [`RuntimeSource`] is the runtime-profiling tree attached to inlinee
//!   targets: the same shape, plus cloned inline caches.

use ori_jit_ir::{
    BodyRecord, InlineCacheIndex, LocalFunctionId, ProfileId, ProfileRecord, PropertyId,
    RemoteAddr, TypeSpecRecord,
};

/// Code-gen-time context of one function instance.
pub trait CodeGenSource {
    /// The compiled body, or `None` when the function has none.
    fn body(&self) -> Option<&dyn FunctionBodySource>;

    /// Identity address of the function info.
    fn function_info_addr(&self) -> RemoteAddr;

    /// Address of the weak reference to the function object.
    fn weak_func_ref(&self) -> RemoteAddr;

    fn local_function_id(&self) -> LocalFunctionId;

    fn is_aggressive_inlining_enabled(&self) -> bool;

    fn is_inlined(&self) -> bool;

    /// Bitvector marking the call sites considered for inlining.
    fn inlinees_bv(&self) -> RemoteAddr;

    /// Inlining candidate chosen for a profiled call site.
    fn inlinee(&self, call_site: ProfileId) -> Option<&dyn CodeGenSource>;

    /// Inlining candidate chosen for a property-access inline cache.
    fn field_inlinee(&self, cache: InlineCacheIndex) -> Option<&dyn CodeGenSource>;

    /// Per-inline-cache type-specialization sources, if this function has any.
    ///
    /// When present the list covers at least every inline cache of the body.
    fn type_spec_sources(&self) -> Option<&[Option<RemoteAddr>]>;

    /// Call-site independent type-specialization sources.
    fn global_type_spec_sources(&self) -> &[Option<RemoteAddr>];

    /// Next candidate observed at the same call site or slot.
    fn next(&self) -> Option<&dyn CodeGenSource>;
}

/// A live function body.
pub trait FunctionBodySource {
    /// Static per-body data, copied into the snapshot as-is.
    fn static_data(&self) -> BodyRecord;

    fn has_dynamic_profile_info(&self) -> bool;

    fn default_entry_point(&self) -> &dyn EntryPointSource;

    /// Runtime data the body itself keeps for an inlinee at `call_site`.
    fn inlinee_runtime_data(&self, call_site: ProfileId) -> Option<&dyn RuntimeSource>;

    /// Runtime data the body itself keeps for a field inlinee at `cache`.
    fn field_inlinee_runtime_data(&self, cache: InlineCacheIndex) -> Option<&dyn RuntimeSource>;

    /// Runtime data for the body's polymorphic successor.
    fn polymorphic_runtime_data(&self) -> Option<&dyn RuntimeSource>;
}

/// The default entry point of a function body.
pub trait EntryPointSource {
    /// Address of the entry point's call counter.
    fn calls_count_addr(&self) -> RemoteAddr;

    fn shared_property_guards(&self) -> Option<&dyn SharedGuardSet>;
}

/// A set of shared property guards that the owning thread may keep mutating
/// while it is being read.
pub trait SharedGuardSet {
    /// Number of guards when asked. Only a hint: the set may change before or
    /// during [`for_each_guard`](Self::for_each_guard).
    fn count_hint(&self) -> usize;

    /// Visit every guard once, in the set's iteration order.
    fn for_each_guard(&self, visit: &mut dyn FnMut(PropertyId));
}

/// Runtime-profiling context of an inlinee target.
pub trait RuntimeSource {
    fn inlinee(&self, call_site: ProfileId) -> Option<&dyn RuntimeSource>;

    fn field_inlinee(&self, cache: InlineCacheIndex) -> Option<&dyn RuntimeSource>;

    fn next(&self) -> Option<&dyn RuntimeSource>;

    fn has_cloned_inline_caches(&self) -> bool;

    /// Address of the cloned inline cache at `cache`.
    fn cloned_inline_cache(&self, cache: InlineCacheIndex) -> RemoteAddr;
}

/// Lays out profile and type-specialization data for the snapshot.
///
/// Both formats are owned by the compiler's consumers; the builder only
/// decides when each is needed and where the result is stored.
pub trait Materializer {
    /// Fill the profile slot for a body that has dynamic profile info.
    fn fill_profile(&mut self, body: &dyn FunctionBodySource, dest: &mut ProfileRecord);

    /// Fill `dest[i]` from `sources[i]`. Both slices have the same length and
    /// every entry of `dest` starts out `None`.
    fn fill_type_specs(
        &mut self,
        sources: &[Option<RemoteAddr>],
        dest: &mut [Option<TypeSpecRecord>],
    );
}
