//! In-memory test doubles for the live-runtime source traits.
//!
//! Compiled for this crate's tests and, behind the `testing` feature, for
//! downstream crates that need real snapshot trees in their own tests.
//!
//! ```text
//! let root = MockFunction::with_body(0x100, 2, 0)
//!     .with_inlinee(0, MockFunction::with_body(0x200, 0, 0))
//!     .with_inlinee(1, MockFunction::chain(vec![a, b]));
//! let (arena, root_id, _) = build_snapshot(&root, None, false, &mut RecordingMaterializer::default());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use ori_jit_ir::{
    BodyFlags, BodyRecord, FunctionNumber, InlineCacheIndex, LocalFunctionId, ProfileId,
    ProfileRecord, PropertyId, RemoteAddr, SourceContextId, TypeSpecRecord,
};

use crate::source::{
    CodeGenSource, EntryPointSource, FunctionBodySource, Materializer, RuntimeSource,
    SharedGuardSet,
};

/// Offset between a mock function's identity address and its body address,
/// so identity and body lookups cannot accidentally agree.
pub const BODY_ADDR_OFFSET: u64 = 0x10_0000;

/// Code-gen context for one mock function.
#[derive(Default)]
pub struct MockFunction {
    pub function_info_addr: RemoteAddr,
    pub weak_func_ref: RemoteAddr,
    pub local_function_id: LocalFunctionId,
    pub aggressive_inlining: bool,
    pub inlined: bool,
    pub inlinees_bv: RemoteAddr,
    pub body: Option<MockBody>,
    pub inlinees: Vec<Option<MockFunction>>,
    pub field_inlinees: Vec<Option<MockFunction>>,
    pub type_spec_sources: Option<Vec<Option<RemoteAddr>>>,
    pub global_type_spec_sources: Vec<Option<RemoteAddr>>,
    pub next: Option<Box<MockFunction>>,
}

impl MockFunction {
    /// A function without a compiled body.
    pub fn bodyless(identity: u64) -> Self {
        Self {
            function_info_addr: RemoteAddr::new(identity),
            weak_func_ref: RemoteAddr::new(identity + 8),
            ..Self::default()
        }
    }

    /// A function with a body of the given shape and no children.
    ///
    /// The body address is `identity + BODY_ADDR_OFFSET`.
    pub fn with_body(identity: u64, call_sites: u16, caches: u32) -> Self {
        Self {
            body: Some(MockBody::new(identity + BODY_ADDR_OFFSET, call_sites, caches)),
            inlinees: (0..call_sites).map(|_| None).collect(),
            field_inlinees: (0..caches).map(|_| None).collect(),
            ..Self::bodyless(identity)
        }
    }

    /// Link `candidates` into one polymorphic chain, preserving order.
    ///
    /// Panics if `candidates` is empty.
    pub fn chain(candidates: Vec<MockFunction>) -> Self {
        let mut rest = candidates.into_iter().rev();
        let Some(mut head) = rest.next() else {
            panic!("a polymorphic chain needs at least one candidate");
        };
        for mut candidate in rest {
            candidate.next = Some(Box::new(head));
            head = candidate;
        }
        head
    }

    #[must_use]
    pub fn with_inlinee(mut self, call_site: usize, child: MockFunction) -> Self {
        self.inlinees[call_site] = Some(child);
        self
    }

    #[must_use]
    pub fn with_field_inlinee(mut self, cache: usize, child: MockFunction) -> Self {
        self.field_inlinees[cache] = Some(child);
        self
    }

    #[must_use]
    pub fn with_next(mut self, next: MockFunction) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    /// Mutable access to the body; panics for bodyless functions.
    pub fn body_mut(&mut self) -> &mut MockBody {
        match self.body.as_mut() {
            Some(body) => body,
            None => panic!("mock function has no body"),
        }
    }
}

impl CodeGenSource for MockFunction {
    fn body(&self) -> Option<&dyn FunctionBodySource> {
        self.body.as_ref().map(|body| body as &dyn FunctionBodySource)
    }

    fn function_info_addr(&self) -> RemoteAddr {
        self.function_info_addr
    }

    fn weak_func_ref(&self) -> RemoteAddr {
        self.weak_func_ref
    }

    fn local_function_id(&self) -> LocalFunctionId {
        self.local_function_id
    }

    fn is_aggressive_inlining_enabled(&self) -> bool {
        self.aggressive_inlining
    }

    fn is_inlined(&self) -> bool {
        self.inlined
    }

    fn inlinees_bv(&self) -> RemoteAddr {
        self.inlinees_bv
    }

    fn inlinee(&self, call_site: ProfileId) -> Option<&dyn CodeGenSource> {
        self.inlinees
            .get(call_site.index())
            .and_then(Option::as_ref)
            .map(|child| child as &dyn CodeGenSource)
    }

    fn field_inlinee(&self, cache: InlineCacheIndex) -> Option<&dyn CodeGenSource> {
        self.field_inlinees
            .get(cache.index())
            .and_then(Option::as_ref)
            .map(|child| child as &dyn CodeGenSource)
    }

    fn type_spec_sources(&self) -> Option<&[Option<RemoteAddr>]> {
        self.type_spec_sources.as_deref()
    }

    fn global_type_spec_sources(&self) -> &[Option<RemoteAddr>] {
        &self.global_type_spec_sources
    }

    fn next(&self) -> Option<&dyn CodeGenSource> {
        self.next.as_deref().map(|next| next as &dyn CodeGenSource)
    }
}

/// A mock function body.
///
/// Reads of the body's own runtime tables are counted so tests can tell
/// which runtime source the builder consulted.
pub struct MockBody {
    pub record: BodyRecord,
    pub has_profile: bool,
    pub entry_point: MockEntryPoint,
    pub inlinee_runtime: Vec<Option<MockRuntime>>,
    pub field_inlinee_runtime: Vec<Option<MockRuntime>>,
    pub polymorphic_runtime: Option<Box<MockRuntime>>,
    table_reads: AtomicUsize,
}

impl MockBody {
    pub fn new(addr: u64, call_sites: u16, caches: u32) -> Self {
        Self {
            record: BodyRecord {
                addr: RemoteAddr::new(addr),
                source_context_id: SourceContextId::new(1),
                function_number: FunctionNumber::new(1),
                profiled_call_site_count: call_sites,
                inline_cache_count: caches,
                flags: BodyFlags::empty(),
                display_name: format!("fn_{addr:x}"),
                profile: None,
            },
            has_profile: false,
            entry_point: MockEntryPoint::default(),
            inlinee_runtime: Vec::new(),
            field_inlinee_runtime: Vec::new(),
            polymorphic_runtime: None,
            table_reads: AtomicUsize::new(0),
        }
    }

    /// How many times the builder read this body's runtime tables.
    pub fn table_reads(&self) -> usize {
        self.table_reads.load(Ordering::Relaxed)
    }
}

impl FunctionBodySource for MockBody {
    fn static_data(&self) -> BodyRecord {
        self.record.clone()
    }

    fn has_dynamic_profile_info(&self) -> bool {
        self.has_profile
    }

    fn default_entry_point(&self) -> &dyn EntryPointSource {
        &self.entry_point
    }

    fn inlinee_runtime_data(&self, call_site: ProfileId) -> Option<&dyn RuntimeSource> {
        self.table_reads.fetch_add(1, Ordering::Relaxed);
        self.inlinee_runtime
            .get(call_site.index())
            .and_then(Option::as_ref)
            .map(|runtime| runtime as &dyn RuntimeSource)
    }

    fn field_inlinee_runtime_data(&self, cache: InlineCacheIndex) -> Option<&dyn RuntimeSource> {
        self.table_reads.fetch_add(1, Ordering::Relaxed);
        self.field_inlinee_runtime
            .get(cache.index())
            .and_then(Option::as_ref)
            .map(|runtime| runtime as &dyn RuntimeSource)
    }

    fn polymorphic_runtime_data(&self) -> Option<&dyn RuntimeSource> {
        self.table_reads.fetch_add(1, Ordering::Relaxed);
        self.polymorphic_runtime
            .as_deref()
            .map(|runtime| runtime as &dyn RuntimeSource)
    }
}

/// A mock entry point.
#[derive(Default)]
pub struct MockEntryPoint {
    pub calls_count_addr: RemoteAddr,
    pub guards: Option<Arc<MockGuardSet>>,
}

impl EntryPointSource for MockEntryPoint {
    fn calls_count_addr(&self) -> RemoteAddr {
        self.calls_count_addr
    }

    fn shared_property_guards(&self) -> Option<&dyn SharedGuardSet> {
        self.guards
            .as_deref()
            .map(|guards| guards as &dyn SharedGuardSet)
    }
}

/// A guard set that other threads may mutate during a drain.
///
/// Iteration takes the lock once per element, so concurrent inserts and
/// removals interleave with a drain the way they do in the real runtime.
#[derive(Default)]
pub struct MockGuardSet {
    ids: RwLock<Vec<PropertyId>>,
}

impl MockGuardSet {
    pub fn new(ids: &[u32]) -> Self {
        Self {
            ids: RwLock::new(ids.iter().copied().map(PropertyId::new).collect()),
        }
    }

    pub fn insert(&self, id: PropertyId) {
        let mut ids = self.ids.write();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    pub fn remove(&self, id: PropertyId) {
        self.ids.write().retain(|existing| *existing != id);
    }
}

impl SharedGuardSet for MockGuardSet {
    fn count_hint(&self) -> usize {
        self.ids.read().len()
    }

    fn for_each_guard(&self, visit: &mut dyn FnMut(PropertyId)) {
        let mut index = 0;
        loop {
            let Some(id) = self.ids.read().get(index).copied() else {
                break;
            };
            visit(id);
            index += 1;
        }
    }
}

/// Runtime-profiling context for a mock inlinee target.
///
/// Child lookups are counted like [`MockBody`] table reads.
#[derive(Default)]
pub struct MockRuntime {
    pub inlinees: Vec<Option<MockRuntime>>,
    pub field_inlinees: Vec<Option<MockRuntime>>,
    pub next: Option<Box<MockRuntime>>,
    /// Cloned caches; empty means the runtime has none.
    pub cloned_inline_caches: Vec<RemoteAddr>,
    child_reads: AtomicUsize,
}

impl MockRuntime {
    /// Runtime context holding the given cloned inline caches.
    pub fn with_cloned_caches(caches: Vec<RemoteAddr>) -> Self {
        Self {
            cloned_inline_caches: caches,
            ..Self::default()
        }
    }

    /// Attach `child` at `call_site`, padding earlier call sites with `None`.
    #[must_use]
    pub fn with_inlinee(mut self, call_site: usize, child: MockRuntime) -> Self {
        if self.inlinees.len() <= call_site {
            self.inlinees.resize_with(call_site + 1, || None);
        }
        self.inlinees[call_site] = Some(child);
        self
    }

    /// Attach `child` at inline cache `cache`, padding earlier caches with `None`.
    #[must_use]
    pub fn with_field_inlinee(mut self, cache: usize, child: MockRuntime) -> Self {
        if self.field_inlinees.len() <= cache {
            self.field_inlinees.resize_with(cache + 1, || None);
        }
        self.field_inlinees[cache] = Some(child);
        self
    }

    #[must_use]
    pub fn with_next(mut self, next: MockRuntime) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    /// How many times the builder asked this runtime for a child.
    pub fn child_reads(&self) -> usize {
        self.child_reads.load(Ordering::Relaxed)
    }
}

impl RuntimeSource for MockRuntime {
    fn inlinee(&self, call_site: ProfileId) -> Option<&dyn RuntimeSource> {
        self.child_reads.fetch_add(1, Ordering::Relaxed);
        self.inlinees
            .get(call_site.index())
            .and_then(Option::as_ref)
            .map(|runtime| runtime as &dyn RuntimeSource)
    }

    fn field_inlinee(&self, cache: InlineCacheIndex) -> Option<&dyn RuntimeSource> {
        self.child_reads.fetch_add(1, Ordering::Relaxed);
        self.field_inlinees
            .get(cache.index())
            .and_then(Option::as_ref)
            .map(|runtime| runtime as &dyn RuntimeSource)
    }

    fn next(&self) -> Option<&dyn RuntimeSource> {
        self.child_reads.fetch_add(1, Ordering::Relaxed);
        self.next
            .as_deref()
            .map(|runtime| runtime as &dyn RuntimeSource)
    }

    fn has_cloned_inline_caches(&self) -> bool {
        !self.cloned_inline_caches.is_empty()
    }

    fn cloned_inline_cache(&self, cache: InlineCacheIndex) -> RemoteAddr {
        self.cloned_inline_caches
            .get(cache.index())
            .copied()
            .unwrap_or(RemoteAddr::NULL)
    }
}

/// Materializer that encodes its inputs into the output records.
///
/// Profiles become `[body addr, call sites, inline caches]`; a present
/// type-spec source becomes `[source addr]`.
#[derive(Default)]
pub struct RecordingMaterializer {
    pub profiles_filled: usize,
    /// Length of every type-spec batch, in call order.
    pub type_spec_batches: Vec<usize>,
}

impl Materializer for RecordingMaterializer {
    fn fill_profile(&mut self, body: &dyn FunctionBodySource, dest: &mut ProfileRecord) {
        let data = body.static_data();
        dest.words = vec![
            data.addr.raw(),
            u64::from(data.profiled_call_site_count),
            u64::from(data.inline_cache_count),
        ];
        self.profiles_filled += 1;
    }

    fn fill_type_specs(
        &mut self,
        sources: &[Option<RemoteAddr>],
        dest: &mut [Option<TypeSpecRecord>],
    ) {
        for (source, slot) in sources.iter().zip(dest.iter_mut()) {
            *slot = source.map(|addr| TypeSpecRecord {
                words: vec![addr.raw()],
            });
        }
        self.type_spec_batches.push(sources.len());
    }
}
