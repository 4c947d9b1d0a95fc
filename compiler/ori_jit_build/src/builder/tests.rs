#![expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use ori_jit_ir::{BodyFlags, SnapshotArena};

use crate::testing::{
    MockFunction, MockGuardSet, MockRuntime, RecordingMaterializer, BODY_ADDR_OFFSET,
};

use super::*;

// Helpers

fn build(root: &MockFunction) -> (SnapshotArena, SnapshotId, BuildStats) {
    build_snapshot(root, None, false, &mut RecordingMaterializer::default())
}

fn build_inlinee(
    root: &MockFunction,
    runtime: &MockRuntime,
) -> (SnapshotArena, SnapshotId, BuildStats) {
    build_snapshot(root, Some(runtime), true, &mut RecordingMaterializer::default())
}

fn chain_addrs(arena: &SnapshotArena, head: Option<SnapshotId>) -> Vec<u64> {
    let mut addrs = Vec::new();
    let mut cursor = head;
    while let Some(id) = cursor {
        let record = arena.node(id);
        addrs.push(record.function_info_addr.raw());
        cursor = record.next;
    }
    addrs
}

fn with_profile(mut function: MockFunction) -> MockFunction {
    function.body_mut().has_profile = true;
    function
}

fn guarded(function: MockFunction, guards: &Arc<MockGuardSet>) -> MockFunction {
    let mut function = with_profile(function);
    let entry_point = &mut function.body_mut().entry_point;
    entry_point.calls_count_addr = RemoteAddr::new(0xCA11);
    entry_point.guards = Some(Arc::clone(guards));
    function
}

// Scalar fields

#[test]
fn test_scalar_fields_copied() {
    let mut root = MockFunction::with_body(0x100, 0, 0);
    root.local_function_id = ori_jit_ir::LocalFunctionId::new(12);
    root.aggressive_inlining = true;
    root.inlinees_bv = RemoteAddr::new(0xB17);
    root.body_mut().record.flags = BodyFlags::HAS_TRY;

    let (arena, id, _) = build(&root);
    let record = arena.node(id);

    assert_eq!(record.function_info_addr, RemoteAddr::new(0x100));
    assert_eq!(record.weak_func_ref, RemoteAddr::new(0x108));
    assert_eq!(record.local_function_id.raw(), 12);
    assert_eq!(record.inlinees_bv, RemoteAddr::new(0xB17));
    assert_eq!(record.flags, NodeFlags::AGGRESSIVE_INLINING);

    let body = arena.body(record.body.unwrap());
    assert_eq!(body.addr, RemoteAddr::new(0x100 + BODY_ADDR_OFFSET));
    assert!(body.has_try());
    assert!(!body.is_generator());
}

// Leaves and bodyless nodes

#[test]
fn test_leaf_with_body_has_empty_runtime_record() {
    let root = MockFunction::with_body(0x100, 0, 0);
    let (arena, id, _) = build(&root);
    let record = arena.node(id);

    assert!(record.body.is_some());
    assert!(record.inlinees.is_empty());
    assert!(record.field_inlinees.is_empty());
    let runtime = arena.runtime(record.runtime.unwrap());
    assert!(runtime.cloned_inline_caches.is_empty());
}

#[test]
fn test_bodyless_node_is_bare() {
    // Without a body nothing past the scalar fields is read, not even `next`.
    let root = MockFunction::bodyless(0x100).with_next(MockFunction::with_body(0x200, 0, 0));
    let (arena, id, stats) = build(&root);
    let record = arena.node(id);

    assert_eq!(record.body, None);
    assert_eq!(record.runtime, None);
    assert_eq!(record.next, None);
    assert!(record.inlinees.is_empty());
    assert!(record.field_inlinees.is_empty());
    assert_eq!(stats.nodes, 1);
    assert_eq!(stats.bodies, 0);
}

// Slot lists

#[test]
fn test_slot_lengths_match_body_counts() {
    let root = MockFunction::with_body(0x100, 3, 2)
        .with_inlinee(1, MockFunction::with_body(0x200, 0, 0))
        .with_field_inlinee(0, MockFunction::with_body(0x300, 0, 0));
    let (arena, id, _) = build(&root);
    let record = arena.node(id);

    let inlinees = arena.slots(record.inlinees);
    assert_eq!(inlinees.len(), 3);
    assert_eq!(inlinees[0], None);
    assert!(inlinees[1].is_some());
    assert_eq!(inlinees[2], None);

    let fields = arena.slots(record.field_inlinees);
    assert_eq!(fields.len(), 2);
    assert_eq!(chain_addrs(&arena, fields[0]), vec![0x300]);
    assert_eq!(fields[1], None);
}

#[test]
fn test_polymorphic_chain_keeps_upstream_order() {
    let candidates = vec![
        MockFunction::with_body(0x300, 0, 0),
        MockFunction::with_body(0x200, 0, 0),
        MockFunction::with_body(0x400, 0, 0),
    ];
    let root = MockFunction::with_body(0x100, 1, 0).with_inlinee(0, MockFunction::chain(candidates));
    let (arena, id, stats) = build(&root);

    let head = arena.slots(arena.node(id).inlinees)[0];
    assert_eq!(chain_addrs(&arena, head), vec![0x300, 0x200, 0x400]);
    assert_eq!(stats.nodes, 4);
}

// Profile, call counter and guards

#[test]
fn test_root_with_profile_skips_entry_point() {
    let guards = Arc::new(MockGuardSet::new(&[7, 42]));
    let root = guarded(MockFunction::with_body(0x100, 0, 0), &guards);
    let mut materializer = RecordingMaterializer::default();
    let (arena, id, stats) = build_snapshot(&root, None, false, &mut materializer);
    let record = arena.node(id);

    let profile = arena.body(record.body.unwrap()).profile.unwrap();
    assert_eq!(
        arena.profile(profile).words,
        vec![0x100 + BODY_ADDR_OFFSET, 0, 0]
    );
    assert_eq!(materializer.profiles_filled, 1);
    assert_eq!(record.calls_count_addr, RemoteAddr::NULL);
    assert!(record.shared_guards.is_empty());
    assert_eq!(stats.guards, 0);
}

#[test]
fn test_inlinee_with_profile_drains_guards_in_order() {
    let guards = Arc::new(MockGuardSet::new(&[7, 42, 100]));
    let root = guarded(MockFunction::with_body(0x100, 0, 0), &guards);
    let (arena, id, stats) = build_inlinee(&root, &MockRuntime::default());
    let record = arena.node(id);

    assert_eq!(record.calls_count_addr, RemoteAddr::new(0xCA11));
    assert_eq!(
        arena.guards(record.shared_guards),
        &[PropertyId::new(7), PropertyId::new(42), PropertyId::new(100)]
    );
    assert_eq!(stats.guards, 3);
}

#[test]
fn test_inlinee_without_profile_skips_guards() {
    let guards = Arc::new(MockGuardSet::new(&[7]));
    let mut root = guarded(MockFunction::with_body(0x100, 0, 0), &guards);
    root.body_mut().has_profile = false;
    let (arena, id, stats) = build_inlinee(&root, &MockRuntime::default());
    let record = arena.node(id);

    assert_eq!(arena.body(record.body.unwrap()).profile, None);
    assert_eq!(record.calls_count_addr, RemoteAddr::NULL);
    assert!(record.shared_guards.is_empty());
    assert_eq!(stats.profiles, 0);
}

#[test]
fn test_inlinee_without_guard_set() {
    let root = with_profile(MockFunction::with_body(0x100, 0, 0));
    let (arena, id, _) = build_inlinee(&root, &MockRuntime::default());
    assert!(arena.node(id).shared_guards.is_empty());
}

#[test]
fn test_guard_drain_tolerates_concurrent_mutation() {
    // Ids 0..8 are never touched; 100..116 churn at the end of the set.
    let guards = Arc::new(MockGuardSet::new(&[0, 1, 2, 3, 4, 5, 6, 7]));
    let root = guarded(MockFunction::with_body(0x100, 0, 0), &guards);
    let runtime = MockRuntime::default();
    let stop = AtomicBool::new(false);

    let drains: Vec<(Vec<u32>, bool)> = std::thread::scope(|scope| {
        scope.spawn(|| {
            let mut round = 0u32;
            while !stop.load(Ordering::Relaxed) {
                let id = PropertyId::new(100 + round % 16);
                if round % 32 < 16 {
                    guards.insert(id);
                } else {
                    guards.remove(id);
                }
                round = round.wrapping_add(1);
            }
        });

        let drains = (0..200)
            .map(|_| {
                let (arena, id, _) = build_inlinee(&root, &runtime);
                let drained = arena.guards(arena.node(id).shared_guards);
                let raw = drained.iter().map(|guard| guard.raw()).collect();
                (raw, arena.validate(id).is_ok())
            })
            .collect();
        stop.store(true, Ordering::Relaxed);
        drains
    });

    for (drained, valid) in drains {
        assert!(valid);
        let stable: Vec<u32> = drained.iter().copied().filter(|raw| *raw < 100).collect();
        assert_eq!(stable, (0..8).collect::<Vec<u32>>());
        assert!(drained.iter().all(|raw| *raw < 8 || (100..116).contains(raw)));
    }
}

// Runtime data

#[test]
fn test_cloned_caches_recorded_only_for_inlinee() {
    let root = MockFunction::with_body(0x100, 0, 2);
    let runtime =
        MockRuntime::with_cloned_caches(vec![RemoteAddr::new(0xC0), RemoteAddr::new(0xC1)]);

    let (arena, id, _) = build_inlinee(&root, &runtime);
    let caches = arena.runtime(arena.node(id).runtime.unwrap()).cloned_inline_caches;
    assert_eq!(
        arena.addrs(caches),
        &[RemoteAddr::new(0xC0), RemoteAddr::new(0xC1)]
    );

    let (arena, id, _) =
        build_snapshot(&root, Some(&runtime), false, &mut RecordingMaterializer::default());
    let caches = arena.runtime(arena.node(id).runtime.unwrap()).cloned_inline_caches;
    assert!(caches.is_empty());
}

#[test]
fn test_children_read_runtime_from_body_tables() {
    // root (inlinee) -> child -> grandchild
    let grandchild = MockFunction::with_body(0x300, 0, 0);
    let child = MockFunction::with_body(0x200, 1, 1).with_inlinee(0, grandchild);
    let root = MockFunction::with_body(0x100, 1, 0).with_inlinee(0, child);

    let child_runtime = MockRuntime::with_cloned_caches(vec![RemoteAddr::new(0xC0)])
        .with_inlinee(0, MockRuntime::default());
    let root_runtime = MockRuntime::default().with_inlinee(0, child_runtime);

    let (arena, id, _) = build_inlinee(&root, &root_runtime);

    // The root is an inlinee: its child's runtime comes from its own context.
    assert_eq!(root_runtime.child_reads(), 1);
    assert_eq!(root.body.as_ref().unwrap().table_reads(), 0);

    // The child is built as a non-inlinee: the grandchild's runtime comes
    // from the child body's table, and the child's runtime context is unused.
    let child = root.inlinees[0].as_ref().unwrap();
    assert_eq!(child.body.as_ref().unwrap().table_reads(), 1);
    let child_runtime = root_runtime.inlinees[0].as_ref().unwrap();
    assert_eq!(child_runtime.child_reads(), 0);

    let child_id = arena.slots(arena.node(id).inlinees)[0].unwrap();
    let child_record = arena.node(child_id);
    let caches = arena.runtime(child_record.runtime.unwrap()).cloned_inline_caches;
    assert!(caches.is_empty());
}

#[test]
fn test_successor_runtime_source() {
    let root = MockFunction::with_body(0x100, 0, 0).with_next(MockFunction::with_body(0x200, 0, 0));

    let runtime = MockRuntime::default().with_next(MockRuntime::default());
    build_inlinee(&root, &runtime);
    assert_eq!(runtime.child_reads(), 1);
    assert_eq!(root.body.as_ref().unwrap().table_reads(), 0);

    build(&root);
    assert_eq!(root.body.as_ref().unwrap().table_reads(), 1);
}

// Type specialization

#[test]
fn test_type_specs_sized_to_inline_caches() {
    let mut root = MockFunction::with_body(0x100, 0, 3);
    root.type_spec_sources = Some(vec![
        Some(RemoteAddr::new(0xA)),
        None,
        Some(RemoteAddr::new(0xC)),
        Some(RemoteAddr::new(0xD)),
    ]);
    root.global_type_spec_sources = vec![Some(RemoteAddr::new(0xF))];

    let mut materializer = RecordingMaterializer::default();
    let (arena, id, stats) = build_snapshot(&root, None, false, &mut materializer);
    let record = arena.node(id);

    let specs: Vec<Option<Vec<u64>>> = arena
        .type_specs(record.type_specs)
        .iter()
        .map(|spec| spec.as_ref().map(|spec| spec.words.clone()))
        .collect();
    assert_eq!(specs, vec![Some(vec![0xA]), None, Some(vec![0xC])]);

    let globals = arena.type_specs(record.global_type_specs);
    assert_eq!(globals.len(), 1);
    assert_eq!(materializer.type_spec_batches, vec![3, 1]);
    assert_eq!(stats.type_specs, 3);
}

#[test]
fn test_type_specs_absent_without_sources() {
    let root = MockFunction::with_body(0x100, 0, 2);
    let mut materializer = RecordingMaterializer::default();
    let (arena, id, _) = build_snapshot(&root, None, false, &mut materializer);
    let record = arena.node(id);

    assert!(record.type_specs.is_empty());
    assert!(record.global_type_specs.is_empty());
    assert!(materializer.type_spec_batches.is_empty());
}

#[test]
#[should_panic(expected = "type-spec source list has 1 entries, expected at least 2")]
fn test_short_type_spec_sources_panic() {
    let mut root = MockFunction::with_body(0x100, 0, 2);
    root.type_spec_sources = Some(vec![None]);
    build(&root);
}

// Depth and statistics

#[test]
fn test_deep_chain_on_small_stack() {
    const DEPTH: u64 = 2_000;
    let candidates = (0..DEPTH)
        .map(|i| MockFunction::with_body(0x1000 + i * 0x10, 0, 0))
        .collect();
    let root = MockFunction::chain(candidates);

    let length = std::thread::scope(|scope| {
        std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn_scoped(scope, || {
                let (arena, id, _) = build(&root);
                chain_addrs(&arena, Some(id)).len()
            })
            .unwrap()
            .join()
            .unwrap()
    });
    assert_eq!(length, DEPTH as usize);
}

#[test]
fn test_stats_accumulate_across_builds() {
    let first = with_profile(MockFunction::with_body(0x100, 1, 0))
        .with_inlinee(0, MockFunction::bodyless(0x200));
    let second = MockFunction::with_body(0x300, 0, 0);

    let mut arena = SnapshotArena::new();
    let mut materializer = RecordingMaterializer::default();
    let mut builder = SnapshotBuilder::new(&mut arena, &mut materializer);
    let a = builder.build(&first, None, false);
    let b = builder.build(&second, None, false);
    let stats = builder.stats();

    assert_eq!(
        stats,
        BuildStats {
            nodes: 3,
            bodies: 2,
            profiles: 1,
            guards: 0,
            type_specs: 0,
        }
    );
    assert_eq!(arena.len(), 3);
    assert_eq!(arena.validate(a), Ok(2));
    assert_eq!(arena.validate(b), Ok(1));
}

// Property tests

mod proptest_shapes {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    /// Shape of a generated code-gen tree.
    #[derive(Clone, Debug)]
    struct Shape {
        has_body: bool,
        profile: bool,
        inlinees: Vec<Option<Shape>>,
        fields: Vec<Option<Shape>>,
        next: Option<Box<Shape>>,
    }

    fn arb_shape() -> impl Strategy<Value = Shape> {
        let leaf = (any::<bool>(), any::<bool>()).prop_map(|(has_body, profile)| Shape {
            has_body,
            profile,
            inlinees: Vec::new(),
            fields: Vec::new(),
            next: None,
        });
        leaf.prop_recursive(4, 48, 4, |inner| {
            (
                any::<bool>(),
                prop::collection::vec(prop::option::of(inner.clone()), 0..4),
                prop::collection::vec(prop::option::of(inner.clone()), 0..3),
                prop::option::of(inner),
            )
                .prop_map(|(profile, inlinees, fields, next)| Shape {
                    has_body: true,
                    profile,
                    inlinees,
                    fields,
                    next: next.map(Box::new),
                })
        })
    }

    fn to_mock(shape: &Shape, counter: &mut u64) -> MockFunction {
        *counter += 1;
        let identity = *counter * 0x100;
        if !shape.has_body {
            return MockFunction::bodyless(identity);
        }
        let call_sites = u16::try_from(shape.inlinees.len()).unwrap();
        let caches = u32::try_from(shape.fields.len()).unwrap();
        let mut function = MockFunction::with_body(identity, call_sites, caches);
        function.body_mut().has_profile = shape.profile;
        for (i, child) in shape.inlinees.iter().enumerate() {
            function.inlinees[i] = child.as_ref().map(|child| to_mock(child, counter));
        }
        for (i, child) in shape.fields.iter().enumerate() {
            function.field_inlinees[i] = child.as_ref().map(|child| to_mock(child, counter));
        }
        function.next = shape.next.as_ref().map(|next| Box::new(to_mock(next, counter)));
        function
    }

    fn count_nodes(shape: &Shape) -> usize {
        if !shape.has_body {
            return 1;
        }
        let children = shape
            .inlinees
            .iter()
            .chain(&shape.fields)
            .flatten()
            .map(count_nodes)
            .sum::<usize>();
        1 + children + shape.next.as_deref().map_or(0, count_nodes)
    }

    fn assert_mirrors(arena: &SnapshotArena, id: SnapshotId, shape: &Shape) {
        let record = arena.node(id);
        assert_eq!(record.body.is_some(), shape.has_body);
        if !shape.has_body {
            assert!(record.inlinees.is_empty() && record.field_inlinees.is_empty());
            return;
        }
        let body = arena.body(record.body.unwrap());
        assert_eq!(body.profile.is_some(), shape.profile);
        assert!(record.shared_guards.is_empty());

        let pairs = [
            (arena.slots(record.inlinees), &shape.inlinees),
            (arena.slots(record.field_inlinees), &shape.fields),
        ];
        for (slots, expected) in pairs {
            assert_eq!(slots.len(), expected.len());
            for (slot, child) in slots.iter().zip(expected) {
                assert_eq!(slot.is_some(), child.is_some());
                if let (Some(slot), Some(child)) = (slot, child) {
                    assert_mirrors(arena, *slot, child);
                }
            }
        }
        assert_eq!(record.next.is_some(), shape.next.is_some());
        if let (Some(next), Some(shape)) = (record.next, shape.next.as_deref()) {
            assert_mirrors(arena, next, shape);
        }
    }

    proptest! {
        #[test]
        fn built_tree_mirrors_source(shape in arb_shape()) {
            let root = to_mock(&shape, &mut 0);
            let (arena, id, stats) = build(&root);

            let expected = count_nodes(&shape);
            prop_assert_eq!(stats.nodes, expected);
            prop_assert_eq!(arena.validate(id), Ok(expected));
            assert_mirrors(&arena, id, &shape);
        }
    }
}
