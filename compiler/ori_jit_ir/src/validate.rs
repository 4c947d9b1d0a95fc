//! Shape validation for snapshots that crossed a process boundary.
//!
//! A snapshot built in-process is correct by construction and its accessors
//! treat any shape disagreement as a fatal bug. A snapshot that arrives from
//! elsewhere has to be checked first: [`SnapshotArena::validate`] walks the
//! tree reachable from a root and reports the first violation as a typed
//! [`ShapeError`] instead of letting an accessor panic later.

use crate::arena::ListLens;
use crate::ids::SnapshotId;
use crate::record::SnapshotRecord;
use crate::SnapshotArena;

/// A snapshot whose shape disagrees with the record contract.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    /// A node id points past the end of the node list.
    #[error("snapshot node {node:?} is out of bounds (arena holds {len} nodes)")]
    DanglingNode { node: SnapshotId, len: usize },

    /// A side-record id points past the end of its list.
    #[error("node {node:?} refers to missing {what} record {index}")]
    DanglingRecord {
        node: SnapshotId,
        what: &'static str,
        index: u32,
    },

    /// A list range reaches past the end of its flat list.
    #[error("node {node:?}: {what} range {start}..{end} exceeds list length {len}")]
    RangeOutOfBounds {
        node: SnapshotId,
        what: &'static str,
        start: u32,
        end: u64,
        len: u64,
    },

    /// A per-site list disagrees with the count recorded in the body.
    #[error("node {node:?}: {what} list has {actual} entries, body records {expected}")]
    CountMismatch {
        node: SnapshotId,
        what: &'static str,
        expected: u32,
        actual: u32,
    },

    /// A node with a body has no runtime record.
    #[error("node {node:?} has a body but no runtime record")]
    MissingRuntime { node: SnapshotId },

    /// A node without a body carries data that only bodies can have.
    #[error("node {node:?} has no body but carries {what}")]
    BodylessData {
        node: SnapshotId,
        what: &'static str,
    },

    /// Shared guards on a node whose body has no profile data.
    #[error("node {node:?} carries shared property guards without profile data")]
    GuardsWithoutProfile { node: SnapshotId },

    /// A node is reachable along more than one edge (shared subtree or cycle).
    #[error("node {node:?} is reachable more than once")]
    SharedNode { node: SnapshotId },
}

impl SnapshotArena {
    /// Check every invariant of the tree rooted at `root`.
    ///
    /// Returns the number of reachable nodes on success.
    pub fn validate(&self, root: SnapshotId) -> Result<usize, ShapeError> {
        let nodes = self.nodes();
        let lens = self.list_lens();
        let mut seen = vec![false; nodes.len()];
        let mut pending = vec![root];
        let mut reachable = 0;

        while let Some(id) = pending.pop() {
            let Some(record) = nodes.get(id.index()) else {
                return Err(ShapeError::DanglingNode {
                    node: id,
                    len: nodes.len(),
                });
            };
            if std::mem::replace(&mut seen[id.index()], true) {
                return Err(ShapeError::SharedNode { node: id });
            }
            reachable += 1;

            self.validate_node(id, record, lens)?;

            // Push in reverse so the walk visits children in slot order.
            if let Some(next) = record.next {
                pending.push(next);
            }
            for slot in self.slots(record.field_inlinees).iter().rev().flatten() {
                pending.push(*slot);
            }
            for slot in self.slots(record.inlinees).iter().rev().flatten() {
                pending.push(*slot);
            }
        }

        Ok(reachable)
    }

    fn validate_node(
        &self,
        id: SnapshotId,
        record: &SnapshotRecord,
        lens: ListLens,
    ) -> Result<(), ShapeError> {
        check_range(id, "inlinee", record.inlinees.start, record.inlinees.end(), lens.slots)?;
        check_range(
            id,
            "field inlinee",
            record.field_inlinees.start,
            record.field_inlinees.end(),
            lens.slots,
        )?;
        check_range(
            id,
            "shared guard",
            record.shared_guards.start,
            record.shared_guards.end(),
            lens.guards,
        )?;
        check_range(
            id,
            "type-spec",
            record.type_specs.start,
            record.type_specs.end(),
            lens.type_specs,
        )?;
        check_range(
            id,
            "global type-spec",
            record.global_type_specs.start,
            record.global_type_specs.end(),
            lens.type_specs,
        )?;

        let Some(body_id) = record.body else {
            return validate_bodyless(id, record);
        };
        let Some(body) = self.bodies().get(body_id.index()) else {
            return Err(ShapeError::DanglingRecord {
                node: id,
                what: "body",
                index: body_id.raw(),
            });
        };
        if let Some(profile) = body.profile {
            if self.try_profile(profile).is_none() {
                return Err(ShapeError::DanglingRecord {
                    node: id,
                    what: "profile",
                    index: profile.raw(),
                });
            }
        } else if !record.shared_guards.is_empty() {
            return Err(ShapeError::GuardsWithoutProfile { node: id });
        }

        check_count(
            id,
            "inlinee",
            u32::from(body.profiled_call_site_count),
            record.inlinees.len,
        )?;
        check_count(
            id,
            "field inlinee",
            body.inline_cache_count,
            record.field_inlinees.len,
        )?;
        if !record.type_specs.is_empty() {
            check_count(
                id,
                "type-spec",
                body.inline_cache_count,
                record.type_specs.len,
            )?;
        }

        let Some(runtime_id) = record.runtime else {
            return Err(ShapeError::MissingRuntime { node: id });
        };
        let Some(runtime) = self.try_runtime(runtime_id) else {
            return Err(ShapeError::DanglingRecord {
                node: id,
                what: "runtime",
                index: runtime_id.raw(),
            });
        };
        let caches = runtime.cloned_inline_caches;
        check_range(id, "cloned inline cache", caches.start, caches.end(), lens.addrs)?;
        if !caches.is_empty() {
            check_count(
                id,
                "cloned inline cache",
                body.inline_cache_count,
                caches.len,
            )?;
        }

        Ok(())
    }
}

fn validate_bodyless(id: SnapshotId, record: &SnapshotRecord) -> Result<(), ShapeError> {
    let what = if record.runtime.is_some() {
        "a runtime record"
    } else if !record.inlinees.is_empty() || !record.field_inlinees.is_empty() {
        "inlinee slots"
    } else if !record.shared_guards.is_empty() {
        "shared guards"
    } else if !record.type_specs.is_empty() || !record.global_type_specs.is_empty() {
        "type-spec records"
    } else if record.next.is_some() {
        "a polymorphic successor"
    } else {
        return Ok(());
    };
    Err(ShapeError::BodylessData { node: id, what })
}

fn check_range(
    node: SnapshotId,
    what: &'static str,
    start: u32,
    end: u64,
    len: u64,
) -> Result<(), ShapeError> {
    if end > len {
        return Err(ShapeError::RangeOutOfBounds {
            node,
            what,
            start,
            end,
            len,
        });
    }
    Ok(())
}

fn check_count(
    node: SnapshotId,
    what: &'static str,
    expected: u32,
    actual: u32,
) -> Result<(), ShapeError> {
    if expected != actual {
        return Err(ShapeError::CountMismatch {
            node,
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
