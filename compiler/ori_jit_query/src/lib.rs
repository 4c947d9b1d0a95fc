//! Ori JIT Query - read-only navigation of JIT-time snapshots
//!
//! The code generator never touches a [`SnapshotArena`](ori_jit_ir::SnapshotArena)
//! directly. It wraps the root in a [`FunctionSnapshot`] and navigates from
//! there: call-site and field-access inlinees, polymorphic chains, runtime
//! data, type-specialization records and shared property guards.
//!
//! Compilation policy that depends on both the snapshot and the phase
//! configuration ([`JitConfig`]) lives here too, as does the debug tag
//! used to label functions in compiler output.
//!
//! All views are `Copy` borrows of an immutable arena and can be used from
//! any number of threads at once.

mod config;
mod debug_tag;
mod policy;
mod view;

pub use config::{ConfigError, FunctionKey, JitConfig, PhaseList, Phases};
pub use debug_tag::MAX_FUNCTION_BODY_DEBUG_STRING_SIZE;
pub use view::{BodyView, Chain, FunctionSnapshot, RuntimeInfo};
