//! Ori JIT Build - snapshot construction from live runtime context
//!
//! This crate turns the code-gen-time inlining tree and the runtime's
//! profiling tables into an immutable [`SnapshotArena`](ori_jit_ir::SnapshotArena):
//! - [`source`](CodeGenSource) traits the owning runtime implements
//! - [`SnapshotBuilder`], the single recursive construction pass
//! - [`Materializer`], the hook that lays out profile and type-spec payloads
//!
//! Test doubles for every source trait live in [`testing`] (enabled for this
//! crate's tests and behind the `testing` feature).
//!
//! # Tracing
//!
//! Set `RUST_LOG=ori_jit_build=debug` to log one line per built snapshot, or
//! `trace` for one line per captured function. Call [`init_tracing`] once at
//! startup to install a subscriber.

mod builder;
mod source;
mod stack;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use builder::{build_snapshot, BuildStats, SnapshotBuilder};
pub use source::{
    CodeGenSource, EntryPointSource, FunctionBodySource, Materializer, RuntimeSource,
    SharedGuardSet,
};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing subscriber for debugging.
///
/// Call this at the start of a JIT worker to enable tracing output.
/// Set `RUST_LOG=ori_jit_build=debug` to see build events.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
