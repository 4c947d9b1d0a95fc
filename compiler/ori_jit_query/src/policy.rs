//! Compilation policy derived from a snapshot and the phase configuration.

use crate::config::{JitConfig, Phases};
use crate::view::FunctionSnapshot;

impl FunctionSnapshot<'_> {
    /// Whether loop bodies of this function should be JIT-compiled eagerly.
    ///
    /// Requires loop-body and full JIT to be enabled for the function and the
    /// body to be neither a generator nor contain try regions; then either
    /// the loop-body phase is forced or prejit is on.
    ///
    /// # Panics
    ///
    /// Panics if the function has no body.
    pub fn force_jit_loop_body(self, config: &JitConfig) -> bool {
        let body = self.body_or_panic("force_jit_loop_body");
        let key = (body.source_context_id(), self.local_function_id());

        !config.is_phase_off(Phases::JIT_LOOP_BODY, key)
            && !config.is_phase_off(Phases::FULL_JIT, key)
            && !body.is_generator()
            && !body.has_try()
            && (config.is_phase_forced(Phases::JIT_LOOP_BODY, key) || config.prejit)
    }
}
