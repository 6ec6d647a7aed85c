//! Suspend accounting trace helpers.

use std::sync::OnceLock;

pub(crate) fn trace_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var_os("RDV_TARGET_TRACE").is_some())
}

pub(crate) fn trace_target(message: &str) {
    if trace_enabled() {
        tracing::trace!(target: "rdv_target::accounting", "{message}");
    }
}
