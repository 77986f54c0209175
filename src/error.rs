//! Internal error taxonomy (spec.md §7, kinds 2-6).
//!
//! Kind 1 ("native-call error") is never represented here: it is the raw return value and
//! `errno` of the intercepted call, passed straight through to the application untouched.
//! Everything in this module is swallowed by the dispatch front end — logged and folded into
//! the statistics registry — and never crosses the C ABI boundary.

use crate::table::mount_point::MountPoint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Kind 2: `classify_and_pick` returned the invalid sentinel because the path matched no
    /// configured mount-point.
    #[error("path `{path}` did not match any configured mount-point (resolved to {resolved:?})")]
    ClassificationMiss { path: String, resolved: MountPoint },

    /// Kind 3: the fd/stream was not tracked by the descriptor table.
    #[error("no tracked entry for {handle_kind} handle {handle}")]
    TableMiss {
        handle_kind: &'static str,
        handle: String,
    },

    /// Kind 4: the native symbol could not be resolved via either `dlopen` path.
    #[error("failed to resolve native symbol `{symbol}`: {reason}")]
    ResolverFailure { symbol: &'static str, reason: String },

    /// Kind 5: the engine rejected or failed to accept a submitted context.
    #[error("policy engine submission failed for op `{op}`: {reason}")]
    EngineSubmissionFailure { op: &'static str, reason: String },

    /// Kind 6: the layer failed to complete first-use initialization.
    #[error("layer initialization failed: {0}")]
    InitializationFailure(String),
}
