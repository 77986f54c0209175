//! User-space POSIX I/O interposition layer.
//!
//! Built as a `cdylib`, loaded into a target process via `LD_PRELOAD` (or `DYLD_INSERT_LIBRARIES`
//! on macOS). Every interposed libc entry point lives under [`interpose`], grouped by operation
//! category; each classifies the path or fd it was given against a configured set of mount
//! points, submits an enforcement record to an external policy engine, and then always calls
//! through to the real native implementation — this layer never denies or stalls a call on its
//! own.
//!
//! Process-lifecycle hooks (this module) bring the layer up before any application code runs
//! and flush accumulated statistics on the way out.

pub mod config;
pub mod context;
pub mod error;
pub mod interpose;
mod logger;
pub mod ops;
pub mod policy;
pub mod resolver;
pub mod stats;
pub mod table;

/// Runs once, before `main`, via the platform's `.init_array`/`__attribute__((constructor))`
/// mechanism (the same hook `original_source` installs its library-load handler from).
/// Eagerly initializes the layer so the very first interposed call already sees a ready
/// [`context::LayerContext`] instead of taking the bypass path.
#[ctor::ctor]
fn on_load() {
    context::init_layer();
    log::info!("padll layer initialized (pid {})", std::process::id());
}

/// Runs once, after `main` returns (or the process otherwise reaches normal exit), via
/// `.fini_array`/`__attribute__((destructor))`. Best-effort: writes the final statistics
/// snapshot to `padll_stats_file` if one was configured.
#[ctor::dtor]
fn on_unload() {
    let Some(ctx) = context::layer() else {
        return;
    };
    let config = config::Config::from_env();
    let Some(path) = config.stats_file else {
        return;
    };
    let rendered = ctx.stats.snapshot().render_lines();
    if let Err(err) = std::fs::write(&path, rendered) {
        log::warn!("failed to write stats file `{path}`: {err}");
    }
}
