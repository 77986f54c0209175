//! Global layer state (spec.md §9 "Global mutable state").
//!
//! Every interposer needs the same handful of shared objects — the resolver, the statistics
//! registry, the descriptor table, the configured mount points, and the policy-engine client.
//! Rather than threading them through function arguments (impossible anyway across an FFI
//! boundary with a fixed libc signature), they live in one process-wide [`LayerContext`],
//! built lazily on first use and published through a [`std::sync::OnceLock`].
//!
//! A separate atomic "ready" flag exists alongside the `OnceLock` because initialization itself
//! calls into code that logs and may stat paths — if an interposed call reenters during that
//! window (e.g. the allocator or `dlopen` itself opening a file), the ready flag lets the
//! reentrant call see "not ready yet" and take the bypass path (spec.md §4.E step 1) instead of
//! deadlocking on the `OnceLock`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use crate::config::Config;
use crate::policy::{build_client, PolicyEngineClient};
use crate::stats::StatsRegistry;
use crate::table::entry::MountPointEntry;
use crate::table::pool::WorkflowPool;
use crate::table::DescriptorTable;

pub struct LayerContext {
    pub stats: StatsRegistry,
    pub table: DescriptorTable,
    pub mount_points: Vec<MountPointEntry>,
    /// The single pool registered under `none` when mount-point differentiation is disabled
    /// (spec.md §3): populated iff `mount_points` is empty, so every operation still draws a
    /// workflow instead of unconditionally bypassing enforcement.
    pub default_pool: Option<WorkflowPool>,
    pub engine: Box<dyn PolicyEngineClient>,
    pub intercept_mask: crate::config::InterceptMask,
}

static READY: AtomicBool = AtomicBool::new(false);
static CONTEXT: OnceLock<LayerContext> = OnceLock::new();

/// Returns the layer context if initialization has completed, `None` otherwise. Every
/// interposer calls this first (spec.md §4.E step 1); a `None` result means "call straight
/// through to the native function, no classification, no enforcement, no accounting".
pub fn layer() -> Option<&'static LayerContext> {
    if READY.load(Ordering::Acquire) {
        CONTEXT.get()
    } else {
        None
    }
}

/// Performs first-use initialization. Idempotent and safe to call from every interposer: the
/// `OnceLock` guarantees the build closure runs at most once, and the ready flag is only raised
/// after it completes successfully.
///
/// If configuration is invalid (spec.md §7 kind 6 — currently, a missing or non-positive
/// `padll_workflows`), the layer is left permanently not-ready: `layer()` keeps returning
/// `None` and every interposer takes the passthrough branch for the rest of the process's
/// life, exactly as `original_source`'s fatal `option_padll_workflows()` failure does.
pub fn init_layer() {
    if READY.load(Ordering::Acquire) {
        return;
    }
    crate::logger::install();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            return;
        }
    };
    CONTEXT.get_or_init(|| build_context(config));
    READY.store(true, Ordering::Release);
}

fn build_context(config: Config) -> LayerContext {
    let seed = std::process::id() as u64;
    let mount_points: Vec<MountPointEntry> = config
        .mount_point_rules
        .iter()
        .map(|rule| {
            MountPointEntry::new(
                rule.needle.clone(),
                rule.mount_point,
                config.workflows_per_mount_point,
                seed,
            )
        })
        .collect();
    let default_pool = mount_points
        .is_empty()
        .then(|| WorkflowPool::new(config.workflows_per_mount_point, seed));
    LayerContext {
        stats: StatsRegistry::new(),
        table: DescriptorTable::new(),
        mount_points,
        default_pool,
        engine: build_client(config.engine),
        intercept_mask: config.intercept_mask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_layer_is_idempotent_and_publishes_context() {
        // `padll_workflows` is mandatory (spec.md §6); set it so init can succeed at all.
        unsafe { std::env::set_var("padll_workflows", "4") };
        init_layer();
        init_layer();
        assert!(layer().is_some());
    }
}
