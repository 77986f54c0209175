//! Shared machinery for the libc entry points in this module — the non-boilerplate parts of
//! the 9-step template from spec.md §4.E:
//!
//! 1. ready check — [`crate::context::layer`], called directly at each entry point
//! 2. per-op toggle — [`category_enabled`]
//! 3. variadic unpack — handled per entry point (mode-taking `open`/`openat` family)
//! 4. classify — [`classify_path`] / [`classify_fd`]
//! 5. enforce — [`submit`]
//! 6. native call — [`resolve`], then the entry point calls the resolved pointer directly
//! 7. table update — entry-point-specific (`insert_fd`, `remove_fd`, `replace_fd`, ...)
//! 8. stats update — [`record`] / [`record_bypass`]
//! 9. return — the entry point returns the native call's result untouched
//!
//! Steps 3, 6 (the call itself) and 7 stay in each entry point because they depend on that
//! call's specific C signature; everything classification/enforcement/accounting-shaped is
//! factored in here so every entry point in `metadata.rs`/`data.rs`/`directory.rs`/`xattr.rs`/
//! `special.rs` reduces to a short, uniform body.

use std::ffi::CStr;
use std::os::raw::c_char;

use crate::config::InterceptMask;
use crate::context::LayerContext;
use crate::error::CoreError;
use crate::ops::{OpCategory, Operation};
use crate::policy::EnforcementContext;
use crate::resolver::{SymbolCache, GLOBAL};
use crate::table::mount_point::MountPoint;
use crate::table::pool::Workflow;

/// Step 2: is `category` enabled by the process's intercept mask?
pub fn category_enabled(ctx: &LayerContext, category: OpCategory) -> bool {
    let bit = match category {
        OpCategory::Metadata => InterceptMask::METADATA,
        OpCategory::Data => InterceptMask::DATA,
        OpCategory::Directory => InterceptMask::DIRECTORY,
        OpCategory::ExtendedAttributes => InterceptMask::EXTENDED_ATTRIBUTES,
        OpCategory::Special => InterceptMask::SPECIAL,
    };
    ctx.intercept_mask.contains(bit)
}

/// Step 6: resolves `name` through the global native resolver, via `cache`.
///
/// # Safety
/// The returned address must only be transmuted to a function pointer whose signature matches
/// the real native symbol `name`.
pub fn resolve(cache: &SymbolCache, name: &str) -> Result<usize, CoreError> {
    cache.get_or_resolve(name, &GLOBAL)
}

/// Step 4 for path-taking operations: converts a raw C path argument to a `&str` (lossily, for
/// classification purposes only — the native call always gets the original raw pointer) and
/// classifies it against the process's configured mount points.
///
/// # Safety
/// `path` must be a valid, NUL-terminated C string for the duration of the call.
pub unsafe fn classify_path(ctx: &LayerContext, path: *const c_char) -> (MountPoint, Workflow) {
    if path.is_null() {
        return (MountPoint::None, Workflow::INVALID);
    }
    let c_str = unsafe { CStr::from_ptr(path) };
    let lossy = c_str.to_string_lossy();
    classify_str(ctx, &lossy)
}

fn classify_str(ctx: &LayerContext, path: &str) -> (MountPoint, Workflow) {
    // Mount-point differentiation disabled (no rules configured): every path classifies as
    // `none`, but still draws from the single default pool registered for that class rather
    // than bypassing (spec.md §3 "Workflow pool").
    if ctx.mount_points.is_empty() {
        let workflow = ctx
            .default_pool
            .as_ref()
            .map(|pool| pool.pick())
            .unwrap_or(Workflow::INVALID);
        return (MountPoint::None, workflow);
    }
    for entry in &ctx.mount_points {
        if memchr::memmem::find(path.as_bytes(), entry.path.as_bytes()).is_some() {
            return (entry.mount_point, entry.workflows.pick());
        }
    }
    log::error!("path `{path}` did not match any configured mount-point; bypassing enforcement");
    (MountPoint::None, Workflow::INVALID)
}

/// `close()`'s fallback selector (spec.md §4.C `pick_forced`, §7 kind 3): used when the fd
/// being closed was never observed by a tracked `open`. Unlike every other descriptor-based
/// miss, `close` does not simply bypass — it still draws a workflow so an unpaired close
/// traverses an enforcement channel, just without a known source path.
pub fn pick_forced(ctx: &LayerContext) -> (MountPoint, Workflow) {
    if ctx.mount_points.is_empty() {
        let workflow = ctx
            .default_pool
            .as_ref()
            .map(|pool| pool.pick())
            .unwrap_or(Workflow::INVALID);
        return (MountPoint::None, workflow);
    }
    match ctx
        .mount_points
        .iter()
        .find(|entry| entry.mount_point == MountPoint::Remote)
    {
        Some(entry) => (MountPoint::Remote, entry.workflows.pick()),
        None => (MountPoint::None, Workflow::INVALID),
    }
}

/// Step 4 for fd-taking operations: looks the fd up in the descriptor table rather than
/// reclassifying a path (the table was populated when the fd was opened). A miss (fd not
/// tracked — opened before the layer was ready, or a reserved fd) resolves to a bypass.
pub fn classify_fd(ctx: &LayerContext, fd: libc::c_int) -> (MountPoint, Workflow, Option<String>) {
    match ctx.table.get_fd(fd) {
        Some(handle) => (handle.mount_point, handle.workflow, Some(handle.path)),
        None => (MountPoint::None, Workflow::INVALID, None),
    }
}

/// Step 5: submits an [`EnforcementContext`] for the given operation. Best-effort — failures
/// are logged and otherwise ignored, per the submission-only contract (spec.md §4.D).
pub fn submit(
    ctx: &LayerContext,
    op: Operation,
    mount_point: MountPoint,
    workflow: Workflow,
    bytes: u64,
) {
    let context = EnforcementContext::new(op, mount_point, workflow, bytes);
    if let Err(err) = ctx.engine.submit(&context) {
        log::debug!("policy engine submission for `{}` failed: {err}", op.name());
    }
}

/// Step 8, taken path: records a completed dispatch. When the native call failed, also logs
/// the `errno` the caller will observe, via `nix`'s typed wrapper — kind 1 of spec.md §7, never
/// turned into a `CoreError`, but worth a trace line for diagnosing a misbehaving mount point.
pub fn record(ctx: &LayerContext, op: Operation, bytes: u64, is_error: bool) {
    if is_error {
        log::trace!("{} returned an error: {}", op.name(), nix::errno::Errno::last());
    }
    ctx.stats.record(op, bytes, is_error);
}

/// Step 8, bypass path: records that `op` ran without classification/enforcement.
pub fn record_bypass(ctx: &LayerContext, op: Operation) {
    ctx.stats.record_bypass(op);
}

/// True if `workflow` warrants enforcement at all. The invalid sentinel (spec.md §3) means no
/// workflow was selected — classification missed, the pool was empty, or the fd/stream wasn't
/// tracked — and the operation must bypass enforcement regardless of which [`MountPoint`] it
/// nominally classified to.
pub fn should_enforce(workflow: Workflow) -> bool {
    workflow.is_valid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::EngineConstructionParams;
    use crate::stats::StatsRegistry;
    use crate::table::entry::MountPointEntry;
    use crate::table::pool::WorkflowPool;
    use crate::table::DescriptorTable;

    fn ctx_with(mount_points: Vec<MountPointEntry>, default_pool: Option<WorkflowPool>) -> LayerContext {
        LayerContext {
            stats: StatsRegistry::new(),
            table: DescriptorTable::new(),
            mount_points,
            default_pool,
            engine: crate::policy::build_client(EngineConstructionParams::Offline),
            intercept_mask: InterceptMask::all(),
        }
    }

    #[test]
    fn classify_str_draws_from_default_pool_when_no_rules_configured() {
        let ctx = ctx_with(Vec::new(), Some(WorkflowPool::new(4, 1)));
        let (mount_point, workflow) = classify_str(&ctx, "/any/path");
        assert_eq!(mount_point, MountPoint::None);
        assert!(workflow.is_valid());
    }

    #[test]
    fn classify_str_bypasses_when_no_rules_and_no_default_pool() {
        let ctx = ctx_with(Vec::new(), None);
        let (mount_point, workflow) = classify_str(&ctx, "/any/path");
        assert_eq!(mount_point, MountPoint::None);
        assert!(!workflow.is_valid());
    }

    #[test]
    fn classify_str_bypasses_on_genuine_miss_against_configured_rules() {
        let entry = MountPointEntry::new("/mnt/remote", MountPoint::Remote, 4, 1);
        let ctx = ctx_with(vec![entry], None);
        let (mount_point, workflow) = classify_str(&ctx, "/etc/hosts");
        assert_eq!(mount_point, MountPoint::None);
        assert!(!workflow.is_valid());
    }

    #[test]
    fn pick_forced_draws_from_remote_pool_when_differentiation_enabled() {
        let entry = MountPointEntry::new("/mnt/remote", MountPoint::Remote, 4, 1);
        let ctx = ctx_with(vec![entry], None);
        let (mount_point, workflow) = pick_forced(&ctx);
        assert_eq!(mount_point, MountPoint::Remote);
        assert!(workflow.is_valid());
    }

    #[test]
    fn pick_forced_draws_from_default_pool_when_differentiation_disabled() {
        let ctx = ctx_with(Vec::new(), Some(WorkflowPool::new(4, 1)));
        let (mount_point, workflow) = pick_forced(&ctx);
        assert_eq!(mount_point, MountPoint::None);
        assert!(workflow.is_valid());
    }

    #[test]
    fn pick_forced_bypasses_when_no_remote_pool_registered() {
        let entry = MountPointEntry::new("/mnt/local", MountPoint::Local, 4, 1);
        let ctx = ctx_with(vec![entry], None);
        let (mount_point, workflow) = pick_forced(&ctx);
        assert_eq!(mount_point, MountPoint::None);
        assert!(!workflow.is_valid());
    }
}
