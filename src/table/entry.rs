//! Per-mount-point configuration record (spec.md §3).

use crate::table::mount_point::MountPoint;
use crate::table::pool::WorkflowPool;

/// Everything the table needs to know about one configured mount point: the rule that
/// classifies a path into it, and the pool of workflows it can be assigned to.
pub struct MountPointEntry {
    pub path: String,
    pub mount_point: MountPoint,
    pub workflows: WorkflowPool,

    /// Metadata-server-unit identifier, for multi-server deployments where metadata operations
    /// are routed independently of data operations. Declared but not wired up by the current
    /// policy-engine client (spec.md §3 lists it as present-but-unimplemented); always
    /// `u32::MAX` today.
    pub metadata_unit: u32,
}

impl MountPointEntry {
    pub fn new(path: impl Into<String>, mount_point: MountPoint, workflow_count: u32, seed: u64) -> Self {
        MountPointEntry {
            path: path.into(),
            mount_point,
            workflows: WorkflowPool::new(workflow_count, seed),
            metadata_unit: u32::MAX,
        }
    }
}
