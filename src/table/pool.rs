//! Workflow selection within a classified mount point (spec.md §4.C, §9).
//!
//! Each mount point is assigned a pool of interchangeable "workflows" — independent rate-shaping
//! channels the policy engine tracks separately. A dispatch that resolves to a given mount point
//! picks one workflow from its pool at random; the spec only requires "a fast non-cryptographic
//! PRNG" (§9), so `rand::rngs::SmallRng` is used, seeded once per process from the PID so that
//! repeated runs of the same binary don't collide on a fixed seed.

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

/// Identifies one workflow (rate-shaping channel) within a mount point's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Workflow(pub u32);

impl Workflow {
    /// Sentinel used when an operation bypasses workflow selection entirely (e.g. `sync()`,
    /// per spec.md §9), rather than being assigned to any real channel.
    pub const INVALID: Workflow = Workflow(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Workflow::INVALID
    }
}

/// The set of workflows available for one mount point, plus the PRNG used to pick among them.
pub struct WorkflowPool {
    workflows: SmallVec<[Workflow; 8]>,
    rng: Mutex<SmallRng>,
}

impl WorkflowPool {
    /// Builds a pool of `count` workflows, seeded from `seed` (typically the process id, per
    /// spec.md §9). Workflow identifiers are `1000, 2000, ..., count * 1000` rather than a plain
    /// `0..count` range, matching `original_source`'s `MountPointWorkflows` default numbering
    /// (`mount_point_table.hpp`) — an observable convention downstream tooling may depend on, not
    /// an implementation detail this rewrite is free to renumber.
    pub fn new(count: u32, seed: u64) -> Self {
        let workflows = (1..=count).map(|i| Workflow(i * 1000)).collect();
        WorkflowPool {
            workflows,
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    /// Picks a workflow uniformly at random from the pool. Returns [`Workflow::INVALID`] if the
    /// pool is empty (a misconfigured mount point with zero workflows assigned).
    pub fn pick(&self) -> Workflow {
        if self.workflows.is_empty() {
            return Workflow::INVALID;
        }
        let idx = self.rng.lock().gen_range(0..self.workflows.len());
        self.workflows[idx]
    }

    /// Picks a specific workflow by index, bypassing the PRNG. Used by tests and by fd
    /// duplication (spec.md invariant I2: a duplicated fd keeps its source fd's workflow rather
    /// than being re-rolled).
    pub fn pick_at(&self, index: usize) -> Option<Workflow> {
        self.workflows.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_stays_within_pool() {
        let pool = WorkflowPool::new(4, 42);
        for _ in 0..100 {
            let picked = pool.pick();
            assert!(picked.0 <= 4000 && picked.0 % 1000 == 0 && picked.0 != 0);
        }
    }

    #[test]
    fn empty_pool_yields_invalid() {
        let pool = WorkflowPool::new(0, 42);
        assert_eq!(pool.pick(), Workflow::INVALID);
    }

    #[test]
    fn invalid_is_not_valid() {
        assert!(!Workflow::INVALID.is_valid());
        assert!(Workflow(0).is_valid());
    }
}
