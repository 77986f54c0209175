//! Component B: statistics registry.
//!
//! One counter block per [`Operation`](crate::ops::Operation) slot, grouped by
//! [`OpCategory`](crate::ops::OpCategory). Every dispatch updates exactly one block after the
//! native call returns (spec.md §4.B, §4.E step 7); nothing here ever blocks on the policy
//! engine or the descriptor table.

use parking_lot::Mutex;

use crate::ops::{Operation, OpCategory};

/// The four counters tracked for every operation slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(serde::Serialize))]
pub struct Counters {
    /// Number of times this operation was dispatched.
    pub ops: u64,
    /// Sum of bytes transferred, for data-carrying operations (`read`, `write`, `pread`, ...).
    /// Zero for operations with no byte-count notion.
    pub bytes: u64,
    /// Number of times the native call returned an error (negative return / non-zero errno).
    pub errors: u64,
    /// Number of times this operation bypassed enforcement entirely — layer not ready, path
    /// classified as [`MountPoint::None`](crate::table::mount_point::MountPoint::None), or the
    /// per-operation intercept toggle disabled.
    pub bypasses: u64,
}

impl Counters {
    fn record_dispatch(&mut self, bytes: u64, is_error: bool) {
        self.ops += 1;
        self.bytes += bytes;
        if is_error {
            self.errors += 1;
        }
    }
}

struct CategoryBlock {
    category: OpCategory,
    slots: Mutex<Vec<Counters>>,
}

impl CategoryBlock {
    fn new(category: OpCategory) -> Self {
        CategoryBlock {
            category,
            slots: Mutex::new(vec![Counters::default(); category.slot_count()]),
        }
    }
}

/// The statistics registry, one instance per [`LayerContext`](crate::context::LayerContext).
pub struct StatsRegistry {
    blocks: [CategoryBlock; 5],
}

impl StatsRegistry {
    pub fn new() -> Self {
        StatsRegistry {
            blocks: OpCategory::ALL.map(CategoryBlock::new),
        }
    }

    fn block(&self, category: OpCategory) -> &CategoryBlock {
        self.blocks
            .iter()
            .find(|b| b.category == category)
            .expect("OpCategory::ALL covers every category")
    }

    /// Records a completed dispatch for `op`. `bytes` is the transfer size (0 if not
    /// applicable); `is_error` reflects the native call's return value.
    pub fn record(&self, op: Operation, bytes: u64, is_error: bool) {
        let block = self.block(op.category());
        let mut slots = block.slots.lock();
        slots[op.slot()].record_dispatch(bytes, is_error);
    }

    /// Records a bypassed dispatch for `op` — no native-call outcome to fold in.
    pub fn record_bypass(&self, op: Operation) {
        let block = self.block(op.category());
        let mut slots = block.slots.lock();
        slots[op.slot()].bypasses += 1;
    }

    /// Point-in-time copy of every counter, keyed by category and slot.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            categories: OpCategory::ALL
                .iter()
                .map(|&category| {
                    let slots = self.block(category).slots.lock().clone();
                    CategorySnapshot { category, slots }
                })
                .collect(),
        }
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serializable", derive(serde::Serialize))]
pub struct CategorySnapshot {
    pub category: OpCategory,
    pub slots: Vec<Counters>,
}

/// A consistent-enough (not globally atomic, but per-slot consistent) copy of the registry,
/// suitable for rendering a report or handing to `serde` behind the `serializable` feature.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serializable", derive(serde::Serialize))]
pub struct StatsSnapshot {
    pub categories: Vec<CategorySnapshot>,
}

impl StatsSnapshot {
    /// Renders the snapshot as aligned plain-text lines, one per non-empty operation slot.
    /// Intended for the `padll_stats_file` sink described in spec.md §6.
    pub fn render_lines(&self) -> String {
        let mut out = String::new();
        for category in &self.categories {
            for (slot, counters) in category.slots.iter().enumerate() {
                if counters.ops == 0 && counters.bypasses == 0 {
                    continue;
                }
                out.push_str(&format!(
                    "{cat:?}[{slot}]: ops={} bytes={} errors={} bypasses={}\n",
                    counters.ops, counters.bytes, counters.errors, counters.bypasses,
                    cat = category.category,
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{Data, Metadata};

    #[test]
    fn records_ops_and_bytes_independently() {
        let stats = StatsRegistry::new();
        stats.record(Operation::Data(Data::Read), 128, false);
        stats.record(Operation::Data(Data::Read), 64, true);

        let snapshot = stats.snapshot();
        let data = snapshot
            .categories
            .iter()
            .find(|c| c.category == OpCategory::Data)
            .unwrap();
        let counters = data.slots[Operation::Data(Data::Read).slot()];
        assert_eq!(counters.ops, 2);
        assert_eq!(counters.bytes, 192);
        assert_eq!(counters.errors, 1);
    }

    #[test]
    fn bypass_does_not_touch_ops_or_bytes() {
        let stats = StatsRegistry::new();
        stats.record_bypass(Operation::Metadata(Metadata::Open));

        let snapshot = stats.snapshot();
        let metadata = snapshot
            .categories
            .iter()
            .find(|c| c.category == OpCategory::Metadata)
            .unwrap();
        let counters = metadata.slots[Operation::Metadata(Metadata::Open).slot()];
        assert_eq!(counters.ops, 0);
        assert_eq!(counters.bypasses, 1);
    }

    #[test]
    fn slots_are_independent_across_operations() {
        let stats = StatsRegistry::new();
        stats.record(Operation::Data(Data::Read), 10, false);
        stats.record(Operation::Data(Data::Write), 20, false);

        let snapshot = stats.snapshot();
        let data = snapshot
            .categories
            .iter()
            .find(|c| c.category == OpCategory::Data)
            .unwrap();
        assert_eq!(data.slots[Operation::Data(Data::Read).slot()].bytes, 10);
        assert_eq!(data.slots[Operation::Data(Data::Write).slot()].bytes, 20);
    }

    #[test]
    fn render_lines_skips_untouched_slots() {
        let stats = StatsRegistry::new();
        stats.record(Operation::Data(Data::Read), 1, false);
        let rendered = stats.snapshot().render_lines();
        assert!(rendered.contains("Data"));
        assert_eq!(rendered.lines().count(), 1);
    }
}
