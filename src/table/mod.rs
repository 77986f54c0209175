//! Component C: mount-point and descriptor table.
//!
//! Submodules, in dependency order: [`mount_point`] (classification), [`pool`] (workflow
//! selection within a mount point), [`entry`] (the record stored per mount point), and
//! [`descriptor_table`] (the fd/stream maps the dispatch front end actually touches).

pub mod descriptor_table;
pub mod entry;
pub mod mount_point;
pub mod pool;

pub use descriptor_table::DescriptorTable;
pub use entry::MountPointEntry;
pub use mount_point::MountPoint;
pub use pool::{Workflow, WorkflowPool};
