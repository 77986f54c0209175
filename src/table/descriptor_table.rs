//! Component C: the fd/stream descriptor table.
//!
//! Tracks, for every open file descriptor and `FILE*` stream the layer has seen pass through
//! `open`/`openat`/`fopen`, which mount point it resolved to and which workflow within that
//! mount point's pool it was assigned. Every interposer in `src/interpose/` consults this table
//! on entry (to avoid reclassifying a path it has already seen) and updates it on `close`/
//! `fclose`/`dup`-via-`fcntl`.
//!
//! Invariants (spec.md §5):
//! - **I1 (mount-point immutability):** once a handle is inserted with a given
//!   [`MountPoint`], it is never changed in place — only removed and re-inserted.
//! - **I2 (workflow pool consistency):** [`replace_fd`](DescriptorTable::replace_fd), used on
//!   the `fcntl(F_DUPFD)` path, carries the source descriptor's workflow forward rather than
//!   rolling a new one, so a dup'd fd keeps rate-shaping behavior consistent with its source.
//! - **I3 (reserved-handle exclusion):** fd 0, 1 and 2 are never accepted as table keys, and
//!   neither is a null `FILE*` or the current `stdin`/`stdout`/`stderr` stream.
//! - **I4 (atomic rekeying):** `replace_fd` holds a single write lock across the remove-then-
//!   insert, so no concurrent reader ever observes both the old and new fd unset, or the new fd
//!   set to something other than the old entry.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::CoreError;
use crate::table::mount_point::MountPoint;
use crate::table::pool::Workflow;

/// The smallest fd value the table will accept. `stdin`/`stdout`/`stderr` are never tracked:
/// the layer has no opinion on them and they must never be rewritten by a dup.
const MIN_TRACKED_FD: libc::c_int = 3;

/// What the table remembers about one open handle.
#[derive(Debug, Clone)]
pub struct TrackedHandle {
    pub path: String,
    pub mount_point: MountPoint,
    pub workflow: Workflow,
}

#[derive(Default)]
pub struct DescriptorTable {
    fds: RwLock<HashMap<libc::c_int, TrackedHandle>>,
    streams: RwLock<HashMap<usize, TrackedHandle>>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        DescriptorTable {
            fds: RwLock::new(HashMap::new()),
            streams: RwLock::new(HashMap::new()),
        }
    }

    fn check_reserved(fd: libc::c_int) -> Result<(), CoreError> {
        if fd < MIN_TRACKED_FD {
            return Err(CoreError::TableMiss {
                handle_kind: "fd",
                handle: format!("{fd} (reserved)"),
            });
        }
        Ok(())
    }

    /// `true` for a null `FILE*` or the current value of `stdin`/`stdout`/`stderr` — the
    /// stream-side analog of [`check_reserved`](Self::check_reserved)'s fd exclusion.
    fn is_reserved_stream(stream: usize) -> bool {
        if stream == 0 {
            return true;
        }
        // SAFETY: `libc::stdin`/`stdout`/`stderr` are glibc's global `FILE*` statics; reading
        // their current value (not dereferencing it) is always sound.
        unsafe {
            stream == libc::stdin as usize
                || stream == libc::stdout as usize
                || stream == libc::stderr as usize
        }
    }

    fn check_reserved_stream(stream: usize) -> Result<(), CoreError> {
        if Self::is_reserved_stream(stream) {
            return Err(CoreError::TableMiss {
                handle_kind: "stream",
                handle: format!("{stream:#x} (reserved)"),
            });
        }
        Ok(())
    }

    pub fn insert_fd(&self, fd: libc::c_int, handle: TrackedHandle) -> Result<(), CoreError> {
        Self::check_reserved(fd)?;
        self.fds.write().insert(fd, handle);
        Ok(())
    }

    pub fn get_fd(&self, fd: libc::c_int) -> Option<TrackedHandle> {
        if fd < MIN_TRACKED_FD {
            return None;
        }
        self.fds.read().get(&fd).cloned()
    }

    pub fn remove_fd(&self, fd: libc::c_int) -> Option<TrackedHandle> {
        if fd < MIN_TRACKED_FD {
            return None;
        }
        self.fds.write().remove(&fd)
    }

    /// Rekeys `old_fd`'s entry onto `new_fd`, as happens on `fcntl(old_fd, F_DUPFD, ...)` —
    /// the entry moves to the new key and `old_fd` ceases to exist in the table (spec.md
    /// invariant I4). Atomic: holds the write lock across the remove-then-insert, so no
    /// concurrent reader ever observes both keys unset, or the old key still set alongside the
    /// new one. The workflow carried over is exactly the source's, satisfying I2.
    pub fn replace_fd(&self, old_fd: libc::c_int, new_fd: libc::c_int) -> Result<(), CoreError> {
        Self::check_reserved(new_fd)?;
        let mut guard = self.fds.write();
        let handle = guard.remove(&old_fd).ok_or(CoreError::TableMiss {
            handle_kind: "fd",
            handle: old_fd.to_string(),
        })?;
        guard.insert(new_fd, handle);
        Ok(())
    }

    pub fn insert_stream(&self, stream: usize, handle: TrackedHandle) -> Result<(), CoreError> {
        Self::check_reserved_stream(stream)?;
        self.streams.write().insert(stream, handle);
        Ok(())
    }

    pub fn get_stream(&self, stream: usize) -> Option<TrackedHandle> {
        if Self::is_reserved_stream(stream) {
            return None;
        }
        self.streams.read().get(&stream).cloned()
    }

    pub fn remove_stream(&self, stream: usize) -> Option<TrackedHandle> {
        if Self::is_reserved_stream(stream) {
            return None;
        }
        self.streams.write().remove(&stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(path: &str, workflow: u32) -> TrackedHandle {
        TrackedHandle {
            path: path.to_string(),
            mount_point: MountPoint::Remote,
            workflow: Workflow(workflow),
        }
    }

    #[test]
    fn reserved_fds_are_rejected_on_every_path() {
        let table = DescriptorTable::new();
        for fd in 0..MIN_TRACKED_FD {
            assert!(table.insert_fd(fd, handle("/x", 0)).is_err());
            assert!(table.get_fd(fd).is_none());
            assert!(table.remove_fd(fd).is_none());
            assert!(table.replace_fd(10, fd).is_err());
        }
    }

    #[test]
    fn replace_fd_carries_the_source_workflow_and_clears_the_old_key() {
        let table = DescriptorTable::new();
        table.insert_fd(10, handle("/mnt/remote/a", 5)).unwrap();
        table.replace_fd(10, 11).unwrap();

        let moved = table.get_fd(11).unwrap();
        assert_eq!(moved.workflow, Workflow(5));
        assert_eq!(moved.path, "/mnt/remote/a");
        assert!(table.get_fd(10).is_none());
    }

    #[test]
    fn replace_fd_fails_for_unknown_source() {
        let table = DescriptorTable::new();
        assert!(table.replace_fd(99, 10).is_err());
    }

    #[test]
    fn remove_fd_then_get_fd_returns_nothing() {
        let table = DescriptorTable::new();
        table.insert_fd(10, handle("/x", 0)).unwrap();
        table.remove_fd(10).unwrap();
        assert!(table.get_fd(10).is_none());
    }

    #[test]
    fn stream_table_is_independent_of_fd_table() {
        let table = DescriptorTable::new();
        table.insert_stream(0x1000, handle("/x", 1)).unwrap();
        assert!(table.get_stream(0x1000).is_some());
        assert!(table.get_fd(0x1000 as libc::c_int).is_none());
    }

    #[test]
    fn reserved_streams_are_rejected_on_every_path() {
        let table = DescriptorTable::new();
        let reserved: [usize; 4] = unsafe {
            [
                0,
                libc::stdin as usize,
                libc::stdout as usize,
                libc::stderr as usize,
            ]
        };
        for stream in reserved {
            assert!(table.insert_stream(stream, handle("/x", 0)).is_err());
            assert!(table.get_stream(stream).is_none());
            assert!(table.remove_stream(stream).is_none());
        }
    }
}
