//! Mount-point classification (spec.md §4.C, §9 "Sharp edges").
//!
//! A path is classified by checking whether any configured mount-point string occurs anywhere
//! within it — a substring search, not a prefix match. This is a deliberate bug-compatibility
//! choice: `original_source`'s `options.hpp` classifies the same way, and a deployment's
//! workflow assignments may already depend on the quirk (e.g. a mount point `/data` also
//! matching `/mnt/other-data/file`). Changing it to prefix matching would silently change which
//! workflow a path lands in for existing deployments.

use memchr::memmem;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The coarse class a path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MountPoint {
    /// No configured mount point matched; the operation bypasses enforcement entirely.
    None = 0,
    /// Matched a mount point configured as local (served on the same host).
    Local = 1,
    /// Matched a mount point configured as remote (the kind this layer exists to rate-shape).
    Remote = 2,
}

/// One configured mount point: the string searched for, and the class it resolves to.
#[derive(Debug, Clone)]
pub struct MountPointRule {
    pub needle: String,
    pub mount_point: MountPoint,
}

/// Classifies `path` against `rules`, in order, returning the first match.
///
/// Matching is `memchr::memmem::find` substring search, not prefix matching — see the module
/// doc comment. Returns [`MountPoint::None`] if no rule's needle occurs anywhere in `path`.
pub fn classify(path: &str, rules: &[MountPointRule]) -> MountPoint {
    let haystack = path.as_bytes();
    for rule in rules {
        if memmem::find(haystack, rule.needle.as_bytes()).is_some() {
            return rule.mount_point;
        }
    }
    MountPoint::None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<MountPointRule> {
        vec![
            MountPointRule {
                needle: "/mnt/remote".to_string(),
                mount_point: MountPoint::Remote,
            },
            MountPointRule {
                needle: "/data".to_string(),
                mount_point: MountPoint::Local,
            },
        ]
    }

    #[test]
    fn matches_substring_not_just_prefix() {
        // "/data" is not a prefix of this path, only a substring, and still matches.
        let resolved = classify("/srv/backing/data/file.txt", &rules());
        assert_eq!(resolved, MountPoint::Local);
    }

    #[test]
    fn first_rule_wins_on_overlap() {
        let resolved = classify("/mnt/remote/data/file.txt", &rules());
        assert_eq!(resolved, MountPoint::Remote);
    }

    #[test]
    fn no_match_yields_none() {
        let resolved = classify("/etc/hosts", &rules());
        assert_eq!(resolved, MountPoint::None);
    }
}
