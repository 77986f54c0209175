//! Ambient configuration: environment variables, the per-operation intercept mask, and the
//! defaults the layer falls back to when a variable is unset — mirroring `original_source`'s
//! `options.hpp` default table.

use bitflags::bitflags;

use crate::error::CoreError;
use crate::policy::EngineConstructionParams;
use crate::table::mount_point::{MountPoint, MountPointRule};

bitflags! {
    /// Per-category compile-time-configurable toggle, checked as step 2 of the dispatch
    /// template (spec.md §4.E): an operation whose category bit is clear skips classification
    /// and enforcement entirely and calls straight through to the native function.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterceptMask: u8 {
        const METADATA            = 0b0000_0001;
        const DATA                = 0b0000_0010;
        const DIRECTORY           = 0b0000_0100;
        const EXTENDED_ATTRIBUTES = 0b0000_1000;
        const SPECIAL             = 0b0001_0000;
        const ALL = Self::METADATA.bits()
            | Self::DATA.bits()
            | Self::DIRECTORY.bits()
            | Self::EXTENDED_ATTRIBUTES.bits()
            | Self::SPECIAL.bits();
    }
}

/// Fully resolved runtime configuration, built once at layer initialization from environment
/// variables (spec.md §6).
pub struct Config {
    pub intercept_mask: InterceptMask,
    pub mount_point_rules: Vec<MountPointRule>,
    pub workflows_per_mount_point: u32,
    pub engine: EngineConstructionParams,
    pub log_file: Option<String>,
    pub stats_file: Option<String>,
}

impl Config {
    /// Reads the environment variables of spec.md §6. `padll_workflows` is mandatory: an
    /// absent or non-positive value is a fatal configuration error (spec.md §6, §7 kind 6),
    /// mirroring `original_source`'s `options.hpp::option_padll_workflows()`, which throws
    /// `std::runtime_error` in exactly those cases. Every other variable has a documented
    /// fallback and can never fail initialization.
    pub fn from_env() -> Result<Self, CoreError> {
        let workflows_per_mount_point = parse_workflow_count(std::env::var("padll_workflows").ok())?;
        Ok(Config {
            intercept_mask: parse_mask(std::env::var("padll_intercept_mask").ok()),
            mount_point_rules: parse_mount_points(std::env::var("padll_mount_points").ok()),
            workflows_per_mount_point,
            engine: match std::env::var("padll_engine_endpoint") {
                Ok(endpoint) if !endpoint.is_empty() => {
                    EngineConstructionParams::Online { endpoint }
                }
                _ => EngineConstructionParams::Offline,
            },
            log_file: std::env::var("padll_log_file").ok(),
            stats_file: std::env::var("padll_stats_file").ok(),
        })
    }
}

/// Parses `padll_workflows`. Absent, unparseable, zero, or negative all fail initialization
/// (spec.md §6 "Absent or non-positive ⇒ fatal init error").
fn parse_workflow_count(raw: Option<String>) -> Result<u32, CoreError> {
    let raw = raw.ok_or_else(|| {
        CoreError::InitializationFailure("padll_workflows is not set".to_string())
    })?;
    let count: i64 = raw.trim().parse().map_err(|_| {
        CoreError::InitializationFailure(format!("padll_workflows `{raw}` is not an integer"))
    })?;
    if count <= 0 {
        return Err(CoreError::InitializationFailure(format!(
            "padll_workflows must be positive, got `{count}`"
        )));
    }
    Ok(count as u32)
}

/// Parses `padll_intercept_mask`, a comma-separated list of category names (case-insensitive).
/// An unset or unparseable variable defaults to intercepting every category.
fn parse_mask(raw: Option<String>) -> InterceptMask {
    let Some(raw) = raw else {
        return InterceptMask::ALL;
    };
    let mut mask = InterceptMask::empty();
    for token in raw.split(',') {
        match token.trim().to_ascii_lowercase().as_str() {
            "metadata" => mask |= InterceptMask::METADATA,
            "data" => mask |= InterceptMask::DATA,
            "directory" => mask |= InterceptMask::DIRECTORY,
            "xattr" | "extended_attributes" => mask |= InterceptMask::EXTENDED_ATTRIBUTES,
            "special" => mask |= InterceptMask::SPECIAL,
            "" => {}
            other => log::warn!("ignoring unknown intercept-mask token `{other}`"),
        }
    }
    if mask.is_empty() {
        InterceptMask::ALL
    } else {
        mask
    }
}

/// Parses `padll_mount_points`, formatted as `needle=class;needle=class;...` where `class` is
/// `local` or `remote`. Malformed entries are logged and skipped rather than aborting startup.
fn parse_mount_points(raw: Option<String>) -> Vec<MountPointRule> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    raw.split(';')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (needle, class) = entry.split_once('=')?;
            let mount_point = match class.trim().to_ascii_lowercase().as_str() {
                "local" => MountPoint::Local,
                "remote" => MountPoint::Remote,
                other => {
                    log::warn!("ignoring mount-point entry with unknown class `{other}`");
                    return None;
                }
            };
            Some(MountPointRule {
                needle: needle.trim().to_string(),
                mount_point,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_mask_defaults_to_all() {
        assert_eq!(parse_mask(None), InterceptMask::ALL);
    }

    #[test]
    fn mask_parses_known_tokens() {
        let mask = parse_mask(Some("data,xattr".to_string()));
        assert!(mask.contains(InterceptMask::DATA));
        assert!(mask.contains(InterceptMask::EXTENDED_ATTRIBUTES));
        assert!(!mask.contains(InterceptMask::METADATA));
    }

    #[test]
    fn mask_falls_back_to_all_when_every_token_is_unknown() {
        let mask = parse_mask(Some("bogus".to_string()));
        assert_eq!(mask, InterceptMask::ALL);
    }

    #[test]
    fn workflow_count_rejects_missing_variable() {
        assert!(parse_workflow_count(None).is_err());
    }

    #[test]
    fn workflow_count_rejects_unparseable_value() {
        assert!(parse_workflow_count(Some("not-a-number".to_string())).is_err());
    }

    #[test]
    fn workflow_count_rejects_zero_and_negative() {
        assert!(parse_workflow_count(Some("0".to_string())).is_err());
        assert!(parse_workflow_count(Some("-1".to_string())).is_err());
    }

    #[test]
    fn workflow_count_accepts_positive_value() {
        assert_eq!(parse_workflow_count(Some("4".to_string())).unwrap(), 4);
    }

    #[test]
    fn mount_points_parse_multiple_entries() {
        let rules = parse_mount_points(Some("/mnt/a=remote;/mnt/b=local".to_string()));
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].mount_point, MountPoint::Remote);
        assert_eq!(rules[1].mount_point, MountPoint::Local);
    }

    #[test]
    fn malformed_mount_point_entry_is_skipped() {
        let rules = parse_mount_points(Some("/mnt/a=remote;garbage;/mnt/b=local".to_string()));
        assert_eq!(rules.len(), 2);
    }
}
