//! Operation and category enumerations shared by the statistics registry, the policy-engine
//! client, and the dispatch front end.
//!
//! Numbering follows `original_source`'s `libc_enums.hpp` so that a deployment comparing logs
//! or engine traces against the prior C++ core sees the same integer tags.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Coarse category used to route an [`Operation`] to the right statistics bucket and to tell
/// the policy engine which channel class a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serializable", derive(serde::Serialize))]
#[repr(u8)]
pub enum OpCategory {
    Metadata = 1,
    Data = 2,
    Directory = 3,
    ExtendedAttributes = 4,
    Special = 5,
}

impl OpCategory {
    pub const ALL: [OpCategory; 5] = [
        OpCategory::Metadata,
        OpCategory::Data,
        OpCategory::Directory,
        OpCategory::ExtendedAttributes,
        OpCategory::Special,
    ];

    /// Number of [`Operation`] slots reserved for this category's statistics vector.
    pub const fn slot_count(self) -> usize {
        match self {
            OpCategory::Metadata => Metadata::COUNT,
            OpCategory::Data => Data::COUNT,
            OpCategory::Directory => Directory::COUNT,
            OpCategory::ExtendedAttributes => ExtendedAttributes::COUNT,
            OpCategory::Special => Special::COUNT,
        }
    }
}

/// Metadata-category operations (spec.md §6 "Metadata" entry-point set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum Metadata {
    Open = 1,
    OpenVariadic = 2,
    Open64 = 3,
    Open64Variadic = 4,
    Creat = 5,
    Creat64 = 6,
    Openat = 7,
    OpenatVariadic = 8,
    Close = 9,
    Sync = 10,
    Statfs = 11,
    Fstatfs = 12,
    Statfs64 = 13,
    Fstatfs64 = 14,
    Unlink = 15,
    Unlinkat = 16,
    Rename = 17,
    Renameat = 18,
    Fopen = 19,
    Fopen64 = 20,
    Fclose = 21,
}

impl Metadata {
    pub(crate) const COUNT: usize = 21;
}

/// Data-category operations (spec.md §6 "Data" entry-point set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum Data {
    Read = 1,
    Write = 2,
    Pread = 3,
    Pwrite = 4,
    Pread64 = 5,
    Pwrite64 = 6,
    Mmap = 7,
    Munmap = 8,
}

impl Data {
    pub(crate) const COUNT: usize = 8;
}

/// Directory-category operations (spec.md §6 "Directory" entry-point set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum Directory {
    Mkdir = 1,
    Mkdirat = 2,
    Rmdir = 3,
    Mknod = 4,
    Mknodat = 5,
}

impl Directory {
    pub(crate) const COUNT: usize = 5;
}

/// Extended-attribute-category operations (spec.md §6 "Extended attributes" entry-point set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum ExtendedAttributes {
    Getxattr = 1,
    Lgetxattr = 2,
    Fgetxattr = 3,
    Setxattr = 4,
    Lsetxattr = 5,
    Fsetxattr = 6,
    Listxattr = 7,
    Llistxattr = 8,
    Flistxattr = 9,
}

impl ExtendedAttributes {
    pub(crate) const COUNT: usize = 9;
}

/// Special-category operations (spec.md §6 "Special" entry-point set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum Special {
    Socket = 1,
    Fcntl = 2,
}

impl Special {
    pub(crate) const COUNT: usize = 2;
}

/// A fully-qualified operation identifier: its category plus its within-category index.
///
/// This is what gets handed to the statistics registry (to index the right counter) and, via
/// its numeric tag, to the policy engine (`op_type` in the context record of spec.md §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Metadata(Metadata),
    Data(Data),
    Directory(Directory),
    ExtendedAttributes(ExtendedAttributes),
    Special(Special),
}

impl Operation {
    pub fn category(self) -> OpCategory {
        match self {
            Operation::Metadata(_) => OpCategory::Metadata,
            Operation::Data(_) => OpCategory::Data,
            Operation::Directory(_) => OpCategory::Directory,
            Operation::ExtendedAttributes(_) => OpCategory::ExtendedAttributes,
            Operation::Special(_) => OpCategory::Special,
        }
    }

    /// Zero-based slot within the category's statistics vector.
    pub fn slot(self) -> usize {
        let tag: i32 = match self {
            Operation::Metadata(op) => op.into(),
            Operation::Data(op) => op.into(),
            Operation::Directory(op) => op.into(),
            Operation::ExtendedAttributes(op) => op.into(),
            Operation::Special(op) => op.into(),
        };
        (tag - 1) as usize
    }

    /// Numeric tag handed to the policy engine as `op_type`.
    pub fn wire_tag(self) -> i32 {
        match self {
            Operation::Metadata(op) => op.into(),
            Operation::Data(op) => op.into(),
            Operation::Directory(op) => op.into(),
            Operation::ExtendedAttributes(op) => op.into(),
            Operation::Special(op) => op.into(),
        }
    }

    /// Short name used in log messages, mirroring the `__func__`-derived names the C++ core
    /// logged (e.g. `ld_preloaded_posix_open`).
    pub fn name(self) -> &'static str {
        match self {
            Operation::Metadata(Metadata::Open) => "open",
            Operation::Metadata(Metadata::OpenVariadic) => "open_variadic",
            Operation::Metadata(Metadata::Open64) => "open64",
            Operation::Metadata(Metadata::Open64Variadic) => "open64_variadic",
            Operation::Metadata(Metadata::Creat) => "creat",
            Operation::Metadata(Metadata::Creat64) => "creat64",
            Operation::Metadata(Metadata::Openat) => "openat",
            Operation::Metadata(Metadata::OpenatVariadic) => "openat_variadic",
            Operation::Metadata(Metadata::Close) => "close",
            Operation::Metadata(Metadata::Sync) => "sync",
            Operation::Metadata(Metadata::Statfs) => "statfs",
            Operation::Metadata(Metadata::Fstatfs) => "fstatfs",
            Operation::Metadata(Metadata::Statfs64) => "statfs64",
            Operation::Metadata(Metadata::Fstatfs64) => "fstatfs64",
            Operation::Metadata(Metadata::Unlink) => "unlink",
            Operation::Metadata(Metadata::Unlinkat) => "unlinkat",
            Operation::Metadata(Metadata::Rename) => "rename",
            Operation::Metadata(Metadata::Renameat) => "renameat",
            Operation::Metadata(Metadata::Fopen) => "fopen",
            Operation::Metadata(Metadata::Fopen64) => "fopen64",
            Operation::Metadata(Metadata::Fclose) => "fclose",
            Operation::Data(Data::Read) => "read",
            Operation::Data(Data::Write) => "write",
            Operation::Data(Data::Pread) => "pread",
            Operation::Data(Data::Pwrite) => "pwrite",
            Operation::Data(Data::Pread64) => "pread64",
            Operation::Data(Data::Pwrite64) => "pwrite64",
            Operation::Data(Data::Mmap) => "mmap",
            Operation::Data(Data::Munmap) => "munmap",
            Operation::Directory(Directory::Mkdir) => "mkdir",
            Operation::Directory(Directory::Mkdirat) => "mkdirat",
            Operation::Directory(Directory::Rmdir) => "rmdir",
            Operation::Directory(Directory::Mknod) => "mknod",
            Operation::Directory(Directory::Mknodat) => "mknodat",
            Operation::ExtendedAttributes(ExtendedAttributes::Getxattr) => "getxattr",
            Operation::ExtendedAttributes(ExtendedAttributes::Lgetxattr) => "lgetxattr",
            Operation::ExtendedAttributes(ExtendedAttributes::Fgetxattr) => "fgetxattr",
            Operation::ExtendedAttributes(ExtendedAttributes::Setxattr) => "setxattr",
            Operation::ExtendedAttributes(ExtendedAttributes::Lsetxattr) => "lsetxattr",
            Operation::ExtendedAttributes(ExtendedAttributes::Fsetxattr) => "fsetxattr",
            Operation::ExtendedAttributes(ExtendedAttributes::Listxattr) => "listxattr",
            Operation::ExtendedAttributes(ExtendedAttributes::Llistxattr) => "llistxattr",
            Operation::ExtendedAttributes(ExtendedAttributes::Flistxattr) => "flistxattr",
            Operation::Special(Special::Socket) => "socket",
            Operation::Special(Special::Fcntl) => "fcntl",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_slot_counts_match_enum_sizes() {
        assert_eq!(OpCategory::Metadata.slot_count(), 21);
        assert_eq!(OpCategory::Data.slot_count(), 8);
        assert_eq!(OpCategory::Directory.slot_count(), 5);
        assert_eq!(OpCategory::ExtendedAttributes.slot_count(), 9);
        assert_eq!(OpCategory::Special.slot_count(), 2);
    }

    #[test]
    fn slot_is_zero_based() {
        assert_eq!(Operation::Data(Data::Read).slot(), 0);
        assert_eq!(Operation::Data(Data::Munmap).slot(), 7);
        assert_eq!(Operation::Metadata(Metadata::Fclose).slot(), 20);
    }

    #[test]
    fn category_mapping_is_consistent() {
        assert_eq!(Operation::Special(Special::Fcntl).category(), OpCategory::Special);
        assert_eq!(
            Operation::ExtendedAttributes(ExtendedAttributes::Flistxattr).category(),
            OpCategory::ExtendedAttributes
        );
    }
}
