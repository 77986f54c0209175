//! Extended-attribute-category interposers: `getxattr`/`lgetxattr`/`fgetxattr`,
//! `setxattr`/`lsetxattr`/`fsetxattr`, `listxattr`/`llistxattr`/`flistxattr`.

use std::os::raw::{c_char, c_int, c_void};

use crate::context;
use crate::interpose::dispatch::{category_enabled, classify_fd, classify_path, record, record_bypass, should_enforce, submit};
use crate::interpose::macros::native_fn;
use crate::ops::{ExtendedAttributes, OpCategory, Operation};
use crate::resolver::SymbolCache;

type GetxattrFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *mut c_void, libc::size_t) -> isize;
type FgetxattrFn = unsafe extern "C" fn(c_int, *const c_char, *mut c_void, libc::size_t) -> isize;
type SetxattrFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *const c_void, libc::size_t, c_int) -> c_int;
type FsetxattrFn =
    unsafe extern "C" fn(c_int, *const c_char, *const c_void, libc::size_t, c_int) -> c_int;
type ListxattrFn = unsafe extern "C" fn(*const c_char, *mut c_char, libc::size_t) -> isize;
type FlistxattrFn = unsafe extern "C" fn(c_int, *mut c_char, libc::size_t) -> isize;

static GETXATTR: SymbolCache = SymbolCache::new();
static LGETXATTR: SymbolCache = SymbolCache::new();
static FGETXATTR: SymbolCache = SymbolCache::new();
static SETXATTR: SymbolCache = SymbolCache::new();
static LSETXATTR: SymbolCache = SymbolCache::new();
static FSETXATTR: SymbolCache = SymbolCache::new();
static LISTXATTR: SymbolCache = SymbolCache::new();
static LLISTXATTR: SymbolCache = SymbolCache::new();
static FLISTXATTR: SymbolCache = SymbolCache::new();

macro_rules! path_xattr_get {
    ($fn_name:ident, $symbol:literal, $cache:expr, $op:expr) => {
        /// # Safety
        /// `path` and `name` must be valid, NUL-terminated C strings; `value` must be valid for
        /// writes of `size` bytes.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $fn_name(
            path: *const c_char,
            name: *const c_char,
            value: *mut c_void,
            size: libc::size_t,
        ) -> isize {
            let native: GetxattrFn = native_fn!($cache, $symbol, GetxattrFn);
            let op = $op;
            let Some(ctx) = context::layer() else {
                return unsafe { native(path, name, value, size) };
            };
            if !category_enabled(ctx, OpCategory::ExtendedAttributes) {
                let result = unsafe { native(path, name, value, size) };
                record_bypass(ctx, op);
                return result;
            }
            let (mount_point, workflow) = unsafe { classify_path(ctx, path) };
            if should_enforce(workflow) {
                submit(ctx, op, mount_point, workflow, 1);
            }
            let result = unsafe { native(path, name, value, size) };
            if should_enforce(workflow) {
                record(ctx, op, result.max(0) as u64, result < 0);
            } else {
                record_bypass(ctx, op);
            }
            result
        }
    };
}

path_xattr_get!(getxattr, "getxattr", &GETXATTR, Operation::ExtendedAttributes(ExtendedAttributes::Getxattr));
path_xattr_get!(lgetxattr, "lgetxattr", &LGETXATTR, Operation::ExtendedAttributes(ExtendedAttributes::Lgetxattr));

/// # Safety
/// `name` must be a valid, NUL-terminated C string; `value` must be valid for writes of `size`
/// bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fgetxattr(
    fd: c_int,
    name: *const c_char,
    value: *mut c_void,
    size: libc::size_t,
) -> isize {
    let native: FgetxattrFn = native_fn!(&FGETXATTR, "fgetxattr", FgetxattrFn);
    let op = Operation::ExtendedAttributes(ExtendedAttributes::Fgetxattr);
    let Some(ctx) = context::layer() else {
        return unsafe { native(fd, name, value, size) };
    };
    if !category_enabled(ctx, OpCategory::ExtendedAttributes) {
        let result = unsafe { native(fd, name, value, size) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow, _path) = classify_fd(ctx, fd);
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, 1);
    }
    let result = unsafe { native(fd, name, value, size) };
    if should_enforce(workflow) {
        record(ctx, op, result.max(0) as u64, result < 0);
    } else {
        record_bypass(ctx, op);
    }
    result
}

macro_rules! path_xattr_set {
    ($fn_name:ident, $symbol:literal, $cache:expr, $op:expr) => {
        /// # Safety
        /// `path` and `name` must be valid, NUL-terminated C strings; `value` must be valid for
        /// reads of `size` bytes.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $fn_name(
            path: *const c_char,
            name: *const c_char,
            value: *const c_void,
            size: libc::size_t,
            flags: c_int,
        ) -> c_int {
            let native: SetxattrFn = native_fn!($cache, $symbol, SetxattrFn);
            let op = $op;
            let Some(ctx) = context::layer() else {
                return unsafe { native(path, name, value, size, flags) };
            };
            if !category_enabled(ctx, OpCategory::ExtendedAttributes) {
                let result = unsafe { native(path, name, value, size, flags) };
                record_bypass(ctx, op);
                return result;
            }
            let (mount_point, workflow) = unsafe { classify_path(ctx, path) };
            if should_enforce(workflow) {
                submit(ctx, op, mount_point, workflow, 1);
            }
            let result = unsafe { native(path, name, value, size, flags) };
            if should_enforce(workflow) {
                record(ctx, op, size as u64, result != 0);
            } else {
                record_bypass(ctx, op);
            }
            result
        }
    };
}

path_xattr_set!(setxattr, "setxattr", &SETXATTR, Operation::ExtendedAttributes(ExtendedAttributes::Setxattr));
path_xattr_set!(lsetxattr, "lsetxattr", &LSETXATTR, Operation::ExtendedAttributes(ExtendedAttributes::Lsetxattr));

/// # Safety
/// `name` must be a valid, NUL-terminated C string; `value` must be valid for reads of `size`
/// bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fsetxattr(
    fd: c_int,
    name: *const c_char,
    value: *const c_void,
    size: libc::size_t,
    flags: c_int,
) -> c_int {
    let native: FsetxattrFn = native_fn!(&FSETXATTR, "fsetxattr", FsetxattrFn);
    let op = Operation::ExtendedAttributes(ExtendedAttributes::Fsetxattr);
    let Some(ctx) = context::layer() else {
        return unsafe { native(fd, name, value, size, flags) };
    };
    if !category_enabled(ctx, OpCategory::ExtendedAttributes) {
        let result = unsafe { native(fd, name, value, size, flags) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow, _path) = classify_fd(ctx, fd);
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, 1);
    }
    let result = unsafe { native(fd, name, value, size, flags) };
    if should_enforce(workflow) {
        record(ctx, op, size as u64, result != 0);
    } else {
        record_bypass(ctx, op);
    }
    result
}

macro_rules! path_xattr_list {
    ($fn_name:ident, $symbol:literal, $cache:expr, $op:expr) => {
        /// # Safety
        /// `path` must be a valid, NUL-terminated C string; `list` must be valid for writes of
        /// `size` bytes.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $fn_name(
            path: *const c_char,
            list: *mut c_char,
            size: libc::size_t,
        ) -> isize {
            let native: ListxattrFn = native_fn!($cache, $symbol, ListxattrFn);
            let op = $op;
            let Some(ctx) = context::layer() else {
                return unsafe { native(path, list, size) };
            };
            if !category_enabled(ctx, OpCategory::ExtendedAttributes) {
                let result = unsafe { native(path, list, size) };
                record_bypass(ctx, op);
                return result;
            }
            let (mount_point, workflow) = unsafe { classify_path(ctx, path) };
            if should_enforce(workflow) {
                submit(ctx, op, mount_point, workflow, 1);
            }
            let result = unsafe { native(path, list, size) };
            if should_enforce(workflow) {
                record(ctx, op, result.max(0) as u64, result < 0);
            } else {
                record_bypass(ctx, op);
            }
            result
        }
    };
}

path_xattr_list!(listxattr, "listxattr", &LISTXATTR, Operation::ExtendedAttributes(ExtendedAttributes::Listxattr));
path_xattr_list!(llistxattr, "llistxattr", &LLISTXATTR, Operation::ExtendedAttributes(ExtendedAttributes::Llistxattr));

/// # Safety
/// `list` must be valid for writes of `size` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn flistxattr(fd: c_int, list: *mut c_char, size: libc::size_t) -> isize {
    let native: FlistxattrFn = native_fn!(&FLISTXATTR, "flistxattr", FlistxattrFn);
    let op = Operation::ExtendedAttributes(ExtendedAttributes::Flistxattr);
    let Some(ctx) = context::layer() else {
        return unsafe { native(fd, list, size) };
    };
    if !category_enabled(ctx, OpCategory::ExtendedAttributes) {
        let result = unsafe { native(fd, list, size) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow, _path) = classify_fd(ctx, fd);
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, 1);
    }
    let result = unsafe { native(fd, list, size) };
    if should_enforce(workflow) {
        record(ctx, op, result.max(0) as u64, result < 0);
    } else {
        record_bypass(ctx, op);
    }
    result
}
