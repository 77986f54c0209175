//! Directory-category interposers: `mkdir`/`mkdirat`, `rmdir`, `mknod`/`mknodat`.

use std::os::raw::{c_char, c_int};

use crate::context;
use crate::interpose::dispatch::{category_enabled, classify_path, record, record_bypass, should_enforce, submit};
use crate::interpose::macros::native_fn;
use crate::ops::{Directory, OpCategory, Operation};
use crate::resolver::SymbolCache;

type MkdirFn = unsafe extern "C" fn(*const c_char, libc::mode_t) -> c_int;
type MkdiratFn = unsafe extern "C" fn(c_int, *const c_char, libc::mode_t) -> c_int;
type RmdirFn = unsafe extern "C" fn(*const c_char) -> c_int;
type MknodFn = unsafe extern "C" fn(*const c_char, libc::mode_t, libc::dev_t) -> c_int;
type MknodatFn = unsafe extern "C" fn(c_int, *const c_char, libc::mode_t, libc::dev_t) -> c_int;

static MKDIR: SymbolCache = SymbolCache::new();
static MKDIRAT: SymbolCache = SymbolCache::new();
static RMDIR: SymbolCache = SymbolCache::new();
static MKNOD: SymbolCache = SymbolCache::new();
static MKNODAT: SymbolCache = SymbolCache::new();

/// # Safety
/// `path` must be a valid, NUL-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mkdir(path: *const c_char, mode: libc::mode_t) -> c_int {
    let native: MkdirFn = native_fn!(&MKDIR, "mkdir", MkdirFn);
    let op = Operation::Directory(Directory::Mkdir);
    let Some(ctx) = context::layer() else {
        return unsafe { native(path, mode) };
    };
    if !category_enabled(ctx, OpCategory::Directory) {
        let result = unsafe { native(path, mode) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow) = unsafe { classify_path(ctx, path) };
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, 1);
    }
    let result = unsafe { native(path, mode) };
    if should_enforce(workflow) {
        record(ctx, op, 0, result != 0);
    } else {
        record_bypass(ctx, op);
    }
    result
}

/// # Safety
/// `path` must be a valid, NUL-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mkdirat(dirfd: c_int, path: *const c_char, mode: libc::mode_t) -> c_int {
    let native: MkdiratFn = native_fn!(&MKDIRAT, "mkdirat", MkdiratFn);
    let op = Operation::Directory(Directory::Mkdirat);
    let Some(ctx) = context::layer() else {
        return unsafe { native(dirfd, path, mode) };
    };
    if !category_enabled(ctx, OpCategory::Directory) {
        let result = unsafe { native(dirfd, path, mode) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow) = unsafe { classify_path(ctx, path) };
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, 1);
    }
    let result = unsafe { native(dirfd, path, mode) };
    if should_enforce(workflow) {
        record(ctx, op, 0, result != 0);
    } else {
        record_bypass(ctx, op);
    }
    result
}

/// # Safety
/// `path` must be a valid, NUL-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rmdir(path: *const c_char) -> c_int {
    let native: RmdirFn = native_fn!(&RMDIR, "rmdir", RmdirFn);
    let op = Operation::Directory(Directory::Rmdir);
    let Some(ctx) = context::layer() else {
        return unsafe { native(path) };
    };
    if !category_enabled(ctx, OpCategory::Directory) {
        let result = unsafe { native(path) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow) = unsafe { classify_path(ctx, path) };
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, 1);
    }
    let result = unsafe { native(path) };
    if should_enforce(workflow) {
        record(ctx, op, 0, result != 0);
    } else {
        record_bypass(ctx, op);
    }
    result
}

/// # Safety
/// `path` must be a valid, NUL-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mknod(path: *const c_char, mode: libc::mode_t, dev: libc::dev_t) -> c_int {
    let native: MknodFn = native_fn!(&MKNOD, "mknod", MknodFn);
    let op = Operation::Directory(Directory::Mknod);
    let Some(ctx) = context::layer() else {
        return unsafe { native(path, mode, dev) };
    };
    if !category_enabled(ctx, OpCategory::Directory) {
        let result = unsafe { native(path, mode, dev) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow) = unsafe { classify_path(ctx, path) };
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, 1);
    }
    let result = unsafe { native(path, mode, dev) };
    if should_enforce(workflow) {
        record(ctx, op, 0, result != 0);
    } else {
        record_bypass(ctx, op);
    }
    result
}

/// # Safety
/// `path` must be a valid, NUL-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mknodat(
    dirfd: c_int,
    path: *const c_char,
    mode: libc::mode_t,
    dev: libc::dev_t,
) -> c_int {
    let native: MknodatFn = native_fn!(&MKNODAT, "mknodat", MknodatFn);
    let op = Operation::Directory(Directory::Mknodat);
    let Some(ctx) = context::layer() else {
        return unsafe { native(dirfd, path, mode, dev) };
    };
    if !category_enabled(ctx, OpCategory::Directory) {
        let result = unsafe { native(dirfd, path, mode, dev) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow) = unsafe { classify_path(ctx, path) };
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, 1);
    }
    let result = unsafe { native(dirfd, path, mode, dev) };
    if should_enforce(workflow) {
        record(ctx, op, 0, result != 0);
    } else {
        record_bypass(ctx, op);
    }
    result
}
