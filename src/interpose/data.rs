//! Data-category interposers: `read`/`write` and their positioned (`pread`/`pwrite`) and
//! 64-bit variants, plus `mmap`/`munmap`. These classify by fd against the descriptor table
//! populated by the metadata-category `open` family, rather than reclassifying a path.

use std::os::raw::{c_int, c_void};

use crate::context;
use crate::interpose::dispatch::{category_enabled, classify_fd, record, record_bypass, should_enforce, submit};
use crate::interpose::macros::native_fn;
use crate::ops::{Data, OpCategory, Operation};
use crate::resolver::SymbolCache;

type ReadFn = unsafe extern "C" fn(c_int, *mut c_void, libc::size_t) -> isize;
type WriteFn = unsafe extern "C" fn(c_int, *const c_void, libc::size_t) -> isize;
type PreadFn = unsafe extern "C" fn(c_int, *mut c_void, libc::size_t, libc::off_t) -> isize;
type PwriteFn = unsafe extern "C" fn(c_int, *const c_void, libc::size_t, libc::off_t) -> isize;
type MmapFn =
    unsafe extern "C" fn(*mut c_void, libc::size_t, c_int, c_int, c_int, libc::off_t) -> *mut c_void;
type MunmapFn = unsafe extern "C" fn(*mut c_void, libc::size_t) -> c_int;

static READ: SymbolCache = SymbolCache::new();
static WRITE: SymbolCache = SymbolCache::new();
static PREAD: SymbolCache = SymbolCache::new();
static PWRITE: SymbolCache = SymbolCache::new();
static PREAD64: SymbolCache = SymbolCache::new();
static PWRITE64: SymbolCache = SymbolCache::new();
static MMAP: SymbolCache = SymbolCache::new();
static MUNMAP: SymbolCache = SymbolCache::new();

/// # Safety
/// `buf` must be valid for writes of `count` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn read(fd: c_int, buf: *mut c_void, count: libc::size_t) -> isize {
    let native: ReadFn = native_fn!(&READ, "read", ReadFn);
    let op = Operation::Data(Data::Read);
    let Some(ctx) = context::layer() else {
        return unsafe { native(fd, buf, count) };
    };
    if !category_enabled(ctx, OpCategory::Data) {
        let result = unsafe { native(fd, buf, count) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow, _path) = classify_fd(ctx, fd);
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, count as u64);
    }
    let n = unsafe { native(fd, buf, count) };
    if should_enforce(workflow) {
        record(ctx, op, n.max(0) as u64, n < 0);
    } else {
        record_bypass(ctx, op);
    }
    n
}

/// # Safety
/// `buf` must be valid for reads of `count` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn write(fd: c_int, buf: *const c_void, count: libc::size_t) -> isize {
    let native: WriteFn = native_fn!(&WRITE, "write", WriteFn);
    let op = Operation::Data(Data::Write);
    let Some(ctx) = context::layer() else {
        return unsafe { native(fd, buf, count) };
    };
    if !category_enabled(ctx, OpCategory::Data) {
        let result = unsafe { native(fd, buf, count) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow, _path) = classify_fd(ctx, fd);
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, count as u64);
    }
    let n = unsafe { native(fd, buf, count) };
    if should_enforce(workflow) {
        record(ctx, op, n.max(0) as u64, n < 0);
    } else {
        record_bypass(ctx, op);
    }
    n
}

/// # Safety
/// `buf` must be valid for writes of `count` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pread(
    fd: c_int,
    buf: *mut c_void,
    count: libc::size_t,
    offset: libc::off_t,
) -> isize {
    let native: PreadFn = native_fn!(&PREAD, "pread", PreadFn);
    let op = Operation::Data(Data::Pread);
    let Some(ctx) = context::layer() else {
        return unsafe { native(fd, buf, count, offset) };
    };
    if !category_enabled(ctx, OpCategory::Data) {
        let result = unsafe { native(fd, buf, count, offset) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow, _path) = classify_fd(ctx, fd);
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, count as u64);
    }
    let n = unsafe { native(fd, buf, count, offset) };
    if should_enforce(workflow) {
        record(ctx, op, n.max(0) as u64, n < 0);
    } else {
        record_bypass(ctx, op);
    }
    n
}

/// # Safety
/// `buf` must be valid for reads of `count` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pwrite(
    fd: c_int,
    buf: *const c_void,
    count: libc::size_t,
    offset: libc::off_t,
) -> isize {
    let native: PwriteFn = native_fn!(&PWRITE, "pwrite", PwriteFn);
    let op = Operation::Data(Data::Pwrite);
    let Some(ctx) = context::layer() else {
        return unsafe { native(fd, buf, count, offset) };
    };
    if !category_enabled(ctx, OpCategory::Data) {
        let result = unsafe { native(fd, buf, count, offset) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow, _path) = classify_fd(ctx, fd);
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, count as u64);
    }
    let n = unsafe { native(fd, buf, count, offset) };
    if should_enforce(workflow) {
        record(ctx, op, n.max(0) as u64, n < 0);
    } else {
        record_bypass(ctx, op);
    }
    n
}

/// # Safety
/// `buf` must be valid for writes of `count` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pread64(
    fd: c_int,
    buf: *mut c_void,
    count: libc::size_t,
    offset: libc::off_t,
) -> isize {
    let native: PreadFn = native_fn!(&PREAD64, "pread64", PreadFn);
    let op = Operation::Data(Data::Pread64);
    let Some(ctx) = context::layer() else {
        return unsafe { native(fd, buf, count, offset) };
    };
    if !category_enabled(ctx, OpCategory::Data) {
        let result = unsafe { native(fd, buf, count, offset) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow, _path) = classify_fd(ctx, fd);
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, count as u64);
    }
    let n = unsafe { native(fd, buf, count, offset) };
    if should_enforce(workflow) {
        record(ctx, op, n.max(0) as u64, n < 0);
    } else {
        record_bypass(ctx, op);
    }
    n
}

/// # Safety
/// `buf` must be valid for reads of `count` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pwrite64(
    fd: c_int,
    buf: *const c_void,
    count: libc::size_t,
    offset: libc::off_t,
) -> isize {
    let native: PwriteFn = native_fn!(&PWRITE64, "pwrite64", PwriteFn);
    let op = Operation::Data(Data::Pwrite64);
    let Some(ctx) = context::layer() else {
        return unsafe { native(fd, buf, count, offset) };
    };
    if !category_enabled(ctx, OpCategory::Data) {
        let result = unsafe { native(fd, buf, count, offset) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow, _path) = classify_fd(ctx, fd);
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, count as u64);
    }
    let n = unsafe { native(fd, buf, count, offset) };
    if should_enforce(workflow) {
        record(ctx, op, n.max(0) as u64, n < 0);
    } else {
        record_bypass(ctx, op);
    }
    n
}

/// # Safety
/// Same contract as the real `mmap(2)`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mmap(
    addr: *mut c_void,
    length: libc::size_t,
    prot: c_int,
    flags: c_int,
    fd: c_int,
    offset: libc::off_t,
) -> *mut c_void {
    let native: MmapFn = native_fn!(&MMAP, "mmap", MmapFn);
    let op = Operation::Data(Data::Mmap);
    let Some(ctx) = context::layer() else {
        return unsafe { native(addr, length, prot, flags, fd, offset) };
    };
    if !category_enabled(ctx, OpCategory::Data) {
        let result = unsafe { native(addr, length, prot, flags, fd, offset) };
        record_bypass(ctx, op);
        return result;
    }
    let (mount_point, workflow, _path) = classify_fd(ctx, fd);
    if should_enforce(workflow) {
        submit(ctx, op, mount_point, workflow, length as u64);
    }
    let result = unsafe { native(addr, length, prot, flags, fd, offset) };
    if should_enforce(workflow) {
        record(ctx, op, length as u64, result == libc::MAP_FAILED);
    } else {
        record_bypass(ctx, op);
    }
    result
}

/// # Safety
/// `addr` must have been returned by a prior `mmap` call and `length` must match.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn munmap(addr: *mut c_void, length: libc::size_t) -> c_int {
    let native: MunmapFn = native_fn!(&MUNMAP, "munmap", MunmapFn);
    let op = Operation::Data(Data::Munmap);
    let Some(ctx) = context::layer() else {
        return unsafe { native(addr, length) };
    };
    if !category_enabled(ctx, OpCategory::Data) {
        let result = unsafe { native(addr, length) };
        record_bypass(ctx, op);
        return result;
    }
    // `munmap` has no fd to classify against; the corresponding `mmap` already accounted for
    // the mapped bytes, so this is always counted as a bypass-for-classification op.
    let result = unsafe { native(addr, length) };
    record_bypass(ctx, op);
    result
}
