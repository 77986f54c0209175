//! Special-category interposers: `socket` and `fcntl`.
//!
//! Neither has a filesystem path to classify. `socket` is counted purely for visibility;
//! `fcntl` additionally drives descriptor-table bookkeeping when it duplicates an fd
//! (`F_DUPFD`/`F_DUPFD_CLOEXEC`), per invariants I2/I4 (spec.md §5).

use std::os::raw::c_int;

use crate::context;
use crate::interpose::dispatch::{category_enabled, record_bypass};
use crate::interpose::macros::native_fn;
use crate::ops::{OpCategory, Operation, Special};
use crate::resolver::SymbolCache;

type SocketFn = unsafe extern "C" fn(c_int, c_int, c_int) -> c_int;
// `fcntl` is variadic in libc; Rust cannot define a variadic `extern "C" fn`, so the optional
// third argument is taken as a plain word. This is only meaningful for the handful of commands
// (`F_DUPFD`, `F_DUPFD_CLOEXEC`, `F_SETFD`, `F_SETFL`) this layer's bookkeeping cares about; any
// caller that omits the argument leaves an unread register slot, which is harmless.
type FcntlFn = unsafe extern "C" fn(c_int, c_int, libc::c_long) -> c_int;

static SOCKET: SymbolCache = SymbolCache::new();
static FCNTL: SymbolCache = SymbolCache::new();

#[unsafe(no_mangle)]
pub extern "C" fn socket(domain: c_int, ty: c_int, protocol: c_int) -> c_int {
    let native: SocketFn = native_fn!(&SOCKET, "socket", SocketFn);
    let op = Operation::Special(Special::Socket);
    let result = unsafe { native(domain, ty, protocol) };
    if let Some(ctx) = context::layer() {
        if category_enabled(ctx, OpCategory::Special) {
            record_bypass(ctx, op);
        }
    }
    result
}

#[unsafe(no_mangle)]
pub extern "C" fn fcntl(fd: c_int, cmd: c_int, arg: libc::c_long) -> c_int {
    let native: FcntlFn = native_fn!(&FCNTL, "fcntl", FcntlFn);
    let op = Operation::Special(Special::Fcntl);
    let result = unsafe { native(fd, cmd, arg) };

    let Some(ctx) = context::layer() else {
        return result;
    };
    if !category_enabled(ctx, OpCategory::Special) {
        return result;
    }

    let is_dup = cmd == libc::F_DUPFD || cmd == libc::F_DUPFD_CLOEXEC;
    if is_dup && result >= 0 {
        if ctx.table.replace_fd(fd, result).is_err() {
            log::trace!("fcntl(F_DUPFD) on untracked fd {fd}, new fd {result} stays untracked");
        }
    }
    record_bypass(ctx, op);
    result
}
