//! Component A: native-symbol resolver.
//!
//! Hands out function pointers into the host's native file API without ever triggering
//! recursive interposition. Two lookup paths are kept alive at all times, per spec.md §9
//! ("Dynamic linking and recursive interposition"):
//!
//! 1. A cached `dlopen` handle onto the well-known native library (`libc.so.6` on Linux,
//!    `libSystem.B.dylib` on macOS), consulted first.
//! 2. A fallback `dlsym(RTLD_NEXT, ...)` lookup, used when the `dlopen` path fails — this is
//!    what lets the resolver work even when the native library is reachable only through the
//!    dynamic linker's own search order.

use std::ffi::CString;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, error};
use parking_lot::Mutex;

use crate::error::CoreError;

#[cfg(padll_native_lib = "libsystem")]
const NATIVE_LIBRARY: &str = "libSystem.B.dylib";
#[cfg(not(padll_native_lib = "libsystem"))]
const NATIVE_LIBRARY: &str = "libc.so.6";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LibHandleState {
    Unresolved,
    Open(usize),
    Failed,
}

/// Resolves and caches pointers into the native file API.
///
/// Thread-safe: the library-open step is serialized by a mutex; callers are expected to cache
/// the returned pointer themselves in a [`SymbolCache`], which publishes it lock-free after the
/// first successful resolution.
pub struct NativeResolver {
    lib_handle: Mutex<LibHandleState>,
    lib_name: &'static str,
}

impl NativeResolver {
    pub const fn new() -> Self {
        NativeResolver {
            lib_handle: Mutex::new(LibHandleState::Unresolved),
            lib_name: NATIVE_LIBRARY,
        }
    }

    fn ensure_open(&self) -> LibHandleState {
        let mut guard = self.lib_handle.lock();
        if *guard == LibHandleState::Unresolved {
            let c_name = CString::new(self.lib_name).expect("library name has no interior NUL");
            // SAFETY: `c_name` is a valid NUL-terminated string for the duration of the call.
            let handle = unsafe { libc::dlopen(c_name.as_ptr(), libc::RTLD_LAZY) };
            *guard = if handle.is_null() {
                LibHandleState::Failed
            } else {
                LibHandleState::Open(handle as usize)
            };
        }
        *guard
    }

    /// Resolves `name` to a native function pointer, or `None` if both lookup paths fail.
    pub fn resolve(&self, name: &str) -> Result<usize, CoreError> {
        let c_name = CString::new(name).map_err(|_| CoreError::ResolverFailure {
            symbol: "<invalid>",
            reason: "symbol name contained an interior NUL byte".to_string(),
        })?;

        if let LibHandleState::Open(handle) = self.ensure_open() {
            // SAFETY: `handle` came from a successful `dlopen` above and is still open (the
            // resolver never closes it until `shutdown`).
            let ptr = unsafe { libc::dlsym(handle as *mut libc::c_void, c_name.as_ptr()) };
            if !ptr.is_null() {
                return Ok(ptr as usize);
            }
            debug!("dlsym({name}) missed in {}, falling back to RTLD_NEXT", self.lib_name);
        }

        // SAFETY: RTLD_NEXT is a valid pseudo-handle understood by `dlsym` on every supported
        // platform.
        let ptr = unsafe { libc::dlsym(libc::RTLD_NEXT, c_name.as_ptr()) };
        if ptr.is_null() {
            let reason = dlerror_message();
            error!("failed to resolve native symbol `{name}` via dlopen or RTLD_NEXT: {reason}");
            return Err(CoreError::ResolverFailure {
                symbol: leak_symbol_name(name),
                reason,
            });
        }
        Ok(ptr as usize)
    }

    /// Closes the cached library handle. Called once at process teardown.
    pub fn shutdown(&self) {
        let mut guard = self.lib_handle.lock();
        if let LibHandleState::Open(handle) = *guard {
            // SAFETY: `handle` is a valid handle previously returned by `dlopen`.
            let result = unsafe { libc::dlclose(handle as *mut libc::c_void) };
            if result != 0 {
                error!("dlclose({}) failed: {}", self.lib_name, dlerror_message());
            }
        }
        *guard = LibHandleState::Unresolved;
    }
}

impl Default for NativeResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn dlerror_message() -> String {
    // SAFETY: `dlerror` returns either null or a pointer to a static, NUL-terminated string
    // owned by the dynamic linker.
    let ptr = unsafe { libc::dlerror() };
    if ptr.is_null() {
        return "unknown dlerror".to_string();
    }
    // SAFETY: `ptr` is non-null and NUL-terminated per the contract above.
    unsafe { std::ffi::CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

// Error-message symbol names are always 'static string literals from call sites; this turns an
// owned `&str` that is already 'static-in-practice back into a `&'static str` for the error
// variant without over-generalizing `CoreError` with a lifetime.
fn leak_symbol_name(name: &str) -> &'static str {
    match name {
        "read" => "read",
        "write" => "write",
        "pread" => "pread",
        "pwrite" => "pwrite",
        "pread64" => "pread64",
        "pwrite64" => "pwrite64",
        "mmap" => "mmap",
        "munmap" => "munmap",
        "open" => "open",
        "open64" => "open64",
        "openat" => "openat",
        "creat" => "creat",
        "creat64" => "creat64",
        "close" => "close",
        "sync" => "sync",
        "statfs" => "statfs",
        "fstatfs" => "fstatfs",
        "statfs64" => "statfs64",
        "fstatfs64" => "fstatfs64",
        "unlink" => "unlink",
        "unlinkat" => "unlinkat",
        "rename" => "rename",
        "renameat" => "renameat",
        "fopen" => "fopen",
        "fopen64" => "fopen64",
        "fclose" => "fclose",
        "mkdir" => "mkdir",
        "mkdirat" => "mkdirat",
        "rmdir" => "rmdir",
        "mknod" => "mknod",
        "mknodat" => "mknodat",
        "getxattr" => "getxattr",
        "lgetxattr" => "lgetxattr",
        "fgetxattr" => "fgetxattr",
        "setxattr" => "setxattr",
        "lsetxattr" => "lsetxattr",
        "fsetxattr" => "fsetxattr",
        "listxattr" => "listxattr",
        "llistxattr" => "llistxattr",
        "flistxattr" => "flistxattr",
        "socket" => "socket",
        "fcntl" => "fcntl",
        _ => "<unknown>",
    }
}

/// The resolver used by every interposer. Deliberately independent of [`crate::context`]'s
/// lazily-built [`LayerContext`](crate::context::LayerContext): native calls must keep working
/// even before the layer has finished initializing, since dispatch always calls through to the
/// native function regardless of whether classification and enforcement ran (spec.md §4.E step
/// 1 only ever skips steps 2-8, never step 6).
pub static GLOBAL: NativeResolver = NativeResolver::new();

/// A one-shot cache for a single resolved symbol, held by each interposer for its own entry
/// point. The slot starts null; every interposer checks it first and only consults the
/// [`NativeResolver`] on miss.
pub struct SymbolCache {
    ptr: AtomicUsize,
}

impl SymbolCache {
    pub const fn new() -> Self {
        SymbolCache {
            ptr: AtomicUsize::new(0),
        }
    }

    /// Returns the cached pointer, resolving and publishing it on first use.
    pub fn get_or_resolve(
        &self,
        name: &str,
        resolver: &NativeResolver,
    ) -> Result<usize, CoreError> {
        let cached = self.ptr.load(Ordering::Acquire);
        if cached != 0 {
            return Ok(cached);
        }
        let resolved = resolver.resolve(name)?;
        self.ptr.store(resolved, Ordering::Release);
        Ok(resolved)
    }
}

impl Default for SymbolCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_well_known_libc_symbol() {
        let resolver = NativeResolver::new();
        let ptr = resolver.resolve("getpid").expect("getpid should resolve");
        assert_ne!(ptr, 0);
    }

    #[test]
    fn unknown_symbol_fails_both_paths() {
        let resolver = NativeResolver::new();
        let result = resolver.resolve("padll_definitely_not_a_real_symbol_xyz");
        assert!(result.is_err());
    }

    #[test]
    fn symbol_cache_is_idempotent() {
        let resolver = NativeResolver::new();
        let cache = SymbolCache::new();
        let first = cache.get_or_resolve("getpid", &resolver).unwrap();
        let second = cache.get_or_resolve("getpid", &resolver).unwrap();
        assert_eq!(first, second);
    }
}
