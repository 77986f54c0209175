//! Bootstrap logger.
//!
//! Every other part of this crate logs through the ordinary `log::{error,warn,info,debug,
//! trace}!` macros. This module is what actually prints those messages, and it is
//! deliberately *not* layered on an off-the-shelf `log` backend (`env_logger` and friends),
//! because this crate interposes `write`/`open`/`close` process-wide: if a logging backend
//! used the libc `write` the application sees, it would recurse straight back into our own
//! `write` interposer.
//!
//! The fix, mirrored from `original_source`'s `Log::dlsym_write_message` (spec.md §9, "Cyclic
//! construction"), is to resolve `write` (and `open`/`close`, for the optional log-file sink)
//! through a *direct*, one-shot `dlsym(RTLD_NEXT, ...)` lookup that bypasses
//! [`crate::resolver`] entirely. The resolver is allowed to log through this logger; this
//! logger must never call back into the resolver.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::OnceLock;

use log::{Level, LevelFilter, Metadata, Record};

type WriteFn = unsafe extern "C" fn(libc::c_int, *const libc::c_void, libc::size_t) -> isize;
type OpenFn = unsafe extern "C" fn(*const libc::c_char, libc::c_int, libc::mode_t) -> libc::c_int;

struct DirectSymbols {
    write: AtomicUsize,
    open: AtomicUsize,
    log_fd: AtomicI32,
}

static DIRECT: DirectSymbols = DirectSymbols {
    write: AtomicUsize::new(0),
    open: AtomicUsize::new(0),
    log_fd: AtomicI32::new(-1),
};

fn direct_write() -> Option<WriteFn> {
    let cached = DIRECT.write.load(Ordering::Acquire);
    if cached != 0 {
        // SAFETY: only ever stores a pointer obtained from `dlsym` below.
        return Some(unsafe { std::mem::transmute::<usize, WriteFn>(cached) });
    }
    let name = CString::new("write").unwrap();
    // SAFETY: RTLD_NEXT lookup of a well-known libc symbol, passed a static C string.
    let ptr = unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr()) };
    if ptr.is_null() {
        return None;
    }
    DIRECT.write.store(ptr as usize, Ordering::Release);
    // SAFETY: `write`'s signature matches `WriteFn`.
    Some(unsafe { std::mem::transmute::<usize, WriteFn>(ptr as usize) })
}

fn direct_open() -> Option<OpenFn> {
    let cached = DIRECT.open.load(Ordering::Acquire);
    if cached != 0 {
        return Some(unsafe { std::mem::transmute::<usize, OpenFn>(cached) });
    }
    let name = CString::new("open").unwrap();
    let ptr = unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr()) };
    if ptr.is_null() {
        return None;
    }
    DIRECT.open.store(ptr as usize, Ordering::Release);
    Some(unsafe { std::mem::transmute::<usize, OpenFn>(ptr as usize) })
}

/// Opens (once) an optional log file via the direct `open` lookup, bypassing our own `open`
/// interposer. If no path is configured, or opening fails, log output goes to fd 2 (stderr).
fn log_fd(path: Option<&Path>) -> libc::c_int {
    let cached = DIRECT.log_fd.load(Ordering::Acquire);
    if cached >= 0 {
        return cached;
    }
    let fd = match (path, direct_open()) {
        (Some(path), Some(open_fn)) => {
            let c_path = CString::new(path.as_os_str().as_bytes()).ok();
            match c_path {
                Some(c_path) => {
                    let flags = libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND;
                    // SAFETY: `c_path` is NUL-terminated and lives for the call's duration.
                    let fd = unsafe { open_fn(c_path.as_ptr(), flags, 0o644) };
                    if fd >= 0 {
                        fd
                    } else {
                        libc::STDERR_FILENO
                    }
                }
                None => libc::STDERR_FILENO,
            }
        }
        _ => libc::STDERR_FILENO,
    };
    DIRECT.log_fd.store(fd, Ordering::Release);
    fd
}

fn write_line(fd: libc::c_int, line: &str) {
    let Some(write_fn) = direct_write() else {
        return;
    };
    let bytes = line.as_bytes();
    let mut offset = 0usize;
    while offset < bytes.len() {
        // SAFETY: `bytes[offset..]` is a valid slice for the duration of the call.
        let n = unsafe {
            write_fn(
                fd,
                bytes[offset..].as_ptr() as *const libc::c_void,
                bytes.len() - offset,
            )
        };
        if n <= 0 {
            break;
        }
        offset += n as usize;
    }
}

pub struct BootstrapLogger {
    log_file: OnceLock<Option<std::path::PathBuf>>,
}

impl BootstrapLogger {
    const fn new() -> Self {
        BootstrapLogger {
            log_file: OnceLock::new(),
        }
    }

    fn configured_path(&self) -> Option<&Path> {
        self.log_file
            .get_or_init(|| std::env::var_os("padll_log_file").map(std::path::PathBuf::from))
            .as_deref()
    }
}

impl log::Log for BootstrapLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let line = format!(
            "[padll] [{level}] [{target}] {args}\n",
            target = record.target(),
            args = record.args()
        );
        write_line(log_fd(self.configured_path()), &line);
    }

    fn flush(&self) {}
}

static LOGGER: BootstrapLogger = BootstrapLogger::new();

fn max_level() -> LevelFilter {
    static LEVEL: OnceLock<LevelFilter> = OnceLock::new();
    *LEVEL.get_or_init(|| match std::env::var("padll_log_level") {
        Ok(v) => v.parse().unwrap_or(LevelFilter::Info),
        Err(_) => LevelFilter::Info,
    })
}

/// Installs the bootstrap logger as the global `log` backend. Idempotent: safe to call from
/// every interposer on the "layer not yet initialized" path.
pub fn install() {
    static INSTALLED: std::sync::Once = std::sync::Once::new();
    INSTALLED.call_once(|| {
        log::set_max_level(max_level());
        // A second call (another thread racing us) returns `Err`, which we ignore: the first
        // installer wins and that's the only one we need.
        let _ = log::set_logger(&LOGGER);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_write_resolves_to_a_non_null_symbol() {
        assert!(direct_write().is_some());
    }

    #[test]
    fn install_is_idempotent() {
        install();
        install();
    }
}
