//! The one truly mechanical step of the dispatch template — step 6, resolving and calling the
//! native symbol — factored into a macro so every entry point states only the symbol name and
//! call signature instead of repeating the resolve/transmute/call boilerplate.

/// Resolves `$name` (through `$cache`, a `static` [`crate::resolver::SymbolCache`]) to a
/// function pointer of type `$ty` and returns it.
///
/// Resolution failure here is unrecoverable — there is no sane fallback when the native
/// implementation of a libc entry point cannot be found — so this aborts the process rather
/// than unwind a panic across the `extern "C"` boundary.
macro_rules! native_fn {
    ($cache:expr, $name:expr, $ty:ty) => {{
        match $crate::interpose::dispatch::resolve($cache, $name) {
            Ok(addr) => unsafe { ::std::mem::transmute::<usize, $ty>(addr) },
            Err(err) => {
                ::log::error!("padll: cannot resolve native `{}`: {}", $name, err);
                ::std::process::abort();
            }
        }
    }};
}

pub(crate) use native_fn;
