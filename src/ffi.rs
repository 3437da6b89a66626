//! C boundary
//!
//! Hosts link the `cdylib` and drive one opaque session per
//! [`relaxng_init`]. Every call returns a status: `0` on success, a positive
//! length when the output region holds diagnostic records, a negative
//! [`Status`] code on failure. The output region always ends up
//! NUL-terminated.
//!
//! # Safety
//!
//! The output region passed to `relaxng_init` must stay valid, and must not be
//! written by the host, until `relaxng_free`. A session must not be used from
//! two threads at once.

use std::ffi::CStr;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr::NonNull;

use libc::{c_char, c_int};
use tracing::warn;

use crate::engine::SchemaSyntax;
use crate::error::{SessionError, Status};
use crate::input::Source;
use crate::libxml2::LibXml2Engine;
use crate::session::Session;

/// The caller's output region
#[derive(Debug)]
pub struct ForeignRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl ForeignRegion {
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for as long as
    /// the region is alive.
    pub unsafe fn new(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }
}

impl AsRef<[u8]> for ForeignRegion {
    fn as_ref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl AsMut<[u8]> for ForeignRegion {
    fn as_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

/// Session type behind the opaque handle
pub type RelaxngSession = Session<LibXml2Engine, ForeignRegion>;

/// Run `f`, turning a panic into an API error.
fn guarded(f: impl FnOnce() -> c_int) -> c_int {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        warn!("panic caught at the C boundary");
        Status::API_ERROR
    })
}

unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, SessionError> {
    if ptr.is_null() {
        return Err(SessionError::InvalidArgument(format!("{} is null", what)));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| SessionError::InvalidArgument(format!("{} is not valid UTF-8", what)))
}

#[cfg(unix)]
unsafe fn c_path<'a>(ptr: *const c_char) -> Result<&'a Path, SessionError> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    if ptr.is_null() {
        return Err(SessionError::InvalidArgument("path is null".to_string()));
    }
    let bytes = unsafe { CStr::from_ptr(ptr) }.to_bytes();
    Ok(Path::new(OsStr::from_bytes(bytes)))
}

#[cfg(not(unix))]
unsafe fn c_path<'a>(ptr: *const c_char) -> Result<&'a Path, SessionError> {
    unsafe { c_str(ptr, "path") }.map(Path::new)
}

/// Decode `source`/`length`: a negative length means `source` is a
/// NUL-terminated path, otherwise it points at `length` bytes.
unsafe fn source<'a>(source: *const c_char, length: c_int) -> Result<Source<'a>, SessionError> {
    if length < 0 {
        return unsafe { c_path(source) }.map(Source::Path);
    }
    if length == 0 {
        return Ok(Source::Bytes(&[]));
    }
    if source.is_null() {
        return Err(SessionError::InvalidArgument("source is null".to_string()));
    }
    let bytes = unsafe { std::slice::from_raw_parts(source.cast::<u8>(), length as usize) };
    Ok(Source::Bytes(bytes))
}

/// Create a session writing into `buffer`, storing its handle in
/// `out_session`.
///
/// # Safety
///
/// `out_session` must be valid for writes; `buffer` must be valid for
/// `length` bytes until [`relaxng_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaxng_init(
    out_session: *mut *mut RelaxngSession,
    buffer: *mut c_char,
    length: c_int,
) -> c_int {
    guarded(|| {
        if out_session.is_null() {
            return Status::API_ERROR;
        }
        unsafe { *out_session = std::ptr::null_mut() };

        let Some(ptr) = NonNull::new(buffer.cast::<u8>()) else {
            return Status::API_ERROR;
        };
        let Ok(len) = usize::try_from(length) else {
            return Status::API_ERROR;
        };
        if len > 0 {
            unsafe { *ptr.as_ptr() = 0 };
        }

        let region = unsafe { ForeignRegion::new(ptr, len) };
        match Session::new(LibXml2Engine::new(), region) {
            Ok(session) => {
                unsafe { *out_session = Box::into_raw(Box::new(session)) };
                Status::OK
            }
            Err(err) => {
                warn!(error = %err, "relaxng_init rejected");
                err.status().code()
            }
        }
    })
}

/// Load a schema under `name`. `compact` non-zero selects the compact
/// syntax.
///
/// # Safety
///
/// `session` must come from [`relaxng_init`]; `name` must be NUL-terminated;
/// `source` as described for the module.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaxng_load_schema(
    session: *mut RelaxngSession,
    name: *const c_char,
    source: *const c_char,
    length: c_int,
    compact: c_int,
) -> c_int {
    guarded(|| {
        let Some(session) = (unsafe { session.as_mut() }) else {
            return Status::API_ERROR;
        };
        let args = unsafe { c_str(name, "schema name") }
            .and_then(|name| unsafe { self::source(source, length) }.map(|source| (name, source)));
        let outcome = match args {
            Ok((name, source)) => {
                session.load_schema(name, source, SchemaSyntax::from_compact(compact != 0))
            }
            Err(err) => session.reject(&err),
        };
        outcome.raw()
    })
}

/// Forget the schema registered under `name`.
///
/// # Safety
///
/// `session` must come from [`relaxng_init`]; `name` must be NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaxng_unload_schema(
    session: *mut RelaxngSession,
    name: *const c_char,
) -> c_int {
    guarded(|| {
        let Some(session) = (unsafe { session.as_mut() }) else {
            return Status::API_ERROR;
        };
        let outcome = match unsafe { c_str(name, "schema name") } {
            Ok(name) => session.unload_schema(name),
            Err(err) => session.reject(&err),
        };
        outcome.raw()
    })
}

/// Validate a document against the schema registered under `name`.
///
/// # Safety
///
/// `session` must come from [`relaxng_init`]; `name` must be NUL-terminated;
/// `source` as described for the module.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaxng_validate(
    session: *mut RelaxngSession,
    name: *const c_char,
    source: *const c_char,
    length: c_int,
) -> c_int {
    guarded(|| {
        let Some(session) = (unsafe { session.as_mut() }) else {
            return Status::API_ERROR;
        };
        let args = unsafe { c_str(name, "schema name") }
            .and_then(|name| unsafe { self::source(source, length) }.map(|source| (name, source)));
        let outcome = match args {
            Ok((name, source)) => session.validate(name, source),
            Err(err) => session.reject(&err),
        };
        outcome.raw()
    })
}

/// Release a session and every schema it holds. Null is ignored.
///
/// # Safety
///
/// `session` must come from [`relaxng_init`] and not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn relaxng_free(session: *mut RelaxngSession) {
    if session.is_null() {
        return;
    }
    let _ = panic::catch_unwind(AssertUnwindSafe(|| drop(unsafe { Box::from_raw(session) })));
}
