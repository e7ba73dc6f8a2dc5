//! Low-level bindings to libsqlite3.
//!
//! The raw declarations come from `libsqlite3-sys` (bundled amalgamation);
//! this module re-exports them under one path and adds the handful of safe
//! helpers the rest of the crate needs.

use std::ffi::{CStr, c_char, c_int};

pub use libsqlite3_sys::*;

// The pinned libsqlite3-sys bindings blocklist `sqlite3_close_v2`, but the
// bundled amalgamation still exports it, so declare it here.
unsafe extern "C" {
    pub fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

fn static_str(ptr: *const c_char, fallback: &'static str) -> &'static str {
    if ptr.is_null() {
        return fallback;
    }
    // SAFETY: only called with strings owned by the library for its lifetime
    unsafe { CStr::from_ptr(ptr) }.to_str().unwrap_or(fallback)
}

/// The library version string, e.g. `"3.46.0"`.
pub fn version() -> &'static str {
    // SAFETY: no preconditions; the result is a static string
    static_str(unsafe { sqlite3_libversion() }, "unknown")
}

/// The library version as `X * 1_000_000 + Y * 1_000 + Z`.
pub fn version_number() -> i32 {
    // SAFETY: no preconditions
    unsafe { sqlite3_libversion_number() }
}

/// English description of a result code.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr accepts any code and returns a static string
    static_str(unsafe { sqlite3_errstr(code) }, "unknown error")
}

/// Copy a possibly-null C string into an owned `String`.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: caller guarantees NUL termination
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

/// Borrow a possibly-null C string as `&str`, rejecting invalid UTF-8.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for `'a`.
pub unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: caller guarantees NUL termination and lifetime
        unsafe { CStr::from_ptr(ptr) }.to_str().ok()
    }
}

/// The current error message of a connection handle.
///
/// # Safety
/// `db` must be null or a live connection handle.
pub unsafe fn errmsg(db: *mut sqlite3) -> String {
    if db.is_null() {
        return error_string(SQLITE_MISUSE).to_string();
    }
    // SAFETY: db is live; sqlite3_errmsg never returns null for a live handle
    unsafe { cstr_to_string(sqlite3_errmsg(db)) }.unwrap_or_default()
}
