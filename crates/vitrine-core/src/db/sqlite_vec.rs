//! Process-wide registration of the sqlite-vec extension.
//!
//! Once registered, every connection opened afterwards exposes
//! `vec_version()` and `vec_distance_cosine()`. Setting
//! `VITRINE_SQLITE_VEC_AUTO=0` disables registration and forces the
//! in-process cosine scan.
#![allow(unsafe_code)]

use std::os::raw::{c_char, c_int};
use std::sync::OnceLock;

const AUTO_ENABLE_ENV: &str = "VITRINE_SQLITE_VEC_AUTO";

static REGISTRATION: OnceLock<Result<(), String>> = OnceLock::new();

type ExtensionInit = unsafe extern "C" fn(
    *mut rusqlite::ffi::sqlite3,
    *mut *const c_char,
    *const rusqlite::ffi::sqlite3_api_routines,
) -> c_int;

/// Register sqlite-vec as an auto extension, at most once per process.
///
/// # Errors
///
/// Returns a description of why registration is unavailable: disabled via
/// the environment, or rejected by SQLite.
pub fn register_auto_extension() -> Result<(), String> {
    if matches!(
        std::env::var(AUTO_ENABLE_ENV).ok().as_deref(),
        Some("0" | "false" | "off")
    ) {
        return Err(format!("sqlite-vec disabled by {AUTO_ENABLE_ENV}"));
    }

    REGISTRATION.get_or_init(register_once).clone()
}

fn register_once() -> Result<(), String> {
    // SAFETY: `sqlite3_vec_init` is the extension entry point with exactly the
    // `ExtensionInit` signature; the crate declares it without arguments.
    let entrypoint = unsafe {
        std::mem::transmute::<*const (), ExtensionInit>(sqlite_vec::sqlite3_vec_init as *const ())
    };

    // SAFETY: registering a valid entry point has no other preconditions.
    let rc = unsafe { rusqlite::ffi::sqlite3_auto_extension(Some(entrypoint)) };
    if rc == rusqlite::ffi::SQLITE_OK {
        Ok(())
    } else {
        Err(format!("sqlite3_auto_extension failed with rc={rc}"))
    }
}

/// `true` if `conn` can call sqlite-vec functions.
#[must_use]
pub fn is_available(conn: &rusqlite::Connection) -> bool {
    conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
        .is_ok()
}
