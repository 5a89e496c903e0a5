//! FFI bindings for the Kinesia engine
//!
//! C-compatible functions for embedding the engine from other languages.
//! All functions use C strings (null-terminated); returned strings are
//! allocated here and must be freed by the caller using
//! `kinesia_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use chrono::{DateTime, TimeZone, Utc};

use crate::config::EngineConfig;
use crate::engine::AssessmentEngine;
use crate::types::AssessmentDomain;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn millis_to_datetime(timestamp_ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(timestamp_ms).single()
}

/// Get the last error message, or NULL if none.
///
/// # Safety
/// The returned pointer is owned by thread-local storage; do not free it.
#[no_mangle]
pub unsafe extern "C" fn kinesia_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|cstr| cstr.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Create an engine for one assessment domain.
///
/// # Safety
/// - `domain` must be a valid null-terminated C string holding one of the
///   persistence-boundary type names (e.g. "GAIT_ANALYSIS").
/// - `config_json` may be NULL for defaults.
/// - Returns NULL on error; call `kinesia_last_error` for details.
/// - The handle must be released with `kinesia_engine_free`.
#[no_mangle]
pub unsafe extern "C" fn kinesia_engine_new(
    domain: *const c_char,
    config_json: *const c_char,
) -> *mut AssessmentEngine {
    clear_last_error();

    let Some(domain_str) = cstr_to_string(domain) else {
        set_last_error("Invalid domain string pointer");
        return ptr::null_mut();
    };

    let domain = match serde_json::from_str::<AssessmentDomain>(&format!("\"{}\"", domain_str)) {
        Ok(d) => d,
        Err(_) => {
            set_last_error(&format!("Unknown assessment domain: {}", domain_str));
            return ptr::null_mut();
        }
    };

    let config = match cstr_to_string(config_json) {
        Some(json) => match EngineConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        None => EngineConfig::default(),
    };

    match AssessmentEngine::new(domain, config) {
        Ok(engine) => Box::into_raw(Box::new(engine)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Start the engine's session at the given Unix timestamp (milliseconds).
///
/// # Safety
/// - `engine` must be a handle returned by `kinesia_engine_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn kinesia_engine_start(
    engine: *mut AssessmentEngine,
    timestamp_ms: i64,
) -> c_int {
    clear_last_error();

    let Some(engine) = engine.as_mut() else {
        set_last_error("Invalid engine pointer");
        return -1;
    };
    let Some(now) = millis_to_datetime(timestamp_ms) else {
        set_last_error("Invalid timestamp");
        return -1;
    };

    match engine.start(now) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Process one raw frame (JSON) and return the tick update as JSON.
///
/// # Safety
/// - `engine` must be a handle returned by `kinesia_engine_new`.
/// - `frame_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string to free with `kinesia_free_string`,
///   or NULL on error (including detection timeout; the partial result is
///   still retrievable through `kinesia_engine_take_result`).
#[no_mangle]
pub unsafe extern "C" fn kinesia_engine_tick(
    engine: *mut AssessmentEngine,
    frame_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(engine) = engine.as_mut() else {
        set_last_error("Invalid engine pointer");
        return ptr::null_mut();
    };
    let Some(json) = cstr_to_string(frame_json) else {
        set_last_error("Invalid frame string pointer");
        return ptr::null_mut();
    };

    match engine.tick_json(&json) {
        Ok(update) => match serde_json::to_string(&update) {
            Ok(out) => string_to_cstr(&out),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        },
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Signal explicit completion of the active phase.
///
/// # Safety
/// - `engine` must be a handle returned by `kinesia_engine_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn kinesia_engine_advance_phase(
    engine: *mut AssessmentEngine,
    timestamp_ms: i64,
) -> c_int {
    clear_last_error();

    let Some(engine) = engine.as_mut() else {
        set_last_error("Invalid engine pointer");
        return -1;
    };
    let Some(now) = millis_to_datetime(timestamp_ms) else {
        set_last_error("Invalid timestamp");
        return -1;
    };

    match engine.advance_phase(now) {
        Ok(_) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Stop the session and return the assembled result as JSON.
///
/// # Safety
/// - `engine` must be a handle returned by `kinesia_engine_new`.
/// - Returns a newly allocated string to free with `kinesia_free_string`,
///   or NULL on error.
#[no_mangle]
pub unsafe extern "C" fn kinesia_engine_stop(
    engine: *mut AssessmentEngine,
    timestamp_ms: i64,
) -> *mut c_char {
    clear_last_error();

    let Some(engine) = engine.as_mut() else {
        set_last_error("Invalid engine pointer");
        return ptr::null_mut();
    };
    let Some(now) = millis_to_datetime(timestamp_ms) else {
        set_last_error("Invalid timestamp");
        return ptr::null_mut();
    };

    match engine.stop(now) {
        Ok(result) => match serde_json::to_string(&result) {
            Ok(out) => string_to_cstr(&out),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        },
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Take the finished result (after completion or abort) as JSON.
///
/// # Safety
/// - `engine` must be a handle returned by `kinesia_engine_new`.
/// - Returns NULL when no result is available.
#[no_mangle]
pub unsafe extern "C" fn kinesia_engine_take_result(
    engine: *mut AssessmentEngine,
) -> *mut c_char {
    clear_last_error();

    let Some(engine) = engine.as_mut() else {
        set_last_error("Invalid engine pointer");
        return ptr::null_mut();
    };

    match engine.take_result() {
        Some(result) => match serde_json::to_string(&result) {
            Ok(out) => string_to_cstr(&out),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        },
        None => {
            set_last_error("No result available");
            ptr::null_mut()
        }
    }
}

/// Release an engine handle.
///
/// # Safety
/// - `engine` must be a handle returned by `kinesia_engine_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn kinesia_engine_free(engine: *mut AssessmentEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Free a string returned by this library.
///
/// # Safety
/// - `ptr` must have been returned by a `kinesia_*` function, or NULL.
#[no_mangle]
pub unsafe extern "C" fn kinesia_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}
