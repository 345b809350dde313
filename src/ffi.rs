//! FFI bindings for the Healthwaves engine
//!
//! This module provides C-compatible functions for calling the engine from the host
//! application. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `waves_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::FixedOffset;

use crate::error::EngineError;
use crate::input::{parse_window_bound, SampleInput, SleepInput};
use crate::pipeline::{build_insight_json, sleep_timeline_json, InsightEngine};
use crate::types::Metric;
use crate::window::Window;

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

/// Read a required argument, recording an error naming it when missing
unsafe fn required_arg(ptr: *const c_char, name: &str) -> Option<String> {
    let value = cstr_to_string(ptr);
    if value.is_none() {
        set_last_error(&format!("Invalid {name} string pointer"));
    }
    value
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn finish(result: Result<String, EngineError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn parse_window(start_iso: &str, end_iso: &str) -> Result<Window<FixedOffset>, EngineError> {
    let start = parse_window_bound(start_iso)?;
    let end = parse_window_bound(end_iso)?;
    Window::new(start, end)
}

// ============================================================================
// Stateless API
// ============================================================================

/// Build the insight payload JSON for daily samples.
///
/// `samples_json` is a JSON array of `{timestamp, value}` records. Window bounds are
/// RFC 3339 strings; calendar days follow `start_iso`'s offset. When `fill_missing`
/// is non-zero, days without a sample are added with a value of 0.
///
/// # Safety
/// - `samples_json`, `metric`, `unit`, `start_iso` and `end_iso` must be valid
///   null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `waves_free_string`.
/// - Returns NULL on error; call `waves_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn waves_insight_payload(
    samples_json: *const c_char,
    metric: *const c_char,
    unit: *const c_char,
    start_iso: *const c_char,
    end_iso: *const c_char,
    fill_missing: i32,
) -> *mut c_char {
    clear_last_error();

    let Some(samples_str) = required_arg(samples_json, "samples JSON") else {
        return ptr::null_mut();
    };
    let Some(metric_str) = required_arg(metric, "metric") else {
        return ptr::null_mut();
    };
    let Some(unit_str) = required_arg(unit, "unit") else {
        return ptr::null_mut();
    };
    let Some(start_str) = required_arg(start_iso, "start") else {
        return ptr::null_mut();
    };
    let Some(end_str) = required_arg(end_iso, "end") else {
        return ptr::null_mut();
    };

    finish((|| -> Result<String, EngineError> {
        let samples = SampleInput::parse_array(&samples_str)?;
        let window = parse_window(&start_str, &end_str)?;
        if fill_missing != 0 {
            InsightEngine::new().insight_json(&metric_str, &unit_str, &window, &samples, true)
        } else {
            build_insight_json(&metric_str, &unit_str, &window.start, &window.end, &samples)
        }
    })())
}

/// Aggregate raw readings for a known metric and build its insight payload JSON.
///
/// `metric_key` names a metric (e.g. "steps", "heartRate"); its label, unit and
/// daily aggregation rule are applied, and missing days are filled with 0.
///
/// # Safety
/// - `samples_json`, `metric_key`, `start_iso` and `end_iso` must be valid
///   null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `waves_free_string`.
/// - Returns NULL on error; call `waves_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn waves_metric_insight(
    samples_json: *const c_char,
    metric_key: *const c_char,
    start_iso: *const c_char,
    end_iso: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(samples_str) = required_arg(samples_json, "samples JSON") else {
        return ptr::null_mut();
    };
    let Some(metric_str) = required_arg(metric_key, "metric") else {
        return ptr::null_mut();
    };
    let Some(start_str) = required_arg(start_iso, "start") else {
        return ptr::null_mut();
    };
    let Some(end_str) = required_arg(end_iso, "end") else {
        return ptr::null_mut();
    };

    finish((|| -> Result<String, EngineError> {
        let metric: Metric = metric_str.parse()?;
        let samples = SampleInput::parse_array(&samples_str)?;
        let window = parse_window(&start_str, &end_str)?;
        let payload = InsightEngine::new().insight_for_metric(metric, &window, &samples);
        Ok(serde_json::to_string_pretty(&payload)?)
    })())
}

/// Segment sleep intervals for one week and return the timeline JSON.
///
/// `intervals_json` is a JSON array of `{start, end, stage}` records.
///
/// # Safety
/// - `intervals_json`, `week_start_iso` and `week_end_iso` must be valid
///   null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `waves_free_string`.
/// - Returns NULL on error; call `waves_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn waves_sleep_timeline(
    intervals_json: *const c_char,
    week_start_iso: *const c_char,
    week_end_iso: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(intervals_str) = required_arg(intervals_json, "intervals JSON") else {
        return ptr::null_mut();
    };
    let Some(start_str) = required_arg(week_start_iso, "week start") else {
        return ptr::null_mut();
    };
    let Some(end_str) = required_arg(week_end_iso, "week end") else {
        return ptr::null_mut();
    };

    finish((|| -> Result<String, EngineError> {
        let intervals = SleepInput::parse_array(&intervals_str)?;
        let week = parse_window(&start_str, &end_str)?;
        sleep_timeline_json(&intervals, &week.start, &week.end)
    })())
}

// ============================================================================
// Configured Engine API
// ============================================================================

/// Opaque handle to a configured InsightEngine
pub struct WavesEngineHandle {
    engine: InsightEngine,
}

/// Create an engine from a JSON configuration, or with defaults when `config_json`
/// is NULL.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Must be freed with `waves_engine_free`.
/// - Returns NULL on error; call `waves_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn waves_engine_new(config_json: *const c_char) -> *mut WavesEngineHandle {
    clear_last_error();

    let engine = match cstr_to_string(config_json) {
        None => InsightEngine::new(),
        Some(json) => match InsightEngine::from_config_json(&json) {
            Ok(engine) => engine,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
    };

    Box::into_raw(Box::new(WavesEngineHandle { engine }))
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `waves_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn waves_engine_free(engine: *mut WavesEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Build an insight payload with the engine's configuration.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `waves_engine_new`.
/// - The string arguments must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `waves_free_string`.
/// - Returns NULL on error; call `waves_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn waves_engine_insight(
    engine: *const WavesEngineHandle,
    samples_json: *const c_char,
    metric: *const c_char,
    unit: *const c_char,
    start_iso: *const c_char,
    end_iso: *const c_char,
    fill_missing: i32,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    let Some(samples_str) = required_arg(samples_json, "samples JSON") else {
        return ptr::null_mut();
    };
    let Some(metric_str) = required_arg(metric, "metric") else {
        return ptr::null_mut();
    };
    let Some(unit_str) = required_arg(unit, "unit") else {
        return ptr::null_mut();
    };
    let Some(start_str) = required_arg(start_iso, "start") else {
        return ptr::null_mut();
    };
    let Some(end_str) = required_arg(end_iso, "end") else {
        return ptr::null_mut();
    };

    finish((|| -> Result<String, EngineError> {
        let samples = SampleInput::parse_array(&samples_str)?;
        let window = parse_window(&start_str, &end_str)?;
        handle
            .engine
            .insight_json(&metric_str, &unit_str, &window, &samples, fill_missing != 0)
    })())
}

/// Segment a week of sleep with the engine's configuration and return the report
/// JSON (timeline plus per-night totals).
///
/// # Safety
/// - `engine` must be a valid pointer returned by `waves_engine_new`.
/// - The string arguments must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `waves_free_string`.
/// - Returns NULL on error; call `waves_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn waves_engine_sleep_report(
    engine: *const WavesEngineHandle,
    intervals_json: *const c_char,
    week_start_iso: *const c_char,
    week_end_iso: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    let Some(intervals_str) = required_arg(intervals_json, "intervals JSON") else {
        return ptr::null_mut();
    };
    let Some(start_str) = required_arg(week_start_iso, "week start") else {
        return ptr::null_mut();
    };
    let Some(end_str) = required_arg(week_end_iso, "week end") else {
        return ptr::null_mut();
    };

    finish((|| -> Result<String, EngineError> {
        let intervals = SleepInput::parse_array(&intervals_str)?;
        let week = parse_window(&start_str, &end_str)?;
        let report = handle.engine.sleep_report(&intervals, &week);
        Ok(serde_json::to_string_pretty(&report)?)
    })())
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by engine functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an engine function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn waves_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next engine function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn waves_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the engine library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn waves_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
