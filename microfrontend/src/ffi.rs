//! C ABI over [`crate::handle`].
//!
//! Handles cross the boundary as plain `u64`, with 0 meaning "no session".
//! Feature rows come back as one flat `frames * 40` buffer that the caller
//! must return through [`mfe_free_features`]. No function unwinds into the
//! caller: a panic is logged and mapped to the same neutral result as an
//! invalid handle.

use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;

use tracing::error;

use crate::config::FEATURE_SIZE;
use crate::handle::{self, Handle};

fn guard<T>(op: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => v,
        Err(_) => {
            error!(op, "microfrontend: panic at the C boundary");
            fallback
        }
    }
}

/// Number of `f32` values per frame.
#[unsafe(no_mangle)]
pub extern "C" fn mfe_feature_size() -> usize {
    FEATURE_SIZE
}

/// Creates a session. Returns 0 on failure.
#[unsafe(no_mangle)]
pub extern "C" fn mfe_create(sample_rate: i32, step_size_ms: i32) -> u64 {
    guard("create", 0, || handle::create(sample_rate, step_size_ms).as_raw())
}

/// Processes `len` samples at `samples`.
///
/// Writes the number of completed frames to `out_frames` and returns a
/// buffer of `frames * mfe_feature_size()` floats, or null when no frame was
/// produced or the handle is invalid.
///
/// # Safety
///
/// `samples` must point to `len` readable `i16` values (or be null with
/// `len == 0`), and `out_frames` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mfe_process_samples(
    handle: u64,
    samples: *const i16,
    len: usize,
    out_frames: *mut usize,
) -> *mut f32 {
    if !out_frames.is_null() {
        unsafe { *out_frames = 0 };
    }
    if samples.is_null() && len > 0 {
        return ptr::null_mut();
    }
    let input: &[i16] = if len == 0 {
        &[]
    } else {
        unsafe { slice::from_raw_parts(samples, len) }
    };

    let frames = guard("process_samples", Vec::new(), || {
        handle::process_samples(Handle::from_raw(handle), input)
    });
    if frames.is_empty() {
        return ptr::null_mut();
    }

    let count = frames.len();
    let flat: Box<[f32]> = frames.into_iter().flatten().collect();
    if !out_frames.is_null() {
        unsafe { *out_frames = count };
    }
    Box::into_raw(flat) as *mut f32
}

/// Frees a buffer returned by [`mfe_process_samples`].
///
/// # Safety
///
/// `features` must be null or a pointer returned by `mfe_process_samples`
/// together with the frame count it reported, and must not be freed twice.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mfe_free_features(features: *mut f32, frames: usize) {
    if features.is_null() {
        return;
    }
    let len = frames * FEATURE_SIZE;
    drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(features, len)) });
}

/// Resets a session. No-op for invalid handles.
#[unsafe(no_mangle)]
pub extern "C" fn mfe_reset(handle: u64) {
    guard("reset", (), || handle::reset(Handle::from_raw(handle)));
}

/// Destroys a session. No-op for invalid handles.
#[unsafe(no_mangle)]
pub extern "C" fn mfe_destroy(handle: u64) {
    guard("destroy", (), || handle::destroy(Handle::from_raw(handle)));
}
