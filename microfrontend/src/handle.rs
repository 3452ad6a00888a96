//! Opaque session handles for host runtimes.
//!
//! Hosts that cannot hold Rust values directly keep a [`Handle`] instead.
//! Every operation accepts any handle value: unknown, destroyed or zero
//! handles produce empty results and are logged instead of faulting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::session::FeatureSession;

/// Identifies a live session in the process-wide registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// The "no session" sentinel returned when creation fails.
    pub const NONE: Handle = Handle(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

type SharedSession = Arc<Mutex<FeatureSession>>;

static SESSIONS: Lazy<Mutex<HashMap<u64, SharedSession>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Handles are never reused, so a stale handle cannot reach a newer session.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Locks `mutex`, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Looks up a live session. The registry lock is released before returning,
/// so work on one session never blocks calls on another.
fn lookup(handle: Handle) -> Option<SharedSession> {
    lock(&SESSIONS).get(&handle.0).cloned()
}

/// Creates a session and returns its handle, or [`Handle::NONE`] if the
/// engine rejects the parameters.
pub fn create(sample_rate: i32, step_size_ms: i32) -> Handle {
    match FeatureSession::new(sample_rate, step_size_ms) {
        Ok(session) => {
            let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
            lock(&SESSIONS).insert(id, Arc::new(Mutex::new(session)));
            debug!(handle = id, sample_rate, step_size_ms, "microfrontend: handle created");
            Handle(id)
        }
        Err(e) => {
            warn!(error = %e, "microfrontend: create failed");
            Handle::NONE
        }
    }
}

/// Feeds samples to the session behind `handle`.
///
/// Returns one 40-value row per completed frame, or nothing if `handle` is
/// not live.
pub fn process_samples(handle: Handle, samples: &[i16]) -> Vec<Vec<f32>> {
    let Some(session) = lookup(handle) else {
        warn!(handle = handle.0, "microfrontend: process on invalid handle");
        return Vec::new();
    };
    let frames = lock(&session).process_samples(samples);
    frames.into_iter().map(|frame| frame.to_vec()).collect()
}

/// Resets the session behind `handle`. No-op for invalid handles.
pub fn reset(handle: Handle) {
    match lookup(handle) {
        Some(session) => lock(&session).reset(),
        None => warn!(handle = handle.0, "microfrontend: reset on invalid handle"),
    }
}

/// Releases the session behind `handle`. No-op for invalid handles, so
/// destroying twice is harmless. A call still running on the session
/// finishes first; the engine is released when it returns.
pub fn destroy(handle: Handle) {
    let removed = lock(&SESSIONS).remove(&handle.0);
    if removed.is_none() {
        warn!(handle = handle.0, "microfrontend: destroy on invalid handle");
    }
}
