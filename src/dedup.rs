//! Admission queue guaranteeing at most one decode session per track key.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
};

use crate::track::TrackKey;

/// Small ordered set of in-flight track keys behind a single mutex.
#[derive(Default)]
pub struct DedupQueue {
    in_flight: Mutex<BTreeSet<String>>,
}

impl DedupQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim `key`. Returns true when the caller must run the session;
    /// false when one is already in flight. Claiming an already-present key
    /// is a no-op.
    pub fn try_admit(&self, key: &TrackKey) -> bool {
        let mut guard = self.lock();
        guard.insert(key.cache_key())
    }

    /// Release `key` after the session ends, regardless of outcome. Must be
    /// called exactly once by whichever caller `try_admit` returned true to;
    /// [`AdmitGuard`] does this on drop.
    pub fn release(&self, key: &TrackKey) {
        let mut guard = self.lock();
        if !guard.remove(&key.cache_key()) {
            tracing::debug!("Released {key} which was not in flight");
        }
    }

    /// Whether a session for `key` is currently in flight.
    pub fn contains(&self, key: &TrackKey) -> bool {
        self.lock().contains(&key.cache_key())
    }

    /// Claim `key`, returning a guard that releases it on drop.
    pub fn admit(self: &Arc<Self>, key: &TrackKey) -> Option<AdmitGuard> {
        if self.try_admit(key) {
            Some(AdmitGuard {
                queue: Arc::clone(self),
                key: key.clone(),
            })
        } else {
            tracing::debug!("Session for {key} already queued, dropping request");
            None
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.in_flight.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Releases the claimed key exactly once, on every exit path.
pub struct AdmitGuard {
    queue: Arc<DedupQueue>,
    key: TrackKey,
}

impl Drop for AdmitGuard {
    fn drop(&mut self) {
        self.queue.release(&self.key);
    }
}
