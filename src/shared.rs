//! The mutex-guarded slot holding the summary considered authoritative for
//! display.
//!
//! Exactly one value is shared between the background decode session and the
//! foreground renderer. Writers go through a [`SessionToken`] carrying the
//! generation observed at session start; a publish with a stale token is a
//! silent no-op, which is what keeps a finishing session for the previous
//! track from overwriting the current one. The lock is held only for memory
//! copies and bucket reduction, never across decoder or store I/O.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::display::DisplaySummary;
use crate::summary::Summary;
use crate::track::TrackKey;

struct Slot {
    generation: u64,
    key: Option<TrackKey>,
    summary: Option<Summary>,
}

/// Cheaply clonable handle to the shared summary slot.
#[derive(Clone)]
pub struct SharedSummary {
    inner: Arc<Mutex<Slot>>,
}

/// Write capability captured at session start; stale after the next
/// `begin_track` or `clear`.
#[derive(Clone, Copy, Debug)]
pub struct SessionToken {
    generation: u64,
}

impl Default for SharedSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSummary {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Slot {
                generation: 0,
                key: None,
                summary: None,
            })),
        }
    }

    /// Start a new track: bump the generation, clear the slot, and hand the
    /// caller the only token allowed to write until the next track starts.
    pub fn begin_track(&self, key: &TrackKey) -> SessionToken {
        let mut slot = self.lock();
        slot.generation += 1;
        slot.key = Some(key.clone());
        slot.summary = None;
        SessionToken {
            generation: slot.generation,
        }
    }

    /// Clear the slot on track-stopped. Outstanding tokens become stale.
    pub fn clear(&self) {
        let mut slot = self.lock();
        slot.generation += 1;
        slot.key = None;
        slot.summary = None;
    }

    /// Whether `token` still owns the slot.
    pub fn is_current(&self, token: &SessionToken) -> bool {
        self.lock().generation == token.generation
    }

    /// Replace the slot's summary if `token` is still current.
    ///
    /// Returns false (and changes nothing) for a stale token. Within one
    /// session, each publish wholly replaces the previous snapshot, so later
    /// publications strictly extend earlier ones.
    pub fn publish(&self, token: &SessionToken, summary: Summary) -> bool {
        let mut slot = self.lock();
        if slot.generation != token.generation {
            return false;
        }
        slot.summary = Some(summary);
        true
    }

    /// Key of the track currently owning the slot, if any.
    pub fn current_key(&self) -> Option<TrackKey> {
        self.lock().key.clone()
    }

    /// Clone of the current summary, if one has been published.
    pub fn current_summary(&self) -> Option<Summary> {
        self.lock().summary.clone()
    }

    /// Re-bucket the current summary to `target_width` columns per displayed
    /// channel (one channel when `mono`).
    ///
    /// The reduction runs while holding the lock; its cost is bounded by the
    /// storage bucket count, so it is safe on a UI refresh tick and a
    /// concurrent publish can never be observed half-applied.
    pub fn snapshot_for_width(&self, target_width: usize, mono: bool) -> Option<DisplaySummary> {
        let slot = self.lock();
        let summary = slot.summary.as_ref()?;
        Some(crate::display::reduce_for_display(
            summary,
            target_width,
            mono,
        ))
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }
}
