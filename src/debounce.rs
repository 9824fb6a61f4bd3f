//! Scheduling helpers for the foreground redraw loop.
//!
//! The renderer polls these from its event loop: [`RefreshTimer`] gates the
//! fixed-interval redraw tick, [`ResizeDebouncer`] coalesces bursts of resize
//! events into a single re-derivation after a quiet period.

use std::time::{Duration, Instant};

/// Fixed-interval tick gate for the redraw loop.
#[derive(Debug)]
pub struct RefreshTimer {
    interval: Duration,
    last_tick: Option<Instant>,
}

impl RefreshTimer {
    /// Timer firing every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: None,
        }
    }

    /// Change the tick interval; the running cadence adapts on the next poll.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Whether a tick is due at `now`. The first poll always fires.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last_tick {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_tick = Some(now);
                true
            }
        }
    }
}

/// Coalesces rapid resize events; ready only after a quiet period.
#[derive(Debug)]
pub struct ResizeDebouncer {
    quiet: Duration,
    pending_since: Option<Instant>,
}

impl ResizeDebouncer {
    /// Debouncer with the given quiet period.
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending_since: None,
        }
    }

    /// Record a resize event at `now`, restarting the quiet period.
    pub fn mark(&mut self, now: Instant) {
        self.pending_since = Some(now);
    }

    /// Whether any resize is waiting to be applied.
    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// Consume the pending resize if the quiet period has elapsed at `now`.
    pub fn take_ready(&mut self, now: Instant) -> bool {
        match self.pending_since {
            Some(since) if now.duration_since(since) >= self.quiet => {
                self.pending_since = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_timer_fires_immediately_then_on_interval() {
        let mut timer = RefreshTimer::new(Duration::from_millis(33));
        let start = Instant::now();
        assert!(timer.due(start));
        assert!(!timer.due(start + Duration::from_millis(10)));
        assert!(timer.due(start + Duration::from_millis(40)));
        assert!(!timer.due(start + Duration::from_millis(50)));
    }

    #[test]
    fn debouncer_waits_for_quiet_period() {
        let mut debouncer = ResizeDebouncer::new(Duration::from_millis(250));
        let start = Instant::now();
        debouncer.mark(start);
        assert!(debouncer.is_pending());
        assert!(!debouncer.take_ready(start + Duration::from_millis(100)));
        assert!(debouncer.take_ready(start + Duration::from_millis(300)));
        assert!(!debouncer.is_pending());
        assert!(!debouncer.take_ready(start + Duration::from_millis(600)));
    }

    #[test]
    fn repeated_marks_restart_the_quiet_period() {
        let mut debouncer = ResizeDebouncer::new(Duration::from_millis(200));
        let start = Instant::now();
        debouncer.mark(start);
        debouncer.mark(start + Duration::from_millis(150));
        assert!(
            !debouncer.take_ready(start + Duration::from_millis(250)),
            "second mark must push the deadline out"
        );
        assert!(debouncer.take_ready(start + Duration::from_millis(350)));
    }
}
