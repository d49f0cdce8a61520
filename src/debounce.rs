//! Trailing-edge debouncing for bursty events.

use std::time::Duration;

use tokio::time::Instant;

/// Default spacing between debounced resize renders.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Rate limiter that fires at most once per `delay` and never loses the last
/// trigger of a burst.
///
/// The debouncer only keeps time; whoever owns it waits for
/// [`Debouncer::deadline`] and then calls [`Debouncer::poll`].
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    last_fire: Option<Instant>,
    pending: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_fire: None,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Register an event at `now`.
    ///
    /// Returns `true` when the effect should run immediately. Otherwise a
    /// trailing fire is scheduled one `delay` from now, replacing any fire
    /// that was already pending.
    pub fn trigger(&mut self, now: Instant) -> bool {
        self.pending = None;

        let idle = self
            .last_fire
            .map_or(true, |last| now.saturating_duration_since(last) > self.delay);

        if idle {
            self.last_fire = Some(now);
            true
        } else {
            self.pending = Some(now + self.delay);
            false
        }
    }

    /// When the pending trailing fire is due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Consume the pending fire if it is due at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(due) if due <= now => {
                self.pending = None;
                self.last_fire = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Drop any pending fire without running it.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}
