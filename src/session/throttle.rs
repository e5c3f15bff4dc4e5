//! Client-side rate limiting for advisory writes

use std::time::{Duration, Instant};

/// Lets at most one event through per `interval`.
///
/// Skipped events are not queued. Callers that must not lose the last value
/// use [`Throttle::reserve_at`] to book a trailing emission.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Build from a maximum rate
    pub fn per_second(rate: u32) -> Self {
        Self::new(Duration::from_millis(1000 / u64::from(rate.max(1))))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true and records the attempt if enough time has passed
    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    /// Book the next free slot and return how long until it opens. The slot
    /// counts as an emission, so `ready` stays false until one interval past it.
    pub fn reserve_at(&mut self, now: Instant) -> Duration {
        let slot = match self.last {
            Some(last) => (last + self.interval).max(now),
            None => now,
        };
        self.last = Some(slot);
        slot.saturating_duration_since(now)
    }

    pub fn reserve(&mut self) -> Duration {
        self.reserve_at(Instant::now())
    }

    /// Forget the last emission so the next call passes
    pub fn reset(&mut self) {
        self.last = None;
    }
}
