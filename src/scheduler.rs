//! Interval timers for the cooperative loop.
//!
//! The loop owns one [`IntervalTimer`] per periodic duty.  A timer is due
//! when `now - last_fired >= period`; marking it stores `now` no matter
//! what the guarded action did, so a failing action is retried only after
//! another full period.
//!
//! ```text
//!   last_fired            last_fired + period
//!       │◀──────── period ────────▶│
//!  ─────┼──────────────────────────┼──────▶ now
//!       mark(now)                  is_due(now) == true
//! ```

/// A single periodic timer driven by an external millisecond clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTimer {
    /// `None` until the first fire: the timer is due immediately.
    last_fired_ms: Option<u64>,
    period_ms: u64,
}

impl IntervalTimer {
    /// Timer that is due on the very first check.
    pub const fn due_immediately(period_ms: u64) -> Self {
        Self {
            last_fired_ms: None,
            period_ms,
        }
    }

    /// Timer whose reference point is `last_fired_ms`.
    pub const fn starting_at(last_fired_ms: u64, period_ms: u64) -> Self {
        Self {
            last_fired_ms: Some(last_fired_ms),
            period_ms,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn last_fired_ms(&self) -> Option<u64> {
        self.last_fired_ms
    }

    /// Milliseconds since the last fire (saturates on a clock that steps back).
    pub fn elapsed_ms(&self, now_ms: u64) -> Option<u64> {
        self.last_fired_ms.map(|last| now_ms.saturating_sub(last))
    }

    /// Whether the guarded action should run at `now_ms`.
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.elapsed_ms(now_ms)
            .is_none_or(|elapsed| elapsed >= self.period_ms)
    }

    /// Record a fire at `now_ms`.
    pub fn mark(&mut self, now_ms: u64) {
        self.last_fired_ms = Some(now_ms);
    }

    /// Check and mark in one step. Returns `true` if the timer fired.
    pub fn fire_if_due(&mut self, now_ms: u64) -> bool {
        if self.is_due(now_ms) {
            self.mark(now_ms);
            true
        } else {
            false
        }
    }
}
