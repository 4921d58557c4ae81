//! Monotonic millisecond timestamps shared by every component.
//!
//! The core never reads a clock. Firmware converts `embassy_time::Instant`
//! and the emulator converts its simulated clock into [`Instant`] once per
//! pass, so all deadline arithmetic happens on plain integers.

use core::{fmt, ops::Add, time::Duration};

/// Milliseconds since boot.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Instant(u64);

impl Instant {
    /// Boot time.
    pub const ZERO: Self = Self(0);

    /// Creates an instant from a raw millisecond count.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the raw millisecond count.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed from `earlier` to `self`, saturating at zero.
    #[must_use]
    pub const fn elapsed_ms_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Returns the saturating duration from `earlier` to `self`.
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.elapsed_ms_since(earlier))
    }

    /// Returns `true` once at least `interval` has passed since `earlier`.
    #[must_use]
    pub fn has_elapsed(self, earlier: Self, interval: Duration) -> bool {
        u128::from(self.elapsed_ms_since(earlier)) >= interval.as_millis()
    }
}

impl Add<Duration> for Instant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let millis = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Converts a duration to whole milliseconds, saturating on overflow.
#[must_use]
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_saturates_when_clock_runs_backwards() {
        let earlier = Instant::from_millis(500);
        let later = Instant::from_millis(200);
        assert_eq!(later.elapsed_ms_since(earlier), 0);
        assert_eq!(later.saturating_duration_since(earlier), Duration::ZERO);
    }

    #[test]
    fn has_elapsed_is_inclusive_at_the_boundary() {
        let start = Instant::from_millis(1_000);
        let interval = Duration::from_millis(50);
        assert!(!Instant::from_millis(1_049).has_elapsed(start, interval));
        assert!(Instant::from_millis(1_050).has_elapsed(start, interval));
    }

    #[test]
    fn add_duration_advances_millis() {
        let start = Instant::from_millis(10);
        assert_eq!(start + Duration::from_secs(3), Instant::from_millis(3_010));
    }
}
