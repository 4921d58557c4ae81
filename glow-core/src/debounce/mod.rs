//! Debounced edge detection for the session button.
//!
//! The raw input is sampled once per cooperative pass. A sample is only
//! *accepted* once the debounce window has elapsed since the previous
//! accepted sample; accepted samples that differ from the previous accepted
//! level produce a [`PressEvent`]. Nothing is queued, so transitions shorter
//! than the pass cadence are dropped.

use core::time::Duration;

use crate::time::Instant;

/// Logic level read from a digital input.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    #[must_use]
    pub const fn from_high(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }

    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

/// Direction of an accepted transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Clean transition produced by the detector.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PressEvent {
    pub edge: Edge,
    pub at: Instant,
}

/// A raw sample the detector accepted this pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AcceptedSample {
    pub level: Level,
    pub at: Instant,
    pub edge: Option<Edge>,
}

impl AcceptedSample {
    /// Returns the transition carried by this sample, if the level changed.
    #[must_use]
    pub fn press_event(&self) -> Option<PressEvent> {
        self.edge.map(|edge| PressEvent { edge, at: self.at })
    }
}

/// Converts noisy button samples into debounced edges.
#[derive(Clone, Debug)]
pub struct DebouncedEdgeDetector {
    window: Duration,
    accepted_level: Level,
    last_accepted_at: Instant,
}

impl DebouncedEdgeDetector {
    /// Creates a detector seeded with the level read at boot.
    #[must_use]
    pub const fn new(window: Duration, initial_level: Level, now: Instant) -> Self {
        Self {
            window,
            accepted_level: initial_level,
            last_accepted_at: now,
        }
    }

    /// Level of the most recently accepted sample.
    #[must_use]
    pub const fn accepted_level(&self) -> Level {
        self.accepted_level
    }

    /// Timestamp of the most recently accepted sample.
    #[must_use]
    pub const fn last_accepted_at(&self) -> Instant {
        self.last_accepted_at
    }

    /// Offers a raw sample. Returns `None` while inside the debounce window.
    ///
    /// Once the window has elapsed the sample is accepted and the sampling
    /// timestamp advances even when the level is unchanged.
    pub fn sample(&mut self, level: Level, now: Instant) -> Option<AcceptedSample> {
        if !now.has_elapsed(self.last_accepted_at, self.window) {
            return None;
        }

        self.last_accepted_at = now;
        let previous = core::mem::replace(&mut self.accepted_level, level);
        let edge = match (previous, level) {
            (Level::Low, Level::High) => Some(Edge::Rising),
            (Level::High, Level::Low) => Some(Edge::Falling),
            _ => None,
        };

        Some(AcceptedSample {
            level,
            at: now,
            edge,
        })
    }
}
