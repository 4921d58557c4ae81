//! Cooperative round-robin scheduler.
//!
//! One call to [`CyclicScheduler::run_pass`] per loop pass. Activities are
//! evaluated in a fixed order and each runs at most one unit of work:
//!
//! 1. liveness feed, every `liveness_interval`, unconditionally;
//! 2. pattern emission, every pass while a session is active;
//! 3. beacon rotation, every `beacon_interval` while a session is active,
//!    first rotation immediately on session start;
//! 4. update-transport service step, every `maintenance_poll` in maintenance.

use core::time::Duration;

use crate::beacon::{BeaconCursor, BeaconRotation};
use crate::collaborators::{
    Collaborators, LivenessWatchdog, Platform, TransportEvent, TransportFault, UpdateTransport,
};
use crate::config::TimingConfig;
use crate::emission::{EmissionCursor, EmissionPattern, EmissionStep};
use crate::time::Instant;

/// Fixed-interval activity timer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Periodic {
    interval: Duration,
    last_run: Option<Instant>,
}

impl Periodic {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub const fn last_run(&self) -> Option<Instant> {
        self.last_run
    }

    /// Due when it never ran or `interval` has elapsed since the last run.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_run
            .is_none_or(|last| now.has_elapsed(last, self.interval))
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_run = Some(now);
    }

    /// Marks and returns `true` when due.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.mark(now);
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.last_run = None;
    }
}

/// Which activities may run on this pass.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct PassGates {
    pub session_active: bool,
    pub liveness_enabled: bool,
    pub beacon_enabled: bool,
    pub maintenance_poll: bool,
}

/// Work performed by one pass.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PassActivities {
    /// Gap since the previous pass when it exceeded the liveness interval,
    /// otherwise the time since the previous feed when this pass fed late.
    pub stall: Option<Duration>,
    pub liveness_fed: bool,
    pub emission: Option<EmissionStep>,
    pub rotation: Option<BeaconRotation>,
    pub service: Option<Result<TransportEvent, TransportFault>>,
}

/// Owns the emission and beacon cursors and the activity timers.
#[derive(Clone, Debug)]
pub struct CyclicScheduler {
    patterns: &'static [EmissionPattern],
    liveness: Periodic,
    liveness_slack: Duration,
    maintenance_poll: Periodic,
    beacon_interval: Duration,
    emission: EmissionCursor,
    beacon: BeaconCursor,
    last_pass_at: Option<Instant>,
}

impl CyclicScheduler {
    #[must_use]
    pub const fn new(timing: &TimingConfig, patterns: &'static [EmissionPattern]) -> Self {
        Self {
            patterns,
            liveness: Periodic::new(timing.liveness_interval),
            liveness_slack: timing.liveness_slack,
            maintenance_poll: Periodic::new(timing.maintenance_poll),
            beacon_interval: timing.beacon_interval,
            emission: EmissionCursor::new(patterns.len()),
            beacon: BeaconCursor::new(),
            last_pass_at: None,
        }
    }

    #[must_use]
    pub const fn emission(&self) -> &EmissionCursor {
        &self.emission
    }

    #[must_use]
    pub const fn beacon(&self) -> &BeaconCursor {
        &self.beacon
    }

    #[must_use]
    pub const fn last_fed_at(&self) -> Option<Instant> {
        self.liveness.last_run()
    }

    /// Records a feed performed outside a pass (at boot).
    pub fn note_fed(&mut self, now: Instant) {
        self.liveness.mark(now);
        self.last_pass_at = Some(now);
    }

    /// Rewinds the session-scoped cursors. Called on session start and end.
    pub fn reset_session(&mut self) {
        self.emission.reset();
        self.beacon.reset();
    }

    /// Runs one pass of the activity round.
    pub fn run_pass<P: Platform>(
        &mut self,
        now: Instant,
        gates: PassGates,
        io: &mut Collaborators<P>,
    ) -> PassActivities {
        let mut activities = PassActivities {
            stall: self.detect_stall(now),
            ..PassActivities::default()
        };

        let since_fed = self.liveness.last_run();
        if gates.liveness_enabled && self.liveness.poll(now) {
            io.watchdog.feed();
            activities.liveness_fed = true;
            if activities.stall.is_none() {
                activities.stall = since_fed.and_then(|fed| self.late_feed(now, fed));
            }
        }

        if gates.session_active {
            activities.emission = self.emission.emit_next(self.patterns, &mut io.emitter);
        }

        if gates.session_active
            && gates.beacon_enabled
            && self.beacon.is_due(now, self.beacon_interval)
        {
            activities.rotation = Some(self.beacon.rotate(now, &mut io.rng, &mut io.radio));
        }

        if gates.maintenance_poll && self.maintenance_poll.poll(now) {
            activities.service = Some(io.transport.service_once());
        }

        activities
    }

    /// Time since the previous feed when it overran the interval by more than the slack.
    fn late_feed(&self, now: Instant, fed: Instant) -> Option<Duration> {
        let since = now.saturating_duration_since(fed);
        let limit = self.liveness.interval().saturating_add(self.liveness_slack);
        (since > limit).then_some(since)
    }

    fn detect_stall(&mut self, now: Instant) -> Option<Duration> {
        let previous = self.last_pass_at.replace(now)?;
        let gap = now.saturating_duration_since(previous);
        (gap > self.liveness.interval()).then_some(gap)
    }
}
