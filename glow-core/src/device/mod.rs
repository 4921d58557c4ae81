//! The single owned device context.
//!
//! [`DeviceContext`] holds every piece of session, mode and scheduling state
//! plus the platform collaborators, and advances them once per loop pass:
//!
//! 1. debounce the raw button sample;
//! 2. evaluate the session state machine (at most one transition), then the
//!    maintenance exit gesture, applying transition side effects;
//! 3. refresh the brightness curve;
//! 4. run the scheduler activities in their fixed order;
//! 5. act on the update-transport result.
//!
//! The only state shared with the envelope tick is the [`SharedBrightness`]
//! the context is constructed with.

use crate::beacon::BeaconRotation;
use crate::collaborators::{
    BeaconRadio, BringUpError, Collaborators, EnvelopeTickControl, LightOutputs,
    LivenessWatchdog, Platform,
};
use crate::config::{EnvelopeConfig, TimingConfig};
use crate::debounce::{DebouncedEdgeDetector, Level};
use crate::emission::EmissionPattern;
use crate::envelope::{EnvelopeRefresher, SharedBrightness};
use crate::mode::{Mode, ModeCoordinator, RestartRequest, TransportAction};
use crate::scheduler::{CyclicScheduler, PassActivities, PassGates};
use crate::session::{SessionMachine, SessionState, StateChange};
use crate::telemetry::{
    BeaconTelemetry, StatusSnapshot, Subsystem, TelemetryEventKind, TelemetryPayload,
    TelemetryRecorder,
};
use crate::time::Instant;

/// Outcome of [`DeviceContext::boot`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BootReport {
    pub mode: Mode,
    pub radio: Result<(), BringUpError>,
    /// `None` outside maintenance mode.
    pub transport: Option<Result<(), BringUpError>>,
}

/// Summary of one loop pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct PassReport {
    pub at: Instant,
    pub state: SessionState,
    /// Transition applied by the state machine this pass.
    pub change: Option<StateChange>,
    pub exited_maintenance: bool,
    /// Set when a pass or a liveness feed overran the liveness interval.
    pub liveness_missed: bool,
    pub liveness_fed: bool,
    pub emitted: Option<usize>,
    pub rotation: Option<BeaconRotation>,
    pub transfer_started: bool,
    /// Pending restart; the platform resets once it is due.
    pub restart: Option<RestartRequest>,
}

/// Session context plus collaborators for one device.
pub struct DeviceContext<'a, P: Platform> {
    timing: TimingConfig,
    io: Collaborators<P>,
    brightness: &'a SharedBrightness,
    debounce: DebouncedEdgeDetector,
    session: SessionMachine,
    refresher: EnvelopeRefresher,
    scheduler: CyclicScheduler,
    mode: ModeCoordinator,
    telemetry: TelemetryRecorder,
    raw_level: Level,
    beacon_enabled: bool,
    liveness_enabled: bool,
    tick_suspended: bool,
    restart: Option<RestartRequest>,
}

impl<'a, P: Platform> DeviceContext<'a, P> {
    /// Builds the context. `initial_level` is the button level read before
    /// the first pass; `now` seeds the debounce window.
    #[must_use]
    pub fn new(
        timing: TimingConfig,
        envelope: EnvelopeConfig,
        patterns: &'static [EmissionPattern],
        brightness: &'a SharedBrightness,
        io: Collaborators<P>,
        initial_level: Level,
        now: Instant,
    ) -> Self {
        Self {
            timing,
            io,
            brightness,
            debounce: DebouncedEdgeDetector::new(timing.debounce, initial_level, now),
            session: SessionMachine::new(timing.long_press, timing.short_session),
            refresher: EnvelopeRefresher::new(envelope, timing.brightness_refresh),
            scheduler: CyclicScheduler::new(&timing, patterns),
            mode: ModeCoordinator::new(timing.maintenance_exit_hold),
            telemetry: TelemetryRecorder::new(),
            raw_level: initial_level,
            beacon_enabled: false,
            liveness_enabled: true,
            tick_suspended: false,
            restart: None,
        }
    }

    /// Runs the boot sequence: feed the watchdog, force the lights off, apply
    /// the mode switch, bring up the transport (maintenance only) and the
    /// radio. Bring-up failures disable the subsystem and boot continues.
    pub fn boot(&mut self, now: Instant, switch_high: bool) -> BootReport {
        self.io.watchdog.feed();
        self.scheduler.note_fed(now);
        self.brightness.deactivate();
        self.io.lights.all_off();

        let outcome = self.mode.boot(switch_high, &mut self.io.transport);
        self.telemetry.record(
            TelemetryEventKind::BootMode(outcome.mode),
            TelemetryPayload::none(),
            now,
        );
        let transport = match (outcome.mode, outcome.transport_error) {
            (Mode::Normal, _) => None,
            (Mode::Maintenance, None) => Some(Ok(())),
            (Mode::Maintenance, Some(error)) => {
                self.record_disabled(Subsystem::UpdateTransport, error, now);
                Some(Err(error))
            }
        };

        let radio = self.io.radio.bring_up();
        match radio {
            Ok(()) => self.beacon_enabled = true,
            Err(error) => {
                self.beacon_enabled = false;
                self.record_disabled(Subsystem::BeaconRadio, error, now);
            }
        }

        BootReport {
            mode: outcome.mode,
            radio,
            transport,
        }
    }

    /// Advances the device by one loop pass.
    pub fn poll(&mut self, now: Instant, button_high: bool) -> PassReport {
        let level = Level::from_high(button_high);
        self.raw_level = level;

        let sample = self.debounce.sample(level, now);

        let mut change = None;
        if !self.mode.transfer_in_progress() {
            change = self
                .session
                .evaluate(now, level, sample.and_then(|s| s.press_event()));
            if let Some(change) = change {
                self.apply_change(change);
            }
        }

        let mut exited_maintenance = false;
        if let Some(sample) = sample
            && self.mode.observe_sample(&sample)
        {
            self.exit_maintenance(now);
            exited_maintenance = true;
        }

        let started_at = self.session.timer().map(|timer| timer.session_started_at);
        self.refresher.refresh(now, started_at, self.brightness);

        let gates = PassGates {
            session_active: self.session.state().is_active(),
            liveness_enabled: self.liveness_enabled,
            beacon_enabled: self.beacon_enabled,
            maintenance_poll: self.mode.transport_enabled() && self.restart.is_none(),
        };
        let activities = self.scheduler.run_pass(now, gates, &mut self.io);
        self.record_activities(now, &activities);

        let mut transfer_started = false;
        if let Some(result) = activities.service {
            match self
                .mode
                .on_service_result(result, now, self.timing.fatal_restart_delay)
            {
                TransportAction::None => {}
                TransportAction::SuspendForTransfer => {
                    self.suspend_for_transfer(now);
                    transfer_started = true;
                }
                TransportAction::Restart(request) => self.schedule_restart(request),
            }
        }

        PassReport {
            at: now,
            state: self.session.state(),
            change,
            exited_maintenance,
            liveness_missed: activities.stall.is_some(),
            liveness_fed: activities.liveness_fed,
            emitted: activities.emission.map(|step| step.index),
            rotation: activities.rotation,
            transfer_started,
            restart: self.restart,
        }
    }

    /// Returns the current status, as carried by heartbeat events.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        let shared = self.brightness.snapshot();
        let state = self.session.state();
        StatusSnapshot {
            session: state,
            button_high: self.raw_level.is_high(),
            mode: self.mode.mode(),
            breathing_active: shared.breathing_active,
            brightness: shared.brightness,
            beacon_active: state.is_active() && self.beacon_enabled,
            pattern_index: u8::try_from(self.scheduler.emission().pattern_index())
                .unwrap_or(u8::MAX),
        }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode.mode()
    }

    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    #[must_use]
    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    #[must_use]
    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    #[must_use]
    pub fn collaborators(&self) -> &Collaborators<P> {
        &self.io
    }

    pub fn collaborators_mut(&mut self) -> &mut Collaborators<P> {
        &mut self.io
    }

    #[must_use]
    pub fn beacon_enabled(&self) -> bool {
        self.beacon_enabled
    }

    #[must_use]
    pub fn liveness_enabled(&self) -> bool {
        self.liveness_enabled
    }

    #[must_use]
    pub fn tick_suspended(&self) -> bool {
        self.tick_suspended
    }

    #[must_use]
    pub fn pending_restart(&self) -> Option<RestartRequest> {
        self.restart
    }

    fn apply_change(&mut self, change: StateChange) {
        self.telemetry
            .record_transition(change.from, change.to, change.trigger, change.at);

        if change.started_session() {
            self.scheduler.reset_session();
            self.brightness.activate();
        } else if change.ended_session() {
            self.stop_session_outputs();
        }
    }

    fn stop_session_outputs(&mut self) {
        self.brightness.deactivate();
        if self.beacon_enabled {
            self.io.radio.stop();
        }
        self.io.lights.all_off();
        self.scheduler.reset_session();
    }

    fn exit_maintenance(&mut self, now: Instant) {
        let radio = if self.beacon_enabled {
            Some(&mut self.io.radio)
        } else {
            None
        };
        let change = self.mode.exit_maintenance(
            now,
            &mut self.io.transport,
            &mut self.session,
            self.brightness,
            radio,
            &mut self.io.lights,
        );
        if let Some(change) = change {
            self.telemetry
                .record_transition(change.from, change.to, change.trigger, change.at);
        }
        self.scheduler.reset_session();
        self.telemetry.record(
            TelemetryEventKind::MaintenanceExited,
            TelemetryPayload::none(),
            now,
        );
    }

    fn suspend_for_transfer(&mut self, now: Instant) {
        self.telemetry.record(
            TelemetryEventKind::UpdateTransferStarted,
            TelemetryPayload::none(),
            now,
        );

        self.brightness.deactivate();
        if let Some(change) = self.session.force_idle(now) {
            self.telemetry
                .record_transition(change.from, change.to, change.trigger, change.at);
        }
        self.scheduler.reset_session();

        if self.beacon_enabled {
            self.io.radio.stop();
            self.beacon_enabled = false;
            self.telemetry.record(
                TelemetryEventKind::SubsystemDisabled(Subsystem::BeaconRadio),
                TelemetryPayload::none(),
                now,
            );
        }

        self.io.tick.suspend();
        self.tick_suspended = true;
        self.io.lights.all_off();

        self.io.watchdog.release();
        self.liveness_enabled = false;
    }

    fn schedule_restart(&mut self, request: RestartRequest) {
        if self.restart.is_some() {
            return;
        }
        self.restart = Some(request);
        self.telemetry.record(
            TelemetryEventKind::RestartScheduled(request.reason),
            TelemetryPayload::Restart(request.after),
            request.requested_at,
        );
    }

    fn record_disabled(&mut self, subsystem: Subsystem, error: BringUpError, now: Instant) {
        self.telemetry.record(
            TelemetryEventKind::SubsystemDisabled(subsystem),
            TelemetryPayload::BringUp(error),
            now,
        );
    }

    fn record_activities(&mut self, now: Instant, activities: &PassActivities) {
        if let Some(gap) = activities.stall {
            self.telemetry.record(
                TelemetryEventKind::LoopStalled,
                TelemetryPayload::Stall(gap),
                now,
            );
        }

        if activities.liveness_fed {
            let status = self.status();
            self.telemetry.record(
                TelemetryEventKind::Heartbeat,
                TelemetryPayload::Status(status),
                now,
            );
        }

        if let Some(step) = activities.emission
            && step.completed_cycle
        {
            self.telemetry.record(
                TelemetryEventKind::PatternCycleCompleted,
                TelemetryPayload::none(),
                now,
            );
        }

        if let Some(rotation) = activities.rotation
            && rotation.first_in_session
        {
            self.telemetry.record(
                TelemetryEventKind::BeaconStarted(rotation.category),
                TelemetryPayload::Beacon(BeaconTelemetry {
                    payload_index: u8::try_from(rotation.payload_index).unwrap_or(u8::MAX),
                    kind: rotation.kind,
                    power: rotation.power,
                }),
                now,
            );
        }
    }
}
