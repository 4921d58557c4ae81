//! Normal/maintenance mode lifecycle.
//!
//! The mode is chosen once at boot from the mode switch. Leaving maintenance
//! is possible at runtime through the exit gesture; entering it again needs
//! a reboot. The coordinator also owns the update-transport lifecycle and
//! turns transport results into restart requests.

use core::{fmt, time::Duration};

use crate::collaborators::{
    BeaconRadio, BringUpError, LightOutputs, TransportEvent, TransportFault, UpdateTransport,
};
use crate::debounce::{AcceptedSample, Edge};
use crate::envelope::SharedBrightness;
use crate::session::{SessionMachine, StateChange};
use crate::time::Instant;

/// Operating mode selected by the mode switch.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Mode {
    #[default]
    Normal,
    Maintenance,
}

impl Mode {
    /// Maps the boot-time switch level to a mode. High selects maintenance.
    #[must_use]
    pub const fn from_switch(high: bool) -> Self {
        if high { Mode::Maintenance } else { Mode::Normal }
    }

    #[must_use]
    pub const fn as_index(self) -> u8 {
        match self {
            Mode::Normal => 0,
            Mode::Maintenance => 1,
        }
    }

    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Mode::Normal),
            1 => Some(Mode::Maintenance),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Normal => "normal",
            Mode::Maintenance => "maintenance",
        })
    }
}

/// Why a restart was requested.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RestartReason {
    UpdateFailed,
    UpdateApplied,
}

impl RestartReason {
    #[must_use]
    pub const fn as_index(self) -> u8 {
        match self {
            RestartReason::UpdateFailed => 0,
            RestartReason::UpdateApplied => 1,
        }
    }

    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(RestartReason::UpdateFailed),
            1 => Some(RestartReason::UpdateApplied),
            _ => None,
        }
    }
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RestartReason::UpdateFailed => "update-failed",
            RestartReason::UpdateApplied => "update-applied",
        })
    }
}

/// Unconditional restart the platform must carry out.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RestartRequest {
    pub reason: RestartReason,
    pub requested_at: Instant,
    pub after: Duration,
}

impl RestartRequest {
    #[must_use]
    pub fn due_at(&self) -> Instant {
        self.requested_at + self.after
    }

    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        now.has_elapsed(self.requested_at, self.after)
    }
}

/// What the core must do after a transport service step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransportAction {
    None,
    /// A transfer began; everything competing with it must stop.
    SuspendForTransfer,
    Restart(RestartRequest),
}

/// Hold-to-exit detector for maintenance mode.
///
/// Arms on an accepted rising edge and fires on a later accepted high sample
/// once the hold time has elapsed. An accepted low sample disarms it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExitGesture {
    hold: Duration,
    armed_at: Option<Instant>,
}

impl ExitGesture {
    #[must_use]
    pub const fn new(hold: Duration) -> Self {
        Self {
            hold,
            armed_at: None,
        }
    }

    #[must_use]
    pub const fn armed_at(&self) -> Option<Instant> {
        self.armed_at
    }

    /// Feeds one accepted sample. Returns `true` when the gesture completes.
    pub fn observe(&mut self, sample: &AcceptedSample) -> bool {
        if sample.edge == Some(Edge::Rising) {
            self.armed_at = Some(sample.at);
            return false;
        }
        if !sample.level.is_high() {
            self.armed_at = None;
            return false;
        }
        if let Some(armed_at) = self.armed_at
            && sample.at.has_elapsed(armed_at, self.hold)
        {
            self.armed_at = None;
            return true;
        }
        false
    }
}

/// Result of bringing the mode up at boot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BootOutcome {
    pub mode: Mode,
    /// `Some` when maintenance mode could not bring its transport up.
    pub transport_error: Option<BringUpError>,
}

/// Owns the mode flag and the update-transport lifecycle.
#[derive(Clone, Debug)]
pub struct ModeCoordinator {
    mode: Mode,
    transport_enabled: bool,
    transfer_in_progress: bool,
    gesture: ExitGesture,
}

impl ModeCoordinator {
    #[must_use]
    pub const fn new(exit_hold: Duration) -> Self {
        Self {
            mode: Mode::Normal,
            transport_enabled: false,
            transfer_in_progress: false,
            gesture: ExitGesture::new(exit_hold),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub const fn is_maintenance(&self) -> bool {
        matches!(self.mode, Mode::Maintenance)
    }

    /// Returns `true` while the transport is up and may be serviced.
    #[must_use]
    pub const fn transport_enabled(&self) -> bool {
        self.transport_enabled && self.is_maintenance()
    }

    #[must_use]
    pub const fn transfer_in_progress(&self) -> bool {
        self.transfer_in_progress
    }

    #[must_use]
    pub const fn gesture(&self) -> &ExitGesture {
        &self.gesture
    }

    /// Applies the boot-time switch reading, bringing the transport up in
    /// maintenance mode. A failed bring-up leaves the transport disabled.
    pub fn boot<T: UpdateTransport>(&mut self, switch_high: bool, transport: &mut T) -> BootOutcome {
        self.mode = Mode::from_switch(switch_high);
        self.transfer_in_progress = false;
        self.transport_enabled = false;

        let mut transport_error = None;
        if self.is_maintenance() {
            match transport.begin() {
                Ok(()) => self.transport_enabled = true,
                Err(error) => transport_error = Some(error),
            }
        }

        BootOutcome {
            mode: self.mode,
            transport_error,
        }
    }

    /// Feeds an accepted button sample to the exit gesture. Returns `true`
    /// when maintenance mode should be left.
    pub fn observe_sample(&mut self, sample: &AcceptedSample) -> bool {
        if !self.is_maintenance() || self.transfer_in_progress {
            return false;
        }
        self.gesture.observe(sample)
    }

    /// Leaves maintenance mode.
    ///
    /// Steps run in a fixed order: transport teardown, session forced idle
    /// with breathing off, beacon stopped, lights off, and finally the mode
    /// flag cleared.
    pub fn exit_maintenance<T, B, L>(
        &mut self,
        now: Instant,
        transport: &mut T,
        session: &mut SessionMachine,
        brightness: &SharedBrightness,
        radio: Option<&mut B>,
        lights: &mut L,
    ) -> Option<StateChange>
    where
        T: UpdateTransport,
        B: BeaconRadio,
        L: LightOutputs,
    {
        if !self.is_maintenance() {
            return None;
        }

        if self.transport_enabled {
            transport.end();
            self.transport_enabled = false;
        }

        let change = session.force_idle(now);
        brightness.deactivate();

        if let Some(radio) = radio {
            radio.stop();
        }

        lights.all_off();

        self.mode = Mode::Normal;
        change
    }

    /// Maps one transport service step onto the action the core must take.
    pub fn on_service_result(
        &mut self,
        result: Result<TransportEvent, TransportFault>,
        now: Instant,
        fatal_restart_delay: Duration,
    ) -> TransportAction {
        match result {
            Ok(TransportEvent::Idle) => TransportAction::None,
            Ok(TransportEvent::TransferStarted) => {
                if self.transfer_in_progress {
                    TransportAction::None
                } else {
                    self.transfer_in_progress = true;
                    TransportAction::SuspendForTransfer
                }
            }
            Ok(TransportEvent::TransferComplete) => TransportAction::Restart(RestartRequest {
                reason: RestartReason::UpdateApplied,
                requested_at: now,
                after: Duration::ZERO,
            }),
            Err(TransportFault::Fatal) => {
                self.transport_enabled = false;
                TransportAction::Restart(RestartRequest {
                    reason: RestartReason::UpdateFailed,
                    requested_at: now,
                    after: fatal_restart_delay,
                })
            }
        }
    }
}
