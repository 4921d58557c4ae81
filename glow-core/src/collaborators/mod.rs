//! Interfaces to the hardware-facing subsystems the core drives.
//!
//! Firmware and emulator supply concrete implementations; the core only ever
//! talks to these traits. Every call is expected to return within a bounded
//! latency well below the liveness interval.

use core::fmt;

use rand_core::RngCore;

use crate::beacon::{AdvertisingKind, BeaconAddress, TxPowerStep};
use crate::emission::EmissionPattern;

/// Failure reported while bringing a subsystem up.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BringUpError {
    /// The subsystem is not fitted on this board.
    Unavailable,
    /// The subsystem refused to initialise.
    Rejected,
}

impl fmt::Display for BringUpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BringUpError::Unavailable => f.write_str("subsystem unavailable"),
            BringUpError::Rejected => f.write_str("subsystem rejected bring-up"),
        }
    }
}

/// Progress reported by one update-transport service step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransportEvent {
    Idle,
    TransferStarted,
    TransferComplete,
}

/// Unrecoverable update-transport failure.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransportFault {
    Fatal,
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFault::Fatal => f.write_str("fatal update failure"),
        }
    }
}

/// Transmits remote-control patterns.
pub trait PatternEmitter {
    fn transmit(&mut self, pattern: &EmissionPattern);
}

/// Short-range advertising radio.
pub trait BeaconRadio {
    /// Powers up the radio stack.
    ///
    /// # Errors
    ///
    /// Returns [`BringUpError`] when the radio is missing or fails to start.
    fn bring_up(&mut self) -> Result<(), BringUpError>;

    fn set_address(&mut self, address: BeaconAddress);

    /// Replaces the advertised content.
    fn set_advertisement_payload(&mut self, payload: &[u8]);

    fn set_advertising_kind(&mut self, kind: AdvertisingKind);

    fn set_tx_power(&mut self, step: TxPowerStep);

    fn start(&mut self);

    fn stop(&mut self);
}

/// Field-update transport active in maintenance mode.
pub trait UpdateTransport {
    /// Starts listening for update transfers.
    ///
    /// # Errors
    ///
    /// Returns [`BringUpError`] when the transport is missing or fails to start.
    fn begin(&mut self) -> Result<(), BringUpError>;

    /// Performs one non-blocking service step.
    ///
    /// # Errors
    ///
    /// Returns [`TransportFault::Fatal`] when the transfer cannot continue.
    fn service_once(&mut self) -> Result<TransportEvent, TransportFault>;

    fn end(&mut self);
}

/// Supervising watchdog.
pub trait LivenessWatchdog {
    fn feed(&mut self);

    /// Stops supervision for the rest of the process lifetime.
    fn release(&mut self);
}

/// Light outputs rendered by the envelope tick.
pub trait LightOutputs {
    fn drive(&mut self, on: bool);

    /// Forces every output to the off level.
    fn all_off(&mut self) {
        self.drive(false);
    }
}

/// Handle on the hardware tick that renders the envelope.
pub trait EnvelopeTickControl {
    /// Stops the tick. There is no resume; suspension ends in a restart.
    fn suspend(&mut self);
}

/// Binds the concrete collaborator types of one target.
pub trait Platform {
    type Emitter: PatternEmitter;
    type Radio: BeaconRadio;
    type Transport: UpdateTransport;
    type Watchdog: LivenessWatchdog;
    type Lights: LightOutputs;
    type Tick: EnvelopeTickControl;
    type Rng: RngCore;
}

/// Owned collaborator instances handed to
/// [`DeviceContext`](crate::device::DeviceContext).
pub struct Collaborators<P: Platform> {
    pub emitter: P::Emitter,
    pub radio: P::Radio,
    pub transport: P::Transport,
    pub watchdog: P::Watchdog,
    pub lights: P::Lights,
    pub tick: P::Tick,
    pub rng: P::Rng,
}

/// Emitter that transmits nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PatternEmitter for NoopEmitter {
    fn transmit(&mut self, _: &EmissionPattern) {}
}

/// Radio that is never fitted.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopRadio;

impl NoopRadio {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl BeaconRadio for NoopRadio {
    fn bring_up(&mut self) -> Result<(), BringUpError> {
        Err(BringUpError::Unavailable)
    }

    fn set_address(&mut self, _: BeaconAddress) {}

    fn set_advertisement_payload(&mut self, _: &[u8]) {}

    fn set_advertising_kind(&mut self, _: AdvertisingKind) {}

    fn set_tx_power(&mut self, _: TxPowerStep) {}

    fn start(&mut self) {}

    fn stop(&mut self) {}
}

/// Transport that is never fitted.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopTransport;

impl NoopTransport {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl UpdateTransport for NoopTransport {
    fn begin(&mut self) -> Result<(), BringUpError> {
        Err(BringUpError::Unavailable)
    }

    fn service_once(&mut self) -> Result<TransportEvent, TransportFault> {
        Ok(TransportEvent::Idle)
    }

    fn end(&mut self) {}
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NoopWatchdog;

impl NoopWatchdog {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LivenessWatchdog for NoopWatchdog {
    fn feed(&mut self) {}

    fn release(&mut self) {}
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NoopLights;

impl NoopLights {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LightOutputs for NoopLights {
    fn drive(&mut self, _: bool) {}
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NoopTickControl;

impl NoopTickControl {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EnvelopeTickControl for NoopTickControl {
    fn suspend(&mut self) {}
}
