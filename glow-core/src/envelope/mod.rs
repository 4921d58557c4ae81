//! Brightness envelope: the accelerating breathing curve and the software PWM
//! that renders it.
//!
//! Two contexts meet here. The cooperative loop recomputes the curve every
//! few milliseconds through [`EnvelopeRefresher`]; a fixed-rate hardware tick
//! renders the latest value through [`PwmTick`]. The only state they share is
//! [`SharedBrightness`], and every access to it happens inside a
//! `critical_section::with` scope that covers the read or write alone.

use core::{cell::Cell, f32::consts::PI, time::Duration};

use critical_section::Mutex;

use crate::collaborators::LightOutputs;
use crate::config::EnvelopeConfig;
use crate::time::{Instant, duration_ms};

/// Upper bound of the brightness scale.
pub const MAX_BRIGHTNESS: u8 = 100;

/// Scalars shared between the tick and the cooperative loop.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BrightnessState {
    pub brightness: u8,
    pub breathing_active: bool,
}

/// Interrupt-safe cell holding the [`BrightnessState`].
pub struct SharedBrightness {
    state: Mutex<Cell<BrightnessState>>,
}

impl SharedBrightness {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(BrightnessState {
                brightness: 0,
                breathing_active: false,
            })),
        }
    }

    /// Copies the current state out of the critical section.
    #[must_use]
    pub fn snapshot(&self) -> BrightnessState {
        critical_section::with(|cs| self.state.borrow(cs).get())
    }

    /// Starts breathing from zero brightness.
    pub fn activate(&self) {
        self.store(BrightnessState {
            brightness: 0,
            breathing_active: true,
        });
    }

    /// Stops breathing and zeroes the brightness in one critical section.
    pub fn deactivate(&self) {
        self.store(BrightnessState {
            brightness: 0,
            breathing_active: false,
        });
    }

    /// Publishes a freshly computed brightness, clamped to the scale.
    pub fn publish(&self, brightness: u8) {
        let brightness = brightness.min(MAX_BRIGHTNESS);
        critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            let mut state = cell.get();
            state.brightness = brightness;
            cell.set(state);
        });
    }

    fn store(&self, state: BrightnessState) {
        critical_section::with(|cs| self.state.borrow(cs).set(state));
    }
}

impl Default for SharedBrightness {
    fn default() -> Self {
        Self::new()
    }
}

/// Breath period after `elapsed_ms` of breathing.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn breathing_period_ms(config: &EnvelopeConfig, elapsed_ms: u64) -> f32 {
    let ramp_ms = duration_ms(config.ramp).max(1) as f32;
    let accel = (elapsed_ms as f32 / ramp_ms).min(1.0);
    config.start_period_ms - (config.start_period_ms - config.end_period_ms) * accel
}

/// Brightness on the 0..=100 scale.
///
/// The phase is taken from the absolute clock (`now mod period`), so a
/// session does not necessarily start at the bottom of a breath.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#[must_use]
pub fn breathing_brightness(config: &EnvelopeConfig, elapsed_ms: u64, now_ms: u64) -> u8 {
    let period_ms = breathing_period_ms(config, elapsed_ms);
    let whole_period = (period_ms as u64).max(1);
    let phase = 2.0 * PI * (now_ms % whole_period) as f32 / period_ms;
    let level = libm::roundf((libm::sinf(phase) + 1.0) * 50.0);
    level.clamp(0.0, f32::from(MAX_BRIGHTNESS)) as u8
}

/// Cooperative-side recomputation of the curve.
#[derive(Clone, Debug)]
pub struct EnvelopeRefresher {
    config: EnvelopeConfig,
    interval: Duration,
    last_refresh: Option<Instant>,
}

impl EnvelopeRefresher {
    #[must_use]
    pub const fn new(config: EnvelopeConfig, interval: Duration) -> Self {
        Self {
            config,
            interval,
            last_refresh: None,
        }
    }

    /// Recomputes and publishes brightness when the refresh interval is due.
    ///
    /// `session_started_at` is `None` while no session breathes; in that case
    /// zero is published so the value converges to off.
    pub fn refresh(
        &mut self,
        now: Instant,
        session_started_at: Option<Instant>,
        shared: &SharedBrightness,
    ) -> Option<u8> {
        if let Some(last) = self.last_refresh
            && !now.has_elapsed(last, self.interval)
        {
            return None;
        }
        self.last_refresh = Some(now);

        // The curve math stays outside the critical section.
        let brightness = match session_started_at {
            Some(started) if shared.snapshot().breathing_active => breathing_brightness(
                &self.config,
                now.elapsed_ms_since(started),
                now.as_millis(),
            ),
            _ => 0,
        };
        shared.publish(brightness);
        Some(brightness)
    }
}

/// Tick-side software PWM.
///
/// Owned by the tick context; nothing else touches the counter.
#[derive(Clone, Debug)]
pub struct PwmTick {
    counter: u8,
    steps: u8,
}

impl PwmTick {
    #[must_use]
    pub const fn new(steps: u8) -> Self {
        Self {
            counter: 0,
            steps: if steps == 0 { 1 } else { steps },
        }
    }

    /// Current position within the PWM frame.
    #[must_use]
    pub const fn counter(&self) -> u8 {
        self.counter
    }

    /// Renders one tick. Returns the level driven onto the outputs.
    pub fn tick<L: LightOutputs>(&mut self, shared: &SharedBrightness, outputs: &mut L) -> bool {
        let state = shared.snapshot();
        if !state.breathing_active {
            outputs.drive(false);
            return false;
        }

        self.counter = (self.counter + 1) % self.steps;
        let on = self.counter < state.brightness;
        outputs.drive(on);
        on
    }
}
