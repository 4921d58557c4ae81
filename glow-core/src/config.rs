//! Timing and envelope configuration.
//!
//! Defaults reproduce the shipping device. Firmware and emulator both start
//! from [`TimingConfig::default`] and may override individual fields before
//! handing the configuration to [`DeviceContext`](crate::device::DeviceContext).

use core::{fmt, time::Duration};

/// Minimum interval between accepted button samples.
pub const DEBOUNCE: Duration = Duration::from_millis(50);
/// Hold time that turns a press into a long-press session.
pub const LONG_PRESS: Duration = Duration::from_secs(3);
/// Total length of a short-press session, measured from the press.
pub const SHORT_SESSION: Duration = Duration::from_secs(10);
/// Hold time that leaves maintenance mode.
pub const MAINTENANCE_EXIT_HOLD: Duration = Duration::from_secs(5);
/// Cadence of the liveness feed.
pub const LIVENESS_INTERVAL: Duration = Duration::from_secs(5);
/// Lateness a liveness feed may accumulate before it counts as a stall.
pub const LIVENESS_SLACK: Duration = Duration::from_millis(500);
/// Timeout of the supervising watchdog.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(10);
/// Cadence of beacon rotation.
pub const BEACON_INTERVAL: Duration = Duration::from_millis(30);
/// Minimum spacing between update-transport service steps.
pub const MAINTENANCE_POLL: Duration = Duration::from_millis(50);
/// Cadence of the brightness curve recomputation.
pub const BRIGHTNESS_REFRESH: Duration = Duration::from_millis(10);
/// Fixed delay at the end of each cooperative pass.
pub const LOOP_DELAY: Duration = Duration::from_millis(10);
/// Delay before restarting after a fatal update failure.
pub const FATAL_RESTART_DELAY: Duration = Duration::from_secs(1);
/// Period of the hardware tick that drives the software PWM.
pub const PWM_TICK: Duration = Duration::from_micros(200);

/// Intervals and thresholds used by the cooperative loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimingConfig {
    pub debounce: Duration,
    pub long_press: Duration,
    pub short_session: Duration,
    pub maintenance_exit_hold: Duration,
    pub liveness_interval: Duration,
    pub liveness_slack: Duration,
    pub watchdog_timeout: Duration,
    pub beacon_interval: Duration,
    pub maintenance_poll: Duration,
    pub brightness_refresh: Duration,
    pub loop_delay: Duration,
    pub fatal_restart_delay: Duration,
    pub pwm_tick: Duration,
}

impl TimingConfig {
    /// Configuration used by the shipping device.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            debounce: DEBOUNCE,
            long_press: LONG_PRESS,
            short_session: SHORT_SESSION,
            maintenance_exit_hold: MAINTENANCE_EXIT_HOLD,
            liveness_interval: LIVENESS_INTERVAL,
            liveness_slack: LIVENESS_SLACK,
            watchdog_timeout: WATCHDOG_TIMEOUT,
            beacon_interval: BEACON_INTERVAL,
            maintenance_poll: MAINTENANCE_POLL,
            brightness_refresh: BRIGHTNESS_REFRESH,
            loop_delay: LOOP_DELAY,
            fatal_restart_delay: FATAL_RESTART_DELAY,
            pwm_tick: PWM_TICK,
        }
    }

    /// Checks the relationships the state machine and scheduler rely on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce.is_zero() {
            return Err(ConfigError::ZeroDebounce);
        }
        if self.long_press >= self.short_session {
            return Err(ConfigError::LongPressExceedsSession);
        }
        if self.liveness_interval.saturating_add(self.liveness_slack) >= self.watchdog_timeout {
            return Err(ConfigError::LivenessSlowerThanWatchdog);
        }
        if self.beacon_interval.is_zero()
            || self.maintenance_poll.is_zero()
            || self.brightness_refresh.is_zero()
            || self.liveness_interval.is_zero()
            || self.pwm_tick.is_zero()
        {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    /// Returns the configuration once [`validate`](Self::validate) accepts it.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate().map(|()| self)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejected configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    ZeroDebounce,
    LongPressExceedsSession,
    LivenessSlowerThanWatchdog,
    ZeroInterval,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroDebounce => f.write_str("debounce window must be non-zero"),
            ConfigError::LongPressExceedsSession => {
                f.write_str("long-press threshold must be shorter than the short session")
            }
            ConfigError::LivenessSlowerThanWatchdog => {
                f.write_str("liveness interval plus slack must be shorter than the watchdog timeout")
            }
            ConfigError::ZeroInterval => f.write_str("periodic intervals must be non-zero"),
        }
    }
}

/// Breathing curve parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EnvelopeConfig {
    /// Breath period at session start, in milliseconds.
    pub start_period_ms: f32,
    /// Breath period once fully accelerated, in milliseconds.
    pub end_period_ms: f32,
    /// Time over which the period shrinks from start to end.
    pub ramp: Duration,
    /// Number of duty-cycle steps per PWM frame.
    pub pwm_steps: u8,
}

impl EnvelopeConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            start_period_ms: 4_000.0,
            end_period_ms: 500.0,
            ramp: Duration::from_secs(10),
            pwm_steps: 100,
        }
    }
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self::new()
    }
}
