#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The cooperative loop publishes the latest [`StatusSnapshot`] after every
//! pass so the panic handler can report where the device was without
//! touching the loop's state.

use glow_core::mode::Mode;
use glow_core::session::SessionState;
use glow_core::telemetry::StatusSnapshot;
use glow_core::time::Instant;
use portable_atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

const FLAG_BUTTON_HIGH: u8 = 1 << 0;
const FLAG_BREATHING: u8 = 1 << 1;
const FLAG_BEACON: u8 = 1 << 2;

/// Set once the first pass has been published.
static PUBLISHED: AtomicBool = AtomicBool::new(false);
static SESSION: AtomicU8 = AtomicU8::new(0);
static MODE: AtomicU8 = AtomicU8::new(0);
/// Bitmask of `FLAG_*` values.
static FLAGS: AtomicU8 = AtomicU8::new(0);
static BRIGHTNESS: AtomicU8 = AtomicU8::new(0);
static PATTERN_INDEX: AtomicU8 = AtomicU8::new(0);
/// Millisecond timestamp of the last pass, saturated to `u32`.
static LAST_PASS_MS: AtomicU32 = AtomicU32::new(0);

fn encode_flags(status: &StatusSnapshot) -> u8 {
    let mut flags = 0;
    if status.button_high {
        flags |= FLAG_BUTTON_HIGH;
    }
    if status.breathing_active {
        flags |= FLAG_BREATHING;
    }
    if status.beacon_active {
        flags |= FLAG_BEACON;
    }
    flags
}

fn saturate_millis(at: Instant) -> u32 {
    u32::try_from(at.as_millis()).unwrap_or(u32::MAX)
}

/// Stores the status observed at the end of a pass.
pub fn publish(status: &StatusSnapshot, at: Instant) {
    SESSION.store(status.session.as_index(), Ordering::Relaxed);
    MODE.store(status.mode.as_index(), Ordering::Relaxed);
    FLAGS.store(encode_flags(status), Ordering::Relaxed);
    BRIGHTNESS.store(status.brightness, Ordering::Relaxed);
    PATTERN_INDEX.store(status.pattern_index, Ordering::Relaxed);
    LAST_PASS_MS.store(saturate_millis(at), Ordering::Relaxed);
    PUBLISHED.store(true, Ordering::Release);
}

/// Returns the last published status and the time of its pass.
pub fn last_published() -> Option<(StatusSnapshot, Instant)> {
    if !PUBLISHED.load(Ordering::Acquire) {
        return None;
    }

    let flags = FLAGS.load(Ordering::Relaxed);
    let status = StatusSnapshot {
        session: SessionState::from_index(SESSION.load(Ordering::Relaxed))?,
        button_high: flags & FLAG_BUTTON_HIGH != 0,
        mode: Mode::from_index(MODE.load(Ordering::Relaxed))?,
        breathing_active: flags & FLAG_BREATHING != 0,
        brightness: BRIGHTNESS.load(Ordering::Relaxed),
        beacon_active: flags & FLAG_BEACON != 0,
        pattern_index: PATTERN_INDEX.load(Ordering::Relaxed),
    };
    let at = Instant::from_millis(u64::from(LAST_PASS_MS.load(Ordering::Relaxed)));
    Some((status, at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_latest_pass() {
        let status = StatusSnapshot {
            session: SessionState::RunningLong,
            button_high: true,
            mode: Mode::Maintenance,
            breathing_active: true,
            brightness: 42,
            beacon_active: false,
            pattern_index: 7,
        };
        publish(&status, Instant::from_millis(12_345));

        let (stored, at) = last_published().expect("status published");
        assert_eq!(stored, status);
        assert_eq!(at, Instant::from_millis(12_345));
    }

    #[test]
    fn pass_time_saturates() {
        assert_eq!(saturate_millis(Instant::from_millis(u64::MAX)), u32::MAX);
    }
}
