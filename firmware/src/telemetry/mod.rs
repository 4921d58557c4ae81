//! Mirrors the core telemetry ring to the debug console.
//!
//! The ring lives inside the device context and overwrites its oldest
//! entries, so the loop flushes after every pass and only prints records it
//! has not seen yet. Target builds log through defmt; host builds fall back
//! to stdout.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use glow_core::telemetry::{EventId, TelemetryRecord, TelemetryRecorder};

/// Tracks how far the console has caught up with the ring.
pub struct TelemetryMirror {
    last_seen: Option<EventId>,
}

impl TelemetryMirror {
    pub const fn new() -> Self {
        Self { last_seen: None }
    }

    /// Identifier of the newest record already printed.
    pub const fn last_seen(&self) -> Option<EventId> {
        self.last_seen
    }

    /// Prints every record newer than the last flush. Returns how many were printed.
    pub fn flush(&mut self, recorder: &TelemetryRecorder) -> usize {
        let mut printed = 0;
        for record in recorder.newer_than(self.last_seen) {
            emit_record(record);
            self.last_seen = Some(record.id);
            printed += 1;
        }
        printed
    }
}

impl Default for TelemetryMirror {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "none")]
fn emit_record(record: &TelemetryRecord) {
    defmt::info!(
        "telemetry:{=u16:#x} {}",
        record.event.to_raw(),
        defmt::Display2Format(record)
    );
}

#[cfg(not(target_os = "none"))]
fn emit_record(record: &TelemetryRecord) {
    println!("telemetry:{:#06x} {}", record.event.to_raw(), record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use glow_core::mode::Mode;
    use glow_core::telemetry::{TelemetryEventKind, TelemetryPayload};
    use glow_core::time::Instant;

    #[test]
    fn flush_prints_each_record_once() {
        let mut recorder = TelemetryRecorder::new();
        let mut mirror = TelemetryMirror::new();

        recorder.record(
            TelemetryEventKind::BootMode(Mode::Normal),
            TelemetryPayload::None,
            Instant::from_millis(0),
        );
        recorder.record(
            TelemetryEventKind::Heartbeat,
            TelemetryPayload::None,
            Instant::from_millis(5000),
        );
        assert_eq!(mirror.flush(&recorder), 2);
        assert_eq!(mirror.last_seen(), Some(1));
        assert_eq!(mirror.flush(&recorder), 0);

        recorder.record(
            TelemetryEventKind::MaintenanceExited,
            TelemetryPayload::None,
            Instant::from_millis(6000),
        );
        assert_eq!(mirror.flush(&recorder), 1);
        assert_eq!(mirror.last_seen(), Some(2));
    }
}
