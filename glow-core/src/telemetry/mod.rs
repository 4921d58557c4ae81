//! Telemetry event catalog and the fixed-capacity recorder shared by firmware
//! and host targets.
//!
//! Event kinds encode to compact numeric codes so firmware can mirror them
//! over a diagnostics channel without formatting strings on the device.
//! Payloads carry the extra details the emulator transcript and the heartbeat
//! status line need while remaining `no_std` compatible.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::beacon::{AdvertisingKind, BeaconCategory, TxPowerStep};
use crate::collaborators::BringUpError;
use crate::mode::{Mode, RestartReason};
use crate::session::{SessionState, Trigger};
use crate::time::Instant;

/// Identifier used when tracking emitted telemetry events.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Subsystem that can be disabled at runtime.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Subsystem {
    BeaconRadio,
    UpdateTransport,
}

impl Subsystem {
    const fn index(self) -> u16 {
        match self {
            Subsystem::BeaconRadio => 0,
            Subsystem::UpdateTransport => 1,
        }
    }

    const fn from_index(index: u16) -> Option<Self> {
        match index {
            0 => Some(Subsystem::BeaconRadio),
            1 => Some(Subsystem::UpdateTransport),
            _ => None,
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Subsystem::BeaconRadio => "beacon-radio",
            Subsystem::UpdateTransport => "update-transport",
        })
    }
}

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    BootMode(Mode),
    SessionEntered(SessionState),
    BeaconStarted(BeaconCategory),
    PatternCycleCompleted,
    SubsystemDisabled(Subsystem),
    LoopStalled,
    Heartbeat,
    MaintenanceExited,
    UpdateTransferStarted,
    RestartScheduled(RestartReason),
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::BootMode(mode) => write!(f, "boot-mode {mode}"),
            TelemetryEventKind::SessionEntered(state) => write!(f, "session {state}"),
            TelemetryEventKind::BeaconStarted(category) => write!(f, "beacon-started {category}"),
            TelemetryEventKind::PatternCycleCompleted => f.write_str("pattern-cycle-completed"),
            TelemetryEventKind::SubsystemDisabled(subsystem) => {
                write!(f, "disabled {subsystem}")
            }
            TelemetryEventKind::LoopStalled => f.write_str("loop-stalled"),
            TelemetryEventKind::Heartbeat => f.write_str("heartbeat"),
            TelemetryEventKind::MaintenanceExited => f.write_str("maintenance-exited"),
            TelemetryEventKind::UpdateTransferStarted => f.write_str("update-transfer-started"),
            TelemetryEventKind::RestartScheduled(reason) => write!(f, "restart {reason}"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const BOOT_MODE_BASE: u16 = 0x0000;
    const SESSION_BASE: u16 = 0x0004;
    const BEACON_BASE: u16 = 0x0008;
    const SUBSYSTEM_BASE: u16 = 0x000C;
    const RESTART_BASE: u16 = 0x0010;
    const PATTERN_CYCLE_CODE: u16 = 0x0020;
    const LOOP_STALLED_CODE: u16 = 0x0021;
    const HEARTBEAT_CODE: u16 = 0x0022;
    const MAINTENANCE_EXITED_CODE: u16 = 0x0023;
    const TRANSFER_STARTED_CODE: u16 = 0x0024;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::BootMode(mode) => Self::BOOT_MODE_BASE + mode.as_index() as u16,
            TelemetryEventKind::SessionEntered(state) => {
                Self::SESSION_BASE + state.as_index() as u16
            }
            TelemetryEventKind::BeaconStarted(category) => {
                Self::BEACON_BASE + category.as_index() as u16
            }
            TelemetryEventKind::SubsystemDisabled(subsystem) => {
                Self::SUBSYSTEM_BASE + subsystem.index()
            }
            TelemetryEventKind::RestartScheduled(reason) => {
                Self::RESTART_BASE + reason.as_index() as u16
            }
            TelemetryEventKind::PatternCycleCompleted => Self::PATTERN_CYCLE_CODE,
            TelemetryEventKind::LoopStalled => Self::LOOP_STALLED_CODE,
            TelemetryEventKind::Heartbeat => Self::HEARTBEAT_CODE,
            TelemetryEventKind::MaintenanceExited => Self::MAINTENANCE_EXITED_CODE,
            TelemetryEventKind::UpdateTransferStarted => Self::TRANSFER_STARTED_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        let decoded = match code {
            Self::PATTERN_CYCLE_CODE => Some(TelemetryEventKind::PatternCycleCompleted),
            Self::LOOP_STALLED_CODE => Some(TelemetryEventKind::LoopStalled),
            Self::HEARTBEAT_CODE => Some(TelemetryEventKind::Heartbeat),
            Self::MAINTENANCE_EXITED_CODE => Some(TelemetryEventKind::MaintenanceExited),
            Self::TRANSFER_STARTED_CODE => Some(TelemetryEventKind::UpdateTransferStarted),
            value if (Self::BOOT_MODE_BASE..Self::SESSION_BASE).contains(&value) => {
                narrow(value - Self::BOOT_MODE_BASE)
                    .and_then(Mode::from_index)
                    .map(TelemetryEventKind::BootMode)
            }
            value if (Self::SESSION_BASE..Self::BEACON_BASE).contains(&value) => {
                narrow(value - Self::SESSION_BASE)
                    .and_then(SessionState::from_index)
                    .map(TelemetryEventKind::SessionEntered)
            }
            value if (Self::BEACON_BASE..Self::SUBSYSTEM_BASE).contains(&value) => {
                narrow(value - Self::BEACON_BASE)
                    .and_then(BeaconCategory::from_index)
                    .map(TelemetryEventKind::BeaconStarted)
            }
            value if (Self::SUBSYSTEM_BASE..Self::RESTART_BASE).contains(&value) => {
                Subsystem::from_index(value - Self::SUBSYSTEM_BASE)
                    .map(TelemetryEventKind::SubsystemDisabled)
            }
            value if (Self::RESTART_BASE..Self::RESTART_BASE + 4).contains(&value) => {
                narrow(value - Self::RESTART_BASE)
                    .and_then(RestartReason::from_index)
                    .map(TelemetryEventKind::RestartScheduled)
            }
            _ => None,
        };
        decoded.unwrap_or(TelemetryEventKind::Custom(code))
    }
}

fn narrow(offset: u16) -> Option<u8> {
    u8::try_from(offset).ok()
}

/// Point-in-time view of the device, carried by heartbeat events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub session: SessionState,
    pub button_high: bool,
    pub mode: Mode,
    pub breathing_active: bool,
    pub brightness: u8,
    pub beacon_active: bool,
    pub pattern_index: u8,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state={} button={} mode={} breathing={} brightness={} beacon={} pattern={}",
            self.session,
            if self.button_high { "high" } else { "low" },
            self.mode,
            self.breathing_active,
            self.brightness,
            if self.beacon_active { "active" } else { "idle" },
            self.pattern_index,
        )
    }
}

/// Session transition payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransitionTelemetry {
    pub from: SessionState,
    pub trigger: Trigger,
    pub elapsed_since_previous: Option<Duration>,
}

/// First beacon rotation of a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BeaconTelemetry {
    pub payload_index: u8,
    pub kind: AdvertisingKind,
    pub power: TxPowerStep,
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    Transition(TransitionTelemetry),
    Beacon(BeaconTelemetry),
    /// Reason a subsystem was disabled.
    BringUp(BringUpError),
    /// Gap between two consecutive loop passes.
    Stall(Duration),
    Status(StatusSnapshot),
    /// Delay before the restart takes effect.
    Restart(Duration),
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

impl fmt::Display for TelemetryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryPayload::None => Ok(()),
            TelemetryPayload::Transition(details) => {
                write!(f, "from={} trigger={:?}", details.from, details.trigger)?;
                if let Some(elapsed) = details.elapsed_since_previous {
                    write!(f, " after={}ms", elapsed.as_millis())?;
                }
                Ok(())
            }
            TelemetryPayload::Beacon(details) => write!(
                f,
                "payload={} kind={:?} power=-{}",
                details.payload_index,
                details.kind,
                details.power.steps_below_max()
            ),
            TelemetryPayload::BringUp(error) => write!(f, "{error}"),
            TelemetryPayload::Stall(gap) => write!(f, "gap={}ms", gap.as_millis()),
            TelemetryPayload::Status(status) => write!(f, "{status}"),
            TelemetryPayload::Restart(after) => write!(f, "after={}ms", after.as_millis()),
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp: Instant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] #{} {}", self.timestamp, self.id, self.event)?;
        if self.details != TelemetryPayload::None {
            write!(f, " {}", self.details)?;
        }
        Ok(())
    }
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<CAPACITY>,
    last_transition_at: Option<Instant>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_transition_at: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    #[must_use]
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    /// Records newer than `last_seen`, oldest first.
    ///
    /// Used by targets that mirror telemetry incrementally.
    pub fn newer_than(
        &self,
        last_seen: Option<EventId>,
    ) -> impl Iterator<Item = &TelemetryRecord> + '_ {
        self.ring
            .oldest_ordered()
            .filter(move |record| last_seen.is_none_or(|seen| is_newer(record.id, seen)))
    }

    /// Returns the most recent telemetry record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a session transition and captures the time spent in the
    /// previous state.
    pub fn record_transition(
        &mut self,
        from: SessionState,
        to: SessionState,
        trigger: Trigger,
        timestamp: Instant,
    ) -> EventId {
        let elapsed = self
            .last_transition_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_transition_at = Some(timestamp);

        self.record(
            TelemetryEventKind::SessionEntered(to),
            TelemetryPayload::Transition(TransitionTelemetry {
                from,
                trigger,
                elapsed_since_previous: elapsed,
            }),
            timestamp,
        )
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: Instant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

/// Compares ids by wrapping distance, so ordering survives the counter
/// rolling over. Ids more than half the counter range apart are not
/// comparable; the ring is far smaller than that.
const fn is_newer(id: EventId, seen: EventId) -> bool {
    let distance = id.wrapping_sub(seen);
    distance != 0 && distance < 1 << (EventId::BITS - 1)
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_codes_round_trip() {
        let fixtures = [
            TelemetryEventKind::BootMode(Mode::Normal),
            TelemetryEventKind::BootMode(Mode::Maintenance),
            TelemetryEventKind::SessionEntered(SessionState::Idle),
            TelemetryEventKind::SessionEntered(SessionState::RunningLong),
            TelemetryEventKind::BeaconStarted(BeaconCategory::LocalName),
            TelemetryEventKind::SubsystemDisabled(Subsystem::UpdateTransport),
            TelemetryEventKind::RestartScheduled(RestartReason::UpdateFailed),
            TelemetryEventKind::RestartScheduled(RestartReason::UpdateApplied),
            TelemetryEventKind::PatternCycleCompleted,
            TelemetryEventKind::LoopStalled,
            TelemetryEventKind::Heartbeat,
            TelemetryEventKind::MaintenanceExited,
            TelemetryEventKind::UpdateTransferStarted,
        ];

        for event in fixtures {
            assert_eq!(TelemetryEventKind::from_raw(event.to_raw()), event);
        }
    }

    #[test]
    fn unknown_codes_decode_as_custom() {
        assert_eq!(
            TelemetryEventKind::from_raw(0x0009),
            TelemetryEventKind::BeaconStarted(BeaconCategory::EddystoneUid)
        );
        assert_eq!(
            TelemetryEventKind::from_raw(0x000E),
            TelemetryEventKind::Custom(0x000E)
        );
        assert_eq!(
            TelemetryEventKind::from_raw(0x0200),
            TelemetryEventKind::Custom(0x0200)
        );
    }

    #[test]
    fn records_elapsed_between_transitions() {
        let mut recorder = TelemetryRecorder::<8>::new();

        let first = recorder.record_transition(
            SessionState::Idle,
            SessionState::ClassifyingPress,
            Trigger::RisingEdge,
            Instant::from_millis(100),
        );
        assert_eq!(first, 0);
        match recorder.latest().copied().unwrap().details {
            TelemetryPayload::Transition(details) => {
                assert_eq!(details.elapsed_since_previous, None);
            }
            _ => panic!("expected transition payload"),
        }

        let second = recorder.record_transition(
            SessionState::ClassifyingPress,
            SessionState::RunningLong,
            Trigger::HoldThresholdReached,
            Instant::from_millis(3_100),
        );
        assert_eq!(second, 1);
        let record = recorder.latest().copied().unwrap();
        assert_eq!(
            record.event,
            TelemetryEventKind::SessionEntered(SessionState::RunningLong)
        );
        match record.details {
            TelemetryPayload::Transition(details) => {
                let elapsed = details.elapsed_since_previous.expect("missing elapsed");
                assert_eq!(elapsed.as_millis(), 3_000);
            }
            _ => panic!("expected transition payload"),
        }
    }

    #[test]
    fn ring_keeps_most_recent_records() {
        let mut recorder = TelemetryRecorder::<4>::new();
        for tick in 0..10 {
            recorder.record(
                TelemetryEventKind::Heartbeat,
                TelemetryPayload::none(),
                Instant::from_millis(tick * 5_000),
            );
        }

        assert_eq!(recorder.len(), 4);
        let ids: heapless::Vec<EventId, 4> = recorder.oldest_first().map(|r| r.id).collect();
        assert_eq!(ids.as_slice(), &[6, 7, 8, 9]);

        let newer: heapless::Vec<EventId, 4> =
            recorder.newer_than(Some(7)).map(|r| r.id).collect();
        assert_eq!(newer.as_slice(), &[8, 9]);
        assert_eq!(recorder.newer_than(None).count(), 4);
    }

    #[test]
    fn newer_than_follows_ids_across_rollover() {
        let mut recorder = TelemetryRecorder::<4>::new();
        recorder.next_event_id = EventId::MAX - 1;
        for tick in 0..4 {
            recorder.record(
                TelemetryEventKind::Heartbeat,
                TelemetryPayload::none(),
                Instant::from_millis(tick * 5_000),
            );
        }

        let ids: heapless::Vec<EventId, 4> = recorder.oldest_first().map(|r| r.id).collect();
        assert_eq!(ids.as_slice(), &[EventId::MAX - 1, EventId::MAX, 0, 1]);

        let newer: heapless::Vec<EventId, 4> = recorder
            .newer_than(Some(EventId::MAX))
            .map(|r| r.id)
            .collect();
        assert_eq!(newer.as_slice(), &[0, 1]);
        assert_eq!(recorder.newer_than(Some(1)).count(), 0);
    }
}
