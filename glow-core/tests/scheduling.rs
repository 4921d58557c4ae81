mod common;

use common::{Call, Harness, Setup};
use glow_core::emission::POWER_CODES;
use glow_core::session::SessionState;
use glow_core::telemetry::{TelemetryEventKind, TelemetryPayload};

fn short_session(harness: &mut Harness) -> Vec<glow_core::device::PassReport> {
    harness.run_until(1_000);
    harness.press();
    let mut reports = vec![harness.step()];
    harness.release();
    reports.extend(harness.run_until(11_010));
    reports
}

#[test]
fn beacon_rotates_every_30ms_starting_at_session_start() {
    let mut harness = Harness::boot(Setup::default());
    let reports = short_session(&mut harness);

    let rotations: Vec<_> = reports.iter().filter_map(|report| report.rotation).collect();
    let first = rotations.first().expect("session should rotate the beacon");
    assert_eq!(first.at.as_millis(), 1_000);
    assert!(first.first_in_session);
    assert!(rotations[1..].iter().all(|rotation| !rotation.first_in_session));

    let session_ms: u64 = 10_000;
    let expected = session_ms / 30;
    let count = rotations.len() as u64;
    assert!(
        (expected - 1..=expected + 1).contains(&count),
        "{count} rotations for a {session_ms}ms session"
    );

    for pair in rotations.windows(2) {
        assert!(pair[1].at.as_millis() - pair[0].at.as_millis() >= 30);
    }

    assert_eq!(
        harness.count(|call| *call == Call::RadioPayload),
        rotations.len()
    );
}

#[test]
fn no_rotation_or_emission_while_idle() {
    let mut harness = Harness::boot(Setup::default());
    harness.clear_log();
    let reports = harness.run_until(30_000);

    assert!(
        reports
            .iter()
            .all(|report| report.rotation.is_none() && report.emitted.is_none())
    );
    assert_eq!(harness.count(|call| matches!(call, Call::Transmit(_))), 0);
    assert_eq!(harness.count(|call| *call == Call::RadioPayload), 0);
}

#[test]
fn emission_cycles_through_the_whole_table_in_order() {
    let mut harness = Harness::boot(Setup::default());
    let reports = short_session(&mut harness);

    let emitted: Vec<usize> = reports.iter().filter_map(|report| report.emitted).collect();
    assert_eq!(emitted.len(), 1_000);
    for (pass, index) in emitted.iter().enumerate() {
        assert_eq!(*index, pass % POWER_CODES.len());
    }

    let transmitted: Vec<_> = harness
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Transmit(pattern) => Some(pattern),
            _ => None,
        })
        .take(POWER_CODES.len())
        .collect();
    assert_eq!(transmitted, POWER_CODES.to_vec());
}

#[test]
fn next_session_restarts_emission_from_the_first_pattern() {
    let mut harness = Harness::boot(Setup::default());
    short_session(&mut harness);
    assert_eq!(harness.device.session_state(), SessionState::Idle);

    harness.run_until(12_000);
    harness.press();
    let report = harness.step();
    assert_eq!(report.emitted, Some(0));
}

#[test]
fn liveness_is_fed_every_five_seconds() {
    let mut harness = Harness::boot(Setup::default());
    short_session(&mut harness);
    harness.run_until(60_000);

    let feeds: Vec<u64> = harness
        .device
        .telemetry()
        .oldest_first()
        .filter(|record| record.event == TelemetryEventKind::Heartbeat)
        .map(|record| record.timestamp.as_millis())
        .collect();
    assert!(!feeds.is_empty());
    for pair in feeds.windows(2) {
        assert_eq!(pair[1] - pair[0], 5_000);
    }

    // Boot feed plus one per interval.
    assert_eq!(harness.count(|call| *call == Call::Feed), 1 + 11);
}

#[test]
fn heartbeat_carries_a_status_snapshot() {
    let mut harness = Harness::boot(Setup::default());
    harness.run_until(1_000);
    harness.press();
    harness.run_until(5_010);

    let heartbeat = harness
        .device
        .telemetry()
        .oldest_first()
        .filter(|record| record.event == TelemetryEventKind::Heartbeat)
        .last()
        .copied()
        .expect("heartbeat at 5s");
    assert_eq!(heartbeat.timestamp.as_millis(), 5_000);
    let TelemetryPayload::Status(status) = heartbeat.details else {
        panic!("heartbeat without status");
    };
    assert_eq!(status.session, SessionState::RunningLong);
    assert!(status.button_high);
    assert!(status.breathing_active);
    assert!(status.beacon_active);
}

#[test]
fn slow_collaborator_is_flagged_as_missed_liveness() {
    let mut harness = Harness::boot(Setup::default());
    harness.run_until(1_000);
    harness.press();
    harness.step();
    harness.release();
    harness.run_until(2_000);

    // One transmit that blocks for six seconds.
    harness.emit_cost_ms.set(6_000);
    let slow = harness.step();
    harness.emit_cost_ms.set(0);
    assert!(!slow.liveness_missed);

    let next = harness.step();
    assert!(next.liveness_missed);
    assert!(next.at.as_millis() >= 8_000);

    let stalled = harness
        .device
        .telemetry()
        .oldest_first()
        .find(|record| record.event == TelemetryEventKind::LoopStalled)
        .copied()
        .expect("stall recorded");
    match stalled.details {
        TelemetryPayload::Stall(gap) => assert_eq!(gap.as_millis(), 6_010),
        other => panic!("unexpected payload {other:?}"),
    }

    let later = harness.run_until(9_000);
    assert!(later.iter().all(|report| !report.liveness_missed));
}

#[test]
fn missing_radio_degrades_without_stopping_the_session() {
    let mut harness = Harness::boot(Setup {
        radio_fitted: false,
        ..Setup::default()
    });
    assert!(!harness.device.beacon_enabled());

    let disabled = harness
        .device
        .telemetry()
        .oldest_first()
        .any(|record| matches!(record.event, TelemetryEventKind::SubsystemDisabled(_)));
    assert!(disabled);

    let reports = short_session(&mut harness);
    assert!(reports.iter().all(|report| report.rotation.is_none()));
    assert_eq!(
        reports.iter().filter(|report| report.emitted.is_some()).count(),
        1_000
    );
    assert_eq!(harness.count(|call| *call == Call::RadioStop), 0);
    assert_eq!(harness.device.session_state(), SessionState::Idle);
}
