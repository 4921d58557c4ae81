mod common;

use common::{Call, Harness, Setup};
use glow_core::session::{SessionState, Trigger};
use glow_core::telemetry::{TelemetryEventKind, TelemetryPayload};

fn press_at_one_second() -> Harness {
    let mut harness = Harness::boot(Setup::default());
    harness.run_until(1_000);
    harness.press();
    let report = harness.step();
    let change = report.change.expect("rising edge should start a session");
    assert_eq!(change.from, SessionState::Idle);
    assert_eq!(change.to, SessionState::ClassifyingPress);
    assert_eq!(change.at.as_millis(), 1_000);
    harness
}

#[test]
fn press_of_2999ms_runs_short_session_for_ten_seconds_from_press() {
    let mut harness = press_at_one_second();
    harness.run_until(3_999);
    assert_eq!(harness.device.session_state(), SessionState::ClassifyingPress);

    harness.clock.set(3_999);
    harness.release();
    let report = harness.step();
    harness.clock.set(4_000);
    assert_eq!(report.state, SessionState::RunningShort);
    assert_eq!(
        report.change.map(|change| change.trigger),
        Some(Trigger::ReleasedBeforeThreshold)
    );

    let reports = harness.run_until(11_000);
    assert!(
        reports
            .iter()
            .all(|report| report.state == SessionState::RunningShort)
    );

    let end = harness.step();
    assert_eq!(end.at.as_millis(), 11_000);
    assert_eq!(end.state, SessionState::Idle);
    assert_eq!(
        end.change.map(|change| change.trigger),
        Some(Trigger::ShortDeadlineElapsed)
    );
}

#[test]
fn press_held_past_threshold_runs_until_release() {
    let mut harness = press_at_one_second();
    harness.run_until(4_000);
    assert_eq!(harness.device.session_state(), SessionState::ClassifyingPress);

    let report = harness.step();
    assert_eq!(report.state, SessionState::RunningLong);
    assert_eq!(
        report.change.map(|change| change.trigger),
        Some(Trigger::HoldThresholdReached)
    );

    // Held well beyond the short-session deadline.
    harness.run_until(20_000);
    assert_eq!(harness.device.session_state(), SessionState::RunningLong);

    harness.release();
    let report = harness.step();
    assert_eq!(report.state, SessionState::Idle);
    assert_eq!(report.change.map(|change| change.trigger), Some(Trigger::Released));
}

#[test]
fn presses_during_a_session_are_ignored() {
    let mut harness = press_at_one_second();
    harness.release();
    harness.run_until(2_000);
    assert_eq!(harness.device.session_state(), SessionState::RunningShort);

    harness.press();
    let reports = harness.run_until(2_500);
    harness.release();
    let more = harness.run_until(11_000);

    assert!(
        reports
            .iter()
            .chain(more.iter())
            .all(|report| report.change.is_none())
    );
    assert_eq!(harness.device.session_state(), SessionState::RunningShort);
    assert_eq!(harness.step().state, SessionState::Idle);
}

#[test]
fn bounce_shorter_than_debounce_window_does_not_start_a_session() {
    let mut harness = Harness::boot(Setup::default());
    harness.run_until(1_010);

    // High for 20ms between two accepted samples.
    harness.press();
    harness.run_until(1_030);
    harness.release();
    let reports = harness.run_until(2_000);

    assert!(reports.iter().all(|report| report.change.is_none()));
    assert_eq!(harness.device.session_state(), SessionState::Idle);
}

#[test]
fn breathing_follows_the_session_and_lights_go_dark_at_the_end() {
    let mut harness = press_at_one_second();
    harness.release();

    let mut max_seen = 0;
    while harness.now() < 11_000 {
        harness.step();
        let shared = harness.brightness.snapshot();
        assert!(shared.breathing_active);
        assert!(shared.brightness <= 100);
        max_seen = max_seen.max(shared.brightness);
    }
    assert!(max_seen > 90, "curve should reach near full brightness");

    harness.clear_log();
    let end = harness.step();
    assert_eq!(end.state, SessionState::Idle);

    let shared = harness.brightness.snapshot();
    assert!(!shared.breathing_active);
    assert_eq!(shared.brightness, 0);

    let calls = harness.calls();
    assert_eq!(calls, vec![Call::RadioStop, Call::Lights(false)]);
}

#[test]
fn transitions_are_recorded_with_time_in_previous_state() {
    let mut harness = press_at_one_second();
    harness.run_until(4_010);
    harness.release();
    harness.step();

    let transitions: Vec<_> = harness
        .device
        .telemetry()
        .oldest_first()
        .filter_map(|record| match (record.event, record.details) {
            (TelemetryEventKind::SessionEntered(state), TelemetryPayload::Transition(details)) => {
                Some((state, details.elapsed_since_previous.map(|d| d.as_millis())))
            }
            _ => None,
        })
        .collect();

    assert_eq!(
        transitions,
        vec![
            (SessionState::ClassifyingPress, None),
            (SessionState::RunningLong, Some(3_000)),
            (SessionState::Idle, Some(10)),
        ]
    );
}
