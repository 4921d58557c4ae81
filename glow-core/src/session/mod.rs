//! Press-duration classifier and session state machine.
//!
//! Transitions are defined once, in [`transition`]; [`SessionMachine`] only
//! decides which [`Trigger`] applies on a given pass. Side effects (breathing,
//! cursors, outputs) belong to the caller, which reacts to the returned
//! [`StateChange`].
//!
//! | From               | Trigger                    | To                 |
//! |--------------------|----------------------------|--------------------|
//! | `Idle`             | `RisingEdge`               | `ClassifyingPress` |
//! | `ClassifyingPress` | `HoldThresholdReached`     | `RunningLong`      |
//! | `ClassifyingPress` | `ReleasedBeforeThreshold`  | `RunningShort`     |
//! | `RunningShort`     | `ShortDeadlineElapsed`     | `Idle`             |
//! | `RunningLong`      | `Released`                 | `Idle`             |
//! | any active state   | `ForceIdle`                | `Idle`             |

use core::{fmt, time::Duration};

use crate::debounce::{Edge, Level, PressEvent};
use crate::time::Instant;

/// Phase of the current operation session.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SessionState {
    #[default]
    Idle,
    ClassifyingPress,
    RunningShort,
    RunningLong,
}

impl SessionState {
    /// Returns `true` while a session is in flight.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, SessionState::Idle)
    }

    /// Compact index used by telemetry encodings.
    #[must_use]
    pub const fn as_index(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::ClassifyingPress => 1,
            SessionState::RunningShort => 2,
            SessionState::RunningLong => 3,
        }
    }

    /// Inverse of [`SessionState::as_index`].
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(SessionState::Idle),
            1 => Some(SessionState::ClassifyingPress),
            2 => Some(SessionState::RunningShort),
            3 => Some(SessionState::RunningLong),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::ClassifyingPress => "classifying",
            SessionState::RunningShort => "running-short",
            SessionState::RunningLong => "running-long",
        })
    }
}

/// Condition observed on a pass that may move the machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Trigger {
    RisingEdge,
    HoldThresholdReached,
    ReleasedBeforeThreshold,
    ShortDeadlineElapsed,
    Released,
    ForceIdle,
}

/// A trigger that has no row in the transition table for `from`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TransitionError {
    pub from: SessionState,
    pub trigger: Trigger,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no transition from {} on {:?}", self.from, self.trigger)
    }
}

/// The transition table.
///
/// # Errors
///
/// Returns [`TransitionError`] when `trigger` is not accepted in `from`.
pub const fn transition(
    from: SessionState,
    trigger: Trigger,
) -> Result<SessionState, TransitionError> {
    match (from, trigger) {
        (SessionState::Idle, Trigger::RisingEdge) => Ok(SessionState::ClassifyingPress),
        (SessionState::ClassifyingPress, Trigger::HoldThresholdReached) => {
            Ok(SessionState::RunningLong)
        }
        (SessionState::ClassifyingPress, Trigger::ReleasedBeforeThreshold) => {
            Ok(SessionState::RunningShort)
        }
        (SessionState::RunningShort, Trigger::ShortDeadlineElapsed)
        | (SessionState::RunningLong, Trigger::Released)
        | (
            SessionState::ClassifyingPress | SessionState::RunningShort | SessionState::RunningLong,
            Trigger::ForceIdle,
        ) => Ok(SessionState::Idle),
        _ => Err(TransitionError { from, trigger }),
    }
}

/// Timestamps captured when a session starts.
///
/// `session_started_at` is never moved while the session runs; both the
/// breathing curve and the short-session deadline are measured from it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SessionTimer {
    pub press_started_at: Instant,
    pub session_started_at: Instant,
}

/// Applied transition reported to the caller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StateChange {
    pub from: SessionState,
    pub to: SessionState,
    pub trigger: Trigger,
    pub at: Instant,
}

impl StateChange {
    /// Returns `true` when this change began a new session.
    #[must_use]
    pub const fn started_session(&self) -> bool {
        matches!(self.from, SessionState::Idle) && self.to.is_active()
    }

    /// Returns `true` when this change returned the machine to idle.
    #[must_use]
    pub const fn ended_session(&self) -> bool {
        self.from.is_active() && matches!(self.to, SessionState::Idle)
    }
}

/// Classifies presses and tracks the active session.
#[derive(Clone, Debug)]
pub struct SessionMachine {
    state: SessionState,
    timer: Option<SessionTimer>,
    long_press: Duration,
    short_session: Duration,
}

impl SessionMachine {
    #[must_use]
    pub const fn new(long_press: Duration, short_session: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            timer: None,
            long_press,
            short_session,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Timer of the active session, `None` while idle.
    #[must_use]
    pub const fn timer(&self) -> Option<SessionTimer> {
        self.timer
    }

    /// Evaluates one pass. At most one transition is applied per call.
    ///
    /// `edge` is the debounced transition accepted this pass (if any);
    /// `raw_level` is the undebounced button level, used for hold and
    /// release checks.
    pub fn evaluate(
        &mut self,
        now: Instant,
        raw_level: Level,
        edge: Option<PressEvent>,
    ) -> Option<StateChange> {
        let trigger = self.pending_trigger(now, raw_level, edge)?;
        self.apply(trigger, now)
    }

    /// Returns the machine to idle from any active state.
    pub fn force_idle(&mut self, now: Instant) -> Option<StateChange> {
        self.apply(Trigger::ForceIdle, now)
    }

    fn pending_trigger(
        &self,
        now: Instant,
        raw_level: Level,
        edge: Option<PressEvent>,
    ) -> Option<Trigger> {
        match (self.state, self.timer) {
            (SessionState::Idle, _) => edge
                .filter(|event| event.edge == Edge::Rising)
                .map(|_| Trigger::RisingEdge),
            (SessionState::ClassifyingPress, Some(timer)) => {
                if !raw_level.is_high() {
                    Some(Trigger::ReleasedBeforeThreshold)
                } else if now.has_elapsed(timer.press_started_at, self.long_press) {
                    Some(Trigger::HoldThresholdReached)
                } else {
                    None
                }
            }
            (SessionState::RunningShort, Some(timer)) => now
                .has_elapsed(timer.session_started_at, self.short_session)
                .then_some(Trigger::ShortDeadlineElapsed),
            (SessionState::RunningLong, _) => (!raw_level.is_high()).then_some(Trigger::Released),
            // Active states always carry a timer; recover rather than stall.
            (_, None) => Some(Trigger::ForceIdle),
        }
    }

    fn apply(&mut self, trigger: Trigger, now: Instant) -> Option<StateChange> {
        let from = self.state;
        let to = transition(from, trigger).ok()?;

        self.state = to;
        match to {
            SessionState::Idle => self.timer = None,
            SessionState::ClassifyingPress => {
                self.timer = Some(SessionTimer {
                    press_started_at: now,
                    session_started_at: now,
                });
            }
            SessionState::RunningShort | SessionState::RunningLong => {}
        }

        Some(StateChange {
            from,
            to,
            trigger,
            at: now,
        })
    }
}
