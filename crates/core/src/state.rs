//! Stop-state machine.
//!
//! ```text
//! NEW --begin--> ENROUTE --arrive--> ARRIVED --complete--> COMPLETED
//!  ^                |                   |
//!  +-----cancel-----+-------------------+
//! ```
//!
//! `UNSPECIFIED` behaves like `NEW`. `COMPLETED` is terminal.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::StopState;

/// Edge a driver action requests on the active stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopTransition {
    /// NEW -> ENROUTE.
    BeginNavigation,
    /// ENROUTE -> ARRIVED.
    Arrive,
    /// ARRIVED -> COMPLETED.
    Complete,
    /// ENROUTE | ARRIVED -> NEW.
    CancelNavigation,
}

impl fmt::Display for StopTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopTransition::BeginNavigation => "begin navigation",
            StopTransition::Arrive => "arrive",
            StopTransition::Complete => "complete",
            StopTransition::CancelNavigation => "cancel navigation",
        })
    }
}

/// Rejected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {transition} a stop in state {from}")]
pub struct TransitionError {
    /// State the stop was in.
    pub from: StopState,
    /// Edge that was requested.
    pub transition: StopTransition,
}

impl StopState {
    /// Applies `transition`, returning the target state.
    pub fn apply(self, transition: StopTransition) -> Result<StopState, TransitionError> {
        use StopState::*;
        use StopTransition::*;

        match (self, transition) {
            (New | Unspecified, BeginNavigation) => Ok(Enroute),
            (Enroute, Arrive) => Ok(Arrived),
            (Arrived, Complete) => Ok(Completed),
            (Enroute | Arrived, CancelNavigation) => Ok(New),
            (from, transition) => Err(TransitionError { from, transition }),
        }
    }

    /// States reported to the server as a stop-state update.
    pub fn is_pushable(self) -> bool {
        matches!(self, StopState::New | StopState::Enroute | StopState::Arrived)
    }

    /// States the fleet engine understands.
    pub fn is_fleet_state(self) -> bool {
        self != StopState::Completed
    }

    /// `COMPLETED` has no outgoing edge.
    pub fn is_terminal(self) -> bool {
        self == StopState::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StopState::*;
    use StopTransition::*;

    #[test]
    fn happy_path_walks_to_completed() {
        let s = New.apply(BeginNavigation).unwrap();
        assert_eq!(s, Enroute);
        let s = s.apply(Arrive).unwrap();
        assert_eq!(s, Arrived);
        assert_eq!(s.apply(Complete).unwrap(), Completed);
    }

    #[test]
    fn unspecified_starts_like_new() {
        assert_eq!(Unspecified.apply(BeginNavigation).unwrap(), Enroute);
    }

    #[test]
    fn cancel_returns_to_new() {
        assert_eq!(Enroute.apply(CancelNavigation).unwrap(), New);
        assert_eq!(Arrived.apply(CancelNavigation).unwrap(), New);
        assert!(New.apply(CancelNavigation).is_err());
    }

    #[test]
    fn completed_is_terminal() {
        for t in [BeginNavigation, Arrive, Complete, CancelNavigation] {
            let err = Completed.apply(t).unwrap_err();
            assert_eq!(err.from, Completed);
        }
    }

    #[test]
    fn skipping_states_is_rejected() {
        let err = New.apply(Arrive).unwrap_err();
        assert_eq!(err.to_string(), "cannot arrive a stop in state NEW");
        assert!(Enroute.apply(Complete).is_err());
    }

    #[test]
    fn completed_is_never_pushed() {
        assert!(!Completed.is_pushable());
        assert!(!Unspecified.is_pushable());
        assert!(Arrived.is_pushable());
    }
}
