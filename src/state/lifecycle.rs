use thiserror::Error;

use crate::dao::models::MatchStatus;

/// Events that drive a match through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// Creator opened the countdown.
    Start,
    /// Client countdown elapsed and the creator confirmed play.
    Begin,
    /// A participant unblocked a countdown whose completion signal never arrived.
    Recover,
    /// Scores are frozen and the ranking is final.
    Finish,
}

/// Error returned when an event cannot be applied from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while the match is {from:?}")]
pub struct InvalidTransition {
    /// Status the match was in when the event was received.
    pub from: MatchStatus,
    /// Event that cannot be applied from this status.
    pub event: MatchEvent,
}

/// Compute the status reached by applying `event` to `from`.
///
/// Status only moves forward: `waiting → countdown → playing → finished`.
pub fn compute_transition(
    from: MatchStatus,
    event: MatchEvent,
) -> Result<MatchStatus, InvalidTransition> {
    let next = match (from, event) {
        (MatchStatus::Waiting, MatchEvent::Start) => MatchStatus::Countdown,
        (MatchStatus::Countdown, MatchEvent::Begin) => MatchStatus::Playing,
        (MatchStatus::Countdown, MatchEvent::Recover) => MatchStatus::Playing,
        (MatchStatus::Playing, MatchEvent::Finish) => MatchStatus::Finished,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank(status: MatchStatus) -> u8 {
        match status {
            MatchStatus::Waiting => 0,
            MatchStatus::Countdown => 1,
            MatchStatus::Playing => 2,
            MatchStatus::Finished => 3,
        }
    }

    const ALL_STATUSES: [MatchStatus; 4] = [
        MatchStatus::Waiting,
        MatchStatus::Countdown,
        MatchStatus::Playing,
        MatchStatus::Finished,
    ];
    const ALL_EVENTS: [MatchEvent; 4] = [
        MatchEvent::Start,
        MatchEvent::Begin,
        MatchEvent::Recover,
        MatchEvent::Finish,
    ];

    #[test]
    fn full_happy_path_through_match() {
        let mut status = MatchStatus::Waiting;
        for event in [MatchEvent::Start, MatchEvent::Begin, MatchEvent::Finish] {
            status = compute_transition(status, event).unwrap();
        }
        assert_eq!(status, MatchStatus::Finished);
    }

    #[test]
    fn recover_leaves_countdown_for_playing() {
        assert_eq!(
            compute_transition(MatchStatus::Countdown, MatchEvent::Recover),
            Ok(MatchStatus::Playing)
        );
    }

    #[test]
    fn cannot_start_twice() {
        let err = compute_transition(MatchStatus::Countdown, MatchEvent::Start).unwrap_err();
        assert_eq!(err.from, MatchStatus::Countdown);
        assert_eq!(err.event, MatchEvent::Start);
    }

    #[test]
    fn finished_is_terminal() {
        for event in ALL_EVENTS {
            assert!(compute_transition(MatchStatus::Finished, event).is_err());
        }
    }

    #[test]
    fn every_accepted_transition_moves_forward() {
        for from in ALL_STATUSES {
            for event in ALL_EVENTS {
                if let Ok(to) = compute_transition(from, event) {
                    assert!(rank(to) > rank(from), "{from:?} -> {to:?} via {event:?}");
                }
            }
        }
    }
}
