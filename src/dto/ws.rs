use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::dto::{matches::RankingEntry, relay::RelayAssignment, votes::VoteSummary};

const MAX_CHAT_LENGTH: usize = 1_000;

/// Messages accepted from realtime clients.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Enter a session room.
    #[serde(rename_all = "camelCase")]
    Join {
        /// Session room id.
        session_id: String,
        /// Sender's user id.
        user_id: String,
        /// Display name.
        user_name: String,
    },
    /// Enter a team room.
    #[serde(rename_all = "camelCase")]
    TeamJoin {
        /// Team room id.
        team_id: String,
        /// Sender's user id.
        user_id: String,
        /// Display name.
        user_name: String,
    },
    /// Chat line for the current team room.
    #[serde(rename_all = "camelCase")]
    TeamChat {
        /// Sender's user id.
        user_id: String,
        /// Chat text.
        message: String,
    },
    /// Position shared with the current team room.
    #[serde(rename_all = "camelCase")]
    TeamLocation {
        /// Sender's user id.
        user_id: String,
        /// Latitude in degrees.
        latitude: f64,
        /// Longitude in degrees.
        longitude: f64,
    },
    /// Readiness toggle for the current team room.
    #[serde(rename_all = "camelCase")]
    TeamReady {
        /// Sender's user id.
        user_id: String,
        /// Whether the member is ready.
        is_ready: bool,
    },
    /// Chat line for the current session room.
    #[serde(rename_all = "camelCase")]
    Chat {
        /// Sender's user id.
        user_id: String,
        /// Chat text.
        message: String,
    },
    /// Enter a match room.
    #[serde(rename_all = "camelCase")]
    MatchJoin {
        /// Match room id.
        match_id: String,
        /// Sender's user id.
        user_id: String,
        /// Display name.
        user_name: String,
    },
    /// Live score hint relayed to the match room; the persisted score goes through HTTP.
    #[serde(rename_all = "camelCase")]
    MatchScoreUpdate {
        /// Match room id.
        match_id: String,
        /// Sender's user id.
        user_id: String,
        /// Reported score.
        score: i64,
    },
    /// Hand-off hint relayed to the match room; the persisted hand-off goes through HTTP.
    #[serde(rename_all = "camelCase")]
    RelayHandoff {
        /// Match room id.
        match_id: String,
        /// Runner passing the baton.
        from_user_id: String,
        /// Runner receiving the baton.
        to_user_id: String,
    },
}

/// Failure to turn a text frame into an [`InboundMessage`].
#[derive(Debug, Error)]
pub enum InboundParseError {
    /// Frame is not valid JSON for any message type.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Fields failed validation.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
}

impl InboundMessage {
    /// Parse and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, InboundParseError> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    /// User id the sender claims to act as.
    pub fn claimed_user_id(&self) -> &str {
        match self {
            Self::Join { user_id, .. }
            | Self::TeamJoin { user_id, .. }
            | Self::TeamChat { user_id, .. }
            | Self::TeamLocation { user_id, .. }
            | Self::TeamReady { user_id, .. }
            | Self::Chat { user_id, .. }
            | Self::MatchJoin { user_id, .. }
            | Self::MatchScoreUpdate { user_id, .. } => user_id,
            Self::RelayHandoff { from_user_id, .. } => from_user_id,
        }
    }

    /// Wire name of the message kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::TeamJoin { .. } => "team_join",
            Self::TeamChat { .. } => "team_chat",
            Self::TeamLocation { .. } => "team_location",
            Self::TeamReady { .. } => "team_ready",
            Self::Chat { .. } => "chat",
            Self::MatchJoin { .. } => "match_join",
            Self::MatchScoreUpdate { .. } => "match_score_update",
            Self::RelayHandoff { .. } => "relay_handoff",
        }
    }
}

impl Validate for InboundMessage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        require_non_empty(&mut errors, "userId", self.claimed_user_id());
        match self {
            Self::Join {
                session_id,
                user_name,
                ..
            } => {
                require_non_empty(&mut errors, "sessionId", session_id);
                require_non_empty(&mut errors, "userName", user_name);
            }
            Self::TeamJoin {
                team_id, user_name, ..
            } => {
                require_non_empty(&mut errors, "teamId", team_id);
                require_non_empty(&mut errors, "userName", user_name);
            }
            Self::MatchJoin {
                match_id,
                user_name,
                ..
            } => {
                require_non_empty(&mut errors, "matchId", match_id);
                require_non_empty(&mut errors, "userName", user_name);
            }
            Self::TeamChat { message, .. } | Self::Chat { message, .. } => {
                require_non_empty(&mut errors, "message", message);
                if message.chars().count() > MAX_CHAT_LENGTH {
                    let mut err = ValidationError::new("message_length");
                    err.message = Some(
                        format!("Message must be at most {MAX_CHAT_LENGTH} characters").into(),
                    );
                    errors.add("message", err);
                }
            }
            Self::TeamLocation {
                latitude,
                longitude,
                ..
            } => {
                if !(-90.0..=90.0).contains(latitude) {
                    errors.add("latitude", ValidationError::new("range"));
                }
                if !(-180.0..=180.0).contains(longitude) {
                    errors.add("longitude", ValidationError::new("range"));
                }
            }
            Self::MatchScoreUpdate { match_id, .. } => {
                require_non_empty(&mut errors, "matchId", match_id);
            }
            Self::RelayHandoff {
                match_id,
                to_user_id,
                ..
            } => {
                require_non_empty(&mut errors, "matchId", match_id);
                require_non_empty(&mut errors, "toUserId", to_user_id);
            }
            Self::TeamReady { .. } => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn require_non_empty(errors: &mut ValidationErrors, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some(format!("{field} must not be empty").into());
        errors.add(field, err);
    }
}

/// Events pushed to realtime clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Handshake acknowledgement.
    #[serde(rename_all = "camelCase")]
    Connected {
        /// Registry id of this connection.
        connection_id: Uuid,
        /// User bound at handshake, if any.
        user_id: Option<String>,
    },
    /// Someone entered a session room.
    #[serde(rename_all = "camelCase")]
    UserJoined {
        /// Session room id.
        session_id: String,
        /// User the message is about.
        user_id: String,
        /// Display name.
        user_name: String,
    },
    /// Someone left a room, by choice, by switching rooms or by disconnecting.
    #[serde(rename_all = "camelCase")]
    UserLeft {
        /// Kind of room that was left.
        room_type: String,
        /// Id of the room that was left.
        room_id: String,
        /// User the message is about.
        user_id: String,
        /// Display name.
        user_name: String,
    },
    /// Someone entered a team room.
    #[serde(rename_all = "camelCase")]
    TeamMemberJoined {
        /// Team room id.
        team_id: String,
        /// User the message is about.
        user_id: String,
        /// Display name.
        user_name: String,
    },
    /// Chat line in a team room.
    #[serde(rename_all = "camelCase")]
    TeamChat {
        /// Team room id.
        team_id: String,
        /// User the message is about.
        user_id: String,
        /// Display name.
        user_name: String,
        /// Chat text.
        message: String,
        /// Server time the line was relayed.
        sent_at: String,
    },
    /// Member position in a team room.
    #[serde(rename_all = "camelCase")]
    TeamLocation {
        /// Team room id.
        team_id: String,
        /// User the message is about.
        user_id: String,
        /// Latitude in degrees.
        latitude: f64,
        /// Longitude in degrees.
        longitude: f64,
    },
    /// A member changed readiness.
    #[serde(rename_all = "camelCase")]
    TeamReadyUpdate {
        /// Team room id.
        team_id: String,
        /// User the message is about.
        user_id: String,
        /// Whether the member is ready.
        is_ready: bool,
    },
    /// Chat line in a session room.
    #[serde(rename_all = "camelCase")]
    Chat {
        /// Session room id.
        session_id: String,
        /// User the message is about.
        user_id: String,
        /// Display name.
        user_name: String,
        /// Chat text.
        message: String,
        /// Server time the line was relayed.
        sent_at: String,
    },
    /// Someone entered a match room or joined the lobby.
    #[serde(rename_all = "camelCase")]
    MatchParticipantJoined {
        /// Match room id.
        match_id: String,
        /// User the message is about.
        user_id: String,
        /// Display name.
        user_name: String,
        /// Roster size when known from storage.
        participant_count: Option<usize>,
    },
    /// Countdown started.
    #[serde(rename_all = "camelCase")]
    MatchCountdown {
        /// Match room id.
        match_id: Uuid,
        /// Countdown length.
        seconds: u32,
    },
    /// Play began.
    #[serde(rename_all = "camelCase")]
    MatchStarted {
        /// Match room id.
        match_id: Uuid,
        /// Whether play began through recovery of a stalled countdown.
        recovered: bool,
    },
    /// Final ranking.
    #[serde(rename_all = "camelCase")]
    MatchFinished {
        /// Match room id.
        match_id: Uuid,
        /// Entries from first to last.
        ranking: Vec<RankingEntry>,
    },
    /// Live ranking after a score change.
    #[serde(rename_all = "camelCase")]
    MatchRanking {
        /// Match room id.
        match_id: Uuid,
        /// Entries from first to last.
        ranking: Vec<RankingEntry>,
    },
    /// Live score hint from a participant.
    #[serde(rename_all = "camelCase")]
    MatchScoreUpdate {
        /// Match room id.
        match_id: String,
        /// User the message is about.
        user_id: String,
        /// Reported score.
        score: i64,
    },
    /// Segments were distributed.
    #[serde(rename_all = "camelCase")]
    RelaySegmentsAssigned {
        /// Match room id.
        match_id: Uuid,
        /// Segments the course is split into.
        segment_count: u32,
        /// Runners with their segment, in join order.
        assignments: Vec<RelayAssignment>,
    },
    /// Baton passed between runners.
    #[serde(rename_all = "camelCase")]
    RelayHandoff {
        /// Match room id.
        match_id: String,
        /// Runner passing the baton.
        from_user_id: String,
        /// Runner receiving the baton.
        to_user_id: String,
    },
    /// A team vote was opened.
    #[serde(rename_all = "camelCase")]
    VoteCreated {
        /// Vote that was opened.
        vote: VoteSummary,
    },
    /// A ballot was recorded.
    #[serde(rename_all = "camelCase")]
    VoteCast {
        /// Vote the ballot belongs to.
        vote_id: Uuid,
        /// Team room id.
        team_id: String,
        /// User the message is about.
        user_id: String,
        /// Option chosen.
        option_id: String,
        /// Whether the ballot completed the vote.
        is_complete: bool,
        /// Winner once the vote completed.
        winning_option_id: Option<String>,
        /// Ballots per option, in option order.
        #[schema(value_type = Object)]
        vote_counts: IndexMap<String, u32>,
    },
    /// Team score changed.
    #[serde(rename_all = "camelCase")]
    ScoreUpdate {
        /// Team room id.
        team_id: String,
        /// Signed amount applied.
        delta: i64,
        /// Team score after the delta.
        new_score: i64,
    },
    /// Inbound message was refused.
    Error {
        /// Why the message was refused.
        message: String,
    },
}

impl OutboundEvent {
    /// Wire name of the event, reused as the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::TeamMemberJoined { .. } => "team_member_joined",
            Self::TeamChat { .. } => "team_chat",
            Self::TeamLocation { .. } => "team_location",
            Self::TeamReadyUpdate { .. } => "team_ready_update",
            Self::Chat { .. } => "chat",
            Self::MatchParticipantJoined { .. } => "match_participant_joined",
            Self::MatchCountdown { .. } => "match_countdown",
            Self::MatchStarted { .. } => "match_started",
            Self::MatchFinished { .. } => "match_finished",
            Self::MatchRanking { .. } => "match_ranking",
            Self::MatchScoreUpdate { .. } => "match_score_update",
            Self::RelaySegmentsAssigned { .. } => "relay_segments_assigned",
            Self::RelayHandoff { .. } => "relay_handoff",
            Self::VoteCreated { .. } => "vote_created",
            Self::VoteCast { .. } => "vote_cast",
            Self::ScoreUpdate { .. } => "score_update",
            Self::Error { .. } => "error",
        }
    }

    /// `error` event carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_camel_case_fields_with_type_tag() {
        let message = InboundMessage::from_json_str(
            r#"{"type":"team_ready","userId":"u1","isReady":true}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            InboundMessage::TeamReady {
                user_id: "u1".into(),
                is_ready: true
            }
        );
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(
            InboundMessage::from_json_str(r#"{"type":"dance","userId":"u1"}"#),
            Err(InboundParseError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_blank_identifiers_and_bad_coordinates() {
        assert!(matches!(
            InboundMessage::from_json_str(
                r#"{"type":"join","sessionId":" ","userId":"u1","userName":"Ann"}"#
            ),
            Err(InboundParseError::Invalid(_))
        ));
        assert!(matches!(
            InboundMessage::from_json_str(
                r#"{"type":"team_location","userId":"u1","latitude":91.0,"longitude":0.0}"#
            ),
            Err(InboundParseError::Invalid(_))
        ));
    }

    #[test]
    fn relay_handoff_claims_the_sender() {
        let message = InboundMessage::from_json_str(
            r#"{"type":"relay_handoff","matchId":"m","fromUserId":"a","toUserId":"b"}"#,
        )
        .unwrap();
        assert_eq!(message.claimed_user_id(), "a");
    }

    #[test]
    fn outbound_events_serialize_with_type_tag() {
        let event = OutboundEvent::ScoreUpdate {
            team_id: "t".into(),
            delta: 10,
            new_score: 60,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "score_update", "teamId": "t", "delta": 10, "newScore": 60})
        );
        assert_eq!(event.kind(), "score_update");
    }
}
