//! DTOs of the match lifecycle endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dao::models::{
    HandoffMethod, MatchEntity, MatchMode, MatchStatus, ParticipantEntity, RelayStatus,
    ScoringMode,
};
use crate::dto::{format_optional_time, format_system_time, validation::validate_access_code};

/// Payload used to open a new match lobby.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchRequest {
    /// Game the match is played on.
    #[validate(length(min = 1, max = 128))]
    pub game_id: String,
    /// Competitive or relay; competitive when omitted.
    #[serde(default = "default_mode")]
    pub mode: MatchMode,
    /// Defaults to the configured countdown.
    #[validate(range(min = 1, max = 300))]
    pub countdown_seconds: Option<u32>,
    /// Defaults to the configured capacity.
    #[validate(range(min = 2, max = 100))]
    pub max_participants: Option<u32>,
    /// How scores are combined.
    #[serde(default)]
    pub scoring_mode: ScoringMode,
    /// Required for relay matches, ignored otherwise.
    #[validate(nested)]
    pub relay: Option<RelaySettingsInput>,
}

fn default_mode() -> MatchMode {
    MatchMode::Competitive
}

/// Relay configuration supplied at creation.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RelaySettingsInput {
    /// Number of relay segments.
    #[validate(range(min = 1, max = 50))]
    pub segment_count: u32,
    /// How the baton is passed.
    #[serde(default)]
    pub handoff_method: HandoffMethod,
}

/// Join a lobby knowing only its access code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinByCodeRequest {
    /// Code shared by the creator; case-insensitive.
    #[validate(length(min = 4, max = 12), custom(function = "validate_access_code"))]
    pub access_code: String,
}

/// New absolute score of the caller.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateScoreRequest {
    /// Absolute score, replacing the previous one.
    pub score: i64,
}

/// Relay settings as exposed by the API.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelaySettingsDto {
    /// Number of relay segments.
    pub segment_count: u32,
    /// How the baton is passed.
    pub handoff_method: HandoffMethod,
}

/// Participant as listed in a match roster.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    /// Participant's user id.
    pub user_id: String,
    /// Display name at join time.
    pub user_name: String,
    /// Zero-based position in the lobby.
    pub join_order: u32,
    /// Latest reported score.
    pub score: i64,
    /// Score frozen when the match finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<i64>,
    /// Rank frozen when the match finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_rank: Option<u32>,
    /// Assigned relay segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_segment: Option<u32>,
    /// Progress on the relay segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_status: Option<RelayStatus>,
}

impl From<ParticipantEntity> for ParticipantSummary {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            user_id: value.user_id,
            user_name: value.user_name,
            join_order: value.join_order,
            score: value.score,
            final_score: value.final_score,
            final_rank: value.final_rank,
            relay_segment: value.relay_segment,
            relay_status: value.relay_status,
        }
    }
}

/// Match with its current roster.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    /// Match identifier.
    pub id: Uuid,
    /// Game the match is played on.
    pub game_id: String,
    /// User who opened the lobby.
    pub creator_id: String,
    /// Competitive or relay.
    pub mode: MatchMode,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Countdown length clients display.
    pub countdown_seconds: u32,
    /// How scores are combined.
    pub scoring_mode: ScoringMode,
    /// Relay settings of relay matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay: Option<RelaySettingsDto>,
    /// Lobby capacity.
    pub max_participants: u32,
    /// Code for joining without the id.
    pub access_code: String,
    /// Creation time.
    pub created_at: String,
    /// Last status change.
    pub updated_at: String,
    /// When play began.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// When the match finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// Participants in join order.
    pub participants: Vec<ParticipantSummary>,
}

impl From<(MatchEntity, Vec<ParticipantEntity>)> for MatchSummary {
    fn from((entity, participants): (MatchEntity, Vec<ParticipantEntity>)) -> Self {
        Self {
            id: entity.id,
            game_id: entity.game_id,
            creator_id: entity.creator_id,
            mode: entity.mode,
            status: entity.status,
            countdown_seconds: entity.settings.countdown_seconds,
            scoring_mode: entity.settings.scoring_mode,
            relay: entity.relay.map(|relay| RelaySettingsDto {
                segment_count: relay.segment_count,
                handoff_method: relay.handoff_method,
            }),
            max_participants: entity.max_participants,
            access_code: entity.access_code,
            created_at: format_system_time(entity.created_at),
            updated_at: format_system_time(entity.updated_at),
            started_at: format_optional_time(entity.started_at),
            finished_at: format_optional_time(entity.finished_at),
            participants: participants.into_iter().map(Into::into).collect(),
        }
    }
}

/// One line of a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    /// One-based position.
    pub rank: u32,
    /// Participant's user id.
    pub user_id: String,
    /// Display name.
    pub user_name: String,
    /// Score the rank is based on.
    pub score: i64,
}

/// Ranking of a match, live or final depending on its status.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankingResponse {
    /// Match the ranking belongs to.
    pub match_id: Uuid,
    /// Match status; the ranking is final once finished.
    pub status: MatchStatus,
    /// Entries from first to last.
    pub ranking: Vec<RankingEntry>,
}
