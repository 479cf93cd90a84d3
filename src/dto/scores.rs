use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dao::models::{ScoreHistoryEntity, ScoreSource};
use crate::dto::format_system_time;

/// Delta applied to a team's running score.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeamScoreRequest {
    /// Signed amount added to the score.
    pub delta: i64,
    /// What produced the change.
    pub source: ScoreSource,
    /// Free-form explanation.
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Ledger row as exposed by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreHistoryEntry {
    /// Entry identifier.
    pub id: Uuid,
    /// Team the entry belongs to.
    pub team_id: String,
    /// Signed amount applied.
    pub delta: i64,
    /// Team score after this entry.
    pub running_total: i64,
    /// What produced the change.
    pub source: ScoreSource,
    /// Free-form explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Position in the team ledger, starting at 1.
    pub sequence: u64,
    /// When the entry was recorded.
    pub created_at: String,
}

impl From<ScoreHistoryEntity> for ScoreHistoryEntry {
    fn from(value: ScoreHistoryEntity) -> Self {
        Self {
            id: value.id,
            team_id: value.team_id,
            delta: value.delta,
            running_total: value.running_total,
            source: value.source,
            reason: value.reason,
            sequence: value.sequence,
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Result of applying a delta.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamScoreUpdateResponse {
    /// Team whose score changed.
    pub team_id: String,
    /// Score before the delta.
    pub previous_score: i64,
    /// Delta applied.
    pub delta: i64,
    /// Score after the delta.
    pub new_score: i64,
    /// Ledger entry recorded for the change.
    pub entry: ScoreHistoryEntry,
}

/// Ledger of a team, newest entry first.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreHistoryResponse {
    /// Team the ledger belongs to.
    pub team_id: String,
    /// Stored aggregate score.
    pub current_score: i64,
    /// Whether replaying every delta from zero lands on `current_score`.
    pub consistent: bool,
    /// Entries, newest first.
    pub entries: Vec<ScoreHistoryEntry>,
}
