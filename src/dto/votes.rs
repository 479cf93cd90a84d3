use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dao::models::{VoteEntity, VoteStatus, VotingMode};
use crate::dto::{format_optional_time, format_system_time, validation::validate_vote_options};

/// Payload used to open a team vote.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVoteRequest {
    /// Question put to the team.
    #[validate(length(min = 1, max = 500))]
    pub question: String,
    /// Option texts; ids are assigned in this order.
    #[validate(length(min = 2, max = 10), custom(function = "validate_vote_options"))]
    pub options: Vec<String>,
    /// How the winner is decided.
    pub mode: VotingMode,
    /// Lifetime of the vote in seconds; open-ended when omitted.
    #[validate(range(min = 1, max = 604_800))]
    pub expires_in_seconds: Option<u64>,
}

/// Ballot submitted by a team member.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CastBallotRequest {
    /// Chosen option id.
    #[validate(length(min = 1))]
    pub option_id: String,
}

/// One selectable option.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VoteOptionDto {
    /// Stable option id.
    pub id: String,
    /// Display text.
    pub text: String,
}

/// Vote with its current tally.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteSummary {
    /// Vote identifier.
    pub id: Uuid,
    /// Team the vote belongs to.
    pub team_id: String,
    /// Member who opened the vote.
    pub creator_id: String,
    /// Question put to the team.
    pub question: String,
    /// Options in creation order.
    pub options: Vec<VoteOptionDto>,
    /// How the winner is decided.
    pub mode: VotingMode,
    /// Whether ballots are still accepted.
    pub status: VoteStatus,
    /// Winner once the vote completed.
    pub winning_option_id: Option<String>,
    /// Deadline, when the vote has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// Creation time.
    pub created_at: String,
    /// Completion time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Ballots per option, in option order.
    #[schema(value_type = Object)]
    pub vote_counts: IndexMap<String, u32>,
    /// Sum of all ballots.
    pub total_ballots: u32,
}

impl From<(VoteEntity, IndexMap<String, u32>)> for VoteSummary {
    fn from((entity, vote_counts): (VoteEntity, IndexMap<String, u32>)) -> Self {
        Self {
            id: entity.id,
            team_id: entity.team_id,
            creator_id: entity.creator_id,
            question: entity.question,
            options: entity
                .options
                .into_iter()
                .map(|option| VoteOptionDto {
                    id: option.id,
                    text: option.text,
                })
                .collect(),
            mode: entity.mode,
            status: entity.status,
            winning_option_id: entity.winning_option_id,
            expires_at: format_optional_time(entity.expires_at),
            created_at: format_system_time(entity.created_at),
            completed_at: format_optional_time(entity.completed_at),
            total_ballots: vote_counts.values().sum(),
            vote_counts,
        }
    }
}

/// Outcome of casting a ballot.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CastBallotResponse {
    /// Vote the ballot was cast in.
    pub vote_id: Uuid,
    /// Option the caller chose.
    pub option_id: String,
    /// Whether this ballot completed the vote.
    pub is_complete: bool,
    /// Winner once the vote completed.
    pub winning_option_id: Option<String>,
    /// Ballots per option after this ballot, in option order.
    #[schema(value_type = Object)]
    pub vote_counts: IndexMap<String, u32>,
}
