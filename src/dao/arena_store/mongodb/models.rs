use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::{
    BallotEntity, GameEntity, MatchEntity, MatchMode, MatchSettings, MatchStatus,
    ParticipantEntity, RelaySettings, RelayStatus, ScoreHistoryEntity, ScoreSource, TeamEntity,
    TeamMemberEntity, TeamScoreEntity, UserEntity, VoteEntity, VoteOptionEntity, VoteStatus,
    VotingMode,
};

pub const USER_COLLECTION: &str = "users";
pub const GAME_COLLECTION: &str = "games";
pub const TEAM_COLLECTION: &str = "teams";
pub const MATCH_COLLECTION: &str = "matches";
pub const PARTICIPANT_COLLECTION: &str = "match_participants";
pub const VOTE_COLLECTION: &str = "team_votes";
pub const BALLOT_COLLECTION: &str = "vote_ballots";
pub const TEAM_SCORE_COLLECTION: &str = "team_scores";
pub const SCORE_HISTORY_COLLECTION: &str = "score_history";

pub fn doc_id(id: impl ToString) -> Document {
    doc! {"_id": id.to_string()}
}

fn parse_uuid(collection: &'static str, raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| MongoDaoError::CorruptDocument {
        collection,
        id: raw.to_owned(),
    })
}

fn optional_time(value: Option<DateTime>) -> Option<std::time::SystemTime> {
    value.map(DateTime::to_system_time)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    token: String,
}

impl From<MongoUserDocument> for UserEntity {
    fn from(value: MongoUserDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            token: value.token,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    id: String,
    title: String,
}

impl From<MongoGameDocument> for GameEntity {
    fn from(value: MongoGameDocument) -> Self {
        Self {
            id: value.id,
            title: value.title,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTeamDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(default)]
    members: Vec<TeamMemberEntity>,
}

impl From<MongoTeamDocument> for TeamEntity {
    fn from(value: MongoTeamDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            members: value.members,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    id: String,
    game_id: String,
    creator_id: String,
    mode: MatchMode,
    status: MatchStatus,
    settings: MatchSettings,
    relay: Option<RelaySettings>,
    max_participants: u32,
    access_code: String,
    created_at: DateTime,
    updated_at: DateTime,
    started_at: Option<DateTime>,
    finished_at: Option<DateTime>,
    version: i64,
}

impl From<MatchEntity> for MongoMatchDocument {
    fn from(value: MatchEntity) -> Self {
        Self {
            id: value.id.to_string(),
            game_id: value.game_id,
            creator_id: value.creator_id,
            mode: value.mode,
            status: value.status,
            settings: value.settings,
            relay: value.relay,
            max_participants: value.max_participants,
            access_code: value.access_code,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            started_at: value.started_at.map(DateTime::from_system_time),
            finished_at: value.finished_at.map(DateTime::from_system_time),
            version: value.version as i64,
        }
    }
}

impl TryFrom<MongoMatchDocument> for MatchEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoMatchDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(MATCH_COLLECTION, &value.id)?,
            game_id: value.game_id,
            creator_id: value.creator_id,
            mode: value.mode,
            status: value.status,
            settings: value.settings,
            relay: value.relay,
            max_participants: value.max_participants,
            access_code: value.access_code,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            started_at: optional_time(value.started_at),
            finished_at: optional_time(value.finished_at),
            version: value.version as u64,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    #[serde(rename = "_id")]
    id: String,
    match_id: String,
    user_id: String,
    user_name: String,
    join_order: u32,
    score: i64,
    final_score: Option<i64>,
    final_rank: Option<u32>,
    relay_segment: Option<u32>,
    relay_status: Option<RelayStatus>,
    segment_completed_at: Option<DateTime>,
    joined_at: DateTime,
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id.to_string(),
            match_id: value.match_id.to_string(),
            user_id: value.user_id,
            user_name: value.user_name,
            join_order: value.join_order,
            score: value.score,
            final_score: value.final_score,
            final_rank: value.final_rank,
            relay_segment: value.relay_segment,
            relay_status: value.relay_status,
            segment_completed_at: value.segment_completed_at.map(DateTime::from_system_time),
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl TryFrom<MongoParticipantDocument> for ParticipantEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoParticipantDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(PARTICIPANT_COLLECTION, &value.id)?,
            match_id: parse_uuid(PARTICIPANT_COLLECTION, &value.match_id)?,
            user_id: value.user_id,
            user_name: value.user_name,
            join_order: value.join_order,
            score: value.score,
            final_score: value.final_score,
            final_rank: value.final_rank,
            relay_segment: value.relay_segment,
            relay_status: value.relay_status,
            segment_completed_at: optional_time(value.segment_completed_at),
            joined_at: value.joined_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVoteDocument {
    #[serde(rename = "_id")]
    id: String,
    team_id: String,
    creator_id: String,
    question: String,
    options: Vec<VoteOptionEntity>,
    mode: VotingMode,
    status: VoteStatus,
    winning_option_id: Option<String>,
    expires_at: Option<DateTime>,
    created_at: DateTime,
    completed_at: Option<DateTime>,
    version: i64,
}

impl From<VoteEntity> for MongoVoteDocument {
    fn from(value: VoteEntity) -> Self {
        Self {
            id: value.id.to_string(),
            team_id: value.team_id,
            creator_id: value.creator_id,
            question: value.question,
            options: value.options,
            mode: value.mode,
            status: value.status,
            winning_option_id: value.winning_option_id,
            expires_at: value.expires_at.map(DateTime::from_system_time),
            created_at: DateTime::from_system_time(value.created_at),
            completed_at: value.completed_at.map(DateTime::from_system_time),
            version: value.version as i64,
        }
    }
}

impl TryFrom<MongoVoteDocument> for VoteEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoVoteDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(VOTE_COLLECTION, &value.id)?,
            team_id: value.team_id,
            creator_id: value.creator_id,
            question: value.question,
            options: value.options,
            mode: value.mode,
            status: value.status,
            winning_option_id: value.winning_option_id,
            expires_at: optional_time(value.expires_at),
            created_at: value.created_at.to_system_time(),
            completed_at: optional_time(value.completed_at),
            version: value.version as u64,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoBallotDocument {
    #[serde(rename = "_id")]
    id: String,
    vote_id: String,
    user_id: String,
    option_id: String,
    cast_at: DateTime,
}

impl From<BallotEntity> for MongoBallotDocument {
    fn from(value: BallotEntity) -> Self {
        Self {
            id: value.id.to_string(),
            vote_id: value.vote_id.to_string(),
            user_id: value.user_id,
            option_id: value.option_id,
            cast_at: DateTime::from_system_time(value.cast_at),
        }
    }
}

impl TryFrom<MongoBallotDocument> for BallotEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoBallotDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(BALLOT_COLLECTION, &value.id)?,
            vote_id: parse_uuid(BALLOT_COLLECTION, &value.vote_id)?,
            user_id: value.user_id,
            option_id: value.option_id,
            cast_at: value.cast_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTeamScoreDocument {
    /// Keyed by team id so a team has a single aggregate.
    #[serde(rename = "_id")]
    team_id: String,
    score: i64,
    version: i64,
    updated_at: DateTime,
}

impl From<TeamScoreEntity> for MongoTeamScoreDocument {
    fn from(value: TeamScoreEntity) -> Self {
        Self {
            team_id: value.team_id,
            score: value.score,
            version: value.version as i64,
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoTeamScoreDocument> for TeamScoreEntity {
    fn from(value: MongoTeamScoreDocument) -> Self {
        Self {
            team_id: value.team_id,
            score: value.score,
            version: value.version as u64,
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoScoreHistoryDocument {
    #[serde(rename = "_id")]
    id: String,
    team_id: String,
    delta: i64,
    running_total: i64,
    source: ScoreSource,
    reason: Option<String>,
    sequence: i64,
    created_at: DateTime,
}

impl From<ScoreHistoryEntity> for MongoScoreHistoryDocument {
    fn from(value: ScoreHistoryEntity) -> Self {
        Self {
            id: value.id.to_string(),
            team_id: value.team_id,
            delta: value.delta,
            running_total: value.running_total,
            source: value.source,
            reason: value.reason,
            sequence: value.sequence as i64,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoScoreHistoryDocument> for ScoreHistoryEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoScoreHistoryDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(SCORE_HISTORY_COLLECTION, &value.id)?,
            team_id: value.team_id,
            delta: value.delta,
            running_total: value.running_total,
            source: value.source,
            reason: value.reason,
            sequence: value.sequence as u64,
            created_at: value.created_at.to_system_time(),
        })
    }
}
