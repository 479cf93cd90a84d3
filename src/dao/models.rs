use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Account known to the platform, resolved from a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntity {
    /// Stable identifier of the user.
    pub id: String,
    /// Display name shown to other players.
    pub name: String,
    /// Opaque bearer credential issued by the account service.
    pub token: String,
}

/// Game content a match is played on. Authored elsewhere, read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    /// Stable identifier of the game.
    pub id: String,
    /// Human readable title.
    pub title: String,
}

/// Team roster owned by the team management service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Stable identifier of the team.
    pub id: String,
    /// Display name of the team.
    pub name: String,
    /// Members, in the order they joined the team.
    pub members: Vec<TeamMemberEntity>,
}

impl TeamEntity {
    /// Whether `user_id` belongs to the team.
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|member| member.user_id == user_id)
    }
}

/// Single team member entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamMemberEntity {
    /// Member's user id.
    pub user_id: String,
    /// Member's display name.
    pub user_name: String,
}

/// Kind of match being played.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Every participant plays at once and is ranked by score.
    Competitive,
    /// Participants run ordered segments, handing off to the next runner.
    Relay,
}

/// Lifecycle status of a match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Lobby is open and players may join.
    Waiting,
    /// Creator started the match; clients display a countdown.
    Countdown,
    /// Match is in progress.
    Playing,
    /// Final ranking has been recorded.
    Finished,
}

/// How participant scores are produced by clients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Score is the number of points collected.
    #[default]
    Points,
    /// Score is derived from completion time by the client.
    Time,
}

/// How a relay runner passes the baton to the next one.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HandoffMethod {
    /// The active runner picks the next runner from the roster.
    #[default]
    Manual,
    /// The next runner scans a code displayed by the active runner.
    QrCode,
}

/// Per-match tunables chosen at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchSettings {
    /// Length of the pre-start countdown, in seconds.
    pub countdown_seconds: u32,
    /// How scores are combined.
    pub scoring_mode: ScoringMode,
}

/// Relay-only settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelaySettings {
    /// Number of ordered legs in the relay.
    pub segment_count: u32,
    /// How the baton is passed.
    pub handoff_method: HandoffMethod,
}

/// Persisted match aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Match identifier.
    pub id: Uuid,
    /// Game the match is played on.
    pub game_id: String,
    /// User who created the match; the only one allowed to start it.
    pub creator_id: String,
    /// Competitive or relay.
    pub mode: MatchMode,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Tunables chosen at creation.
    pub settings: MatchSettings,
    /// Present for relay matches only.
    pub relay: Option<RelaySettings>,
    /// Maximum number of participants.
    pub max_participants: u32,
    /// Short code players type to find the match.
    pub access_code: String,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last status change; the countdown recovery path measures from here.
    pub updated_at: SystemTime,
    /// When play began.
    pub started_at: Option<SystemTime>,
    /// When the match finished.
    pub finished_at: Option<SystemTime>,
    /// Optimistic concurrency counter, bumped on every update.
    pub version: u64,
}

/// Progress of a participant through a relay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelayStatus {
    /// Segment not reached yet.
    Pending,
    /// Runner currently on the course.
    Active,
    /// Segment handed off.
    Completed,
}

/// Enrollment of a user in a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Enrollment identifier.
    pub id: Uuid,
    /// Match joined.
    pub match_id: Uuid,
    /// Enrolled user.
    pub user_id: String,
    /// Display name at join time.
    pub user_name: String,
    /// Zero-based position in the join sequence of the match.
    pub join_order: u32,
    /// Latest score reported for the participant (absolute, not a delta).
    pub score: i64,
    /// Score frozen when the match finished.
    pub final_score: Option<i64>,
    /// One-based rank assigned when the match finished.
    pub final_rank: Option<u32>,
    /// Assigned relay segment, starting at 1.
    pub relay_segment: Option<u32>,
    /// Progress on the relay segment.
    pub relay_status: Option<RelayStatus>,
    /// When the participant handed off their segment.
    pub segment_completed_at: Option<SystemTime>,
    /// When the user joined.
    pub joined_at: SystemTime,
}

/// Completion rule for a team vote.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VotingMode {
    /// Completes once an option reaches half of the team (rounded up).
    Majority,
    /// Completes only when every member picked the same option.
    Unanimous,
}

/// Whether a vote still accepts ballots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    /// Ballots are accepted.
    Active,
    /// A winner was recorded; no further ballots.
    Completed,
}

/// One selectable answer of a vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteOptionEntity {
    /// Identifier of the form `option_<index>`.
    pub id: String,
    /// Display text.
    pub text: String,
}

/// Persisted team vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEntity {
    /// Vote identifier.
    pub id: Uuid,
    /// Team the vote belongs to.
    pub team_id: String,
    /// Member who opened the vote.
    pub creator_id: String,
    /// Question put to the team.
    pub question: String,
    /// Options in creation order.
    pub options: Vec<VoteOptionEntity>,
    /// Completion rule.
    pub mode: VotingMode,
    /// Whether ballots are still accepted.
    pub status: VoteStatus,
    /// Set once, together with `status = completed`.
    pub winning_option_id: Option<String>,
    /// Ballots are refused from this instant on.
    pub expires_at: Option<SystemTime>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Completion time.
    pub completed_at: Option<SystemTime>,
    /// Optimistic concurrency counter, bumped on every update.
    pub version: u64,
}

impl VoteEntity {
    /// Whether `option_id` names one of the vote's options.
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|option| option.id == option_id)
    }
}

/// A single user's ballot. At most one per (vote, user).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BallotEntity {
    /// Ballot identifier.
    pub id: Uuid,
    /// Vote the ballot belongs to.
    pub vote_id: Uuid,
    /// Voter.
    pub user_id: String,
    /// Option chosen.
    pub option_id: String,
    /// When the ballot was cast.
    pub cast_at: SystemTime,
}

/// Running score aggregate of a team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamScoreEntity {
    /// Team the score belongs to.
    pub team_id: String,
    /// Current score.
    pub score: i64,
    /// Number of ledger entries applied; doubles as the CAS version.
    pub version: u64,
    /// Last change.
    pub updated_at: SystemTime,
}

/// Classification of a score change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Points earned by solving a challenge.
    Challenge,
    /// Extra points granted by an organiser.
    Bonus,
    /// Points removed for a rule violation.
    Penalty,
    /// Points carried over from a match result.
    Match,
    /// Manual correction by an organiser.
    Manual,
}

/// Append-only ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreHistoryEntity {
    /// Entry identifier.
    pub id: Uuid,
    /// Team the entry belongs to.
    pub team_id: String,
    /// Signed amount applied.
    pub delta: i64,
    /// Aggregate value right after this delta was applied.
    pub running_total: i64,
    /// What produced the change.
    pub source: ScoreSource,
    /// Free-form explanation.
    pub reason: Option<String>,
    /// Position of the entry in the team ledger, starting at 1.
    pub sequence: u64,
    /// When the entry was recorded.
    pub created_at: SystemTime,
}
