/// In-process backend for tests and runs without MongoDB.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{
    BallotEntity, GameEntity, MatchEntity, ParticipantEntity, ScoreHistoryEntity, TeamEntity,
    TeamScoreEntity, UserEntity, VoteEntity,
};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer backing matches, votes and team scores.
///
/// Updates of versioned aggregates take the version the caller read; backends
/// reject the write with [`StorageError::VersionConflict`] when it no longer
/// matches.
///
/// [`StorageError::VersionConflict`]: crate::dao::storage::StorageError::VersionConflict
pub trait ArenaStore: Send + Sync {
    /// User owning a bearer token.
    fn find_user_by_token(&self, token: String)
    -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// Game by id.
    fn find_game(&self, id: String) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    /// Team with its members.
    fn find_team(&self, id: String) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>>;

    /// Insert a match, failing with a duplicate error when the access code is taken.
    fn insert_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Match by id.
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Match by its upper-case access code.
    fn find_match_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Replace a match whose stored version is still `expected_version`.
    fn update_match(
        &self,
        entity: MatchEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Insert a participant, failing with a duplicate error when the user already joined.
    fn insert_participant(&self, entity: ParticipantEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Enrollment of `user_id` in a match.
    fn find_participant(
        &self,
        match_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;
    /// Participants of a match in join order.
    fn list_participants(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;
    /// Replace a participant row.
    fn update_participant(&self, entity: ParticipantEntity)
    -> BoxFuture<'static, StorageResult<()>>;

    /// Insert a vote.
    fn insert_vote(&self, entity: VoteEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Vote by id.
    fn find_vote(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<VoteEntity>>>;
    /// Votes of a team, newest first.
    fn list_votes(&self, team_id: String) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>>;
    /// Replace a vote whose stored version is still `expected_version`.
    fn update_vote(
        &self,
        entity: VoteEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Insert a ballot, failing with a duplicate error when the user already voted.
    fn insert_ballot(&self, entity: BallotEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Ballots of a vote in the order they were cast.
    fn list_ballots(&self, vote_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<BallotEntity>>>;

    /// Score aggregate of a team, absent before its first delta.
    fn find_team_score(
        &self,
        team_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<TeamScoreEntity>>>;
    /// Persist the aggregate. `None` means the caller saw no aggregate and expects to create it.
    fn save_team_score(
        &self,
        entity: TeamScoreEntity,
        expected_version: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Append a ledger row, failing with a duplicate error when its sequence is taken.
    fn append_score_history(
        &self,
        entry: ScoreHistoryEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Ledger entries of a team, newest first.
    fn list_score_history(
        &self,
        team_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreHistoryEntity>>>;

    /// Cheap round trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Rebuild the connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
