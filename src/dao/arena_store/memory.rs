//! Process-local store used by tests and single-node deployments without MongoDB.

use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    arena_store::ArenaStore,
    models::{
        BallotEntity, GameEntity, MatchEntity, ParticipantEntity, ScoreHistoryEntity, TeamEntity,
        TeamScoreEntity, UserEntity, VoteEntity,
    },
    storage::{StorageError, StorageResult},
};

/// [`ArenaStore`] kept in process memory; clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, UserEntity>,
    games: HashMap<String, GameEntity>,
    teams: HashMap<String, TeamEntity>,
    matches: HashMap<Uuid, MatchEntity>,
    participants: Vec<ParticipantEntity>,
    votes: Vec<VoteEntity>,
    ballots: Vec<BallotEntity>,
    team_scores: HashMap<String, TeamScoreEntity>,
    score_history: Vec<ScoreHistoryEntity>,
}

impl InMemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user so its token resolves to an identity.
    pub async fn insert_user(&self, user: UserEntity) {
        self.inner.write().await.users.insert(user.id.clone(), user);
    }

    /// Register a game matches can be created on.
    pub async fn insert_game(&self, game: GameEntity) {
        self.inner.write().await.games.insert(game.id.clone(), game);
    }

    /// Register a team with its members.
    pub async fn insert_team(&self, team: TeamEntity) {
        self.inner.write().await.teams.insert(team.id.clone(), team);
    }
}

impl ArenaStore for InMemoryStore {
    fn find_user_by_token(
        &self,
        token: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.read().await;
            Ok(guard.users.values().find(|user| user.token == token).cloned())
        })
    }

    fn find_game(&self, id: String) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.games.get(&id).cloned()) })
    }

    fn find_team(&self, id: String) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.teams.get(&id).cloned()) })
    }

    fn insert_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            if guard.matches.contains_key(&entity.id)
                || guard
                    .matches
                    .values()
                    .any(|existing| existing.access_code == entity.access_code)
            {
                return Err(StorageError::duplicate("match", entity.id));
            }
            guard.matches.insert(entity.id, entity);
            Ok(())
        })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.matches.get(&id).cloned()) })
    }

    fn find_match_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.read().await;
            Ok(guard
                .matches
                .values()
                .find(|entity| entity.access_code == code)
                .cloned())
        })
    }

    fn update_match(
        &self,
        entity: MatchEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            match guard.matches.get_mut(&entity.id) {
                Some(stored) if stored.version == expected_version => {
                    *stored = entity;
                    Ok(())
                }
                _ => Err(StorageError::version_conflict("match", entity.id)),
            }
        })
    }

    fn insert_participant(
        &self,
        entity: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            if guard
                .participants
                .iter()
                .any(|p| p.match_id == entity.match_id && p.user_id == entity.user_id)
            {
                return Err(StorageError::duplicate("participant", entity.user_id));
            }
            guard.participants.push(entity);
            Ok(())
        })
    }

    fn find_participant(
        &self,
        match_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.read().await;
            Ok(guard
                .participants
                .iter()
                .find(|p| p.match_id == match_id && p.user_id == user_id)
                .cloned())
        })
    }

    fn list_participants(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.read().await;
            let mut roster: Vec<ParticipantEntity> = guard
                .participants
                .iter()
                .filter(|p| p.match_id == match_id)
                .cloned()
                .collect();
            roster.sort_by_key(|p| p.join_order);
            Ok(roster)
        })
    }

    fn update_participant(
        &self,
        entity: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            if let Some(stored) = guard.participants.iter_mut().find(|p| p.id == entity.id) {
                *stored = entity;
            }
            Ok(())
        })
    }

    fn insert_vote(&self, entity: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            if guard.votes.iter().any(|v| v.id == entity.id) {
                return Err(StorageError::duplicate("vote", entity.id));
            }
            guard.votes.push(entity);
            Ok(())
        })
    }

    fn find_vote(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<VoteEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner.read().await.votes.iter().find(|v| v.id == id).cloned())
        })
    }

    fn list_votes(&self, team_id: String) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.read().await;
            // Insertion order is creation order; reverse for newest first.
            Ok(guard
                .votes
                .iter()
                .rev()
                .filter(|v| v.team_id == team_id)
                .cloned()
                .collect())
        })
    }

    fn update_vote(
        &self,
        entity: VoteEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            match guard.votes.iter_mut().find(|v| v.id == entity.id) {
                Some(stored) if stored.version == expected_version => {
                    *stored = entity;
                    Ok(())
                }
                _ => Err(StorageError::version_conflict("vote", entity.id)),
            }
        })
    }

    fn insert_ballot(&self, entity: BallotEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            if guard
                .ballots
                .iter()
                .any(|b| b.vote_id == entity.vote_id && b.user_id == entity.user_id)
            {
                return Err(StorageError::duplicate("ballot", entity.user_id));
            }
            guard.ballots.push(entity);
            Ok(())
        })
    }

    fn list_ballots(&self, vote_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<BallotEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.read().await;
            Ok(guard
                .ballots
                .iter()
                .filter(|b| b.vote_id == vote_id)
                .cloned()
                .collect())
        })
    }

    fn find_team_score(
        &self,
        team_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<TeamScoreEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.team_scores.get(&team_id).cloned()) })
    }

    fn save_team_score(
        &self,
        entity: TeamScoreEntity,
        expected_version: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            let current = guard.team_scores.get(&entity.team_id).map(|s| s.version);
            if current != expected_version {
                return Err(StorageError::version_conflict("team score", entity.team_id));
            }
            guard.team_scores.insert(entity.team_id.clone(), entity);
            Ok(())
        })
    }

    fn append_score_history(
        &self,
        entry: ScoreHistoryEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            let taken = guard
                .score_history
                .iter()
                .any(|row| row.team_id == entry.team_id && row.sequence == entry.sequence);
            if taken {
                return Err(StorageError::duplicate(
                    "score_history",
                    format!("{}#{}", entry.team_id, entry.sequence),
                ));
            }
            guard.score_history.push(entry);
            Ok(())
        })
    }

    fn list_score_history(
        &self,
        team_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreHistoryEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.read().await;
            let mut entries: Vec<ScoreHistoryEntity> = guard
                .score_history
                .iter()
                .filter(|entry| entry.team_id == team_id)
                .cloned()
                .collect();
            entries.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then(b.sequence.cmp(&a.sequence))
            });
            Ok(entries)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
