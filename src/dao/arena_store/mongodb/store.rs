use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        BALLOT_COLLECTION, GAME_COLLECTION, MATCH_COLLECTION, MongoBallotDocument,
        MongoGameDocument, MongoMatchDocument, MongoParticipantDocument,
        MongoScoreHistoryDocument, MongoTeamDocument, MongoTeamScoreDocument, MongoUserDocument,
        MongoVoteDocument, PARTICIPANT_COLLECTION, SCORE_HISTORY_COLLECTION, TEAM_COLLECTION,
        TEAM_SCORE_COLLECTION, USER_COLLECTION, VOTE_COLLECTION, doc_id,
    },
};
use crate::dao::{
    arena_store::ArenaStore,
    models::{
        BallotEntity, GameEntity, MatchEntity, ParticipantEntity, ScoreHistoryEntity, TeamEntity,
        TeamScoreEntity, UserEntity, VoteEntity,
    },
    storage::StorageResult,
};

/// MongoDB implementation of [`ArenaStore`].
#[derive(Clone)]
pub struct MongoArenaStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    /// Swap in a fresh client. Retrying is left to the storage supervisor.
    async fn reconnect(&self) -> MongoResult<()> {
        let database = open(&self.config).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

/// Build a client for `config` and require one answered ping.
async fn open(config: &MongoConfig) -> MongoResult<Database> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);
    database
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|source| MongoDaoError::Unreachable { source })?;
    Ok(database)
}

impl MongoArenaStore {
    /// Connect to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = open(&config).await?;
        let store = Self {
            inner: Arc::new(MongoInner {
                database: RwLock::new(database),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let indexes: [(&'static str, &'static str, Document, bool); 7] = [
            (USER_COLLECTION, "token", doc! {"token": 1}, true),
            (MATCH_COLLECTION, "access_code", doc! {"access_code": 1}, true),
            (
                PARTICIPANT_COLLECTION,
                "match_id,user_id",
                doc! {"match_id": 1, "user_id": 1},
                true,
            ),
            (
                VOTE_COLLECTION,
                "team_id,created_at",
                doc! {"team_id": 1, "created_at": -1},
                false,
            ),
            (
                BALLOT_COLLECTION,
                "vote_id,user_id",
                doc! {"vote_id": 1, "user_id": 1},
                true,
            ),
            (
                SCORE_HISTORY_COLLECTION,
                "team_id,sequence",
                doc! {"team_id": 1, "sequence": 1},
                true,
            ),
            (
                PARTICIPANT_COLLECTION,
                "match_id,join_order",
                doc! {"match_id": 1, "join_order": 1},
                false,
            ),
        ];

        let database = self.database().await;
        for (collection, index, keys, unique) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(format!("{}_idx", index.replace(',', "_"))))
                        .unique(Some(unique))
                        .build(),
                )
                .build();

            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.database.read().await.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.inner.database.read().await.collection::<T>(name)
    }

    async fn find_one<T>(&self, name: &'static str, filter: Document) -> MongoResult<Option<T>>
    where
        T: DeserializeOwned + Send + Sync,
    {
        self.collection::<T>(name)
            .await
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: name,
                source,
            })
    }

    async fn find_many<T>(
        &self,
        name: &'static str,
        filter: Document,
        sort: Document,
    ) -> MongoResult<Vec<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        self.collection::<T>(name)
            .await
            .find(filter)
            .sort(sort)
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: name,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: name,
                source,
            })
    }

    /// Insert a document, reporting unique index collisions as duplicates.
    async fn insert<T>(
        &self,
        name: &'static str,
        entity: &'static str,
        id: String,
        document: T,
    ) -> MongoResult<()>
    where
        T: Serialize + Send + Sync,
    {
        match self.collection::<T>(name).await.insert_one(&document).await {
            Ok(_) => Ok(()),
            Err(source) if is_duplicate_key(&source) => {
                Err(MongoDaoError::Duplicate { entity, id })
            }
            Err(source) => Err(MongoDaoError::Write {
                collection: name,
                id,
                source,
            }),
        }
    }

    /// Replace a versioned document only when its stored version still matches.
    async fn replace_versioned<T>(
        &self,
        name: &'static str,
        entity: &'static str,
        id: String,
        expected_version: u64,
        document: T,
    ) -> MongoResult<()>
    where
        T: Serialize + Send + Sync,
    {
        let filter = doc! {"_id": id.as_str(), "version": expected_version as i64};
        let result = self
            .collection::<T>(name)
            .await
            .replace_one(filter, &document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: name,
                id: id.clone(),
                source,
            })?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::VersionConflict { entity, id });
        }
        Ok(())
    }

    async fn find_user_by_token(&self, token: String) -> MongoResult<Option<UserEntity>> {
        let document: Option<MongoUserDocument> =
            self.find_one(USER_COLLECTION, doc! {"token": token}).await?;
        Ok(document.map(Into::into))
    }

    async fn find_game(&self, id: String) -> MongoResult<Option<GameEntity>> {
        let document: Option<MongoGameDocument> =
            self.find_one(GAME_COLLECTION, doc_id(id)).await?;
        Ok(document.map(Into::into))
    }

    async fn find_team(&self, id: String) -> MongoResult<Option<TeamEntity>> {
        let document: Option<MongoTeamDocument> =
            self.find_one(TEAM_COLLECTION, doc_id(id)).await?;
        Ok(document.map(Into::into))
    }

    async fn insert_match(&self, entity: MatchEntity) -> MongoResult<()> {
        let id = entity.id.to_string();
        let document: MongoMatchDocument = entity.into();
        self.insert(MATCH_COLLECTION, "match", id, document).await
    }

    async fn find_match_by(&self, filter: Document) -> MongoResult<Option<MatchEntity>> {
        let document: Option<MongoMatchDocument> =
            self.find_one(MATCH_COLLECTION, filter).await?;
        document.map(MatchEntity::try_from).transpose()
    }

    async fn update_match(&self, entity: MatchEntity, expected_version: u64) -> MongoResult<()> {
        let id = entity.id.to_string();
        let document: MongoMatchDocument = entity.into();
        self.replace_versioned(MATCH_COLLECTION, "match", id, expected_version, document)
            .await
    }

    async fn insert_participant(&self, entity: ParticipantEntity) -> MongoResult<()> {
        let id = format!("{}/{}", entity.match_id, entity.user_id);
        let document: MongoParticipantDocument = entity.into();
        self.insert(PARTICIPANT_COLLECTION, "participant", id, document)
            .await
    }

    async fn find_participant(
        &self,
        match_id: Uuid,
        user_id: String,
    ) -> MongoResult<Option<ParticipantEntity>> {
        let document: Option<MongoParticipantDocument> = self
            .find_one(
                PARTICIPANT_COLLECTION,
                doc! {"match_id": match_id.to_string(), "user_id": user_id},
            )
            .await?;
        document.map(ParticipantEntity::try_from).transpose()
    }

    async fn list_participants(&self, match_id: Uuid) -> MongoResult<Vec<ParticipantEntity>> {
        let documents: Vec<MongoParticipantDocument> = self
            .find_many(
                PARTICIPANT_COLLECTION,
                doc! {"match_id": match_id.to_string()},
                doc! {"join_order": 1},
            )
            .await?;
        documents
            .into_iter()
            .map(ParticipantEntity::try_from)
            .collect()
    }

    async fn update_participant(&self, entity: ParticipantEntity) -> MongoResult<()> {
        let id = entity.id.to_string();
        let document: MongoParticipantDocument = entity.into();
        self.collection::<MongoParticipantDocument>(PARTICIPANT_COLLECTION)
            .await
            .replace_one(doc_id(id.as_str()), &document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: PARTICIPANT_COLLECTION,
                id,
                source,
            })?;
        Ok(())
    }

    async fn insert_vote(&self, entity: VoteEntity) -> MongoResult<()> {
        let id = entity.id.to_string();
        let document: MongoVoteDocument = entity.into();
        self.insert(VOTE_COLLECTION, "vote", id, document).await
    }

    async fn find_vote(&self, id: Uuid) -> MongoResult<Option<VoteEntity>> {
        let document: Option<MongoVoteDocument> =
            self.find_one(VOTE_COLLECTION, doc_id(id)).await?;
        document.map(VoteEntity::try_from).transpose()
    }

    async fn list_votes(&self, team_id: String) -> MongoResult<Vec<VoteEntity>> {
        let documents: Vec<MongoVoteDocument> = self
            .find_many(
                VOTE_COLLECTION,
                doc! {"team_id": team_id},
                doc! {"created_at": -1},
            )
            .await?;
        documents.into_iter().map(VoteEntity::try_from).collect()
    }

    async fn update_vote(&self, entity: VoteEntity, expected_version: u64) -> MongoResult<()> {
        let id = entity.id.to_string();
        let document: MongoVoteDocument = entity.into();
        self.replace_versioned(VOTE_COLLECTION, "vote", id, expected_version, document)
            .await
    }

    async fn insert_ballot(&self, entity: BallotEntity) -> MongoResult<()> {
        let id = format!("{}/{}", entity.vote_id, entity.user_id);
        let document: MongoBallotDocument = entity.into();
        self.insert(BALLOT_COLLECTION, "ballot", id, document).await
    }

    async fn list_ballots(&self, vote_id: Uuid) -> MongoResult<Vec<BallotEntity>> {
        let documents: Vec<MongoBallotDocument> = self
            .find_many(
                BALLOT_COLLECTION,
                doc! {"vote_id": vote_id.to_string()},
                doc! {"cast_at": 1, "_id": 1},
            )
            .await?;
        documents.into_iter().map(BallotEntity::try_from).collect()
    }

    async fn find_team_score(&self, team_id: String) -> MongoResult<Option<TeamScoreEntity>> {
        let document: Option<MongoTeamScoreDocument> =
            self.find_one(TEAM_SCORE_COLLECTION, doc_id(team_id)).await?;
        Ok(document.map(Into::into))
    }

    async fn save_team_score(
        &self,
        entity: TeamScoreEntity,
        expected_version: Option<u64>,
    ) -> MongoResult<()> {
        let id = entity.team_id.clone();
        let document: MongoTeamScoreDocument = entity.into();
        match expected_version {
            Some(version) => {
                self.replace_versioned(TEAM_SCORE_COLLECTION, "team score", id, version, document)
                    .await
            }
            // Another writer creating the aggregate first is a lost race, not a duplicate.
            None => match self
                .insert(TEAM_SCORE_COLLECTION, "team score", id, document)
                .await
            {
                Err(MongoDaoError::Duplicate { entity, id }) => {
                    Err(MongoDaoError::VersionConflict { entity, id })
                }
                other => other,
            },
        }
    }

    async fn append_score_history(&self, entry: ScoreHistoryEntity) -> MongoResult<()> {
        let id = entry.id.to_string();
        let document: MongoScoreHistoryDocument = entry.into();
        self.insert(SCORE_HISTORY_COLLECTION, "score history entry", id, document)
            .await
    }

    async fn list_score_history(&self, team_id: String) -> MongoResult<Vec<ScoreHistoryEntity>> {
        let documents: Vec<MongoScoreHistoryDocument> = self
            .find_many(
                SCORE_HISTORY_COLLECTION,
                doc! {"team_id": team_id},
                doc! {"created_at": -1, "sequence": -1},
            )
            .await?;
        documents
            .into_iter()
            .map(ScoreHistoryEntity::try_from)
            .collect()
    }
}

impl ArenaStore for MongoArenaStore {
    fn find_user_by_token(
        &self,
        token: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_user_by_token(token).await.map_err(Into::into) })
    }

    fn find_game(&self, id: String) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game(id).await.map_err(Into::into) })
    }

    fn find_team(&self, id: String) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_team(id).await.map_err(Into::into) })
    }

    fn insert_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_match(entity).await.map_err(Into::into) })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_match_by(doc_id(id)).await.map_err(Into::into) })
    }

    fn find_match_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_match_by(doc! {"access_code": code})
                .await
                .map_err(Into::into)
        })
    }

    fn update_match(
        &self,
        entity: MatchEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_match(entity, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_participant(
        &self,
        entity: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_participant(entity).await.map_err(Into::into) })
    }

    fn find_participant(
        &self,
        match_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_participant(match_id, user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_participants(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_participants(match_id).await.map_err(Into::into) })
    }

    fn update_participant(
        &self,
        entity: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.update_participant(entity).await.map_err(Into::into) })
    }

    fn insert_vote(&self, entity: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_vote(entity).await.map_err(Into::into) })
    }

    fn find_vote(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<VoteEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_vote(id).await.map_err(Into::into) })
    }

    fn list_votes(&self, team_id: String) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_votes(team_id).await.map_err(Into::into) })
    }

    fn update_vote(
        &self,
        entity: VoteEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_vote(entity, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_ballot(&self, entity: BallotEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_ballot(entity).await.map_err(Into::into) })
    }

    fn list_ballots(&self, vote_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<BallotEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_ballots(vote_id).await.map_err(Into::into) })
    }

    fn find_team_score(
        &self,
        team_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<TeamScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_team_score(team_id).await.map_err(Into::into) })
    }

    fn save_team_score(
        &self,
        entity: TeamScoreEntity,
        expected_version: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_team_score(entity, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn append_score_history(
        &self,
        entry: ScoreHistoryEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_score_history(entry).await.map_err(Into::into) })
    }

    fn list_score_history(
        &self,
        team_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreHistoryEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_score_history(team_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
