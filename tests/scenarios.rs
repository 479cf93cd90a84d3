use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};

use axum::{
    body::{Body, to_bytes},
    extract::ws::Message,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use futures::future::BoxFuture;
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

use arena_back::{
    config::AppConfig,
    dao::{
        arena_store::{ArenaStore, memory::InMemoryStore},
        models::{
            BallotEntity, GameEntity, MatchEntity, MatchStatus, ParticipantEntity, RelayStatus,
            ScoreHistoryEntity, TeamEntity, TeamMemberEntity, TeamScoreEntity, UserEntity,
            VoteEntity, VoteStatus,
        },
        storage::{StorageError, StorageResult},
    },
    dto::{
        matches::{CreateMatchRequest, JoinByCodeRequest},
        relay::{AssignSegmentsRequest, HandoffRequest},
        scores::UpdateTeamScoreRequest,
        votes::{CastBallotRequest, CreateVoteRequest},
    },
    error::ServiceError,
    routes,
    services::{
        auth_service::CurrentUser, match_service, relay_service, score_service, vote_service,
    },
    state::{
        AppState, SharedState,
        registry::{RoomKey, RoomSeat},
    },
};

const USERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

struct Harness {
    state: SharedState,
    store: InMemoryStore,
}

impl Harness {
    async fn new() -> Self {
        let store = InMemoryStore::new();
        for id in USERS {
            store
                .insert_user(UserEntity {
                    id: id.into(),
                    name: capitalize(id),
                    token: format!("{id}-token"),
                })
                .await;
        }
        store
            .insert_game(GameEntity {
                id: "g1".into(),
                title: "City Hunt".into(),
            })
            .await;
        store.insert_team(team("four", &USERS)).await;
        store.insert_team(team("three", &USERS[..3])).await;
        store.insert_team(team("duo", &USERS[..2])).await;

        let state = AppState::with_store(AppConfig::default(), Arc::new(store.clone())).await;
        Self { state, store }
    }

    fn user(&self, id: &str) -> CurrentUser {
        CurrentUser {
            id: id.into(),
            name: capitalize(id),
        }
    }

    /// Seat a fake realtime connection in a room and return its outbound queue.
    fn listen(&self, room: RoomKey, user: &str) -> UnboundedReceiver<Message> {
        let (connection, rx) = self.state.registry().connect(None);
        self.state.registry().join(
            connection.id(),
            RoomSeat {
                room,
                user_id: user.into(),
                user_name: capitalize(user),
            },
        );
        rx
    }
}

fn capitalize(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn team(id: &str, members: &[&str]) -> TeamEntity {
    TeamEntity {
        id: id.into(),
        name: capitalize(id),
        members: members
            .iter()
            .map(|member| TeamMemberEntity {
                user_id: (*member).into(),
                user_name: capitalize(member),
            })
            .collect(),
    }
}

fn events(rx: &mut UnboundedReceiver<Message>) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Message::Text(text) = message {
            events.push(serde_json::from_str(text.as_str()).expect("json event"));
        }
    }
    events
}

fn create_request(body: Value) -> CreateMatchRequest {
    serde_json::from_value(body).expect("create request")
}

#[tokio::test]
async fn stalled_countdown_is_recovered_by_a_participant() {
    let h = Harness::new().await;
    let alice = h.user("alice");
    let bob = h.user("bob");

    let created = match_service::create_match(
        &h.state,
        &alice,
        create_request(json!({"gameId": "g1", "countdownSeconds": 3})),
    )
    .await
    .expect("create");
    assert_eq!(created.status, MatchStatus::Waiting);
    assert!(created.participants.is_empty());

    match_service::join_by_code(
        &h.state,
        &bob,
        JoinByCodeRequest {
            access_code: created.access_code.clone(),
        },
    )
    .await
    .expect("join by code");

    let mut room = h.listen(RoomKey::match_room(created.id.to_string()), "bob");

    let counting = match_service::start_match(&h.state, &alice, created.id)
        .await
        .expect("start");
    assert_eq!(counting.status, MatchStatus::Countdown);

    let too_early = match_service::recover_match(&h.state, &bob, created.id).await;
    match too_early {
        Err(ServiceError::InvalidState(message)) => {
            assert!(message.contains("countdown has not timed out yet"))
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // Pretend the countdown started ten seconds ago (3s countdown + 2s grace).
    let mut stalled = h
        .store
        .find_match(created.id)
        .await
        .expect("read")
        .expect("match");
    let version = stalled.version;
    stalled.updated_at = SystemTime::now() - Duration::from_secs(10);
    stalled.version += 1;
    h.store.update_match(stalled, version).await.expect("rewind");

    let playing = match_service::recover_match(&h.state, &bob, created.id)
        .await
        .expect("recover");
    assert_eq!(playing.status, MatchStatus::Playing);
    assert!(playing.started_at.is_some());

    let kinds: Vec<Value> = events(&mut room);
    assert_eq!(kinds[0]["type"], "match_countdown");
    assert_eq!(kinds[0]["seconds"], 3);
    assert_eq!(kinds[1]["type"], "match_started");
    assert_eq!(kinds[1]["recovered"], true);

    // Status only moves forward.
    assert!(matches!(
        match_service::start_match(&h.state, &alice, created.id).await,
        Err(ServiceError::InvalidState(_))
    ));
}

#[tokio::test]
async fn lobby_rules_creator_rights_and_final_ranking() {
    let h = Harness::new().await;
    let alice = h.user("alice");
    let bob = h.user("bob");
    let carol = h.user("carol");

    let created = match_service::create_match(
        &h.state,
        &alice,
        create_request(json!({"gameId": "g1", "maxParticipants": 2})),
    )
    .await
    .expect("create");

    match_service::join_match(&h.state, &bob, created.id)
        .await
        .expect("bob joins");
    assert!(matches!(
        match_service::join_match(&h.state, &bob, created.id).await,
        Err(ServiceError::InvalidState(_))
    ));
    match_service::join_match(&h.state, &carol, created.id)
        .await
        .expect("carol joins");
    assert!(matches!(
        match_service::join_match(&h.state, &alice, created.id).await,
        Err(ServiceError::InvalidState(_))
    ));

    assert!(matches!(
        match_service::start_match(&h.state, &bob, created.id).await,
        Err(ServiceError::Forbidden(_))
    ));
    match_service::start_match(&h.state, &alice, created.id)
        .await
        .expect("start");
    match_service::begin_match(&h.state, &alice, created.id)
        .await
        .expect("begin");

    match_service::update_score(&h.state, &bob, created.id, 40)
        .await
        .expect("bob score");
    let live = match_service::update_score(&h.state, &carol, created.id, 70)
        .await
        .expect("carol score");
    assert_eq!(live.ranking[0].user_id, "carol");

    let finished = match_service::finish_match(&h.state, &bob, created.id)
        .await
        .expect("finish");
    assert_eq!(finished.status, MatchStatus::Finished);
    let ranked: Vec<_> = finished
        .ranking
        .iter()
        .map(|entry| (entry.rank, entry.user_id.as_str(), entry.score))
        .collect();
    assert_eq!(ranked, [(1, "carol", 70), (2, "bob", 40)]);

    let summary = match_service::get_match(&h.state, created.id)
        .await
        .expect("get");
    let carol_row = summary
        .participants
        .iter()
        .find(|participant| participant.user_id == "carol")
        .expect("carol listed");
    assert_eq!(carol_row.final_rank, Some(1));
    assert_eq!(carol_row.final_score, Some(70));

    let unknown_game = match_service::create_match(
        &h.state,
        &alice,
        create_request(json!({"gameId": "missing"})),
    )
    .await;
    assert!(matches!(unknown_game, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn majority_vote_completes_at_half_the_team() {
    let h = Harness::new().await;
    let mut team_room = h.listen(RoomKey::team("four"), "dave");

    let vote = vote_service::create_vote(
        &h.state,
        &h.user("alice"),
        "four",
        CreateVoteRequest {
            question: "Next checkpoint?".into(),
            options: vec!["Park".into(), "Museum".into(), "Harbour".into()],
            mode: arena_back::dao::models::VotingMode::Majority,
            expires_in_seconds: None,
        },
    )
    .await
    .expect("create vote");
    assert_eq!(vote.options[1].id, "option_1");

    let first = vote_service::cast_ballot(
        &h.state,
        &h.user("alice"),
        vote.id,
        CastBallotRequest {
            option_id: "option_1".into(),
        },
    )
    .await
    .expect("first ballot");
    assert!(!first.is_complete);

    let second = vote_service::cast_ballot(
        &h.state,
        &h.user("bob"),
        vote.id,
        CastBallotRequest {
            option_id: "option_1".into(),
        },
    )
    .await
    .expect("second ballot");
    assert!(second.is_complete);
    assert_eq!(second.winning_option_id.as_deref(), Some("option_1"));
    assert_eq!(second.vote_counts["option_1"], 2);

    let late = vote_service::cast_ballot(
        &h.state,
        &h.user("carol"),
        vote.id,
        CastBallotRequest {
            option_id: "option_0".into(),
        },
    )
    .await;
    assert!(matches!(late, Err(ServiceError::InvalidState(_))));

    let listed = vote_service::list_votes(&h.state, &h.user("dave"), "four")
        .await
        .expect("list");
    assert_eq!(listed[0].status, VoteStatus::Completed);
    assert_eq!(listed[0].total_ballots, 2);

    let kinds: Vec<_> = events(&mut team_room)
        .into_iter()
        .map(|event| event["type"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(kinds, ["vote_created", "vote_cast", "vote_cast"]);
}

#[tokio::test]
async fn unanimous_vote_with_a_split_stays_open() {
    let h = Harness::new().await;
    let vote = vote_service::create_vote(
        &h.state,
        &h.user("alice"),
        "three",
        CreateVoteRequest {
            question: "Take the shortcut?".into(),
            options: vec!["Yes".into(), "No".into()],
            mode: arena_back::dao::models::VotingMode::Unanimous,
            expires_in_seconds: Some(600),
        },
    )
    .await
    .expect("create vote");

    for (user, option) in [("alice", "option_0"), ("bob", "option_0"), ("carol", "option_1")] {
        let cast = vote_service::cast_ballot(
            &h.state,
            &h.user(user),
            vote.id,
            CastBallotRequest {
                option_id: option.into(),
            },
        )
        .await
        .expect("ballot");
        assert!(!cast.is_complete);
    }

    let again = vote_service::cast_ballot(
        &h.state,
        &h.user("alice"),
        vote.id,
        CastBallotRequest {
            option_id: "option_1".into(),
        },
    )
    .await;
    assert!(matches!(again, Err(ServiceError::InvalidState(_))));

    let outsider = vote_service::cast_ballot(
        &h.state,
        &h.user("dave"),
        vote.id,
        CastBallotRequest {
            option_id: "option_0".into(),
        },
    )
    .await;
    assert!(matches!(outsider, Err(ServiceError::Forbidden(_))));

    let listed = vote_service::list_votes(&h.state, &h.user("carol"), "three")
        .await
        .expect("list");
    assert_eq!(listed[0].status, VoteStatus::Active);
    assert_eq!(listed[0].winning_option_id, None);
}

#[tokio::test]
async fn relay_segments_are_assigned_round_robin() {
    let h = Harness::new().await;
    let alice = h.user("alice");

    let created = match_service::create_match(
        &h.state,
        &alice,
        create_request(json!({
            "gameId": "g1",
            "mode": "relay",
            "relay": {"segmentCount": 2}
        })),
    )
    .await
    .expect("create relay");
    for user in USERS {
        match_service::join_match(&h.state, &h.user(user), created.id)
            .await
            .expect("join");
    }

    assert!(matches!(
        relay_service::assign_segments(
            &h.state,
            &h.user("bob"),
            created.id,
            AssignSegmentsRequest::default()
        )
        .await,
        Err(ServiceError::Forbidden(_))
    ));

    let status = relay_service::assign_segments(
        &h.state,
        &alice,
        created.id,
        AssignSegmentsRequest::default(),
    )
    .await
    .expect("assign");
    let segments: Vec<_> = status
        .participants
        .iter()
        .map(|runner| runner.segment)
        .collect();
    assert_eq!(segments, [Some(1), Some(2), Some(1), Some(2)]);
    assert_eq!(
        status.participants[1].status,
        Some(RelayStatus::Pending)
    );
    assert_eq!(status.completed_segments, 0);

    let to_self = relay_service::handoff(
        &h.state,
        &alice,
        created.id,
        HandoffRequest {
            to_user_id: "alice".into(),
        },
    )
    .await;
    assert!(matches!(to_self, Err(ServiceError::InvalidInput(_))));

    let to_stranger = relay_service::handoff(
        &h.state,
        &alice,
        created.id,
        HandoffRequest {
            to_user_id: "zoe".into(),
        },
    )
    .await;
    assert!(matches!(to_stranger, Err(ServiceError::NotFound(_))));

    let not_active = relay_service::handoff(
        &h.state,
        &h.user("bob"),
        created.id,
        HandoffRequest {
            to_user_id: "dave".into(),
        },
    )
    .await;
    assert!(matches!(not_active, Err(ServiceError::InvalidState(_))));

    let after = relay_service::handoff(
        &h.state,
        &alice,
        created.id,
        HandoffRequest {
            to_user_id: "bob".into(),
        },
    )
    .await
    .expect("handoff");
    assert_eq!(after.completed_segments, 1);
    let bob_row = after
        .participants
        .iter()
        .find(|runner| runner.user_id == "bob")
        .expect("bob");
    assert_eq!(bob_row.status, Some(RelayStatus::Active));
}

#[tokio::test]
async fn score_ledger_replays_to_the_aggregate() {
    let h = Harness::new().await;
    let alice = h.user("alice");
    let mut team_room = h.listen(RoomKey::team("duo"), "bob");

    let update = |delta: i64| UpdateTeamScoreRequest {
        delta,
        source: arena_back::dao::models::ScoreSource::Challenge,
        reason: Some("checkpoint".into()),
    };

    let opening = score_service::update_team_score(&h.state, &alice, "duo", update(50))
        .await
        .expect("+50");
    assert_eq!(opening.previous_score, 0);
    assert_eq!(opening.entry.sequence, 1);

    let bonus = score_service::update_team_score(&h.state, &alice, "duo", update(10))
        .await
        .expect("+10");
    assert_eq!(bonus.previous_score, 50);
    assert_eq!(bonus.new_score, 60);
    assert_eq!(bonus.entry.running_total, 60);

    let history = score_service::score_history(&h.state, &h.user("bob"), "duo")
        .await
        .expect("history");
    assert_eq!(history.current_score, 60);
    assert!(history.consistent);
    assert_eq!(history.entries[0].delta, 10);
    assert_eq!(
        history.entries.iter().map(|entry| entry.delta).sum::<i64>(),
        history.current_score
    );

    let pushed = events(&mut team_room);
    assert_eq!(pushed.len(), 2);
    assert_eq!(pushed[1]["type"], "score_update");
    assert_eq!(pushed[1]["delta"], 10);
    assert_eq!(pushed[1]["newScore"], 60);

    score_service::update_team_score(&h.state, &alice, "three", update(30))
        .await
        .expect("+30");
    let penalty = score_service::update_team_score(&h.state, &alice, "three", update(-15))
        .await
        .expect("-15");
    assert_eq!(penalty.previous_score, 30);
    assert_eq!(penalty.new_score, 15);

    let outsider = score_service::update_team_score(&h.state, &h.user("dave"), "duo", update(5)).await;
    assert!(matches!(outsider, Err(ServiceError::Forbidden(_))));
}

#[tokio::test]
async fn degraded_state_rejects_requests() {
    let state = AppState::new(AppConfig::default());
    let result = match_service::get_ranking(&state, uuid::Uuid::new_v4()).await;
    assert!(matches!(result, Err(ServiceError::Degraded)));
}

async fn send(state: &SharedState, request: Request<Body>) -> (StatusCode, Value) {
    let response = routes::router(state.clone())
        .oneshot(request)
        .await
        .expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn http_routes_enforce_bearer_auth_and_status_codes() {
    let h = Harness::new().await;

    let (status, body) = send(
        &h.state,
        Request::get("/healthcheck").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(
        &h.state,
        Request::post("/matches")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"gameId":"g1"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].is_string());

    let (status, _) = send(
        &h.state,
        Request::post("/matches")
            .header(header::AUTHORIZATION, "Bearer nope")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"gameId":"g1"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, created) = send(
        &h.state,
        Request::post("/matches")
            .header(header::AUTHORIZATION, "Bearer alice-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"gameId":"g1"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "waiting");
    assert_eq!(created["accessCode"].as_str().map(str::len), Some(6));
    let match_id = created["id"].as_str().expect("id").to_string();

    let (status, body) = send(
        &h.state,
        Request::post(format!("/matches/{match_id}/start"))
            .header(header::AUTHORIZATION, "Bearer bob-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].is_string());

    let (status, _) = send(
        &h.state,
        Request::post(format!("/matches/{match_id}/recover"))
            .header(header::AUTHORIZATION, "Bearer alice-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &h.state,
        Request::post("/matches")
            .header(header::AUTHORIZATION, "Bearer alice-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"gameId":"missing"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &h.state,
        Request::post("/matches")
            .header(header::AUTHORIZATION, "Bearer alice-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"gameId":"g1","countdownSeconds":0}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &h.state,
        Request::get("/ws?token=forged").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &h.state,
        Request::get("/sse/matches/00000000-0000-0000-0000-000000000000")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &h.state,
        Request::post("/teams/duo/score")
            .header(header::AUTHORIZATION, "Bearer bob-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"delta":-15,"source":"penalty"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newScore"], -15);
}

#[tokio::test]
async fn degraded_router_answers_500() {
    let state = AppState::new(AppConfig::default());
    let (status, body) = send(
        &state,
        Request::get("/healthcheck").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");

    let (status, _) = send(
        &state,
        Request::post("/matches")
            .header(header::AUTHORIZATION, "Bearer alice-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"gameId":"g1"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn malformed_requests_answer_400_with_a_message() {
    let h = Harness::new().await;

    let (status, body) = send(
        &h.state,
        Request::post("/matches")
            .header(header::AUTHORIZATION, "Bearer alice-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, body) = send(
        &h.state,
        Request::post("/matches")
            .header(header::AUTHORIZATION, "Bearer alice-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, body) = send(
        &h.state,
        Request::get("/matches/not-a-uuid")
            .header(header::AUTHORIZATION, "Bearer alice-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, body) = send(
        &h.state,
        Request::get("/sse/matches/not-a-uuid")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

/// Delegates to the in-memory store but refuses participant writes once its budget is spent.
struct FlakyStore {
    inner: InMemoryStore,
    participant_writes_left: Arc<AtomicUsize>,
}

impl ArenaStore for FlakyStore {
    fn find_user_by_token(
        &self,
        token: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        self.inner.find_user_by_token(token)
    }
    fn find_game(&self, id: String) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        self.inner.find_game(id)
    }
    fn find_team(&self, id: String) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>> {
        self.inner.find_team(id)
    }
    fn insert_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_match(entity)
    }
    fn find_match(&self, id: uuid::Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        self.inner.find_match(id)
    }
    fn find_match_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        self.inner.find_match_by_code(code)
    }
    fn update_match(
        &self,
        entity: MatchEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.update_match(entity, expected_version)
    }
    fn insert_participant(
        &self,
        entity: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_participant(entity)
    }
    fn find_participant(
        &self,
        match_id: uuid::Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        self.inner.find_participant(match_id, user_id)
    }
    fn list_participants(
        &self,
        match_id: uuid::Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        self.inner.list_participants(match_id)
    }
    fn update_participant(
        &self,
        entity: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let spent = self
            .participant_writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_err();
        if spent {
            return Box::pin(async {
                Err(StorageError::unavailable(
                    "participant write refused".into(),
                    std::io::Error::other("flaky"),
                ))
            });
        }
        self.inner.update_participant(entity)
    }
    fn insert_vote(&self, entity: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_vote(entity)
    }
    fn find_vote(&self, id: uuid::Uuid) -> BoxFuture<'static, StorageResult<Option<VoteEntity>>> {
        self.inner.find_vote(id)
    }
    fn list_votes(&self, team_id: String) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        self.inner.list_votes(team_id)
    }
    fn update_vote(
        &self,
        entity: VoteEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.update_vote(entity, expected_version)
    }
    fn insert_ballot(&self, entity: BallotEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_ballot(entity)
    }
    fn list_ballots(
        &self,
        vote_id: uuid::Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<BallotEntity>>> {
        self.inner.list_ballots(vote_id)
    }
    fn find_team_score(
        &self,
        team_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<TeamScoreEntity>>> {
        self.inner.find_team_score(team_id)
    }
    fn save_team_score(
        &self,
        entity: TeamScoreEntity,
        expected_version: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.save_team_score(entity, expected_version)
    }
    fn append_score_history(
        &self,
        entry: ScoreHistoryEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.append_score_history(entry)
    }
    fn list_score_history(
        &self,
        team_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreHistoryEntity>>> {
        self.inner.list_score_history(team_id)
    }
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

#[tokio::test]
async fn failed_finish_leaves_the_match_playing_and_silent() {
    let h = Harness::new().await;
    let writes_left = Arc::new(AtomicUsize::new(usize::MAX));
    let state = AppState::with_store(
        AppConfig::default(),
        Arc::new(FlakyStore {
            inner: h.store.clone(),
            participant_writes_left: writes_left.clone(),
        }),
    )
    .await;
    let alice = h.user("alice");
    let bob = h.user("bob");

    let created =
        match_service::create_match(&state, &alice, create_request(json!({"gameId": "g1"})))
            .await
            .expect("create");
    for user in [&alice, &bob] {
        match_service::join_match(&state, user, created.id)
            .await
            .expect("join");
    }
    match_service::start_match(&state, &alice, created.id)
        .await
        .expect("start");
    match_service::begin_match(&state, &alice, created.id)
        .await
        .expect("begin");

    let (connection, mut room) = state.registry().connect(None);
    state.registry().join(
        connection.id(),
        RoomSeat {
            room: RoomKey::match_room(created.id.to_string()),
            user_id: "carol".into(),
            user_name: "Carol".into(),
        },
    );

    writes_left.store(1, Ordering::SeqCst);
    let failed = match_service::finish_match(&state, &alice, created.id).await;
    assert!(matches!(failed, Err(ServiceError::Unavailable(_))));

    let summary = match_service::get_match(&state, created.id)
        .await
        .expect("get");
    assert_eq!(summary.status, MatchStatus::Playing);
    assert!(
        events(&mut room)
            .iter()
            .all(|event| event["type"] != "match_finished")
    );

    writes_left.store(usize::MAX, Ordering::SeqCst);
    let finished = match_service::finish_match(&state, &alice, created.id)
        .await
        .expect("finish after recovery");
    assert_eq!(finished.status, MatchStatus::Finished);
    let ranks: Vec<_> = finished.ranking.iter().map(|entry| entry.rank).collect();
    assert_eq!(ranks, [1, 2]);
    assert!(
        events(&mut room)
            .iter()
            .any(|event| event["type"] == "match_finished")
    );
}
