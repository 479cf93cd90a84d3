//! Match lifecycle: lobby, countdown, play and final ranking.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        arena_store::ArenaStore,
        models::{
            MatchEntity, MatchMode, MatchSettings, MatchStatus, ParticipantEntity, RelaySettings,
        },
        storage::StorageError,
    },
    dto::{
        matches::{
            CreateMatchRequest, JoinByCodeRequest, MatchSummary, RankingEntry, RankingResponse,
        },
        validation::ACCESS_CODE_ALPHABET,
        ws::OutboundEvent,
    },
    error::ServiceError,
    services::{auth_service::CurrentUser, room_events},
    state::{
        SharedState,
        lifecycle::{MatchEvent, compute_transition},
    },
};

const ACCESS_CODE_ATTEMPTS: usize = 5;

/// Open a new lobby in `waiting`. The creator is not enrolled automatically.
pub async fn create_match(
    state: &SharedState,
    user: &CurrentUser,
    request: CreateMatchRequest,
) -> Result<MatchSummary, ServiceError> {
    request.validate()?;
    let store = state.require_store().await?;
    let config = state.config();

    if store.find_game(request.game_id.clone()).await?.is_none() {
        return Err(ServiceError::NotFound(format!(
            "game `{}` not found",
            request.game_id
        )));
    }

    let relay = match (request.mode, request.relay) {
        (MatchMode::Relay, Some(relay)) => Some(RelaySettings {
            segment_count: relay.segment_count,
            handoff_method: relay.handoff_method,
        }),
        (MatchMode::Relay, None) => {
            return Err(ServiceError::InvalidInput(
                "relay matches require relay settings".into(),
            ));
        }
        (MatchMode::Competitive, _) => None,
    };

    let now = SystemTime::now();
    let mut entity = MatchEntity {
        id: Uuid::new_v4(),
        game_id: request.game_id,
        creator_id: user.id.clone(),
        mode: request.mode,
        status: MatchStatus::Waiting,
        settings: MatchSettings {
            countdown_seconds: request
                .countdown_seconds
                .unwrap_or(config.default_countdown_seconds),
            scoring_mode: request.scoring_mode,
        },
        relay,
        max_participants: request
            .max_participants
            .unwrap_or(config.default_max_participants),
        access_code: String::new(),
        created_at: now,
        updated_at: now,
        started_at: None,
        finished_at: None,
        version: 0,
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        entity.access_code = generate_access_code(config.access_code_length);
        match store.insert_match(entity.clone()).await {
            Ok(()) => break,
            Err(StorageError::Duplicate { .. }) if attempt < ACCESS_CODE_ATTEMPTS => {
                warn!(attempt, "access code collision; regenerating");
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(match_id = %entity.id, creator = %user.id, mode = ?entity.mode, "match created");
    Ok(MatchSummary::from((entity, Vec::new())))
}

/// Match and its roster.
pub async fn get_match(state: &SharedState, match_id: Uuid) -> Result<MatchSummary, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(&store, match_id).await?;
    let participants = store.list_participants(match_id).await?;
    Ok(MatchSummary::from((entity, participants)))
}

/// Enroll the caller in a lobby that is still `waiting`.
pub async fn join_match(
    state: &SharedState,
    user: &CurrentUser,
    match_id: Uuid,
) -> Result<MatchSummary, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(&store, match_id).await?;
    enroll(state, &store, user, entity).await
}

/// Enroll the caller in the lobby advertised under an access code.
pub async fn join_by_code(
    state: &SharedState,
    user: &CurrentUser,
    request: JoinByCodeRequest,
) -> Result<MatchSummary, ServiceError> {
    request.validate()?;
    let store = state.require_store().await?;
    let code = request.access_code.to_ascii_uppercase();
    let entity = store
        .find_match_by_code(code.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no match with access code `{code}`")))?;
    enroll(state, &store, user, entity).await
}

async fn enroll(
    state: &SharedState,
    store: &Arc<dyn ArenaStore>,
    user: &CurrentUser,
    entity: MatchEntity,
) -> Result<MatchSummary, ServiceError> {
    if entity.status != MatchStatus::Waiting {
        return Err(ServiceError::InvalidState(
            "match is no longer accepting participants".into(),
        ));
    }
    if store
        .find_participant(entity.id, user.id.clone())
        .await?
        .is_some()
    {
        return Err(ServiceError::InvalidState("already joined this match".into()));
    }

    let participants = store.list_participants(entity.id).await?;
    if participants.len() >= entity.max_participants as usize {
        return Err(ServiceError::InvalidState("match is full".into()));
    }

    // Bumping the match version serializes concurrent joins on capacity and join order.
    let expected = entity.version;
    let mut claimed = entity.clone();
    claimed.version += 1;
    store.update_match(claimed.clone(), expected).await?;

    let participant = ParticipantEntity {
        id: Uuid::new_v4(),
        match_id: entity.id,
        user_id: user.id.clone(),
        user_name: user.name.clone(),
        join_order: participants.len() as u32,
        score: 0,
        final_score: None,
        final_rank: None,
        relay_segment: None,
        relay_status: None,
        segment_completed_at: None,
        joined_at: SystemTime::now(),
    };
    store
        .insert_participant(participant.clone())
        .await
        .map_err(|err| match err {
            StorageError::Duplicate { .. } => {
                ServiceError::InvalidState("already joined this match".into())
            }
            other => other.into(),
        })?;

    let mut roster = participants;
    roster.push(participant);

    info!(match_id = %entity.id, user = %user.id, count = roster.len(), "participant joined");
    room_events::send_to_match(
        state,
        entity.id,
        &OutboundEvent::MatchParticipantJoined {
            match_id: entity.id.to_string(),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            participant_count: Some(roster.len()),
        },
    );

    Ok(MatchSummary::from((claimed, roster)))
}

/// Creator opens the countdown.
pub async fn start_match(
    state: &SharedState,
    user: &CurrentUser,
    match_id: Uuid,
) -> Result<MatchSummary, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(&store, match_id).await?;
    require_creator(&entity, user, "start")?;

    let updated = apply_transition(&store, entity, MatchEvent::Start).await?;
    let seconds = updated.settings.countdown_seconds;
    info!(match_id = %match_id, seconds, "match countdown started");
    room_events::send_to_match(
        state,
        match_id,
        &OutboundEvent::MatchCountdown { match_id, seconds },
    );

    with_roster(&store, updated).await
}

/// Creator confirms the client countdown elapsed.
pub async fn begin_match(
    state: &SharedState,
    user: &CurrentUser,
    match_id: Uuid,
) -> Result<MatchSummary, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(&store, match_id).await?;
    require_creator(&entity, user, "begin")?;

    let updated = apply_transition(&store, entity, MatchEvent::Begin).await?;
    info!(match_id = %match_id, "match started");
    room_events::send_to_match(
        state,
        match_id,
        &OutboundEvent::MatchStarted {
            match_id,
            recovered: false,
        },
    );

    with_roster(&store, updated).await
}

/// Any participant moves a stuck countdown to `playing` once it has overrun.
pub async fn recover_match(
    state: &SharedState,
    user: &CurrentUser,
    match_id: Uuid,
) -> Result<MatchSummary, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(&store, match_id).await?;
    require_participant(&store, &entity, user).await?;
    compute_transition(entity.status, MatchEvent::Recover)?;

    let countdown = Duration::from_secs(u64::from(entity.settings.countdown_seconds));
    if !recovery_due(
        entity.updated_at,
        SystemTime::now(),
        countdown,
        state.config().countdown_grace,
    ) {
        return Err(ServiceError::InvalidState(
            "countdown has not timed out yet".into(),
        ));
    }

    let updated = apply_transition(&store, entity, MatchEvent::Recover).await?;
    info!(match_id = %match_id, user = %user.id, "match recovered from stalled countdown");
    room_events::send_to_match(
        state,
        match_id,
        &OutboundEvent::MatchStarted {
            match_id,
            recovered: true,
        },
    );

    with_roster(&store, updated).await
}

/// Whether a countdown last touched at `updated_at` has overrun `countdown + grace` at `now`.
pub fn recovery_due(
    updated_at: SystemTime,
    now: SystemTime,
    countdown: Duration,
    grace: Duration,
) -> bool {
    let elapsed = now.duration_since(updated_at).unwrap_or(Duration::ZERO);
    elapsed >= countdown + grace
}

/// Freeze scores and record the final ranking.
pub async fn finish_match(
    state: &SharedState,
    user: &CurrentUser,
    match_id: Uuid,
) -> Result<RankingResponse, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(&store, match_id).await?;
    if entity.creator_id != user.id {
        require_participant(&store, &entity, user).await?;
    }

    compute_transition(entity.status, MatchEvent::Finish)?;

    // Final ranks land before the status flips so a failed write leaves the match playing.
    let participants = store.list_participants(match_id).await?;
    let ranking = compute_ranking(&participants);
    for (position, participant) in ranked_order(&participants).into_iter().enumerate() {
        let mut participant = participant.clone();
        participant.final_score = Some(participant.score);
        participant.final_rank = Some(position as u32 + 1);
        store.update_participant(participant).await?;
    }

    let updated = apply_transition(&store, entity, MatchEvent::Finish).await?;

    info!(match_id = %match_id, participants = ranking.len(), "match finished");
    room_events::send_to_match(
        state,
        match_id,
        &OutboundEvent::MatchFinished {
            match_id,
            ranking: ranking.clone(),
        },
    );

    Ok(RankingResponse {
        match_id,
        status: updated.status,
        ranking,
    })
}

/// Overwrite the caller's score and publish the refreshed ranking.
pub async fn update_score(
    state: &SharedState,
    user: &CurrentUser,
    match_id: Uuid,
    score: i64,
) -> Result<RankingResponse, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(&store, match_id).await?;
    let mut participant = require_participant(&store, &entity, user).await?;

    participant.score = score;
    store.update_participant(participant).await?;

    let participants = store.list_participants(match_id).await?;
    let ranking = compute_ranking(&participants);
    room_events::send_to_match(
        state,
        match_id,
        &OutboundEvent::MatchRanking {
            match_id,
            ranking: ranking.clone(),
        },
    );

    Ok(RankingResponse {
        match_id,
        status: entity.status,
        ranking,
    })
}

/// Ranking derived from persisted scores.
pub async fn get_ranking(
    state: &SharedState,
    match_id: Uuid,
) -> Result<RankingResponse, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(&store, match_id).await?;
    let participants = store.list_participants(match_id).await?;

    let frozen = participants.iter().all(|p| p.final_rank.is_some());
    let ranking = if entity.status == MatchStatus::Finished && frozen {
        final_ranking(&participants)
    } else {
        compute_ranking(&participants)
    };

    Ok(RankingResponse {
        match_id,
        status: entity.status,
        ranking,
    })
}

/// Rank participants by descending score. `participants` must be in join order;
/// equal scores keep that order.
pub fn compute_ranking(participants: &[ParticipantEntity]) -> Vec<RankingEntry> {
    ranked_order(participants)
        .into_iter()
        .enumerate()
        .map(|(position, participant)| RankingEntry {
            rank: position as u32 + 1,
            user_id: participant.user_id.clone(),
            user_name: participant.user_name.clone(),
            score: participant.score,
        })
        .collect()
}

fn ranked_order(participants: &[ParticipantEntity]) -> Vec<&ParticipantEntity> {
    let mut ordered: Vec<&ParticipantEntity> = participants.iter().collect();
    ordered.sort_by(|a, b| b.score.cmp(&a.score));
    ordered
}

fn final_ranking(participants: &[ParticipantEntity]) -> Vec<RankingEntry> {
    let mut ordered: Vec<&ParticipantEntity> = participants.iter().collect();
    ordered.sort_by_key(|participant| participant.final_rank.unwrap_or(u32::MAX));
    ordered
        .into_iter()
        .enumerate()
        .map(|(position, participant)| RankingEntry {
            rank: participant.final_rank.unwrap_or(position as u32 + 1),
            user_id: participant.user_id.clone(),
            user_name: participant.user_name.clone(),
            score: participant.final_score.unwrap_or(participant.score),
        })
        .collect()
}

pub(crate) async fn load_match(
    store: &Arc<dyn ArenaStore>,
    match_id: Uuid,
) -> Result<MatchEntity, ServiceError> {
    store
        .find_match(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match `{match_id}` not found")))
}

pub(crate) fn require_creator(
    entity: &MatchEntity,
    user: &CurrentUser,
    action: &str,
) -> Result<(), ServiceError> {
    if entity.creator_id == user.id {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "only the match creator can {action} the match"
        )))
    }
}

pub(crate) async fn require_participant(
    store: &Arc<dyn ArenaStore>,
    entity: &MatchEntity,
    user: &CurrentUser,
) -> Result<ParticipantEntity, ServiceError> {
    store
        .find_participant(entity.id, user.id.clone())
        .await?
        .ok_or_else(|| ServiceError::Forbidden("not a participant of this match".into()))
}

/// Validate and persist a status change with a compare-and-swap on the version.
async fn apply_transition(
    store: &Arc<dyn ArenaStore>,
    entity: MatchEntity,
    event: MatchEvent,
) -> Result<MatchEntity, ServiceError> {
    let next = compute_transition(entity.status, event)?;
    let now = SystemTime::now();
    let expected = entity.version;

    let mut updated = entity;
    updated.status = next;
    updated.updated_at = now;
    updated.version += 1;
    match next {
        MatchStatus::Playing => updated.started_at = Some(now),
        MatchStatus::Finished => updated.finished_at = Some(now),
        MatchStatus::Waiting | MatchStatus::Countdown => {}
    }

    store.update_match(updated.clone(), expected).await?;
    Ok(updated)
}

async fn with_roster(
    store: &Arc<dyn ArenaStore>,
    entity: MatchEntity,
) -> Result<MatchSummary, ServiceError> {
    let participants = store.list_participants(entity.id).await?;
    Ok(MatchSummary::from((entity, participants)))
}

fn generate_access_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let index = rng.random_range(0..ACCESS_CODE_ALPHABET.len());
            ACCESS_CODE_ALPHABET[index] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::validation::validate_access_code;

    fn participant(user: &str, join_order: u32, score: i64) -> ParticipantEntity {
        ParticipantEntity {
            id: Uuid::new_v4(),
            match_id: Uuid::nil(),
            user_id: user.into(),
            user_name: user.into(),
            join_order,
            score,
            final_score: None,
            final_rank: None,
            relay_segment: None,
            relay_status: None,
            segment_completed_at: None,
            joined_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn ranking_sorts_by_descending_score() {
        let roster = vec![
            participant("a", 0, 10),
            participant("b", 1, 30),
            participant("c", 2, 20),
        ];
        let ranking = compute_ranking(&roster);
        let order: Vec<_> = ranking.iter().map(|entry| entry.user_id.as_str()).collect();
        assert_eq!(order, ["b", "c", "a"]);
        assert_eq!(ranking[0].rank, 1);
        assert_eq!(ranking[2].rank, 3);
    }

    #[test]
    fn ranking_ties_keep_join_order() {
        let roster = vec![
            participant("first", 0, 5),
            participant("second", 1, 5),
            participant("third", 2, 7),
        ];
        let order: Vec<_> = compute_ranking(&roster)
            .into_iter()
            .map(|entry| entry.user_id)
            .collect();
        assert_eq!(order, ["third", "first", "second"]);
    }

    #[test]
    fn recovery_requires_countdown_plus_grace() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let countdown = Duration::from_secs(3);
        let grace = Duration::from_secs(2);

        assert!(!recovery_due(start, start, countdown, grace));
        assert!(!recovery_due(
            start,
            start + Duration::from_millis(4_999),
            countdown,
            grace
        ));
        assert!(recovery_due(start, start + Duration::from_secs(5), countdown, grace));
        assert!(recovery_due(start, start + Duration::from_secs(6), countdown, grace));
    }

    #[test]
    fn recovery_tolerates_clock_going_backwards() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let earlier = start - Duration::from_secs(10);
        assert!(!recovery_due(
            start,
            earlier,
            Duration::from_secs(3),
            Duration::from_secs(2)
        ));
    }

    #[test]
    fn generated_access_codes_use_the_unambiguous_alphabet() {
        for _ in 0..50 {
            let code = generate_access_code(6);
            assert_eq!(code.len(), 6);
            assert!(validate_access_code(&code).is_ok());
        }
    }
}
