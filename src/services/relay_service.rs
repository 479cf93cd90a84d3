use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        MatchEntity, MatchMode, MatchStatus, ParticipantEntity, RelaySettings, RelayStatus,
    },
    dto::{
        relay::{AssignSegmentsRequest, HandoffRequest, RelayAssignment, RelayStatusResponse},
        ws::OutboundEvent,
    },
    error::ServiceError,
    services::{
        auth_service::CurrentUser,
        match_service::{load_match, require_creator, require_participant},
        room_events,
    },
    state::SharedState,
};

/// Distribute relay segments over the roster and activate segment 1.
pub async fn assign_segments(
    state: &SharedState,
    user: &CurrentUser,
    match_id: Uuid,
    request: AssignSegmentsRequest,
) -> Result<RelayStatusResponse, ServiceError> {
    request.validate()?;
    let store = state.require_store().await?;
    let entity = load_match(&store, match_id).await?;
    require_creator(&entity, user, "assign relay segments of")?;
    let relay = relay_settings(&entity)?;
    if entity.status == MatchStatus::Finished {
        return Err(ServiceError::InvalidState("match is already finished".into()));
    }

    let participants = store.list_participants(match_id).await?;
    if participants.is_empty() {
        return Err(ServiceError::InvalidState(
            "no participants to assign segments to".into(),
        ));
    }

    let segment_count = request.segment_count.unwrap_or(relay.segment_count);
    let entity = if segment_count != relay.segment_count {
        let expected = entity.version;
        let mut updated = entity;
        if let Some(settings) = updated.relay.as_mut() {
            settings.segment_count = segment_count;
        }
        updated.version += 1;
        store.update_match(updated.clone(), expected).await?;
        updated
    } else {
        entity
    };

    let assigned = distribute_segments(participants, segment_count);
    for participant in &assigned {
        store.update_participant(participant.clone()).await?;
    }

    let assignments: Vec<RelayAssignment> = assigned.iter().map(RelayAssignment::from).collect();
    info!(match_id = %match_id, segment_count, runners = assignments.len(), "relay segments assigned");
    room_events::send_to_match(
        state,
        match_id,
        &OutboundEvent::RelaySegmentsAssigned {
            match_id,
            segment_count,
            assignments,
        },
    );

    relay_status(&entity, &assigned)
}

/// Round-robin segments in join order: participant `i` runs segment `(i mod k) + 1`.
///
/// Segment 1 starts `active`, every other one `pending`. Completion timestamps are reset.
pub fn distribute_segments(
    mut participants: Vec<ParticipantEntity>,
    segment_count: u32,
) -> Vec<ParticipantEntity> {
    let segment_count = segment_count.max(1);
    participants.sort_by_key(|participant| participant.join_order);
    for (index, participant) in participants.iter_mut().enumerate() {
        let segment = (index as u32 % segment_count) + 1;
        participant.relay_segment = Some(segment);
        participant.relay_status = Some(if segment == 1 {
            RelayStatus::Active
        } else {
            RelayStatus::Pending
        });
        participant.segment_completed_at = None;
    }
    participants
}

/// Active runner completes their segment and activates `to_user_id`.
pub async fn handoff(
    state: &SharedState,
    user: &CurrentUser,
    match_id: Uuid,
    request: HandoffRequest,
) -> Result<RelayStatusResponse, ServiceError> {
    request.validate()?;
    let store = state.require_store().await?;
    let entity = load_match(&store, match_id).await?;
    relay_settings(&entity)?;

    let mut caller = require_participant(&store, &entity, user).await?;
    if caller.relay_status != Some(RelayStatus::Active) {
        return Err(ServiceError::InvalidState(
            "only the active runner can hand off".into(),
        ));
    }
    if request.to_user_id == caller.user_id {
        return Err(ServiceError::InvalidInput(
            "cannot hand off to yourself".into(),
        ));
    }
    let mut target = store
        .find_participant(match_id, request.to_user_id.clone())
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "`{}` is not a participant of this match",
                request.to_user_id
            ))
        })?;

    caller.relay_status = Some(RelayStatus::Completed);
    caller.segment_completed_at = Some(SystemTime::now());
    target.relay_status = Some(RelayStatus::Active);
    store.update_participant(caller.clone()).await?;
    store.update_participant(target.clone()).await?;

    info!(match_id = %match_id, from = %caller.user_id, to = %target.user_id, "relay handoff");
    room_events::send_to_match(
        state,
        match_id,
        &OutboundEvent::RelayHandoff {
            match_id: match_id.to_string(),
            from_user_id: caller.user_id,
            to_user_id: target.user_id,
        },
    );

    let participants = store.list_participants(match_id).await?;
    relay_status(&entity, &participants)
}

/// Current relay progress of a match.
pub async fn get_status(
    state: &SharedState,
    match_id: Uuid,
) -> Result<RelayStatusResponse, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(&store, match_id).await?;
    let participants = store.list_participants(match_id).await?;
    relay_status(&entity, &participants)
}

/// Derive the relay view from the roster. Nothing here is persisted.
pub fn relay_status(
    entity: &MatchEntity,
    participants: &[ParticipantEntity],
) -> Result<RelayStatusResponse, ServiceError> {
    let relay = relay_settings(entity)?;
    let assignments: Vec<RelayAssignment> =
        participants.iter().map(RelayAssignment::from).collect();
    let completed_segments = assignments
        .iter()
        .filter(|assignment| assignment.status == Some(RelayStatus::Completed))
        .count();
    let active_participant = assignments
        .iter()
        .find(|assignment| assignment.status == Some(RelayStatus::Active))
        .cloned();

    Ok(RelayStatusResponse {
        match_id: entity.id,
        segment_count: relay.segment_count,
        handoff_method: relay.handoff_method,
        completed_segments,
        active_participant,
        participants: assignments,
    })
}

fn relay_settings(entity: &MatchEntity) -> Result<&RelaySettings, ServiceError> {
    match (entity.mode, entity.relay.as_ref()) {
        (MatchMode::Relay, Some(relay)) => Ok(relay),
        _ => Err(ServiceError::InvalidState("match is not a relay match".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{HandoffMethod, MatchSettings, ScoringMode};

    fn runner(user: &str, join_order: u32) -> ParticipantEntity {
        ParticipantEntity {
            id: Uuid::new_v4(),
            match_id: Uuid::nil(),
            user_id: user.into(),
            user_name: user.into(),
            join_order,
            score: 0,
            final_score: None,
            final_rank: None,
            relay_segment: None,
            relay_status: None,
            segment_completed_at: None,
            joined_at: SystemTime::UNIX_EPOCH,
        }
    }

    fn relay_match(segment_count: u32) -> MatchEntity {
        MatchEntity {
            id: Uuid::nil(),
            game_id: "game".into(),
            creator_id: "creator".into(),
            mode: MatchMode::Relay,
            status: MatchStatus::Waiting,
            settings: MatchSettings {
                countdown_seconds: 3,
                scoring_mode: ScoringMode::Points,
            },
            relay: Some(RelaySettings {
                segment_count,
                handoff_method: HandoffMethod::Manual,
            }),
            max_participants: 8,
            access_code: "ABC234".into(),
            created_at: SystemTime::UNIX_EPOCH,
            updated_at: SystemTime::UNIX_EPOCH,
            started_at: None,
            finished_at: None,
            version: 0,
        }
    }

    #[test]
    fn four_runners_over_two_segments() {
        let roster = vec![runner("a", 0), runner("b", 1), runner("c", 2), runner("d", 3)];
        let assigned = distribute_segments(roster, 2);
        let segments: Vec<_> = assigned.iter().map(|p| p.relay_segment).collect();
        assert_eq!(segments, [Some(1), Some(2), Some(1), Some(2)]);
        let statuses: Vec<_> = assigned.iter().map(|p| p.relay_status).collect();
        assert_eq!(
            statuses,
            [
                Some(RelayStatus::Active),
                Some(RelayStatus::Pending),
                Some(RelayStatus::Active),
                Some(RelayStatus::Pending),
            ]
        );
    }

    #[test]
    fn assignment_follows_join_order() {
        let roster = vec![runner("late", 2), runner("first", 0), runner("second", 1)];
        let assigned = distribute_segments(roster, 3);
        let order: Vec<_> = assigned
            .iter()
            .map(|p| (p.user_id.as_str(), p.relay_segment))
            .collect();
        assert_eq!(
            order,
            [("first", Some(1)), ("second", Some(2)), ("late", Some(3))]
        );
    }

    #[test]
    fn status_counts_completed_and_finds_active() {
        let mut roster = distribute_segments(vec![runner("a", 0), runner("b", 1)], 2);
        roster[0].relay_status = Some(RelayStatus::Completed);
        roster[1].relay_status = Some(RelayStatus::Active);

        let status = relay_status(&relay_match(2), &roster).expect("relay match");
        assert_eq!(status.completed_segments, 1);
        assert_eq!(
            status.active_participant.map(|active| active.user_id),
            Some("b".to_string())
        );
        assert_eq!(status.segment_count, 2);
    }

    #[test]
    fn competitive_match_has_no_relay_status() {
        let mut entity = relay_match(2);
        entity.mode = MatchMode::Competitive;
        entity.relay = None;
        assert!(matches!(
            relay_status(&entity, &[]),
            Err(ServiceError::InvalidState(_))
        ));
    }
}
