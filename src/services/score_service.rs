use std::time::SystemTime;

use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{ScoreHistoryEntity, TeamScoreEntity},
    dto::{
        scores::{
            ScoreHistoryEntry, ScoreHistoryResponse, TeamScoreUpdateResponse,
            UpdateTeamScoreRequest,
        },
        ws::OutboundEvent,
    },
    error::ServiceError,
    services::{
        auth_service::CurrentUser,
        room_events,
        vote_service::{load_team, require_member},
    },
    state::SharedState,
};

/// Apply a delta to a team's running score and append it to the ledger.
pub async fn update_team_score(
    state: &SharedState,
    user: &CurrentUser,
    team_id: &str,
    request: UpdateTeamScoreRequest,
) -> Result<TeamScoreUpdateResponse, ServiceError> {
    request.validate()?;
    let store = state.require_store().await?;
    let team = load_team(&store, team_id).await?;
    require_member(&team, user)?;

    let current = store.find_team_score(team.id.clone()).await?;
    let previous_score = current.as_ref().map_or(0, |aggregate| aggregate.score);
    let previous_version = current.as_ref().map(|aggregate| aggregate.version);
    let new_score = previous_score
        .checked_add(request.delta)
        .ok_or_else(|| ServiceError::InvalidInput("score would overflow".into()))?;

    let now = SystemTime::now();
    let sequence = previous_version.unwrap_or(0) + 1;
    store
        .save_team_score(
            TeamScoreEntity {
                team_id: team.id.clone(),
                score: new_score,
                version: sequence,
                updated_at: now,
            },
            previous_version,
        )
        .await?;

    let entry = ScoreHistoryEntity {
        id: Uuid::new_v4(),
        team_id: team.id.clone(),
        delta: request.delta,
        running_total: new_score,
        source: request.source,
        reason: request.reason,
        sequence,
        created_at: now,
    };
    store.append_score_history(entry.clone()).await?;

    info!(
        team_id = %team.id,
        delta = request.delta,
        new_score,
        source = ?entry.source,
        "team score updated"
    );
    room_events::send_to_team(
        state,
        &team.id,
        &OutboundEvent::ScoreUpdate {
            team_id: team.id.clone(),
            delta: request.delta,
            new_score,
        },
    );

    Ok(TeamScoreUpdateResponse {
        team_id: team.id,
        previous_score,
        delta: request.delta,
        new_score,
        entry: entry.into(),
    })
}

/// Ledger of a team, newest first, with a replay check against the aggregate.
pub async fn score_history(
    state: &SharedState,
    user: &CurrentUser,
    team_id: &str,
) -> Result<ScoreHistoryResponse, ServiceError> {
    let store = state.require_store().await?;
    let team = load_team(&store, team_id).await?;
    require_member(&team, user)?;

    let current_score = store
        .find_team_score(team.id.clone())
        .await?
        .map_or(0, |aggregate| aggregate.score);
    let entries = store.list_score_history(team.id.clone()).await?;
    let consistent = verify_history(&entries, current_score);
    if !consistent {
        warn!(team_id = %team.id, current_score, entries = entries.len(), "score ledger does not replay to aggregate");
    }

    Ok(ScoreHistoryResponse {
        team_id: team.id,
        current_score,
        consistent,
        entries: entries.into_iter().map(ScoreHistoryEntry::from).collect(),
    })
}

/// Replay `entries` (newest first) from zero: every running total must match and
/// the last one must equal `current_score`.
pub fn verify_history(entries: &[ScoreHistoryEntity], current_score: i64) -> bool {
    let mut total: i64 = 0;
    for entry in entries.iter().rev() {
        total = match total.checked_add(entry.delta) {
            Some(total) => total,
            None => return false,
        };
        if entry.running_total != total {
            return false;
        }
    }
    total == current_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::ScoreSource;

    fn entry(sequence: u64, delta: i64, running_total: i64) -> ScoreHistoryEntity {
        ScoreHistoryEntity {
            id: Uuid::new_v4(),
            team_id: "team".into(),
            delta,
            running_total,
            source: ScoreSource::Challenge,
            reason: None,
            sequence,
            created_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn replayed_ledger_matches_aggregate() {
        let newest_first = vec![entry(3, -15, 45), entry(2, 10, 60), entry(1, 50, 50)];
        assert!(verify_history(&newest_first, 45));
        assert!(!verify_history(&newest_first, 46));
    }

    #[test]
    fn empty_ledger_is_consistent_with_zero() {
        assert!(verify_history(&[], 0));
        assert!(!verify_history(&[], 10));
    }

    #[test]
    fn broken_running_total_is_detected() {
        let newest_first = vec![entry(2, 10, 70), entry(1, 50, 50)];
        assert!(!verify_history(&newest_first, 70));
    }
}
