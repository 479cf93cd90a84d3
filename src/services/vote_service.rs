//! Team votes with majority and unanimous completion rules.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        arena_store::ArenaStore,
        models::{
            BallotEntity, TeamEntity, VoteEntity, VoteOptionEntity, VoteStatus, VotingMode,
        },
        storage::StorageError,
    },
    dto::{
        votes::{CastBallotRequest, CastBallotResponse, CreateVoteRequest, VoteSummary},
        ws::OutboundEvent,
    },
    error::ServiceError,
    services::{auth_service::CurrentUser, room_events},
    state::SharedState,
};

/// Tally of a vote and the option that completed it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOutcome {
    /// Ballots per option, in option order.
    pub counts: IndexMap<String, u32>,
    /// Option that reached the threshold, once the vote closed.
    pub winner: Option<String>,
}

/// Open a vote for a team. The caller must belong to the team.
pub async fn create_vote(
    state: &SharedState,
    user: &CurrentUser,
    team_id: &str,
    request: CreateVoteRequest,
) -> Result<VoteSummary, ServiceError> {
    request.validate()?;
    let store = state.require_store().await?;
    let team = load_team(&store, team_id).await?;
    require_member(&team, user)?;

    let now = SystemTime::now();
    let entity = VoteEntity {
        id: Uuid::new_v4(),
        team_id: team.id.clone(),
        creator_id: user.id.clone(),
        question: request.question.trim().to_string(),
        options: request
            .options
            .iter()
            .enumerate()
            .map(|(index, text)| VoteOptionEntity {
                id: format!("option_{index}"),
                text: text.trim().to_string(),
            })
            .collect(),
        mode: request.mode,
        status: VoteStatus::Active,
        winning_option_id: None,
        expires_at: request
            .expires_in_seconds
            .map(|seconds| now + Duration::from_secs(seconds)),
        created_at: now,
        completed_at: None,
        version: 0,
    };
    store.insert_vote(entity.clone()).await?;

    let counts = evaluate(entity.mode, team.members.len(), &entity.options, &[]).counts;
    let summary = VoteSummary::from((entity, counts));
    info!(vote_id = %summary.id, team_id = %team.id, mode = ?summary.mode, "vote created");
    room_events::send_to_team(
        state,
        &team.id,
        &OutboundEvent::VoteCreated {
            vote: summary.clone(),
        },
    );

    Ok(summary)
}

/// Votes of a team with their current tallies, newest first.
pub async fn list_votes(
    state: &SharedState,
    user: &CurrentUser,
    team_id: &str,
) -> Result<Vec<VoteSummary>, ServiceError> {
    let store = state.require_store().await?;
    let team = load_team(&store, team_id).await?;
    require_member(&team, user)?;

    let votes = store.list_votes(team.id.clone()).await?;
    let mut summaries = Vec::with_capacity(votes.len());
    for vote in votes {
        let ballots = store.list_ballots(vote.id).await?;
        let counts = tally(&vote.options, &ballots);
        summaries.push(VoteSummary::from((vote, counts)));
    }
    Ok(summaries)
}

/// Record the caller's ballot and complete the vote when its rule is met.
pub async fn cast_ballot(
    state: &SharedState,
    user: &CurrentUser,
    vote_id: Uuid,
    request: CastBallotRequest,
) -> Result<CastBallotResponse, ServiceError> {
    request.validate()?;
    let store = state.require_store().await?;
    let vote = store
        .find_vote(vote_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("vote `{vote_id}` not found")))?;
    let team = load_team(&store, &vote.team_id).await?;
    require_member(&team, user)?;

    if vote.status != VoteStatus::Active {
        return Err(ServiceError::InvalidState("vote is already completed".into()));
    }
    let now = SystemTime::now();
    if vote.expires_at.is_some_and(|expires_at| expires_at <= now) {
        return Err(ServiceError::InvalidState("vote has expired".into()));
    }
    if !vote.has_option(&request.option_id) {
        return Err(ServiceError::InvalidInput(format!(
            "`{}` is not an option of this vote",
            request.option_id
        )));
    }

    let ballot = BallotEntity {
        id: Uuid::new_v4(),
        vote_id,
        user_id: user.id.clone(),
        option_id: request.option_id.clone(),
        cast_at: now,
    };
    store
        .insert_ballot(ballot)
        .await
        .map_err(|err| match err {
            StorageError::Duplicate { .. } => {
                ServiceError::InvalidState("you have already voted".into())
            }
            other => other.into(),
        })?;

    let ballots = store.list_ballots(vote_id).await?;
    let outcome = evaluate(vote.mode, team.members.len(), &vote.options, &ballots);
    let winning_option_id = match outcome.winner.clone() {
        Some(winner) => complete_vote(&store, vote, winner, now).await?,
        None => None,
    };

    let is_complete = winning_option_id.is_some();
    info!(
        vote_id = %vote_id,
        user = %user.id,
        option = %request.option_id,
        is_complete,
        "ballot cast"
    );
    room_events::send_to_team(
        state,
        &team.id,
        &OutboundEvent::VoteCast {
            vote_id,
            team_id: team.id.clone(),
            user_id: user.id.clone(),
            option_id: request.option_id.clone(),
            is_complete,
            winning_option_id: winning_option_id.clone(),
            vote_counts: outcome.counts.clone(),
        },
    );

    Ok(CastBallotResponse {
        vote_id,
        option_id: request.option_id,
        is_complete,
        winning_option_id,
        vote_counts: outcome.counts,
    })
}

/// Persist completion. When another writer got there first, report what it stored.
async fn complete_vote(
    store: &Arc<dyn ArenaStore>,
    vote: VoteEntity,
    winner: String,
    now: SystemTime,
) -> Result<Option<String>, ServiceError> {
    let vote_id = vote.id;
    let expected = vote.version;
    let mut completed = vote;
    completed.status = VoteStatus::Completed;
    completed.winning_option_id = Some(winner.clone());
    completed.completed_at = Some(now);
    completed.version += 1;

    match store.update_vote(completed, expected).await {
        Ok(()) => Ok(Some(winner)),
        Err(StorageError::VersionConflict { .. }) => {
            warn!(vote_id = %vote_id, "vote completed concurrently; reloading outcome");
            let current = store
                .find_vote(vote_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("vote `{vote_id}` not found")))?;
            Ok(current.winning_option_id)
        }
        Err(err) => Err(err.into()),
    }
}

/// Count `ballots` per option. Ballots naming unknown options are ignored.
pub fn tally(options: &[VoteOptionEntity], ballots: &[BallotEntity]) -> IndexMap<String, u32> {
    let mut counts: IndexMap<String, u32> = options
        .iter()
        .map(|option| (option.id.clone(), 0))
        .collect();
    for ballot in ballots {
        if let Some(count) = counts.get_mut(&ballot.option_id) {
            *count += 1;
        }
    }
    counts
}

/// Decide whether `ballots` (in cast order) complete a vote for a team of `team_size`.
///
/// Majority completes as soon as an option reaches half the team rounded up; once
/// every member voted without that, the most voted option wins and ties go to the
/// option that received a ballot first. Unanimous completes only when every member
/// voted and all picked the same option.
pub fn evaluate(
    mode: VotingMode,
    team_size: usize,
    options: &[VoteOptionEntity],
    ballots: &[BallotEntity],
) -> VoteOutcome {
    let counts = tally(options, ballots);
    let cast = counts.values().sum::<u32>() as usize;
    let everyone_voted = team_size > 0 && cast >= team_size;

    let winner = match mode {
        VotingMode::Unanimous => {
            if everyone_voted {
                counts
                    .iter()
                    .find(|(_, count)| **count as usize == cast)
                    .map(|(option_id, _)| option_id.clone())
            } else {
                None
            }
        }
        VotingMode::Majority => {
            let threshold = team_size.div_ceil(2).max(1);
            let mut running: IndexMap<&str, usize> = IndexMap::new();
            let mut reached = None;
            for ballot in ballots {
                if !counts.contains_key(&ballot.option_id) {
                    continue;
                }
                let count = running.entry(ballot.option_id.as_str()).or_insert(0);
                *count += 1;
                if *count >= threshold {
                    reached = Some(ballot.option_id.clone());
                    break;
                }
            }
            match reached {
                Some(winner) => Some(winner),
                None if everyone_voted => plurality(&running),
                None => None,
            }
        }
    };

    VoteOutcome { counts, winner }
}

/// Most voted option; `running` is keyed in first-seen order, which settles ties.
fn plurality(running: &IndexMap<&str, usize>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for (option_id, count) in running {
        if best.is_none_or(|(_, top)| *count > top) {
            best = Some((option_id, *count));
        }
    }
    best.map(|(option_id, _)| option_id.to_string())
}

pub(crate) async fn load_team(
    store: &Arc<dyn ArenaStore>,
    team_id: &str,
) -> Result<TeamEntity, ServiceError> {
    store
        .find_team(team_id.to_string())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))
}

pub(crate) fn require_member(team: &TeamEntity, user: &CurrentUser) -> Result<(), ServiceError> {
    if team.has_member(&user.id) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("not a member of this team".into()))
    }
}
