use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dao::models::{HandoffMethod, ParticipantEntity, RelayStatus};

/// Optional override of the segment count configured on the match.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignSegmentsRequest {
    /// Segments to distribute; the match setting when omitted.
    #[validate(range(min = 1, max = 50))]
    pub segment_count: Option<u32>,
}

/// Pass the baton to another participant.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRequest {
    /// Participant receiving the baton.
    #[validate(length(min = 1, max = 128))]
    pub to_user_id: String,
}

/// Segment held by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelayAssignment {
    /// Runner's user id.
    pub user_id: String,
    /// Runner's display name.
    pub user_name: String,
    /// Assigned segment, once segments were distributed.
    pub segment: Option<u32>,
    /// Progress on that segment.
    pub status: Option<RelayStatus>,
}

impl From<&ParticipantEntity> for RelayAssignment {
    fn from(value: &ParticipantEntity) -> Self {
        Self {
            user_id: value.user_id.clone(),
            user_name: value.user_name.clone(),
            segment: value.relay_segment,
            status: value.relay_status,
        }
    }
}

/// Relay progress derived from the roster.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatusResponse {
    /// Relay match.
    pub match_id: Uuid,
    /// Segments the course is split into.
    pub segment_count: u32,
    /// How the baton is passed.
    pub handoff_method: HandoffMethod,
    /// Runners whose segment is completed.
    pub completed_segments: usize,
    /// First active runner in join order.
    pub active_participant: Option<RelayAssignment>,
    /// Every runner in join order.
    pub participants: Vec<RelayAssignment>,
}
