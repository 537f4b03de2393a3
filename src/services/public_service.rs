//! Read-only projections of the relayed leaderboard.

use crate::{
    dto::public::{HostRankingResponse, ParticipantsResponse, ProgressResponse},
    error::ServiceError,
    state::{
        SharedState,
        model::{RankingChangeData, RankingSnapshot},
    },
};

/// Current ranked participants.
pub fn get_participants(state: &SharedState) -> ParticipantsResponse {
    let store = state.store();
    ParticipantsResponse {
        session_code: store.session_code().to_string(),
        host_participating: store.is_host_participating(),
        last_activity_id: store.last_activity_id(),
        participants: store.participants(),
    }
}

/// Latest participant-facing ranking movement.
pub fn get_ranking(state: &SharedState) -> RankingChangeData {
    state.channel().ranking_position_data()
}

/// Ranking recorded when `activity_id` was settled.
///
/// History is only served while the session is live; it is dropped once the
/// session ends.
pub fn get_activity_ranking(
    state: &SharedState,
    activity_id: &str,
) -> Result<RankingSnapshot, ServiceError> {
    let session_code = &state.config().session_code;
    let store = state
        .registry()
        .get(session_code)
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_code}` has ended")))?;
    store
        .ranking_history(activity_id)
        .ok_or_else(|| ServiceError::NotFound(format!("no ranking recorded for `{activity_id}`")))
}

/// Host before/after view.
pub fn get_host_ranking(state: &SharedState) -> HostRankingResponse {
    let data = state.channel().host_ranking_data();
    HostRankingResponse {
        initialized: data.is_some(),
        data,
    }
}

/// Answer progress for the current activity.
pub fn get_progress(state: &SharedState) -> ProgressResponse {
    let channel = state.channel();
    ProgressResponse {
        connection: channel.connection_status(),
        ratio: channel.participants_event_ratio(),
    }
}
