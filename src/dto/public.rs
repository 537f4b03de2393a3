use serde::Serialize;

use crate::{
    services::session_channel::ConnectionStatus,
    state::model::{HostRankingData, ParticipantsEventRatio, RankedParticipant},
};

/// Current ranked participants of the session.
#[derive(Debug, Serialize)]
pub struct ParticipantsResponse {
    pub session_code: String,
    pub host_participating: bool,
    /// Activity whose ranking was recorded last.
    pub last_activity_id: Option<String>,
    pub participants: Vec<RankedParticipant>,
}

/// Host before/after view; `initialized` is false until the session is started.
#[derive(Debug, Serialize)]
pub struct HostRankingResponse {
    pub initialized: bool,
    #[serde(flatten)]
    pub data: Option<HostRankingData>,
}

/// Answer progress for the current activity plus the link status.
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub connection: ConnectionStatus,
    #[serde(flatten)]
    pub ratio: ParticipantsEventRatio,
}
