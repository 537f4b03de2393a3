use tracing::warn;

use crate::{
    dto::health::HealthResponse, services::session_channel::ConnectionStatus,
    state::SharedState,
};

/// Report whether the relay is linked to the session server.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let session_code = &state.config().session_code;
    let sessions = state.registry().session_codes();
    match state.channel().connection_status() {
        ConnectionStatus::Connected => HealthResponse::ok(session_code, sessions),
        status => {
            warn!(?status, "session server link is down");
            HealthResponse::disconnected(session_code, sessions)
        }
    }
}
