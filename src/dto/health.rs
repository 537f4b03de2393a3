use serde::Serialize;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status ("ok" or "disconnected").
    pub status: String,
    /// Session the relay is bound to.
    pub session_code: String,
    /// Sessions with a live leaderboard.
    pub sessions: Vec<String>,
}

impl HealthResponse {
    /// The session server link is up.
    pub fn ok(session_code: &str, sessions: Vec<String>) -> Self {
        Self {
            status: "ok".to_string(),
            session_code: session_code.to_string(),
            sessions,
        }
    }

    /// The session server link is down; cached rankings are still served.
    pub fn disconnected(session_code: &str, sessions: Vec<String>) -> Self {
        Self {
            status: "disconnected".to_string(),
            session_code: session_code.to_string(),
            sessions,
        }
    }
}
