use serde::Serialize;

use crate::{error::ChannelError, services::session_channel::ConnectionStatus};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    pub stream: String,
    pub session_code: String,
    pub connection: ConnectionStatus,
}

#[derive(Debug, Serialize)]
/// Broadcast whenever the link to the session server changes state.
pub struct ConnectionStatusEvent {
    pub status: ConnectionStatus,
}

#[derive(Debug, Serialize)]
/// Broadcast for transport failures, rejected actions, and server-reported errors.
pub struct SessionErrorEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl From<&ChannelError> for SessionErrorEvent {
    fn from(err: &ChannelError) -> Self {
        match err {
            ChannelError::Server { code, message } => Self {
                code: Some(code.clone()),
                message: message.clone(),
            },
            other => Self {
                code: None,
                message: other.to_string(),
            },
        }
    }
}
