/// Health check service.
pub mod health_service;
/// Participant event counter backing the answer progress ratio.
pub mod progress;
/// Public read-only views of the leaderboard.
pub mod public_service;
/// STOMP session client feeding the leaderboard store.
pub mod session_channel;
/// Bridges store and channel events onto the public SSE stream.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// STOMP frame codec.
pub mod stomp;
/// WebSocket transport for STOMP frames.
pub mod transport;
