//! Live quiz leaderboard engine: ranking math, a throttled observable
//! leaderboard store, and a STOMP session channel, plus the relay surface
//! used by the binary.

pub mod config;
pub mod dto;
pub mod error;
pub mod ranking;
pub mod routes;
pub mod services;
pub mod state;
