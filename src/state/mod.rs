pub mod host_ledger;
pub mod leaderboard;
pub mod listeners;
pub mod model;
pub mod registry;
mod sse;

use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    config::AppConfig,
    services::{session_channel::SessionChannel, transport::Connector},
    state::{leaderboard::LeaderboardStore, registry::LeaderboardRegistry},
};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

const PUBLIC_SSE_CAPACITY: usize = 64;

/// Central relay state: the leaderboard registry, the session link, and the SSE hub.
pub struct AppState {
    config: AppConfig,
    registry: LeaderboardRegistry,
    channel: Arc<SessionChannel>,
    public_sse: SseHub,
    current_activity: Mutex<Option<String>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The channel is created but not connected.
    pub fn new(config: AppConfig, connector: Arc<dyn Connector>) -> SharedState {
        let registry = LeaderboardRegistry::new(config.leaderboard_settings());
        let store = registry.store_for(&config.session_code);
        let channel = SessionChannel::new(
            config.session_code.clone(),
            store,
            connector,
            config.channel_settings(),
        );

        Arc::new(Self {
            config,
            registry,
            channel,
            public_sse: SseHub::new(PUBLIC_SSE_CAPACITY),
            current_activity: Mutex::new(None),
        })
    }

    /// Loaded relay configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Stores of every session known to the relay.
    pub fn registry(&self) -> &LeaderboardRegistry {
        &self.registry
    }

    /// Store of the session the relay is bound to.
    pub fn store(&self) -> &Arc<LeaderboardStore> {
        self.channel.store()
    }

    /// Link to the session server.
    pub fn channel(&self) -> &Arc<SessionChannel> {
        &self.channel
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.public_sse
    }

    /// Record the activity now running and return the one it replaces.
    pub fn replace_current_activity(&self, activity_id: Option<String>) -> Option<String> {
        let mut guard = self
            .current_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, activity_id)
    }
}
