use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::info;

use crate::state::leaderboard::{LeaderboardSettings, LeaderboardStore};

/// Leaderboard stores keyed by session code.
///
/// Each session gets its own store so concurrent sessions in one process
/// never share rankings.
pub struct LeaderboardRegistry {
    settings: LeaderboardSettings,
    stores: DashMap<String, Arc<LeaderboardStore>>,
}

impl LeaderboardRegistry {
    /// Create an empty registry; new stores inherit `settings`.
    pub fn new(settings: LeaderboardSettings) -> Self {
        Self {
            settings,
            stores: DashMap::new(),
        }
    }

    /// Store for `session_code`, created on first use.
    pub fn store_for(&self, session_code: &str) -> Arc<LeaderboardStore> {
        self.stores
            .entry(session_code.to_string())
            .or_insert_with(|| {
                info!(session = session_code, "creating leaderboard store");
                LeaderboardStore::new(session_code, self.settings.clone())
            })
            .clone()
    }

    /// Track an existing store under its own session code.
    ///
    /// Returns false when the code was already registered.
    pub fn register(&self, store: Arc<LeaderboardStore>) -> bool {
        let session_code = store.session_code().to_string();
        match self.stores.entry(session_code) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                info!(session = entry.key().as_str(), "registering leaderboard store");
                entry.insert(store);
                true
            }
        }
    }

    /// Store for `session_code`, if one exists.
    pub fn get(&self, session_code: &str) -> Option<Arc<LeaderboardStore>> {
        self.stores.get(session_code).map(|entry| entry.value().clone())
    }

    /// Forget the store of a finished session.
    pub fn remove(&self, session_code: &str) -> Option<Arc<LeaderboardStore>> {
        self.stores.remove(session_code).map(|(_, store)| store)
    }

    /// Codes of every session with a store.
    pub fn session_codes(&self) -> Vec<String> {
        self.stores.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for LeaderboardRegistry {
    fn default() -> Self {
        Self::new(LeaderboardSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::participant::RawParticipant;

    #[test]
    fn sessions_are_isolated() {
        let registry = LeaderboardRegistry::default();
        let first = registry.store_for("AAA");
        let second = registry.store_for("BBB");

        first.update_participants(vec![RawParticipant::named("Alice", 10)]);
        assert_eq!(first.participants().len(), 1);
        assert!(second.participants().is_empty());
    }

    #[test]
    fn store_for_returns_the_same_instance() {
        let registry = LeaderboardRegistry::default();
        let a = registry.store_for("AAA");
        let b = registry.store_for("AAA");
        assert!(Arc::ptr_eq(&a, &b));

        registry.remove("AAA");
        assert!(registry.get("AAA").is_none());
        assert!(registry.session_codes().is_empty());
    }

    #[test]
    fn evicted_store_can_be_registered_again() {
        let registry = LeaderboardRegistry::default();
        let store = registry.store_for("AAA");
        assert!(!registry.register(store.clone()));

        let evicted = registry.remove("AAA").unwrap();
        assert!(Arc::ptr_eq(&store, &evicted));
        assert!(registry.register(evicted));
        assert!(Arc::ptr_eq(&registry.get("AAA").unwrap(), &store));
        assert_eq!(registry.session_codes(), ["AAA"]);
    }
}
