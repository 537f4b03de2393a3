use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    dto::participant::RawParticipant,
    ranking::{
        default_ranking, diff_host_positions, diff_ranks, has_changed, normalize_and_rank,
        positions, ranking_change_data, ranking_entries,
    },
    state::{
        host_ledger::HostLedger,
        listeners::{ListenerRegistry, Subscription},
        model::{HostRankingData, RankedParticipant, RankingChangeData, RankingSnapshot},
    },
};

/// Default coalescing window for participant updates.
pub const DEFAULT_UPDATE_THROTTLE: Duration = Duration::from_millis(300);

/// Tunables for a [`LeaderboardStore`].
#[derive(Debug, Clone)]
pub struct LeaderboardSettings {
    /// Window during which participant updates are coalesced.
    pub update_throttle: Duration,
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            update_throttle: DEFAULT_UPDATE_THROTTLE,
        }
    }
}

/// Mutable ranking state guarded by the store mutex.
#[derive(Debug, Default)]
struct LeaderboardState {
    participants: Option<Vec<RankedParticipant>>,
    pending: Option<Vec<RawParticipant>>,
    flush_scheduled: bool,
    update_throttle: Duration,
    host_participating: bool,
    history: HashMap<String, RankingSnapshot>,
    last_activity_id: Option<String>,
    latest_ranking: Option<RankingChangeData>,
    host_ledger: HostLedger,
    host_last_activity_id: Option<String>,
    host_ranking: Option<HostRankingData>,
}

/// Notifications computed under the state lock and delivered after it is released.
#[derive(Default)]
struct Deliveries {
    participants: Option<Vec<RankedParticipant>>,
    ranking: Option<RankingChangeData>,
}

/// Ranking state of one quiz session.
///
/// Participant updates are coalesced: within one throttle window only the
/// last snapshot is processed. Listeners are invoked under a delivery gate so
/// they observe events in mutation order; they may read the store but must not
/// subscribe to or mutate it synchronously.
pub struct LeaderboardStore {
    session_code: String,
    state: Mutex<LeaderboardState>,
    delivery_gate: Mutex<()>,
    participants_listeners: ListenerRegistry<Vec<RankedParticipant>>,
    ranking_listeners: ListenerRegistry<RankingChangeData>,
}

impl LeaderboardStore {
    /// Build a store for `session_code`, wrapped in an [`Arc`] for sharing.
    pub fn new(session_code: impl Into<String>, settings: LeaderboardSettings) -> Arc<Self> {
        Arc::new(Self {
            session_code: session_code.into(),
            state: Mutex::new(LeaderboardState {
                update_throttle: settings.update_throttle,
                ..LeaderboardState::default()
            }),
            delivery_gate: Mutex::new(()),
            participants_listeners: ListenerRegistry::new("participants"),
            ranking_listeners: ListenerRegistry::new("ranking"),
        })
    }

    /// Session this store ranks.
    pub fn session_code(&self) -> &str {
        &self.session_code
    }

    /// Queue a raw participant snapshot for processing.
    ///
    /// The first update of a window schedules a flush after the throttle delay;
    /// later updates in the same window replace the queued snapshot.
    ///
    /// The delay needs a tokio runtime. Called from outside one, the snapshot is
    /// processed inline and no throttling applies.
    pub fn update_participants(self: &Arc<Self>, raw: Vec<RawParticipant>) {
        let delay = {
            let mut state = self.lock_state();
            state.pending = Some(raw);
            if state.flush_scheduled {
                return;
            }
            state.flush_scheduled = true;
            state.update_throttle
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::downgrade(self);
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(store) = store.upgrade() {
                        store.run_scheduled_flush();
                    }
                });
            }
            Err(_) => {
                warn!(session = %self.session_code, "no tokio runtime; participants flushed without throttling");
                self.run_scheduled_flush();
            }
        }
    }

    /// Process the queued snapshot immediately, if any.
    pub fn flush_pending(&self) {
        self.mutate(|state, deliveries| process_pending(state, deliveries));
    }

    /// Change the coalescing window used for later updates.
    pub fn set_update_throttle(&self, throttle: Duration) {
        self.lock_state().update_throttle = throttle;
    }

    /// Whether the host competes and should appear in rankings.
    ///
    /// Takes effect for snapshots processed after the call.
    pub fn set_host_participating(&self, participating: bool) {
        self.lock_state().host_participating = participating;
    }

    /// Whether the host currently competes.
    pub fn is_host_participating(&self) -> bool {
        self.lock_state().host_participating
    }

    /// Listen for ranked participant lists; replays the current list when one exists.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Vec<RankedParticipant>) + Send + Sync + 'static,
    {
        let _gate = self.lock_gate();
        let current = self.lock_state().participants.clone();
        self.participants_listeners
            .subscribe(Arc::new(listener), current.as_ref())
    }

    /// Listen for rank movement events; replays the latest event when one exists.
    pub fn subscribe_to_ranking_changes<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RankingChangeData) + Send + Sync + 'static,
    {
        let _gate = self.lock_gate();
        let current = self.lock_state().latest_ranking.clone();
        self.ranking_listeners
            .subscribe(Arc::new(listener), current.as_ref())
    }

    /// Record the current ranking for `activity_id`.
    ///
    /// When a different activity was recorded before, the movement since that
    /// activity is published and returned.
    pub fn save_current_ranking_snapshot(&self, activity_id: &str) -> Option<RankingChangeData> {
        self.mutate(|state, deliveries| {
            let snapshot = state.participants.clone().unwrap_or_default();
            state.history.insert(activity_id.to_string(), snapshot.clone());

            let previous = state
                .last_activity_id
                .replace(activity_id.to_string())
                .filter(|previous| previous != activity_id)?;

            let changes = diff_ranks(&snapshot, &state.history, &previous, activity_id);
            let data = ranking_change_data(
                &snapshot,
                &changes,
                Some(previous),
                Some(activity_id.to_string()),
            );
            info!(
                session = %self.session_code,
                from = data.previous_activity_id.as_deref().unwrap_or_default(),
                to = activity_id,
                participants = data.rankings.len(),
                "ranking transition recorded"
            );
            state.latest_ranking = Some(data.clone());
            deliveries.ranking = Some(data.clone());
            Some(data)
        })
    }

    /// Settle the leaderboard for `activity_id` without waiting for the throttle.
    ///
    /// Uses the host ledger when it has been initialized, the per-activity
    /// history otherwise. Always publishes.
    pub fn publish_ranking_data_immediately(&self, activity_id: &str) -> RankingChangeData {
        self.mutate(|state, deliveries| {
            process_pending(state, deliveries);

            if state.host_ledger.is_initialized() {
                return finish_locked(&self.session_code, state, deliveries, activity_id);
            }

            let snapshot = state.participants.clone().unwrap_or_default();
            state.history.insert(activity_id.to_string(), snapshot.clone());
            let previous = state
                .last_activity_id
                .replace(activity_id.to_string())
                .filter(|previous| previous != activity_id);

            let data = match previous {
                Some(previous) => {
                    let changes = diff_ranks(&snapshot, &state.history, &previous, activity_id);
                    ranking_change_data(
                        &snapshot,
                        &changes,
                        Some(previous),
                        Some(activity_id.to_string()),
                    )
                }
                None => default_ranking(&snapshot, Some(activity_id)),
            };
            state.latest_ranking = Some(data.clone());
            deliveries.ranking = Some(data.clone());
            data
        })
    }

    /// Start the host before/after view.
    pub fn initialize_host_ranking(&self) {
        let mut state = self.lock_state();
        state.host_ledger = HostLedger::initialized();
        state.host_last_activity_id = None;
        state.host_ranking = None;
        info!(session = %self.session_code, "host ranking initialized");
    }

    /// Close `activity_id` in the host ledger and publish the movement.
    pub fn finish_activity(&self, activity_id: &str) -> RankingChangeData {
        self.mutate(|state, deliveries| {
            process_pending(state, deliveries);
            finish_locked(&self.session_code, state, deliveries, activity_id)
        })
    }

    /// Drop the host ledger.
    pub fn clear_host_ranking(&self) {
        let mut state = self.lock_state();
        state.host_ledger.clear();
        state.host_last_activity_id = None;
        state.host_ranking = None;
        info!(session = %self.session_code, "host ranking cleared");
    }

    /// Whether the host ledger is in use.
    pub fn is_host_ranking_initialized(&self) -> bool {
        self.lock_state().host_ledger.is_initialized()
    }

    /// Current ranked participants.
    pub fn participants(&self) -> Vec<RankedParticipant> {
        self.lock_state().participants.clone().unwrap_or_default()
    }

    /// Snapshot recorded for `activity_id`.
    pub fn ranking_history(&self, activity_id: &str) -> Option<RankingSnapshot> {
        self.lock_state().history.get(activity_id).cloned()
    }

    /// Most recently recorded activity.
    pub fn last_activity_id(&self) -> Option<String> {
        self.lock_state().last_activity_id.clone()
    }

    /// Host before/after view, when the host ledger is in use.
    pub fn host_ranking_data(&self) -> Option<HostRankingData> {
        let state = self.lock_state();
        if !state.host_ledger.is_initialized() {
            return None;
        }

        Some(state.host_ranking.clone().unwrap_or_else(|| {
            let participants = state.participants.clone().unwrap_or_default();
            HostRankingData {
                current: None,
                previous: None,
                rankings: ranking_entries(&participants, &Default::default()),
            }
        }))
    }

    /// Latest published movement, or a fresh all-new ranking when none was published.
    pub fn ranking_position_data(&self) -> RankingChangeData {
        let state = self.lock_state();
        state.latest_ranking.clone().unwrap_or_else(|| {
            let participants = state.participants.clone().unwrap_or_default();
            default_ranking(&participants, state.last_activity_id.as_deref())
        })
    }

    /// Forget every ranking of the session. Settings, the participation mode
    /// and listeners are kept.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        let update_throttle = state.update_throttle;
        let flush_scheduled = state.flush_scheduled;
        let host_participating = state.host_participating;
        *state = LeaderboardState {
            update_throttle,
            flush_scheduled,
            host_participating,
            ..LeaderboardState::default()
        };
        info!(session = %self.session_code, "leaderboard state reset");
    }

    fn run_scheduled_flush(&self) {
        self.mutate(|state, deliveries| {
            state.flush_scheduled = false;
            process_pending(state, deliveries);
        });
    }

    /// Apply `work` under the state lock, then deliver what it produced.
    fn mutate<R>(&self, work: impl FnOnce(&mut LeaderboardState, &mut Deliveries) -> R) -> R {
        let _gate = self.lock_gate();
        let mut deliveries = Deliveries::default();
        let result = {
            let mut state = self.lock_state();
            work(&mut state, &mut deliveries)
        };

        if let Some(participants) = deliveries.participants {
            self.participants_listeners.publish(&participants);
        }
        if let Some(ranking) = deliveries.ranking {
            self.ranking_listeners.publish(&ranking);
        }
        result
    }

    fn lock_state(&self) -> MutexGuard<'_, LeaderboardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.delivery_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rank the queued snapshot and stage notifications when it changed anything.
fn process_pending(state: &mut LeaderboardState, deliveries: &mut Deliveries) {
    let Some(raw) = state.pending.take() else {
        return;
    };

    let ranked = normalize_and_rank(&raw, state.host_participating);
    let changed = state
        .participants
        .as_ref()
        .is_none_or(|previous| has_changed(previous, &ranked));
    if !changed {
        debug!(participants = ranked.len(), "participant update carried no ranking change");
        return;
    }

    if state.latest_ranking.is_none() {
        deliveries.ranking = Some(default_ranking(&ranked, state.last_activity_id.as_deref()));
        state.latest_ranking = deliveries.ranking.clone();
    }
    state.participants = Some(ranked.clone());
    deliveries.participants = Some(ranked);
}

/// Shift the host ledger forward for `activity_id` and stage the resulting event.
fn finish_locked(
    session_code: &str,
    state: &mut LeaderboardState,
    deliveries: &mut Deliveries,
    activity_id: &str,
) -> RankingChangeData {
    let ranked = state.participants.clone().unwrap_or_default();
    let changes = diff_host_positions(&ranked, state.host_ledger.current());

    if !state.host_ledger.settle(positions(&ranked)) {
        warn!(
            session = session_code,
            activity_id, "finishing an activity before host ranking was initialized"
        );
    }
    state.history.insert(activity_id.to_string(), ranked.clone());

    let data = ranking_change_data(
        &ranked,
        &changes,
        state.host_last_activity_id.clone(),
        Some(activity_id.to_string()),
    );
    state.host_ranking = Some(HostRankingData {
        current: state.host_ledger.current().cloned(),
        previous: state.host_ledger.previous().cloned(),
        rankings: data.rankings.clone(),
    });
    state.host_last_activity_id = Some(activity_id.to_string());
    state.last_activity_id = Some(activity_id.to_string());
    state.latest_ranking = Some(data.clone());
    deliveries.ranking = Some(data.clone());

    info!(
        session = session_code,
        activity_id,
        participants = ranked.len(),
        "activity finished in host ranking"
    );
    data
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::state::model::RankDirection;

    fn store() -> Arc<LeaderboardStore> {
        LeaderboardStore::new("ABC123", LeaderboardSettings::default())
    }

    fn raw(entries: &[(&str, u64)]) -> Vec<RawParticipant> {
        entries
            .iter()
            .map(|(name, score)| RawParticipant::named(*name, *score))
            .collect()
    }

    fn record_participants(
        store: &LeaderboardStore,
    ) -> (Arc<StdMutex<Vec<Vec<RankedParticipant>>>>, Subscription) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = store.subscribe(move |list| sink.lock().unwrap().push(list.clone()));
        (seen, subscription)
    }

    fn record_rankings(
        store: &LeaderboardStore,
    ) -> (Arc<StdMutex<Vec<RankingChangeData>>>, Subscription) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription =
            store.subscribe_to_ranking_changes(move |data| sink.lock().unwrap().push(data.clone()));
        (seen, subscription)
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_updates_coalesce_into_the_last_one() {
        let store = store();
        let (seen, _subscription) = record_participants(&store);

        for score in 1..=5 {
            store.update_participants(raw(&[("Alice", score), ("Bob", 3)]));
        }
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(310)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let alice = seen[0].iter().find(|p| p.display_name == "Alice").unwrap();
        assert_eq!(alice.score, 5);
        assert_eq!(alice.rank, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn updates_in_separate_windows_are_both_delivered() {
        let store = store();
        let (seen, _subscription) = record_participants(&store);

        store.update_participants(raw(&[("Alice", 1)]));
        tokio::time::sleep(Duration::from_millis(310)).await;
        store.update_participants(raw(&[("Alice", 2)]));
        tokio::time::sleep(Duration::from_millis(310)).await;

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_update_is_not_redelivered() {
        let store = store();
        let (seen, _subscription) = record_participants(&store);

        store.update_participants(raw(&[("Alice", 1), ("Bob", 0)]));
        tokio::time::sleep(Duration::from_millis(310)).await;
        store.update_participants(raw(&[("Alice", 1), ("Bob", 0)]));
        tokio::time::sleep(Duration::from_millis(310)).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_window_can_be_changed() {
        let store = store();
        store.set_update_throttle(Duration::from_millis(1_000));
        let (seen, _subscription) = record_participants(&store);

        store.update_participants(raw(&[("Alice", 1)]));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(seen.lock().unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn late_subscriber_gets_current_state_replayed() {
        let store = store();
        store.update_participants(raw(&[("Alice", 10)]));

        let (participants, _p) = record_participants(&store);
        let (rankings, _r) = record_rankings(&store);

        assert_eq!(participants.lock().unwrap().len(), 1);
        assert_eq!(rankings.lock().unwrap().len(), 1);
        assert_eq!(
            rankings.lock().unwrap()[0].rankings[0].change.direction,
            RankDirection::New
        );
    }

    #[test]
    fn fresh_store_replays_nothing() {
        let store = store();
        let (participants, _p) = record_participants(&store);
        let (rankings, _r) = record_rankings(&store);
        assert!(participants.lock().unwrap().is_empty());
        assert!(rankings.lock().unwrap().is_empty());
    }

    #[test]
    fn updates_outside_a_runtime_apply_without_throttling() {
        let store = store();
        store.set_update_throttle(Duration::from_secs(60));
        let (seen, _subscription) = record_participants(&store);

        store.update_participants(raw(&[("Alice", 10)]));
        store.update_participants(raw(&[("Alice", 20)]));

        assert_eq!(store.participants()[0].score, 20);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn host_filtering_follows_participation_flag() {
        let store = store();
        store.update_participants(raw(&[("Host", 0), ("Alice", 50)]));
        assert_eq!(store.participants().len(), 1);

        store.set_host_participating(true);
        store.update_participants(raw(&[("Host", 0), ("Alice", 50)]));
        assert_eq!(store.participants().len(), 2);
    }

    #[test]
    fn snapshot_transition_publishes_diff() {
        let store = store();
        store.update_participants(raw(&[("Alice", 10), ("Bob", 20)]));
        let (rankings, _subscription) = record_rankings(&store);

        assert!(store.save_current_ranking_snapshot("act1").is_none());

        store.update_participants(raw(&[("Alice", 40), ("Bob", 20), ("Carol", 5)]));
        let data = store.save_current_ranking_snapshot("act2").unwrap();

        assert_eq!(data.previous_activity_id.as_deref(), Some("act1"));
        assert_eq!(data.current_activity_id.as_deref(), Some("act2"));
        let alice = data.change_for("Alice").unwrap();
        assert_eq!(alice.direction, RankDirection::Up);
        assert_eq!(alice.delta, 1);
        assert_eq!(data.change_for("Bob").unwrap().direction, RankDirection::Down);
        assert_eq!(data.change_for("Carol").unwrap().direction, RankDirection::New);

        let rankings = rankings.lock().unwrap();
        // replayed default ranking, then the act1 -> act2 transition
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[1], data);
    }

    #[test]
    fn saving_same_activity_twice_overwrites_without_publishing() {
        let store = store();
        store.update_participants(raw(&[("Alice", 10)]));
        store.save_current_ranking_snapshot("act1");
        store.update_participants(raw(&[("Alice", 30)]));
        assert!(store.save_current_ranking_snapshot("act1").is_none());
        assert_eq!(store.ranking_history("act1").unwrap()[0].score, 30);
    }

    #[test]
    fn host_ledger_tracks_before_and_after() {
        let store = store();
        store.initialize_host_ranking();

        store.update_participants(raw(&[("A", 10), ("B", 5)]));
        let first = store.finish_activity("act1");
        assert!(
            first
                .rankings
                .iter()
                .all(|entry| entry.change.direction == RankDirection::New)
        );

        store.update_participants(raw(&[("A", 5), ("B", 10)]));
        let second = store.finish_activity("act2");
        assert_eq!(second.previous_activity_id.as_deref(), Some("act1"));
        assert_eq!(second.change_for("A").unwrap().direction, RankDirection::Down);
        assert_eq!(second.change_for("B").unwrap().direction, RankDirection::Up);

        let host = store.host_ranking_data().unwrap();
        assert_eq!(host.previous.as_ref().unwrap()["A"], 0);
        assert_eq!(host.current.as_ref().unwrap()["B"], 0);
        assert_eq!(host.current.as_ref().unwrap()["A"], 1);

        store.clear_host_ranking();
        assert!(store.host_ranking_data().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_publish_flushes_pending_and_uses_activity_path() {
        let store = store();
        store.set_update_throttle(Duration::from_secs(60));
        store.update_participants(raw(&[("Alice", 10)]));
        assert!(store.participants().is_empty());

        let data = store.publish_ranking_data_immediately("act1");
        assert_eq!(data.rankings.len(), 1);
        assert_eq!(data.previous_activity_id, None);
        assert_eq!(store.ranking_history("act1").unwrap().len(), 1);
    }

    #[test]
    fn immediate_publish_uses_host_ledger_when_initialized() {
        let store = store();
        store.initialize_host_ranking();
        store.update_participants(raw(&[("A", 10), ("B", 5)]));
        store.publish_ranking_data_immediately("act1");
        store.update_participants(raw(&[("A", 5), ("B", 10)]));
        let data = store.publish_ranking_data_immediately("act2");

        assert_eq!(data.change_for("B").unwrap().direction, RankDirection::Up);
        assert!(store.host_ranking_data().unwrap().previous.is_some());
    }

    #[test]
    fn ranking_position_data_defaults_to_all_new() {
        let store = store();
        assert!(store.ranking_position_data().rankings.is_empty());
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let store = store();
        let _faulty = store.subscribe(|_| panic!("listener failure"));
        let (seen, _subscription) = record_participants(&store);

        store.update_participants(raw(&[("Alice", 1)]));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn reset_forgets_rankings() {
        let store = store();
        store.update_participants(raw(&[("Alice", 1)]));
        store.save_current_ranking_snapshot("act1");
        store.set_host_participating(true);
        assert_eq!(store.last_activity_id().as_deref(), Some("act1"));

        store.reset();
        assert!(store.participants().is_empty());
        assert!(store.ranking_history("act1").is_none());
        assert!(store.last_activity_id().is_none());
        assert!(store.is_host_participating());
    }
}
