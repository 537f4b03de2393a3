use std::sync::{Arc, Weak};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    dto::{
        session::{AchievementUnlock, Activity, EndSessionSummary, SessionStart, SessionSummary},
        sse::{ConnectionStatusEvent, ServerEvent, SessionErrorEvent},
    },
    error::ChannelError,
    services::session_channel::ConnectionStatus,
    state::{
        AppState, SharedState,
        model::{RankedParticipant, RankingChangeData},
    },
};

const EVENT_PARTICIPANTS_UPDATED: &str = "participants.updated";
const EVENT_RANKING_CHANGED: &str = "ranking.changed";
const EVENT_SESSION_STARTED: &str = "session.started";
const EVENT_ACTIVITY_NEXT: &str = "activity.next";
const EVENT_SESSION_ENDED: &str = "session.ended";
const EVENT_SESSION_SUMMARY: &str = "session.summary";
const EVENT_ACHIEVEMENT_UNLOCKED: &str = "achievement.unlocked";
const EVENT_CONNECTION_STATUS: &str = "connection.status";
const EVENT_SESSION_ERROR: &str = "session.error";

/// Wire store listeners and channel callbacks to the public SSE hub.
///
/// Closures hold a [`Weak`] handle so the state can still be dropped.
pub fn install(state: &SharedState) {
    let store = state.store();

    let weak = Arc::downgrade(state);
    store
        .subscribe(move |participants: &Vec<RankedParticipant>| {
            with_state(&weak, |state| broadcast_participants(state, participants))
        })
        .detach();

    let weak = Arc::downgrade(state);
    store
        .subscribe_to_ranking_changes(move |data: &RankingChangeData| {
            with_state(&weak, |state| broadcast_ranking_changed(state, data))
        })
        .detach();

    let channel = state.channel();

    let weak = Arc::downgrade(state);
    channel.on_connection_status(move |status| {
        with_state(&weak, |state| broadcast_connection_status(state, *status))
    });

    let weak = Arc::downgrade(state);
    channel.on_error(move |err| with_state(&weak, |state| broadcast_session_error(state, err)));

    let weak = Arc::downgrade(state);
    channel.on_session_start(move |start| {
        with_state(&weak, |state| handle_session_started(state, start))
    });

    let weak = Arc::downgrade(state);
    channel.on_next_activity(move |activity| {
        with_state(&weak, |state| handle_next_activity(state, activity))
    });

    let weak = Arc::downgrade(state);
    channel.on_session_end(move |summary| {
        with_state(&weak, |state| handle_session_ended(state, summary))
    });

    let weak = Arc::downgrade(state);
    channel.on_session_summary(move |summaries| {
        with_state(&weak, |state| broadcast_session_summary(state, summaries))
    });

    let weak = Arc::downgrade(state);
    channel.on_achievement(move |unlock| {
        with_state(&weak, |state| broadcast_achievement(state, unlock))
    });

    debug!(session = %state.config().session_code, "SSE bridge installed");
}

/// Broadcast the throttled participants list.
pub fn broadcast_participants(state: &AppState, participants: &[RankedParticipant]) {
    send_public_event(state, EVENT_PARTICIPANTS_UPDATED, &participants);
}

/// Broadcast a ranking movement event.
pub fn broadcast_ranking_changed(state: &AppState, data: &RankingChangeData) {
    send_public_event(state, EVENT_RANKING_CHANGED, data);
}

/// Broadcast a link status change.
pub fn broadcast_connection_status(state: &AppState, status: ConnectionStatus) {
    send_public_event(
        state,
        EVENT_CONNECTION_STATUS,
        &ConnectionStatusEvent { status },
    );
}

/// Broadcast a channel error.
pub fn broadcast_session_error(state: &AppState, err: &ChannelError) {
    send_public_event(state, EVENT_SESSION_ERROR, &SessionErrorEvent::from(err));
}

/// Track the activity the session starts on and broadcast the start.
///
/// A session restarted after it ended gets its store registered again.
pub fn handle_session_started(state: &AppState, start: &SessionStart) {
    state.registry().register(state.store().clone());
    state.replace_current_activity(start.current_activity_id.clone());
    send_public_event(state, EVENT_SESSION_STARTED, start);
}

/// Settle the ranking of the activity that just ended, then broadcast the new one.
pub fn handle_next_activity(state: &AppState, activity: &Activity) {
    let previous = state.replace_current_activity(Some(activity.activity_id.clone()));
    if let Some(previous) = previous.filter(|id| *id != activity.activity_id) {
        state.store().publish_ranking_data_immediately(&previous);
    }
    send_public_event(state, EVENT_ACTIVITY_NEXT, activity);
}

/// Settle the last activity, broadcast the end of the session, then drop
/// its rankings and evict it from the registry.
pub fn handle_session_ended(state: &AppState, summary: &SessionSummary) {
    let store = state.store();
    if let Some(last) = state.replace_current_activity(None) {
        store.publish_ranking_data_immediately(&last);
    }
    send_public_event(state, EVENT_SESSION_ENDED, summary);

    store.clear_host_ranking();
    store.reset();
    if state.registry().remove(store.session_code()).is_some() {
        info!(session = %store.session_code(), "session ended; leaderboard evicted");
    }
}

/// Broadcast per-participant final results.
pub fn broadcast_session_summary(state: &AppState, summaries: &[EndSessionSummary]) {
    send_public_event(state, EVENT_SESSION_SUMMARY, &summaries);
}

/// Broadcast achievements unlocked by the relay user.
pub fn broadcast_achievement(state: &AppState, unlock: &AchievementUnlock) {
    send_public_event(state, EVENT_ACHIEVEMENT_UNLOCKED, unlock);
}

fn with_state(weak: &Weak<AppState>, f: impl FnOnce(&AppState)) {
    if let Some(state) = weak.upgrade() {
        f(&state);
    }
}

fn send_public_event(state: &AppState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}
