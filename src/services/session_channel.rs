use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    time::Duration,
};

use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        outbound::{
            ActivitySubmission, JoinRequest, LeaveRequest, NextActivityRequest, SessionIdRequest,
            SubmitRequest,
        },
        participant::{ParticipantsEnvelope, participants_from_value},
        session::{
            AchievementEnvelope, AchievementUnlock, Activity, DataEnvelope, EndSessionSummary,
            ErrorEnvelope, SessionStart, SessionSummary, SummaryEnvelope,
        },
    },
    error::ChannelError,
    ranking::{HOST_DISPLAY_NAME, normalize_and_rank},
    services::{
        progress::ParticipantEventCounter,
        stomp::{StompCommand, StompFrame},
        transport::{Connector, StompLink, TransportError},
    },
    state::{
        leaderboard::LeaderboardStore,
        listeners::invoke_guarded,
        model::{HostRankingData, ParticipantsEventRatio, RankedParticipant, RankingChangeData},
    },
};

/// Default delay between reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Default time allowed for the transport and STOMP handshakes.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of the link to the session server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// `connect` has not been called yet.
    Idle,
    /// A connection attempt is in progress.
    Connecting,
    /// Handshake done and topics subscribed.
    Connected,
    /// The link closed or the channel was disconnected.
    Disconnected,
    /// The last connection attempt failed.
    ConnectionError,
}

/// Tunables for a [`SessionChannel`].
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Fixed delay before reconnecting after a failure.
    pub reconnect_delay: Duration,
    /// Limit for opening the transport and for the STOMP handshake.
    pub connect_timeout: Duration,
    /// Value of the STOMP `host` header.
    pub virtual_host: String,
    /// Heart-beat interval advertised in the CONNECT frame; zero disables it.
    pub heartbeat: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            virtual_host: "/".into(),
            heartbeat: Duration::ZERO,
        }
    }
}

/// Inbound topics the channel subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Participants,
    SessionStart,
    NextActivity,
    SessionEnd,
    SessionSummary,
    Errors,
    Achievements,
}

impl Topic {
    /// Every topic, in subscription order.
    pub const ALL: [Topic; 7] = [
        Topic::Participants,
        Topic::SessionStart,
        Topic::NextActivity,
        Topic::SessionEnd,
        Topic::SessionSummary,
        Topic::Errors,
        Topic::Achievements,
    ];

    /// STOMP destination of this topic for `session_code`.
    pub fn destination(self, session_code: &str) -> String {
        match self {
            Topic::Participants => format!("/topic/session/{session_code}/participants"),
            Topic::SessionStart => format!("/topic/session/{session_code}/start"),
            Topic::NextActivity => format!("/topic/session/{session_code}/nextActivity"),
            Topic::SessionEnd => format!("/topic/session/{session_code}/end"),
            Topic::SessionSummary => format!("/topic/session/{session_code}/summary"),
            Topic::Errors => "/user/queue/errors".into(),
            Topic::Achievements => "/user/queue/achievements".into(),
        }
    }
}

fn action_destination(session_code: &str, action: &str) -> String {
    format!("/app/session/{session_code}/{action}")
}

type Callback<T> = Option<Arc<dyn Fn(&T) + Send + Sync>>;

#[derive(Default)]
struct Callbacks {
    participants: Callback<Vec<RankedParticipant>>,
    connection_status: Callback<ConnectionStatus>,
    error: Callback<ChannelError>,
    session_start: Callback<SessionStart>,
    next_activity: Callback<Activity>,
    session_end: Callback<SessionSummary>,
    session_summary: Callback<Vec<EndSessionSummary>>,
    achievement: Callback<AchievementUnlock>,
}

struct Supervisor {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

enum LinkEnd {
    Shutdown,
    Lost(Option<TransportError>),
}

/// Client side of one live quiz session.
///
/// Forwards participant snapshots into the shared [`LeaderboardStore`],
/// exposes typed outbound actions, and invokes registered callbacks for
/// session lifecycle events. Ranking state lives in the store and survives
/// reconnects and `disconnect`.
pub struct SessionChannel {
    session_code: String,
    store: Arc<LeaderboardStore>,
    connector: Arc<dyn Connector>,
    settings: ChannelSettings,
    callbacks: RwLock<Callbacks>,
    status: watch::Sender<ConnectionStatus>,
    outbound: Mutex<Option<mpsc::UnboundedSender<StompFrame>>>,
    counter: Mutex<ParticipantEventCounter>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl SessionChannel {
    /// Build a channel for `session_code` feeding `store`.
    pub fn new(
        session_code: impl Into<String>,
        store: Arc<LeaderboardStore>,
        connector: Arc<dyn Connector>,
        settings: ChannelSettings,
    ) -> Arc<Self> {
        let (status, _rx) = watch::channel(ConnectionStatus::Idle);
        Arc::new(Self {
            session_code: session_code.into(),
            store,
            connector,
            settings,
            callbacks: RwLock::new(Callbacks::default()),
            status,
            outbound: Mutex::new(None),
            counter: Mutex::new(ParticipantEventCounter::default()),
            supervisor: Mutex::new(None),
        })
    }

    /// Session code this channel is bound to.
    pub fn session_code(&self) -> &str {
        &self.session_code
    }

    /// Shared leaderboard store fed by this channel.
    pub fn store(&self) -> &Arc<LeaderboardStore> {
        &self.store
    }

    /// Start the connection supervisor; it reconnects with a fixed delay until
    /// [`SessionChannel::disconnect`] is called. Calling it twice is a no-op.
    pub fn connect(self: &Arc<Self>) {
        let mut slot = lock(&self.supervisor);
        if slot.as_ref().is_some_and(|supervisor| !supervisor.task.is_finished()) {
            debug!(session = %self.session_code, "connect called while already running");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let channel = self.clone();
        let task = tokio::spawn(async move { channel.run_supervisor(shutdown_rx).await });
        *slot = Some(Supervisor { shutdown, task });
    }

    /// Unsubscribe every topic and close the link. Ranking state is kept.
    pub async fn disconnect(&self) {
        let supervisor = lock(&self.supervisor).take();
        if let Some(Supervisor { shutdown, task }) = supervisor {
            let _ = shutdown.send(true);
            if let Err(err) = task.await {
                warn!(session = %self.session_code, error = %err, "connection supervisor ended abnormally");
            }
        }
        lock(&self.outbound).take();
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Current connection status.
    pub fn connection_status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Receiver notified on every connection status change.
    pub fn status_watcher(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Register the callback receiving ranked participants (host filtered out).
    pub fn on_participants_update(&self, f: impl Fn(&Vec<RankedParticipant>) + Send + Sync + 'static) {
        self.write_callbacks().participants = Some(Arc::new(f));
    }

    /// Register the callback receiving connection status changes.
    pub fn on_connection_status(&self, f: impl Fn(&ConnectionStatus) + Send + Sync + 'static) {
        self.write_callbacks().connection_status = Some(Arc::new(f));
    }

    /// Register the callback receiving transport, server, and precondition errors.
    pub fn on_error(&self, f: impl Fn(&ChannelError) + Send + Sync + 'static) {
        self.write_callbacks().error = Some(Arc::new(f));
    }

    /// Register the callback receiving session start events.
    pub fn on_session_start(&self, f: impl Fn(&SessionStart) + Send + Sync + 'static) {
        self.write_callbacks().session_start = Some(Arc::new(f));
    }

    /// Register the callback receiving the next activity.
    pub fn on_next_activity(&self, f: impl Fn(&Activity) + Send + Sync + 'static) {
        self.write_callbacks().next_activity = Some(Arc::new(f));
    }

    /// Register the callback receiving the session end summary.
    pub fn on_session_end(&self, f: impl Fn(&SessionSummary) + Send + Sync + 'static) {
        self.write_callbacks().session_end = Some(Arc::new(f));
    }

    /// Register the callback receiving per-participant final results.
    pub fn on_session_summary(&self, f: impl Fn(&Vec<EndSessionSummary>) + Send + Sync + 'static) {
        self.write_callbacks().session_summary = Some(Arc::new(f));
    }

    /// Register the callback receiving unlocked achievements.
    pub fn on_achievement(&self, f: impl Fn(&AchievementUnlock) + Send + Sync + 'static) {
        self.write_callbacks().achievement = Some(Arc::new(f));
    }

    /// Join the session. Joining as the host sentinel marks the host as not competing.
    pub fn join_session(
        &self,
        display_name: &str,
        user_id: Option<&str>,
        display_avatar: Option<&str>,
    ) -> Result<(), ChannelError> {
        let payload = JoinRequest {
            session_code: self.session_code.clone(),
            display_name: display_name.to_string(),
            display_avatar: display_avatar.map(str::to_string),
            user_id: user_id.map(str::to_string),
        };
        self.send("join session", "join", &payload)?;
        self.store
            .set_host_participating(display_name.trim() != HOST_DISPLAY_NAME);
        Ok(())
    }

    /// Leave the session.
    pub fn leave_session(&self) -> Result<(), ChannelError> {
        let payload = LeaveRequest {
            session_code: self.session_code.clone(),
        };
        self.send("leave session", "leave", &payload)
    }

    /// Start the session as host and begin the host ranking ledger.
    pub fn start_session(&self, session_id: &str) -> Result<(), ChannelError> {
        let payload = SessionIdRequest {
            session_id: session_id.to_string(),
        };
        self.send("start session", "start", &payload)?;
        self.store.initialize_host_ranking();
        Ok(())
    }

    /// Submit an answer for the current activity.
    pub fn submit_activity(&self, submission: ActivitySubmission) -> Result<(), ChannelError> {
        let payload = SubmitRequest::from_submission(&self.session_code, submission);
        self.send("submit activity", "submit", &payload)
    }

    /// Ask the server to move to the next activity.
    pub fn next_activity(
        &self,
        session_id: &str,
        activity_id: Option<&str>,
    ) -> Result<(), ChannelError> {
        let payload = NextActivityRequest {
            session_id: session_id.to_string(),
            activity_id: activity_id.map(str::to_string),
        };
        self.send("advance activity", "nextActivity", &payload)?;
        lock(&self.counter).reset();
        Ok(())
    }

    /// End the session as host and drop the host ranking ledger.
    pub fn end_session(&self, session_id: &str) -> Result<(), ChannelError> {
        let payload = SessionIdRequest {
            session_id: session_id.to_string(),
        };
        self.send("end session", "complete", &payload)?;
        self.store.clear_host_ranking();
        Ok(())
    }

    /// Participant updates received for the current activity versus the participant total.
    pub fn participants_event_ratio(&self) -> ParticipantsEventRatio {
        lock(&self.counter).ratio()
    }

    /// Host before/after view from the shared store.
    pub fn host_ranking_data(&self) -> Option<HostRankingData> {
        self.store.host_ranking_data()
    }

    /// Latest participant-facing ranking movement from the shared store.
    pub fn ranking_position_data(&self) -> RankingChangeData {
        self.store.ranking_position_data()
    }

    /// Whether the host currently competes.
    pub fn is_host_participating(&self) -> bool {
        self.store.is_host_participating()
    }

    fn send<T: Serialize>(
        &self,
        action: &'static str,
        endpoint: &str,
        payload: &T,
    ) -> Result<(), ChannelError> {
        let sender = lock(&self.outbound).clone();
        let sender = match sender {
            Some(sender) if self.connection_status() == ConnectionStatus::Connected => sender,
            _ => return Err(self.fail(ChannelError::NotConnected { action })),
        };

        let body = serde_json::to_string(payload).map_err(|err| self.fail(err.into()))?;
        let destination = action_destination(&self.session_code, endpoint);
        sender
            .send(StompFrame::send_json(&destination, body))
            .map_err(|_| self.fail(ChannelError::Transport(TransportError::Closed)))?;
        debug!(session = %self.session_code, action, %destination, "action sent");
        Ok(())
    }

    /// Report `err` to the error callback and hand it back to the caller.
    fn fail(&self, err: ChannelError) -> ChannelError {
        warn!(session = %self.session_code, error = %err, "session channel error");
        self.report_error(&err);
        err
    }

    fn report_error(&self, err: &ChannelError) {
        let callback = self.read_callbacks().error.clone();
        if let Some(callback) = callback {
            invoke_guarded("error", callback.as_ref(), err);
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous == status {
            return;
        }
        info!(session = %self.session_code, ?previous, ?status, "connection status changed");
        let callback = self.read_callbacks().connection_status.clone();
        if let Some(callback) = callback {
            invoke_guarded("connection_status", callback.as_ref(), &status);
        }
    }

    async fn run_supervisor(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_status(ConnectionStatus::Connecting);
            let attempt = tokio::select! {
                attempt = self.establish() => attempt,
                _ = shutdown.changed() => break,
            };
            match attempt {
                Ok(link) => match self.run_link(link, &mut shutdown).await {
                    LinkEnd::Shutdown => break,
                    LinkEnd::Lost(reason) => {
                        self.set_status(ConnectionStatus::Disconnected);
                        match reason {
                            Some(err) => {
                                warn!(session = %self.session_code, error = %err, "session link lost");
                                self.report_error(&ChannelError::Transport(err));
                            }
                            None => info!(session = %self.session_code, "session link closed"),
                        }
                    }
                },
                Err(err) => {
                    warn!(session = %self.session_code, error = %err, "connection attempt failed");
                    self.set_status(ConnectionStatus::ConnectionError);
                    self.report_error(&ChannelError::Transport(err));
                }
            }

            tokio::select! {
                _ = sleep(self.settings.reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }
        }
        debug!(session = %self.session_code, "connection supervisor stopped");
    }

    /// Open the transport and complete the STOMP handshake.
    async fn establish(&self) -> Result<StompLink, TransportError> {
        let limit = self.settings.connect_timeout;
        let mut link = timeout(limit, self.connector.connect())
            .await
            .map_err(|_| TransportError::Timeout("transport connection"))??;

        link.outbound
            .send(StompFrame::connect(
                &self.settings.virtual_host,
                self.settings.heartbeat.as_millis() as u64,
            ))
            .map_err(|_| TransportError::Closed)?;

        let reply = timeout(limit, link.inbound.recv())
            .await
            .map_err(|_| TransportError::Timeout("CONNECTED frame"))?
            .ok_or(TransportError::Closed)??;

        match reply.command {
            StompCommand::Connected => Ok(link),
            StompCommand::Error => Err(TransportError::Server(error_message(&reply))),
            other => Err(TransportError::Server(format!(
                "expected CONNECTED, got {other}"
            ))),
        }
    }

    /// Subscribe every topic and pump frames until the link ends.
    async fn run_link(
        &self,
        mut link: StompLink,
        shutdown: &mut watch::Receiver<bool>,
    ) -> LinkEnd {
        let mut subscriptions = HashMap::new();
        for (index, topic) in Topic::ALL.into_iter().enumerate() {
            let id = format!("sub-{index}");
            let destination = topic.destination(&self.session_code);
            if link
                .outbound
                .send(StompFrame::subscribe(&id, &destination))
                .is_err()
            {
                return LinkEnd::Lost(Some(TransportError::Closed));
            }
            subscriptions.insert(id, topic);
        }

        *lock(&self.outbound) = Some(link.outbound.clone());
        self.set_status(ConnectionStatus::Connected);

        let end = loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    for id in subscriptions.keys() {
                        let _ = link.outbound.send(StompFrame::unsubscribe(id));
                    }
                    let _ = link.outbound.send(StompFrame::new(StompCommand::Disconnect));
                    break LinkEnd::Shutdown;
                }
                frame = link.inbound.recv() => match frame {
                    Some(Ok(frame)) => {
                        if let Some(err) = self.handle_frame(&subscriptions, frame) {
                            break LinkEnd::Lost(Some(err));
                        }
                    }
                    Some(Err(err)) => {
                        warn!(session = %self.session_code, error = %err, "dropping undecodable frame");
                    }
                    None => break LinkEnd::Lost(None),
                },
            }
        };

        lock(&self.outbound).take();
        end
    }

    /// Route one inbound frame; returns an error when the link must be dropped.
    fn handle_frame(
        &self,
        subscriptions: &HashMap<String, Topic>,
        frame: StompFrame,
    ) -> Option<TransportError> {
        match frame.command {
            StompCommand::Message => {
                let topic = frame
                    .header_value("subscription")
                    .and_then(|id| subscriptions.get(id).copied())
                    .or_else(|| {
                        let destination = frame.header_value("destination")?;
                        Topic::ALL
                            .into_iter()
                            .find(|topic| topic.destination(&self.session_code) == destination)
                    });
                match topic {
                    Some(topic) => self.dispatch(topic, &frame.body),
                    None => debug!(session = %self.session_code, "message for unknown subscription"),
                }
                None
            }
            StompCommand::Error => Some(TransportError::Server(error_message(&frame))),
            other => {
                debug!(session = %self.session_code, command = %other, "ignoring frame");
                None
            }
        }
    }

    /// Decode and handle a message body; a bad payload only affects its own topic.
    fn dispatch(&self, topic: Topic, body: &str) {
        let result = match topic {
            Topic::Participants => self.handle_participants(body),
            Topic::SessionStart => self.handle_session_start(body),
            Topic::NextActivity => self.handle_next_activity(body),
            Topic::SessionEnd => self.handle_session_end(body),
            Topic::SessionSummary => self.handle_session_summary(body),
            Topic::Errors => self.handle_error_queue(body),
            Topic::Achievements => self.handle_achievement(body),
        };

        if let Err(err) = result {
            warn!(session = %self.session_code, ?topic, error = %err, "dropping malformed payload");
        }
    }

    fn handle_participants(&self, body: &str) -> serde_json::Result<()> {
        let envelope: ParticipantsEnvelope = serde_json::from_str(body)?;
        let Some(raw) = participants_from_value(&envelope.data) else {
            return Ok(());
        };

        let participants: Vec<_> = raw
            .into_iter()
            .filter(|participant| !participant.is_named(HOST_DISPLAY_NAME))
            .collect();
        lock(&self.counter).record(participants.len());

        let ranked = normalize_and_rank(&participants, self.store.is_host_participating());
        self.store.update_participants(participants);

        let callback = self.read_callbacks().participants.clone();
        if let Some(callback) = callback {
            invoke_guarded("participants", callback.as_ref(), &ranked);
        }
        Ok(())
    }

    fn handle_session_start(&self, body: &str) -> serde_json::Result<()> {
        let start = decode_data::<SessionStart>(body)?;
        info!(session = %self.session_code, session_id = %start.session_id, "session started");
        let callback = self.read_callbacks().session_start.clone();
        if let Some(callback) = callback {
            invoke_guarded("session_start", callback.as_ref(), &start);
        }
        Ok(())
    }

    fn handle_next_activity(&self, body: &str) -> serde_json::Result<()> {
        let activity = decode_data::<Activity>(body)?;
        lock(&self.counter).reset();
        info!(session = %self.session_code, activity_id = %activity.activity_id, "next activity");
        let callback = self.read_callbacks().next_activity.clone();
        if let Some(callback) = callback {
            invoke_guarded("next_activity", callback.as_ref(), &activity);
        }
        Ok(())
    }

    fn handle_session_end(&self, body: &str) -> serde_json::Result<()> {
        let summary = decode_data::<SessionSummary>(body)?.without_participant(HOST_DISPLAY_NAME);
        info!(session = %self.session_code, "session ended");
        let callback = self.read_callbacks().session_end.clone();
        if let Some(callback) = callback {
            invoke_guarded("session_end", callback.as_ref(), &summary);
        }
        Ok(())
    }

    fn handle_session_summary(&self, body: &str) -> serde_json::Result<()> {
        let envelope: SummaryEnvelope = serde_json::from_str(body)?;
        if envelope.success == Some(false) {
            warn!(session = %self.session_code, "server reported an unsuccessful session summary");
        }
        let summaries: Vec<_> = envelope
            .data
            .into_vec()
            .into_iter()
            .filter(|summary| summary.display_name.as_deref() != Some(HOST_DISPLAY_NAME))
            .collect();
        let callback = self.read_callbacks().session_summary.clone();
        if let Some(callback) = callback {
            invoke_guarded("session_summary", callback.as_ref(), &summaries);
        }
        Ok(())
    }

    fn handle_error_queue(&self, body: &str) -> serde_json::Result<()> {
        let envelope: ErrorEnvelope = serde_json::from_str(body)?;
        for detail in envelope.errors {
            self.report_error(&ChannelError::Server {
                code: detail.code,
                message: detail.message,
            });
        }
        Ok(())
    }

    fn handle_achievement(&self, body: &str) -> serde_json::Result<()> {
        let envelope: AchievementEnvelope = serde_json::from_str(body)?;
        let unlock = envelope.data;
        info!(
            session = %self.session_code,
            user_id = %unlock.user_id,
            unlocked = unlock.new_achievements.len(),
            "achievements unlocked"
        );
        let callback = self.read_callbacks().achievement.clone();
        if let Some(callback) = callback {
            invoke_guarded("achievement", callback.as_ref(), &unlock);
        }
        Ok(())
    }

    fn read_callbacks(&self) -> std::sync::RwLockReadGuard<'_, Callbacks> {
        self.callbacks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_callbacks(&self) -> std::sync::RwLockWriteGuard<'_, Callbacks> {
        self.callbacks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode_data<T: DeserializeOwned>(body: &str) -> serde_json::Result<T> {
    serde_json::from_str::<DataEnvelope<T>>(body).map(|envelope| envelope.data)
}

fn error_message(frame: &StompFrame) -> String {
    match (frame.header_value("message"), frame.body.trim()) {
        (Some(message), "") => message.to_string(),
        (Some(message), body) => format!("{message}: {body}"),
        (None, "") => "unspecified STOMP error".to_string(),
        (None, body) => body.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
