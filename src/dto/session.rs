use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dto::participant::{RawParticipant, deserialize_participants};

/// Generic `{ data: T }` envelope used by most session topics.
#[derive(Debug, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Payload of the session start topic.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStart {
    pub session_code: String,
    #[serde(default)]
    pub status: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub session_status: Option<String>,
    #[serde(default)]
    pub current_activity_id: Option<String>,
}

/// One quiz question or round pushed on the next-activity topic.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub activity_id: String,
    #[serde(default)]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Type-specific content (options, locations, ...), passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Summary pushed on the session end topic.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub session_code: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "deserialize_participants")]
    pub participants: Vec<RawParticipant>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionSummary {
    /// Drop the participant named `name` from the summary.
    pub fn without_participant(mut self, name: &str) -> Self {
        self.participants.retain(|participant| !participant.is_named(name));
        self
    }
}

/// Per-participant final result on the session summary topic.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionSummary {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub display_avatar: Option<String>,
    #[serde(default)]
    pub final_score: Option<f64>,
    #[serde(default)]
    pub final_ranking: Option<u32>,
    #[serde(default)]
    pub correct_answers: Option<u32>,
    #[serde(default)]
    pub total_questions: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The summary topic sends either one summary or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    /// Flatten into a list.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// `{ success, data }` envelope of the session summary topic.
#[derive(Debug, Deserialize)]
pub struct SummaryEnvelope {
    #[serde(default)]
    pub success: Option<bool>,
    pub data: OneOrMany<EndSessionSummary>,
}

/// One structured error from the private error queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// `{ success: false, errors: [...] }` envelope of the private error queue.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

/// An achievement unlocked by the current user.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub points_reward: Option<u32>,
}

/// Payload of the private achievements queue.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementUnlock {
    pub user_id: String,
    #[serde(default)]
    pub total_points: u64,
    #[serde(default)]
    pub new_achievements: Vec<Achievement>,
}

/// `{ success: true, data: ... }` envelope of the private achievements queue.
#[derive(Debug, Deserialize)]
pub struct AchievementEnvelope {
    #[serde(default)]
    pub success: Option<bool>,
    pub data: AchievementUnlock,
}
