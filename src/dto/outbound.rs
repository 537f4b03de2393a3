use serde::Serialize;
use serde_json::Value;

/// Body sent to join a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub session_code: String,
    pub display_name: String,
    pub display_avatar: Option<String>,
    pub user_id: Option<String>,
}

/// Body sent to leave a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub session_code: String,
}

/// Body shared by the host actions that only carry the session id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdRequest {
    pub session_id: String,
}

/// Body sent to advance to the next activity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextActivityRequest {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
}

/// A participant's answer as handed over by the UI.
///
/// `answer_content` is the unified answer format; `location_answers` is the
/// legacy format still accepted by older servers.
#[derive(Debug, Clone, Default)]
pub struct ActivitySubmission {
    pub activity_id: String,
    pub answer_content: Option<Value>,
    pub location_answers: Option<Vec<Value>>,
    pub activity_type: Option<String>,
}

/// Body sent to submit an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub session_code: String,
    pub activity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_answers: Option<Vec<Value>>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
}

impl SubmitRequest {
    /// Build the submit body, preferring `answer_content` over the legacy field.
    pub fn from_submission(session_code: &str, submission: ActivitySubmission) -> Self {
        let ActivitySubmission {
            activity_id,
            answer_content,
            location_answers,
            activity_type,
        } = submission;

        let location_answers = match answer_content {
            Some(_) => None,
            None => location_answers,
        };

        Self {
            session_code: session_code.to_string(),
            activity_id,
            answer_content,
            location_answers,
            activity_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn answer_content_wins_over_location_answers() {
        let request = SubmitRequest::from_submission(
            "ABC123",
            ActivitySubmission {
                activity_id: "a1".into(),
                answer_content: Some(json!({ "choice": 2 })),
                location_answers: Some(vec![json!({ "lat": 1.0, "lng": 2.0 })]),
                activity_type: Some("QUIZ".into()),
            },
        );
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "sessionCode": "ABC123",
                "activityId": "a1",
                "answerContent": { "choice": 2 },
                "type": "QUIZ"
            })
        );
    }

    #[test]
    fn legacy_location_answers_are_kept_without_answer_content() {
        let request = SubmitRequest::from_submission(
            "ABC123",
            ActivitySubmission {
                activity_id: "a2".into(),
                location_answers: Some(vec![json!({ "lat": 1.0, "lng": 2.0 })]),
                ..ActivitySubmission::default()
            },
        );
        assert!(request.answer_content.is_none());
        assert_eq!(request.location_answers.as_ref().map(Vec::len), Some(1));
    }
}
