use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Participant record as pushed by the session server.
///
/// Every field is optional and decoded leniently: ids may be numbers, a
/// field of the wrong type reads as missing. The record is sanitised by
/// [`crate::ranking::normalize_and_rank`] before use.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParticipant {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub display_avatar: Option<String>,
    #[serde(default, deserialize_with = "lenient_score")]
    pub score: Option<f64>,
}

impl RawParticipant {
    /// Convenience constructor used by callers that already know name and score.
    pub fn named(display_name: impl Into<String>, score: u64) -> Self {
        Self {
            display_name: Some(display_name.into()),
            score: Some(score as f64),
            ..Self::default()
        }
    }

    /// Whether this record carries the display name `name`, ignoring
    /// surrounding whitespace the way ranking does.
    pub fn is_named(&self, name: &str) -> bool {
        self.display_name.as_deref().map(str::trim) == Some(name)
    }
}

/// `{ data: Participant[] }` frame body on the participants topic.
#[derive(Debug, Deserialize)]
pub struct ParticipantsEnvelope {
    #[serde(default)]
    pub data: Value,
}

/// Decode a JSON value that should hold an array of participants.
///
/// Returns `None` (after logging) when the value is not an array. Entries that
/// are not participant objects are skipped individually.
pub fn participants_from_value(value: &Value) -> Option<Vec<RawParticipant>> {
    let Value::Array(items) = value else {
        warn!(kind = value_kind(value), "participants payload is not an array; dropping");
        return None;
    };

    let participants = items
        .iter()
        .enumerate()
        .filter_map(
            |(index, item)| match RawParticipant::deserialize(item) {
                Ok(participant) => Some(participant),
                Err(err) => {
                    warn!(index, error = %err, "skipping malformed participant entry");
                    None
                }
            },
        )
        .collect();

    Some(participants)
}

/// Serde adapter for participant lists nested in other payloads.
///
/// Follows [`participants_from_value`]: a non-array reads as an empty list and
/// non-object entries are skipped.
pub fn deserialize_participants<'de, D>(deserializer: D) -> Result<Vec<RawParticipant>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(participants_from_value(&value).unwrap_or_default())
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_camel_case_fields() {
        let value = json!([{ "id": "p1", "displayName": "Alice", "displayAvatar": "a.png", "score": 40 }]);
        let participants = participants_from_value(&value).unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].display_name.as_deref(), Some("Alice"));
        assert_eq!(participants[0].score, Some(40.0));
    }

    #[test]
    fn non_array_payload_is_dropped() {
        assert!(participants_from_value(&json!({ "displayName": "Alice" })).is_none());
        assert!(participants_from_value(&Value::Null).is_none());
    }

    #[test]
    fn only_non_object_entries_are_skipped() {
        let value = json!([42, { "displayName": "Bob", "score": null }, { "score": "high" }]);
        let participants = participants_from_value(&value).unwrap();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].display_name.as_deref(), Some("Bob"));
        assert_eq!(participants[0].score, None);
        assert_eq!(participants[1].display_name, None);
        assert_eq!(participants[1].score, None);
    }

    #[test]
    fn numeric_ids_are_kept_as_text() {
        let value = json!([
            { "id": 5, "userId": 12, "displayName": "Alice", "score": 50 },
            { "id": "p2", "displayName": "Bob", "score": "10" }
        ]);
        let participants = participants_from_value(&value).unwrap();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].id.as_deref(), Some("5"));
        assert_eq!(participants[0].user_id.as_deref(), Some("12"));
        assert_eq!(participants[1].id.as_deref(), Some("p2"));
        assert_eq!(participants[1].score, Some(10.0));
    }

    #[test]
    fn host_match_ignores_surrounding_whitespace() {
        assert!(RawParticipant::named(" Host ", 0).is_named("Host"));
        assert!(!RawParticipant::named("Hostess", 0).is_named("Host"));
    }
}
