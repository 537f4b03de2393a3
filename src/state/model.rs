use std::collections::HashMap;

use serde::Serialize;

/// Zero-based leaderboard position keyed by display name.
pub type PositionMap = HashMap<String, usize>;

/// Participant after sanitisation and ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedParticipant {
    /// Server-side identifier, when the server sent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name, used as the ranking key within a session.
    pub display_name: String,
    /// Avatar URL, or a deterministic placeholder.
    pub display_avatar: String,
    /// Non-negative score.
    pub score: u64,
    /// One-based rank derived from the score ordering.
    pub rank: u32,
}

/// Immutable ranked list recorded for one activity.
pub type RankingSnapshot = Vec<RankedParticipant>;

/// Direction of a rank movement between two rankings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankDirection {
    /// Moved towards the top.
    Up,
    /// Moved towards the bottom.
    Down,
    /// Kept the same position.
    Same,
    /// No previous position is known.
    New,
}

/// Movement of one participant between two rankings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankChange {
    /// Rank in the earlier ranking, if the participant was present.
    pub previous: Option<u32>,
    /// Rank in the current ranking.
    pub current: u32,
    /// Absolute number of positions moved.
    pub delta: u32,
    /// Sign of the movement.
    pub direction: RankDirection,
}

impl RankChange {
    /// Change for a participant without any recorded position.
    pub fn new_entry(current: u32) -> Self {
        Self {
            previous: None,
            current,
            delta: 0,
            direction: RankDirection::New,
        }
    }

    /// Classify the move from `previous` to `current` (both one-based).
    pub fn between(previous: u32, current: u32) -> Self {
        let direction = match previous.cmp(&current) {
            std::cmp::Ordering::Greater => RankDirection::Up,
            std::cmp::Ordering::Less => RankDirection::Down,
            std::cmp::Ordering::Equal => RankDirection::Same,
        };
        Self {
            previous: Some(previous),
            current,
            delta: previous.abs_diff(current),
            direction,
        }
    }
}

/// A ranked participant paired with its movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    /// Participant as ranked in the current ranking.
    pub participant: RankedParticipant,
    /// Movement compared to the earlier ranking.
    pub change: RankChange,
}

/// Event delivered to ranking-change listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingChangeData {
    /// Activity the comparison starts from, `None` for a fresh ranking.
    pub previous_activity_id: Option<String>,
    /// Activity the current ranking was recorded for.
    pub current_activity_id: Option<String>,
    /// Ranked participants in current order with their movement.
    pub rankings: Vec<RankingEntry>,
    /// RFC 3339 timestamp of when the data was computed.
    pub generated_at: String,
}

impl RankingChangeData {
    /// Look up the movement of a participant by display name.
    pub fn change_for(&self, display_name: &str) -> Option<&RankChange> {
        self.rankings
            .iter()
            .rev()
            .find(|entry| entry.participant.display_name == display_name)
            .map(|entry| &entry.change)
    }
}

/// Host-facing before/after comparison across finished activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRankingData {
    /// Positions after the most recently finished activity.
    pub current: Option<PositionMap>,
    /// Positions after the activity finished before that.
    pub previous: Option<PositionMap>,
    /// Ranked participants with their movement between the two slots.
    pub rankings: Vec<RankingEntry>,
}

/// Answer progress for the current activity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsEventRatio {
    /// Participant updates received for the current activity.
    pub count: usize,
    /// Last known participant total.
    pub total: usize,
    /// `count / total` as a whole percentage.
    pub percentage: u8,
}

impl ParticipantsEventRatio {
    /// Build a ratio, capping `count` at `total`.
    pub fn new(count: usize, total: usize) -> Self {
        let count = count.min(total);
        let percentage = if total == 0 {
            0
        } else {
            ((count * 100) as f64 / total as f64).round() as u8
        };
        Self {
            count,
            total,
            percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_change_between_classifies_sign() {
        let up = RankChange::between(3, 1);
        assert_eq!(up.direction, RankDirection::Up);
        assert_eq!(up.delta, 2);

        let down = RankChange::between(1, 4);
        assert_eq!(down.direction, RankDirection::Down);
        assert_eq!(down.delta, 3);

        let same = RankChange::between(2, 2);
        assert_eq!(same.direction, RankDirection::Same);
        assert_eq!(same.delta, 0);
    }

    #[test]
    fn ratio_caps_count_at_total() {
        let ratio = ParticipantsEventRatio::new(7, 4);
        assert_eq!(ratio.count, 4);
        assert_eq!(ratio.percentage, 100);

        let ratio = ParticipantsEventRatio::new(1, 3);
        assert_eq!(ratio.percentage, 33);

        let empty = ParticipantsEventRatio::new(2, 0);
        assert_eq!(empty.count, 0);
        assert_eq!(empty.percentage, 0);
    }

    #[test]
    fn rank_direction_serializes_in_snake_case() {
        let json = serde_json::to_string(&RankChange::new_entry(1)).unwrap();
        assert_eq!(
            json,
            r#"{"previous":null,"current":1,"delta":0,"direction":"new"}"#
        );
    }
}
