//! Pure ranking functions: sanitising participant lists, assigning ranks, and
//! computing rank movements between two rankings.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::{
    dto::{format_system_time, participant::RawParticipant},
    state::model::{
        PositionMap, RankChange, RankedParticipant, RankingChangeData, RankingEntry,
        RankingSnapshot,
    },
};

/// Display name reserved for the session organiser.
pub const HOST_DISPLAY_NAME: &str = "Host";
/// Name used when the server sent a participant without one.
pub const UNKNOWN_DISPLAY_NAME: &str = "Unknown";
/// Prefix of the generated placeholder avatar URL; the display name is the seed.
pub const PLACEHOLDER_AVATAR_BASE: &str = "https://api.dicebear.com/7.x/avataaars/svg?seed=";

/// Deterministic placeholder avatar for `display_name`.
pub fn placeholder_avatar(display_name: &str) -> String {
    format!(
        "{PLACEHOLDER_AVATAR_BASE}{}",
        urlencoding::encode(display_name)
    )
}

/// Sanitise a raw participant list and rank it by descending score.
///
/// The host sentinel is dropped unless the host competes. Missing fields get
/// defaults; negative or non-finite scores count as zero. Sorting is stable so
/// equal scores keep their input order.
pub fn normalize_and_rank(
    raw: &[RawParticipant],
    host_participating: bool,
) -> Vec<RankedParticipant> {
    let mut participants: Vec<RankedParticipant> = raw
        .iter()
        .filter(|participant| host_participating || !participant.is_named(HOST_DISPLAY_NAME))
        .map(sanitize)
        .collect();

    participants.sort_by(|a, b| b.score.cmp(&a.score));
    assign_ranks(&mut participants);
    participants
}

fn sanitize(raw: &RawParticipant) -> RankedParticipant {
    let display_name = raw
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_DISPLAY_NAME)
        .to_string();
    let display_avatar = raw
        .display_avatar
        .clone()
        .filter(|avatar| !avatar.trim().is_empty())
        .unwrap_or_else(|| placeholder_avatar(&display_name));
    let score = raw
        .score
        .filter(|score| score.is_finite() && *score > 0.0)
        .map(|score| score as u64)
        .unwrap_or(0);

    RankedParticipant {
        id: raw.id.clone().or_else(|| raw.user_id.clone()),
        display_name,
        display_avatar,
        score,
        rank: 0,
    }
}

fn assign_ranks(participants: &mut [RankedParticipant]) {
    for (index, participant) in participants.iter_mut().enumerate() {
        participant.rank = index as u32 + 1;
    }
}

/// Whether `new` differs from `old` in a way listeners should hear about.
///
/// Participants are matched by display name; a different count, a newcomer, or
/// a changed score or rank all count as a change.
pub fn has_changed(old: &[RankedParticipant], new: &[RankedParticipant]) -> bool {
    if old.len() != new.len() {
        return true;
    }

    let previous = by_name(old);
    new.iter().any(|participant| {
        match previous.get(participant.display_name.as_str()) {
            Some(before) => before.score != participant.score || before.rank != participant.rank,
            None => true,
        }
    })
}

/// Later duplicates overwrite earlier ones.
fn by_name(participants: &[RankedParticipant]) -> HashMap<&str, &RankedParticipant> {
    participants
        .iter()
        .map(|participant| (participant.display_name.as_str(), participant))
        .collect()
}

/// Rank movements of `current` relative to the snapshot recorded for
/// `from_activity_id`.
///
/// `to_activity_id` only labels the comparison; `current` is the ranking it
/// refers to. Participants missing from the earlier snapshot, or every
/// participant when that snapshot does not exist, are marked new.
pub fn diff_ranks(
    current: &[RankedParticipant],
    history: &HashMap<String, RankingSnapshot>,
    from_activity_id: &str,
    to_activity_id: &str,
) -> IndexMap<String, RankChange> {
    let previous = history.get(from_activity_id).map(|snapshot| by_name(snapshot));
    if previous.is_none() {
        tracing::debug!(
            from = from_activity_id,
            to = to_activity_id,
            "no snapshot recorded for previous activity; every participant is new"
        );
    }

    current
        .iter()
        .map(|participant| {
            let change = previous
                .as_ref()
                .and_then(|map| map.get(participant.display_name.as_str()))
                .map(|before| RankChange::between(before.rank, participant.rank))
                .unwrap_or_else(|| RankChange::new_entry(participant.rank));
            (participant.display_name.clone(), change)
        })
        .collect()
}

/// Zero-based positions of a ranked list.
pub fn positions(participants: &[RankedParticipant]) -> PositionMap {
    participants
        .iter()
        .enumerate()
        .map(|(index, participant)| (participant.display_name.clone(), index))
        .collect()
}

/// Rank movements of `current` relative to the host ledger's `current` slot.
///
/// Ranks in the result are one-based even though the ledger stores
/// zero-based positions.
pub fn diff_host_positions(
    current: &[RankedParticipant],
    ledger_current: Option<&PositionMap>,
) -> IndexMap<String, RankChange> {
    current
        .iter()
        .enumerate()
        .map(|(index, participant)| {
            let now = index as u32 + 1;
            let change = ledger_current
                .and_then(|map| map.get(&participant.display_name))
                .map(|before| RankChange::between(*before as u32 + 1, now))
                .unwrap_or_else(|| RankChange::new_entry(now));
            (participant.display_name.clone(), change)
        })
        .collect()
}

/// Pair each participant with its change, falling back to `new`.
pub fn ranking_entries(
    participants: &[RankedParticipant],
    changes: &IndexMap<String, RankChange>,
) -> Vec<RankingEntry> {
    participants
        .iter()
        .map(|participant| RankingEntry {
            participant: participant.clone(),
            change: changes
                .get(&participant.display_name)
                .copied()
                .unwrap_or_else(|| RankChange::new_entry(participant.rank)),
        })
        .collect()
}

/// Assemble the event payload delivered to ranking listeners.
pub fn ranking_change_data(
    participants: &[RankedParticipant],
    changes: &IndexMap<String, RankChange>,
    previous_activity_id: Option<String>,
    current_activity_id: Option<String>,
) -> RankingChangeData {
    RankingChangeData {
        previous_activity_id,
        current_activity_id,
        rankings: ranking_entries(participants, changes),
        generated_at: format_system_time(std::time::SystemTime::now()),
    }
}

/// Fresh ranking with every participant marked new.
pub fn default_ranking(
    participants: &[RankedParticipant],
    activity_id: Option<&str>,
) -> RankingChangeData {
    ranking_change_data(
        participants,
        &IndexMap::new(),
        None,
        activity_id.map(str::to_string),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::model::RankDirection;

    fn raw(name: &str, score: u64) -> RawParticipant {
        RawParticipant::named(name, score)
    }

    fn ranked(entries: &[(&str, u64)]) -> Vec<RankedParticipant> {
        let raw: Vec<_> = entries.iter().map(|(name, score)| raw(name, *score)).collect();
        normalize_and_rank(&raw, true)
    }

    #[test]
    fn ranks_are_dense_and_descending() {
        let ranking = ranked(&[("A", 5), ("B", 30), ("C", 10), ("D", 0)]);
        let names: Vec<_> = ranking.iter().map(|p| p.display_name.as_str()).collect();
        let ranks: Vec<_> = ranking.iter().map(|p| p.rank).collect();
        assert_eq!(names, ["B", "C", "A", "D"]);
        assert_eq!(ranks, [1, 2, 3, 4]);
    }

    #[test]
    fn equal_scores_keep_input_order() {
        let ranking = ranked(&[("A", 10), ("B", 10)]);
        assert_eq!(ranking[0].display_name, "A");
        assert_eq!(ranking[0].rank, 1);
        assert_eq!(ranking[1].display_name, "B");
        assert_eq!(ranking[1].rank, 2);
    }

    #[test]
    fn host_is_filtered_unless_participating() {
        let input = [raw("Host", 0), raw("Alice", 50)];

        let without_host = normalize_and_rank(&input, false);
        assert_eq!(without_host.len(), 1);
        assert_eq!(without_host[0].display_name, "Alice");
        assert_eq!(without_host[0].rank, 1);

        let with_host = normalize_and_rank(&input, true);
        assert_eq!(with_host.len(), 2);
        assert_eq!(with_host[1].display_name, "Host");
        assert_eq!(with_host[1].rank, 2);
    }

    #[test]
    fn padded_host_name_is_still_filtered() {
        let input = [raw("Host ", 0), raw("  Host", 0), raw("Alice", 50)];
        let ranking = normalize_and_rank(&input, false);
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].display_name, "Alice");
    }

    #[test]
    fn missing_fields_get_defaults() {
        let input = [RawParticipant {
            score: Some(-3.0),
            ..RawParticipant::default()
        }];
        let ranking = normalize_and_rank(&input, false);
        assert_eq!(ranking[0].display_name, UNKNOWN_DISPLAY_NAME);
        assert_eq!(ranking[0].display_avatar, placeholder_avatar("Unknown"));
        assert_eq!(ranking[0].score, 0);
        assert_eq!(ranking[0].rank, 1);
    }

    #[test]
    fn placeholder_avatar_encodes_name() {
        assert_eq!(
            placeholder_avatar("Jo Ann"),
            "https://api.dicebear.com/7.x/avataaars/svg?seed=Jo%20Ann"
        );
    }

    #[test]
    fn empty_input_gives_empty_ranking() {
        assert!(normalize_and_rank(&[], false).is_empty());
        assert!(default_ranking(&[], Some("a1")).rankings.is_empty());
    }

    #[test]
    fn has_changed_is_false_for_identical_lists() {
        let ranking = ranked(&[("A", 3), ("B", 2), ("C", 1)]);
        assert!(!has_changed(&ranking, &ranking));
        assert!(!has_changed(&[], &[]));
    }

    #[test]
    fn has_changed_detects_score_rank_and_membership() {
        let before = ranked(&[("A", 3), ("B", 2)]);
        assert!(has_changed(&before, &ranked(&[("A", 4), ("B", 2)])));
        assert!(has_changed(&before, &ranked(&[("A", 1), ("B", 2)])));
        assert!(has_changed(&before, &ranked(&[("A", 3), ("C", 2)])));
        assert!(has_changed(&before, &ranked(&[("A", 3)])));
    }

    #[test]
    fn diff_ranks_marks_newcomers_and_moves() {
        let mut history = HashMap::new();
        history.insert("act1".to_string(), ranked(&[("A", 30), ("B", 20), ("C", 10)]));

        let current = ranked(&[("C", 50), ("A", 30), ("B", 20), ("D", 5)]);
        let changes = diff_ranks(&current, &history, "act1", "act2");

        let c = changes["C"];
        assert_eq!(c.direction, RankDirection::Up);
        assert_eq!(c.previous, Some(3));
        assert_eq!(c.current, 1);
        assert_eq!(c.delta, 2);

        assert_eq!(changes["A"].direction, RankDirection::Down);
        assert_eq!(changes["A"].delta, 1);

        let d = changes["D"];
        assert_eq!(d.direction, RankDirection::New);
        assert_eq!(d.previous, None);
    }

    #[test]
    fn diff_ranks_without_snapshot_marks_everyone_new() {
        let current = ranked(&[("A", 1)]);
        let changes = diff_ranks(&current, &HashMap::new(), "missing", "act2");
        assert_eq!(changes["A"].direction, RankDirection::New);
    }

    #[test]
    fn diff_host_positions_uses_ledger_current() {
        let current = ranked(&[("B", 10), ("A", 5)]);

        let all_new = diff_host_positions(&current, None);
        assert!(all_new.values().all(|c| c.direction == RankDirection::New));

        let ledger = positions(&ranked(&[("A", 10), ("B", 5)]));
        let changes = diff_host_positions(&current, Some(&ledger));
        assert_eq!(changes["A"].direction, RankDirection::Down);
        assert_eq!(changes["A"].previous, Some(1));
        assert_eq!(changes["A"].current, 2);
        assert_eq!(changes["B"].direction, RankDirection::Up);
    }

    #[test]
    fn default_ranking_marks_all_new() {
        let data = default_ranking(&ranked(&[("A", 2), ("B", 1)]), Some("act1"));
        assert_eq!(data.previous_activity_id, None);
        assert_eq!(data.current_activity_id.as_deref(), Some("act1"));
        assert!(
            data.rankings
                .iter()
                .all(|entry| entry.change.direction == RankDirection::New)
        );
    }
}
