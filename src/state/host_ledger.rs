use crate::state::model::PositionMap;

/// Host-facing ranking ledger: positions after the last two finished activities.
///
/// Unlike the per-activity history it is not reset when an activity starts;
/// each finished activity shifts `current` into `previous`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostLedger {
    /// The host view is not in use for this session.
    #[default]
    Uninitialized,
    /// Started by the host; slots fill as activities finish.
    Active {
        /// Positions after the most recently finished activity.
        current: Option<PositionMap>,
        /// Positions after the activity before that.
        previous: Option<PositionMap>,
    },
}

impl HostLedger {
    /// Ledger right after the host started the session.
    pub fn initialized() -> Self {
        HostLedger::Active {
            current: None,
            previous: None,
        }
    }

    /// Whether the host view has been started.
    pub fn is_initialized(&self) -> bool {
        matches!(self, HostLedger::Active { .. })
    }

    /// Positions after the most recently finished activity.
    pub fn current(&self) -> Option<&PositionMap> {
        match self {
            HostLedger::Active { current, .. } => current.as_ref(),
            HostLedger::Uninitialized => None,
        }
    }

    /// Positions after the activity finished before the current one.
    pub fn previous(&self) -> Option<&PositionMap> {
        match self {
            HostLedger::Active { previous, .. } => previous.as_ref(),
            HostLedger::Uninitialized => None,
        }
    }

    /// Record the positions of a freshly finished activity.
    ///
    /// Returns `false` when the ledger was not initialized; it is initialized
    /// on the fly in that case.
    pub fn settle(&mut self, positions: PositionMap) -> bool {
        let was_initialized = self.is_initialized();
        let previous = match std::mem::take(self) {
            HostLedger::Active { current, .. } => current,
            HostLedger::Uninitialized => None,
        };
        *self = HostLedger::Active {
            current: Some(positions),
            previous,
        };
        was_initialized
    }

    /// Return to the uninitialized state.
    pub fn clear(&mut self) {
        *self = HostLedger::Uninitialized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, usize)]) -> PositionMap {
        entries
            .iter()
            .map(|(name, position)| (name.to_string(), *position))
            .collect()
    }

    #[test]
    fn walks_through_lifecycle() {
        let mut ledger = HostLedger::default();
        assert!(!ledger.is_initialized());

        ledger = HostLedger::initialized();
        assert!(ledger.is_initialized());
        assert!(ledger.current().is_none());

        let first = map(&[("A", 0), ("B", 1)]);
        assert!(ledger.settle(first.clone()));
        assert_eq!(ledger.current(), Some(&first));
        assert!(ledger.previous().is_none());

        let second = map(&[("B", 0), ("A", 1)]);
        assert!(ledger.settle(second.clone()));
        assert_eq!(ledger.current(), Some(&second));
        assert_eq!(ledger.previous(), Some(&first));

        ledger.clear();
        assert_eq!(ledger, HostLedger::Uninitialized);
    }

    #[test]
    fn settling_uninitialized_ledger_initializes_it() {
        let mut ledger = HostLedger::Uninitialized;
        assert!(!ledger.settle(map(&[("A", 0)])));
        assert!(ledger.is_initialized());
        assert!(ledger.previous().is_none());
    }
}
