use crate::state::model::ParticipantsEventRatio;

/// Counts participant updates received during the current activity.
///
/// The server pushes one participants snapshot per submitted answer, so the
/// count approximates how many players answered.
#[derive(Debug, Default, Clone)]
pub struct ParticipantEventCounter {
    count: usize,
    total: usize,
}

impl ParticipantEventCounter {
    /// Record one participants snapshot with `total` participants.
    pub fn record(&mut self, total: usize) {
        self.total = total;
        self.count = (self.count + 1).min(total);
    }

    /// Start counting for a new activity; the known total is kept.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Current count, total, and percentage.
    pub fn ratio(&self) -> ParticipantsEventRatio {
        ParticipantsEventRatio::new(self.count, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_capped_and_reset_per_activity() {
        let mut counter = ParticipantEventCounter::default();
        counter.record(2);
        counter.record(2);
        counter.record(2);
        assert_eq!(counter.ratio().count, 2);
        assert_eq!(counter.ratio().percentage, 100);

        counter.reset();
        assert_eq!(counter.ratio().count, 0);
        assert_eq!(counter.ratio().total, 2);

        counter.record(4);
        assert_eq!(counter.ratio().percentage, 25);
    }
}
