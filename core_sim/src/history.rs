use serde::{Deserialize, Serialize};
use sim_schema::{HistoryRecordState, TrackerState};

/// Reversible timeline of one tracked value.
///
/// Recordings are `(round, value)` pairs in strictly increasing round order;
/// consecutive equal values are not re-recorded, so a tracker only grows when
/// its value actually changes. A marker selects the currently visible round.
/// Any backwards navigation pauses the tracker; while paused, writes are
/// ignored and the owning engine refuses to execute rounds until
/// [`ValueHistory::continue_tracking`] discards the stale future.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueHistory<T> {
    rounds: Vec<u64>,
    values: Vec<T>,
    marked_round: u64,
    tracking: bool,
}

impl<T: Clone + PartialEq> ValueHistory<T> {
    pub fn new(round: u64, value: T) -> Self {
        Self {
            rounds: vec![round],
            values: vec![value],
            marked_round: round,
            tracking: true,
        }
    }

    /// Index of the recording visible at the marker.
    fn marked_index(&self) -> usize {
        let after = self.rounds.partition_point(|&r| r <= self.marked_round);
        after.saturating_sub(1)
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn first_round(&self) -> u64 {
        self.rounds[0]
    }

    pub fn latest_round(&self) -> u64 {
        *self.rounds.last().expect("history is never empty")
    }

    pub fn latest_value(&self) -> &T {
        self.values.last().expect("history is never empty")
    }

    pub fn marked_round(&self) -> u64 {
        self.marked_round
    }

    pub fn marked_value(&self) -> &T {
        &self.values[self.marked_index()]
    }

    pub fn record_count(&self) -> usize {
        self.rounds.len()
    }

    pub fn records(&self) -> impl Iterator<Item = (u64, &T)> {
        self.rounds.iter().copied().zip(self.values.iter())
    }

    /// Record `value` at `round`. Ignored while paused. Re-recording the
    /// latest round overwrites it; an unchanged value records nothing.
    pub fn record(&mut self, round: u64, value: T) {
        if !self.tracking {
            return;
        }
        let last_round = self.latest_round();
        debug_assert!(round >= last_round, "rounds must be recorded in order");
        if round == last_round {
            if *self.values.last().expect("history is never empty") != value {
                *self.values.last_mut().expect("history is never empty") = value;
            }
        } else if *self.values.last().expect("history is never empty") != value {
            self.rounds.push(round);
            self.values.push(value);
        }
        self.marked_round = self.marked_round.max(round);
    }

    /// Move the marker to the previous recorded round. Pauses the tracker.
    pub fn step_back(&mut self) -> bool {
        let index = self.marked_index();
        if index == 0 {
            return false;
        }
        self.marked_round = self.rounds[index - 1];
        self.tracking = false;
        true
    }

    /// Move the marker to the next recorded round. Stays paused.
    pub fn step_forward(&mut self) -> bool {
        let index = self.marked_index();
        if index + 1 >= self.rounds.len() {
            return false;
        }
        self.marked_round = self.rounds[index + 1];
        self.tracking = false;
        true
    }

    /// Jump the marker to `round`, clamped to the recorded range. Pauses the
    /// tracker.
    pub fn set_marker_to_round(&mut self, round: u64) {
        self.marked_round = round.clamp(self.first_round(), self.latest_round());
        self.tracking = false;
    }

    /// Resume forward recording from the marked round, discarding any
    /// recordings later than the marker.
    pub fn continue_tracking(&mut self) {
        self.truncate_after_marker();
        self.tracking = true;
    }

    /// Truncate recordings after the marker without resuming.
    pub fn cut_off_at_marker(&mut self) {
        self.truncate_after_marker();
    }

    fn truncate_after_marker(&mut self) {
        let keep = self.marked_index() + 1;
        self.rounds.truncate(keep);
        self.values.truncate(keep);
    }

    /// Re-index every recorded round and the marker by a constant offset.
    /// `delta` must not push the first recorded round below zero.
    pub fn shift_timescale(&mut self, delta: i64) {
        debug_assert!(
            delta >= -(self.first_round() as i64),
            "timescale shift would move recordings below round zero"
        );
        for round in &mut self.rounds {
            *round = (*round as i64 + delta) as u64;
        }
        self.marked_round = (self.marked_round as i64 + delta) as u64;
    }

    /// Export the full recorded sequence for persistence.
    pub fn export<S>(&self, mut map: impl FnMut(&T) -> S) -> TrackerState<S> {
        TrackerState {
            records: self
                .records()
                .map(|(round, value)| HistoryRecordState {
                    round,
                    value: map(value),
                })
                .collect(),
            marked_round: self.marked_round,
            tracking: self.tracking,
        }
    }

    /// Rebuild a tracker from an exported sequence. Returns `None` when the
    /// export holds no recordings.
    pub fn from_state<S>(state: &TrackerState<S>, mut map: impl FnMut(&S) -> T) -> Option<Self> {
        if state.records.is_empty() {
            return None;
        }
        Some(Self {
            rounds: state.records.iter().map(|record| record.round).collect(),
            values: state
                .records
                .iter()
                .map(|record| map(&record.value))
                .collect(),
            marked_round: state.marked_round,
            tracking: state.tracking,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ValueHistory<i32> {
        let mut history = ValueHistory::new(0, 10);
        history.record(2, 20);
        history.record(5, 30);
        history
    }

    #[test]
    fn equal_values_are_not_re_recorded() {
        let mut history = ValueHistory::new(0, 7);
        history.record(1, 7);
        history.record(2, 7);
        assert_eq!(history.record_count(), 1);
        history.record(3, 8);
        assert_eq!(history.record_count(), 2);
        assert_eq!(history.latest_round(), 3);
    }

    #[test]
    fn marker_navigation_steps_between_recorded_rounds() {
        let mut history = tracker();
        assert_eq!(*history.marked_value(), 30);
        assert!(history.step_back());
        assert_eq!(history.marked_round(), 2);
        assert_eq!(*history.marked_value(), 20);
        assert!(history.step_back());
        assert!(!history.step_back());
        assert_eq!(*history.marked_value(), 10);
        assert!(history.step_forward());
        assert!(history.step_forward());
        assert!(!history.step_forward());
        assert_eq!(*history.marked_value(), 30);
    }

    #[test]
    fn marker_jump_is_clamped_and_reads_latest_at_or_before() {
        let mut history = tracker();
        history.set_marker_to_round(4);
        assert_eq!(history.marked_round(), 4);
        assert_eq!(*history.marked_value(), 20);
        history.set_marker_to_round(99);
        assert_eq!(history.marked_round(), 5);
        history.set_marker_to_round(0);
        assert_eq!(*history.marked_value(), 10);
    }

    #[test]
    fn writes_are_ignored_while_paused() {
        let mut history = tracker();
        history.step_back();
        history.record(6, 99);
        assert_eq!(history.record_count(), 3);
        assert_eq!(*history.latest_value(), 30);
    }

    #[test]
    fn continue_tracking_discards_the_stale_future() {
        let mut history = tracker();
        history.set_marker_to_round(2);
        history.continue_tracking();
        assert!(history.is_tracking());
        assert_eq!(history.latest_round(), 2);
        history.record(3, 40);
        assert_eq!(history.latest_round(), 3);
        assert_eq!(*history.latest_value(), 40);
    }

    #[test]
    fn cut_off_truncates_without_resuming() {
        let mut history = tracker();
        history.set_marker_to_round(2);
        history.cut_off_at_marker();
        assert!(!history.is_tracking());
        assert_eq!(history.latest_round(), 2);
    }

    #[test]
    fn round_trip_preserves_the_sequence_without_continue() {
        let original = tracker();
        let mut history = original.clone();
        while history.step_back() {}
        while history.step_forward() {}
        assert_eq!(
            history.records().map(|(r, v)| (r, *v)).collect::<Vec<_>>(),
            original.records().map(|(r, v)| (r, *v)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn shift_timescale_moves_every_round() {
        let mut history = tracker();
        history.shift_timescale(10);
        assert_eq!(history.first_round(), 10);
        assert_eq!(history.latest_round(), 15);
        assert_eq!(history.marked_round(), 15);
        history.shift_timescale(-10);
        assert_eq!(history.first_round(), 0);
    }

    #[test]
    fn export_roundtrips_through_tracker_state() {
        let history = tracker();
        let state = history.export(|v| *v);
        let rebuilt = ValueHistory::from_state(&state, |v| *v).expect("non-empty");
        assert_eq!(rebuilt, history);
    }
}
