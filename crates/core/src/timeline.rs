use chrono::{DateTime, Utc};

use crate::timespec::TimeSpec;

/// A single scheduled action: an opaque id (used for removal), the owning
/// rule's id, and the recurrence that produced this firing.
#[derive(Debug, Clone)]
pub struct AlarmAction {
    pub action_id: String,
    pub rule_id: String,
    pub spec: TimeSpec,
}

/// All actions due at one instant. The timeline never holds two alarms at
/// the same instant — a second action scheduled for an existing instant is
/// merged into it.
#[derive(Debug, Clone)]
pub struct ClockAlarm {
    pub alarm_time: DateTime<Utc>,
    pub actions: Vec<AlarmAction>,
}

/// An ascending-ordered sequence of `ClockAlarm`s.
#[derive(Debug, Default)]
pub struct Timeline {
    alarms: Vec<ClockAlarm>,
}

impl Timeline {
    pub fn new() -> Self {
        Self { alarms: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    pub fn alarms(&self) -> &[ClockAlarm] {
        &self.alarms
    }

    /// Schedules `action` to fire at `at`, merging into an existing alarm at
    /// the same instant or inserting a new one at the correct position.
    pub fn schedule(&mut self, at: DateTime<Utc>, action: AlarmAction) {
        match self.alarms.binary_search_by(|a| a.alarm_time.cmp(&at)) {
            Ok(idx) => self.alarms[idx].actions.push(action),
            Err(idx) => self.alarms.insert(
                idx,
                ClockAlarm {
                    alarm_time: at,
                    actions: vec![action],
                },
            ),
        }
    }

    /// Removes every action with `action_id` across all alarms, pruning any
    /// alarm left with no actions.
    pub fn remove_action(&mut self, action_id: &str) {
        for alarm in &mut self.alarms {
            alarm.actions.retain(|a| a.action_id != action_id);
        }
        self.alarms.retain(|a| !a.actions.is_empty());
    }

    /// Pops every alarm whose instant is `<= now`, in ascending order.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<ClockAlarm> {
        let split = self
            .alarms
            .iter()
            .position(|a| a.alarm_time > now)
            .unwrap_or(self.alarms.len());
        self.alarms.drain(0..split).collect()
    }

    /// Releases every pending alarm without firing them (used on shutdown).
    pub fn clear(&mut self) {
        self.alarms.clear();
    }

    #[cfg(test)]
    fn is_ascending(&self) -> bool {
        self.alarms.windows(2).all(|w| w[0].alarm_time < w[1].alarm_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn action(id: &str) -> AlarmAction {
        AlarmAction {
            action_id: id.to_string(),
            rule_id: "r1".to_string(),
            spec: TimeSpec::new("*", "*", "*", "*", "*", "UTC"),
        }
    }

    #[test]
    fn timeline_stays_ascending_and_merges_same_instant() {
        let mut tl = Timeline::new();
        tl.schedule(at("2018-01-01T00:02:00Z"), action("a"));
        tl.schedule(at("2018-01-01T00:01:00Z"), action("b"));
        tl.schedule(at("2018-01-01T00:02:00Z"), action("c"));
        assert!(tl.is_ascending());
        assert_eq!(tl.len(), 2);
        assert_eq!(tl.alarms()[1].actions.len(), 2);
    }

    #[test]
    fn remove_action_prunes_empty_alarms() {
        let mut tl = Timeline::new();
        tl.schedule(at("2018-01-01T00:01:00Z"), action("a"));
        tl.remove_action("a");
        assert!(tl.is_empty());
    }

    #[test]
    fn pop_due_drains_only_expired_alarms_in_order() {
        let mut tl = Timeline::new();
        tl.schedule(at("2018-01-01T00:01:00Z"), action("a"));
        tl.schedule(at("2018-01-01T00:03:00Z"), action("b"));
        let due = tl.pop_due(at("2018-01-01T00:02:00Z"));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].actions[0].action_id, "a");
        assert_eq!(tl.len(), 1);
    }
}
