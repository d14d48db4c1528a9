use std::time::Duration;

use chrono::{DateTime, Utc};
use ottoengine_core::{AlarmAction, ClockAlarm, Timeline};

/// Firings are still fired if popped more than this long after their
/// intended instant, but no catch-up replay is attempted for any
/// occurrences that fell in between.
pub const TICK_GRACE: Duration = Duration::from_secs(60);

/// The default interval between scheduler ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Wraps a `Timeline` with the grace-window bookkeeping the tick loop needs.
#[derive(Debug, Default)]
pub struct Scheduler {
    timeline: Timeline,
}

/// One popped alarm action, with whether it fired outside its grace window.
pub struct DueAction {
    pub action: AlarmAction,
    pub late: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: DateTime<Utc>, action: AlarmAction) {
        self.timeline.schedule(at, action);
    }

    pub fn remove_action(&mut self, action_id: &str) {
        self.timeline.remove_action(action_id);
    }

    pub fn clear(&mut self) {
        self.timeline.clear();
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Pops every alarm due at or before `now`, flattening them into
    /// individual actions tagged with their lateness against `TICK_GRACE`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<DueAction> {
        let alarms: Vec<ClockAlarm> = self.timeline.pop_due(now);
        alarms
            .into_iter()
            .flat_map(|alarm| {
                let late = now
                    .signed_duration_since(alarm.alarm_time)
                    .to_std()
                    .map(|d| d > TICK_GRACE)
                    .unwrap_or(false);
                alarm
                    .actions
                    .into_iter()
                    .map(move |action| DueAction {
                        action,
                        late,
                    })
            })
            .collect()
    }
}
