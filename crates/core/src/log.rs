use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The category of one log entry, matching the phases of rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineLogKind {
    ServiceCall,
    TriggerFired,
    ConditionTested,
    ConditionPassed,
    RuleCompleted,
    Debug,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineLogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: EngineLogKind,
    pub rule_id: Option<String>,
    pub message: String,
}

/// A fixed-capacity ring buffer of log entries. A non-positive `max_logs`
/// disables logging entirely — `record` becomes a no-op.
#[derive(Debug)]
pub struct EngineLog {
    max_logs: usize,
    entries: VecDeque<EngineLogEntry>,
}

impl EngineLog {
    pub fn new(max_logs: i64) -> Self {
        Self {
            max_logs: max_logs.max(0) as usize,
            entries: VecDeque::new(),
        }
    }

    pub fn record(&mut self, entry: EngineLogEntry) {
        if self.max_logs == 0 {
            return;
        }
        if self.entries.len() >= self.max_logs {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &EngineLogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
