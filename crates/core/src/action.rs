use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Condition;
use crate::model::ServiceCall;
use crate::trigger::Trigger;

/// A single step inside an `ActionSequence`, discriminated at the
/// persistence layer by which of `service|condition|delay|log_message|event`
/// key is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleActionItem {
    Service(ServiceActionItem),
    Condition(ConditionActionItem),
    Delay(DelayActionItem),
    Log(LogActionItem),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceActionItem {
    pub service: ServiceCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionActionItem {
    pub condition: Condition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayActionItem {
    pub delay: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogActionItem {
    pub log_message: String,
}

/// An ordered list of action items, optionally gated by an `action_condition`
/// checked once before the sequence starts. A false `action_condition`
/// aborts only this sequence, not the owning rule's other sequences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSequence {
    #[serde(default)]
    pub action_condition: Option<Condition>,
    #[serde(default)]
    pub action_sequence: Vec<RuleActionItem>,
}

/// A persisted automation: one or more triggers, an optional rule-level
/// condition gating every trigger firing, and one or more independently
/// gated action sequences run in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub rule_condition: Option<Condition>,
    pub actions: Vec<ActionSequence>,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl AutomationRule {
    /// Fills in `default_tz` for every `TimeTrigger` and `Time` condition in
    /// this rule whose `tz` was omitted from its descriptor.
    pub fn apply_default_tz(&mut self, default_tz: &str) {
        for trigger in &mut self.triggers {
            if let Trigger::Time(t) = trigger {
                if t.spec.tz_name.is_empty() {
                    t.spec.tz_name = default_tz.to_string();
                }
            }
        }
        if let Some(condition) = &mut self.rule_condition {
            condition.apply_default_tz(default_tz);
        }
        for sequence in &mut self.actions {
            if let Some(condition) = &mut sequence.action_condition {
                condition.apply_default_tz(default_tz);
            }
            for item in &mut sequence.action_sequence {
                if let RuleActionItem::Condition(c) = item {
                    c.condition.apply_default_tz(default_tz);
                }
            }
        }
    }
}
