use std::time::Duration;

use async_trait::async_trait;
use ottoengine_core::{
    AutomationRule, Clock, Condition, EngineLog, EngineLogEntry, EngineLogKind, Error,
    InboundEvent, Result, RuleActionItem, ServiceCall,
};
use ottoengine_state::EngineHandle;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Dispatches a `ServiceCall` outbound through the connection. Returning
/// `Ok` only means the frame was accepted for sending — no reply is
/// awaited.
#[async_trait]
pub trait ServiceSender: Send + Sync {
    async fn call_service(&self, call: ServiceCall) -> Result<()>;
}

/// Runs one rule invocation to completion: trigger gate, rule-condition
/// gate, then each `ActionSequence` in order. `trigger_index`/`event` are
/// `None` for a time-triggered invocation, which skips the trigger
/// re-check (the scheduler is authoritative for those).
pub async fn invoke_rule(
    rule: &AutomationRule,
    trigger_index: Option<usize>,
    event: Option<&InboundEvent>,
    store: &EngineHandle,
    sender: &dyn ServiceSender,
    log: &Mutex<EngineLog>,
    clock: &dyn Clock,
) -> Result<()> {
    if !rule.enabled {
        return Ok(());
    }

    if let (Some(idx), Some(event)) = (trigger_index, event) {
        let Some(trigger) = rule.triggers.get(idx) else {
            return Ok(());
        };
        if !trigger.matches_event(event) {
            debug!(rule_id = %rule.id, "trigger gate re-check failed, dropping invocation");
            return Ok(());
        }
        record(
            log,
            EngineLogKind::TriggerFired,
            Some(rule.id.clone()),
            format!("trigger {idx} fired for rule '{}'", rule.id),
        )
        .await;
    }

    let snapshot = store.snapshot().await?;

    if let Some(condition) = &rule.rule_condition {
        if !condition.evaluate(&snapshot, clock) {
            debug!(rule_id = %rule.id, "rule condition false, invocation ends silently");
            return Ok(());
        }
    }

    for sequence in &rule.actions {
        if let Some(action_condition) = &sequence.action_condition {
            if !action_condition.evaluate(&snapshot, clock) {
                continue;
            }
        }
        run_sequence(&sequence.action_sequence, sender, log, &snapshot, clock, &rule.id).await?;
    }

    record(
        log,
        EngineLogKind::RuleCompleted,
        Some(rule.id.clone()),
        format!("rule '{}' completed", rule.id),
    )
    .await;

    Ok(())
}

/// Runs one `ActionSequence`'s items in order. A false `ConditionAction`
/// aborts only this sequence (returns `Ok`); any other action failure
/// aborts the entire invocation (returns `Err`, propagated by the caller).
async fn run_sequence(
    items: &[RuleActionItem],
    sender: &dyn ServiceSender,
    log: &Mutex<EngineLog>,
    snapshot: &ottoengine_state::StateSnapshot,
    clock: &dyn Clock,
    rule_id: &str,
) -> Result<()> {
    for item in items {
        match item {
            RuleActionItem::Service(item) => {
                if let Err(e) = sender.call_service(item.service.clone()).await {
                    error!(rule_id, error = %e, "service action failed, aborting invocation");
                    record(
                        log,
                        EngineLogKind::ServiceCall,
                        Some(rule_id.to_string()),
                        format!("service call failed: {e}"),
                    )
                    .await;
                    return Err(Error::ActionFailed(e.to_string()));
                }
                record(
                    log,
                    EngineLogKind::ServiceCall,
                    Some(rule_id.to_string()),
                    format!(
                        "called {}.{}",
                        item.service.domain, item.service.service
                    ),
                )
                .await;
            }
            RuleActionItem::Delay(item) => {
                tokio::time::sleep(Duration::from_secs_f64(item.delay.max(0.0))).await;
            }
            RuleActionItem::Condition(item) => {
                record(log, EngineLogKind::ConditionTested, Some(rule_id.to_string()), "evaluating action_condition".to_string()).await;
                if !evaluate_action_condition(&item.condition, snapshot, clock) {
                    info!(rule_id, "condition action evaluated false, aborting sequence");
                    return Ok(());
                }
                record(
                    log,
                    EngineLogKind::ConditionPassed,
                    Some(rule_id.to_string()),
                    "action_condition passed".to_string(),
                )
                .await;
            }
            RuleActionItem::Log(item) => {
                record(
                    log,
                    EngineLogKind::Debug,
                    Some(rule_id.to_string()),
                    item.log_message.clone(),
                )
                .await;
            }
        }
    }
    Ok(())
}

fn evaluate_action_condition(
    condition: &Condition,
    snapshot: &ottoengine_state::StateSnapshot,
    clock: &dyn Clock,
) -> bool {
    condition.evaluate(snapshot, clock)
}

async fn record(log: &Mutex<EngineLog>, kind: EngineLogKind, rule_id: Option<String>, message: String) {
    let entry = EngineLogEntry {
        timestamp: chrono::Utc::now(),
        kind,
        rule_id,
        message,
    };
    log.lock().await.record(entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ottoengine_core::{
        ActionSequence, ConditionActionItem, LogActionItem, ManualClock, ServiceActionItem,
        StateCondition, Trigger,
    };
    use ottoengine_state::spawn_store;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSender(Arc<AtomicUsize>);

    #[async_trait]
    impl ServiceSender for CountingSender {
        async fn call_service(&self, _call: ServiceCall) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn rule_with_service() -> AutomationRule {
        AutomationRule {
            id: "r1".to_string(),
            description: String::new(),
            enabled: true,
            group: None,
            notes: None,
            triggers: Vec::<Trigger>::new(),
            rule_condition: None,
            actions: vec![ActionSequence {
                action_condition: None,
                action_sequence: vec![RuleActionItem::Service(ServiceActionItem {
                    service: ServiceCall {
                        domain: "light".to_string(),
                        service: "turn_on".to_string(),
                        service_data: Default::default(),
                    },
                })],
            }],
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn disabled_rule_never_calls_service() {
        let (store, _join) = spawn_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let sender = CountingSender(calls.clone());
        let log = Mutex::new(EngineLog::new(10));
        let clock = ManualClock::new(chrono::Utc::now());

        let mut rule = rule_with_service();
        rule.enabled = false;

        invoke_rule(&rule, None, None, &store, &sender, &log, &clock)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn action_condition_false_skips_sequence_but_continues() {
        let (store, _join) = spawn_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let sender = CountingSender(calls.clone());
        let log = Mutex::new(EngineLog::new(10));
        let clock = ManualClock::new(chrono::Utc::now());

        let mut rule = rule_with_service();
        rule.actions.insert(
            0,
            ActionSequence {
                action_condition: Some(Condition::State(StateCondition {
                    entity_id: "missing.entity".to_string(),
                    state: "on".to_string(),
                })),
                action_sequence: vec![RuleActionItem::Service(ServiceActionItem {
                    service: ServiceCall {
                        domain: "light".to_string(),
                        service: "turn_off".to_string(),
                        service_data: Default::default(),
                    },
                })],
            },
        );

        invoke_rule(&rule, None, None, &store, &sender, &log, &clock)
            .await
            .unwrap();
        // First sequence's gate is false (entity missing) and is skipped;
        // second sequence is unguarded and runs.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn condition_action_false_aborts_sequence_only() {
        let (store, _join) = spawn_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let sender = CountingSender(calls.clone());
        let log = Mutex::new(EngineLog::new(10));
        let clock = ManualClock::new(chrono::Utc::now());

        let rule = AutomationRule {
            id: "r2".to_string(),
            description: String::new(),
            enabled: true,
            group: None,
            notes: None,
            triggers: Vec::<Trigger>::new(),
            rule_condition: None,
            actions: vec![
                ActionSequence {
                    action_condition: None,
                    action_sequence: vec![
                        RuleActionItem::Condition(ConditionActionItem {
                            condition: Condition::State(StateCondition {
                                entity_id: "missing.entity".to_string(),
                                state: "on".to_string(),
                            }),
                        }),
                        RuleActionItem::Log(LogActionItem {
                            log_message: "unreachable".to_string(),
                        }),
                    ],
                },
                ActionSequence {
                    action_condition: None,
                    action_sequence: vec![RuleActionItem::Service(ServiceActionItem {
                        service: ServiceCall {
                            domain: "light".to_string(),
                            service: "turn_on".to_string(),
                            service_data: Default::default(),
                        },
                    })],
                },
            ],
            extra: Default::default(),
        };

        invoke_rule(&rule, None, None, &store, &sender, &log, &clock)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
