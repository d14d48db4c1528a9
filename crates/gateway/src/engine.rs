use std::collections::HashMap;
use std::sync::Arc;

use ottoengine_core::{
    AlarmAction, AutomationRule, Clock, EngineLog, InboundEvent, Result, ServiceRegistration,
    Trigger,
};
use ottoengine_executor::ServiceSender;
use ottoengine_rules::RuleStore;
use ottoengine_state::{EngineHandle, Listener};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::scheduler::Scheduler;

/// The engine core: rule registry, listener index (via the state facade),
/// and the time-trigger scheduler, all driven from a single owning task.
pub struct Engine {
    pub store: EngineHandle,
    pub sender: Arc<dyn ServiceSender>,
    pub log: Arc<Mutex<EngineLog>>,
    pub clock: Arc<dyn Clock>,
    rule_store: RuleStore,
    rules: HashMap<String, AutomationRule>,
    scheduler: Scheduler,
    services: Vec<ServiceRegistration>,
    default_tz: String,
}

impl Engine {
    pub fn new(
        store: EngineHandle,
        rule_store: RuleStore,
        sender: Arc<dyn ServiceSender>,
        log: Arc<Mutex<EngineLog>>,
        clock: Arc<dyn Clock>,
        default_tz: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sender,
            log,
            clock,
            rule_store,
            rules: HashMap::new(),
            scheduler: Scheduler::new(),
            services: Vec::new(),
            default_tz: default_tz.into(),
        }
    }

    /// The configured fallback IANA timezone applied to any time trigger or
    /// condition whose descriptor omits `tz`.
    pub fn default_tz(&self) -> &str {
        &self.default_tz
    }

    pub fn services(&self) -> &[ServiceRegistration] {
        &self.services
    }

    pub fn set_services(&mut self, services: Vec<ServiceRegistration>) {
        self.services = services;
    }

    pub fn rule(&self, id: &str) -> Option<&AutomationRule> {
        self.rules.get(id)
    }

    pub fn rules(&self) -> impl Iterator<Item = &AutomationRule> {
        self.rules.values()
    }

    pub fn rule_store(&self) -> &RuleStore {
        &self.rule_store
    }

    pub fn scheduler_len(&self) -> usize {
        self.scheduler.len()
    }

    /// Clears listeners, the rule registry, and the scheduler, then reloads
    /// every rule from persistence. A rule that fails re-registration does
    /// not stop the others.
    pub async fn reload(&mut self) -> Result<()> {
        self.store.clear_listeners().await?;
        self.rules.clear();
        self.scheduler.clear();

        let loaded = self.rule_store.load_all().await?;
        for mut rule in loaded {
            rule.apply_default_tz(&self.default_tz);
            if let Err(e) = self.register_rule(rule.clone()).await {
                warn!(rule_id = %rule.id, error = %e, "failed to register rule during reload");
            }
        }
        Ok(())
    }

    /// Indexes one rule's triggers: non-time triggers go into the listener
    /// index, time triggers into the scheduler timeline.
    pub async fn register_rule(&mut self, rule: AutomationRule) -> Result<()> {
        let now = self.clock.now();
        for (idx, trigger) in rule.triggers.iter().enumerate() {
            match trigger {
                Trigger::Time(t) => {
                    let next = t.spec.next_time_from(now)?;
                    self.scheduler.schedule(
                        next,
                        AlarmAction {
                            action_id: t.id.clone(),
                            rule_id: rule.id.clone(),
                            spec: t.spec.clone(),
                        },
                    );
                }
                _ => {
                    if let Some(key) = trigger.index_key() {
                        self.store
                            .register_listener(
                                key,
                                Listener {
                                    rule_id: rule.id.clone(),
                                    trigger_index: idx,
                                },
                            )
                            .await?;
                    }
                }
            }
        }
        self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    /// Routes one inbound event: updates the state store for state changes,
    /// then fans the event out to every matching listener on its own task.
    pub async fn route_event(&self, event: InboundEvent) -> Result<()> {
        let key = match &event {
            InboundEvent::StateChanged(sc) => {
                self.store.upsert_state(sc.new_state.clone()).await?;
                sc.entity_id.clone()
            }
            InboundEvent::Generic(e) => e.event_type.clone(),
        };

        let listeners = self.store.listeners_for(&key).await?;
        for listener in listeners {
            let Some(rule) = self.rules.get(&listener.rule_id).cloned() else {
                continue;
            };
            self.spawn_invocation(rule, Some(listener.trigger_index), Some(event.clone()));
        }
        Ok(())
    }

    /// Pops every due scheduler alarm at `now` and fires each action's rule,
    /// rescheduling every action (time triggers are always recurring).
    pub fn tick(&mut self, now: chrono::DateTime<chrono::Utc>) {
        for due in self.scheduler.pop_due(now) {
            if due.late {
                warn!(
                    rule_id = %due.action.rule_id,
                    action_id = %due.action.action_id,
                    "time trigger fired outside its grace window"
                );
            }
            if let Some(rule) = self.rules.get(&due.action.rule_id).cloned() {
                self.spawn_invocation(rule, None, None);
            } else {
                debug!(rule_id = %due.action.rule_id, "scheduled rule no longer registered");
            }
            if let Ok(next) = due.action.spec.next_time_from(now) {
                self.scheduler.schedule(next, due.action);
            }
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn spawn_invocation(
        &self,
        rule: AutomationRule,
        trigger_index: Option<usize>,
        event: Option<InboundEvent>,
    ) {
        let store = self.store.clone();
        let sender = Arc::clone(&self.sender);
        let log = Arc::clone(&self.log);
        let clock = Arc::clone(&self.clock);
        tokio::spawn(async move {
            let result = ottoengine_executor::invoke_rule(
                &rule,
                trigger_index,
                event.as_ref(),
                &store,
                sender.as_ref(),
                &log,
                clock.as_ref(),
            )
            .await;
            if let Err(e) = result {
                warn!(rule_id = %rule.id, error = %e, "rule invocation aborted");
            }
        });
    }
}

/// Drives the scheduler tick loop until cancelled: sleeps for
/// [`crate::scheduler::TICK_INTERVAL`] between reads of the clock.
pub async fn run_scheduler_loop(engine: Arc<Mutex<Engine>>) {
    let mut interval = tokio::time::interval(crate::scheduler::TICK_INTERVAL);
    loop {
        interval.tick().await;
        let mut engine = engine.lock().await;
        let now = engine.clock.now();
        engine.tick(now);
    }
}
