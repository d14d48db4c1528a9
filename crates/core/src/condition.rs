use chrono::{Datelike, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::state_view::StateView;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCondition {
    pub entity_id: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericStateCondition {
    pub entity_id: String,
    #[serde(default)]
    pub above: Option<f64>,
    #[serde(default)]
    pub below: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeCondition {
    #[serde(default)]
    pub after: Option<NaiveTime>,
    #[serde(default)]
    pub before: Option<NaiveTime>,
    #[serde(default)]
    pub weekdays: Option<Vec<u8>>,
    #[serde(default)]
    pub tz_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SunCondition {
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub before_offset_seconds: i64,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub after_offset_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneCondition {
    pub entity_id: String,
    pub zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateCondition {
    pub value_template: String,
}

/// A recursive boolean condition tree, evaluated purely and synchronously
/// against the state store and clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    State(StateCondition),
    NumericState(NumericStateCondition),
    Sun(SunCondition),
    Template(TemplateCondition),
    Time(TimeCondition),
    Zone(ZoneCondition),
}

impl Condition {
    /// Fills in `default_tz` for any `Time` condition in this tree whose
    /// `tz` was omitted, recursing through `And`/`Or` children.
    pub fn apply_default_tz(&mut self, default_tz: &str) {
        match self {
            Condition::And(children) | Condition::Or(children) => {
                for child in children {
                    child.apply_default_tz(default_tz);
                }
            }
            Condition::Time(c) if c.tz_name.is_empty() => c.tz_name = default_tz.to_string(),
            _ => {}
        }
    }

    pub fn evaluate(&self, view: &dyn StateView, clock: &dyn Clock) -> bool {
        match self {
            Condition::And(children) => children.iter().all(|c| c.evaluate(view, clock)),
            Condition::Or(children) => children.iter().any(|c| c.evaluate(view, clock)),
            Condition::State(c) => view
                .entity_state(&c.entity_id)
                .is_some_and(|s| s.state == c.state),
            Condition::NumericState(c) => {
                let Some(value) = view.entity_state(&c.entity_id).and_then(|s| s.numeric_state())
                else {
                    return false;
                };
                if c.above.is_none() && c.below.is_none() {
                    return false;
                }
                c.above.is_none_or(|a| value > a) && c.below.is_none_or(|b| value < b)
            }
            Condition::Time(c) => c.evaluate(clock),
            Condition::Sun(c) => c.evaluate(view, clock),
            Condition::Zone(c) => view
                .entity_state(&c.entity_id)
                .is_some_and(|s| s.state == c.zone),
            // Template evaluation is not required by the core (documented
            // non-goal); the literal template string is stored verbatim.
            Condition::Template(_) => true,
        }
    }
}

impl TimeCondition {
    fn evaluate(&self, clock: &dyn Clock) -> bool {
        let Ok(tz) = self.tz_name.parse::<chrono_tz::Tz>() else {
            return false;
        };
        let now = clock.now().with_timezone(&tz);
        let now_time = now.time();

        let after = self.after.unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        let before = self
            .before
            .unwrap_or_else(|| NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap());

        let in_window = if after <= before {
            now_time >= after && now_time < before
        } else {
            // Wraps midnight: "not in period" is [before, after).
            !(now_time >= before && now_time < after)
        };

        let weekday_ok = self.weekdays.as_ref().is_none_or(|days| {
            // 0=Sunday..6=Saturday, matching TimeSpec's convention.
            let today = now.weekday().num_days_from_sunday() as u8;
            days.contains(&today)
        });

        in_window && weekday_ok
    }
}

impl SunCondition {
    fn evaluate(&self, view: &dyn StateView, clock: &dyn Clock) -> bool {
        let Some(sun) = view.entity_state("sun.sun") else {
            return true;
        };
        let now = clock.now();
        if let Some(before) = &self.before {
            let attr_key = format!("next_{before}");
            if let Some(instant) = sun
                .attributes
                .get(&attr_key)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<chrono::DateTime<chrono::Utc>>().ok())
            {
                let threshold = instant + chrono::Duration::seconds(self.before_offset_seconds);
                if now > threshold {
                    return false;
                }
            }
        }
        if let Some(after) = &self.after {
            let attr_key = format!("next_{after}");
            if let Some(instant) = sun
                .attributes
                .get(&attr_key)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<chrono::DateTime<chrono::Utc>>().ok())
            {
                let threshold = instant + chrono::Duration::seconds(self.after_offset_seconds);
                if now < threshold {
                    return false;
                }
            }
        }
        true
    }
}
