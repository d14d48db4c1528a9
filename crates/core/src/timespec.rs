use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A cron-style recurrence description: minute, hour, day-of-month, month,
/// and weekday fields (each a literal, a wildcard `*`, or a cron
/// step-expression `*/N` / comma-list), plus an IANA timezone name.
///
/// Weekday numbering is fixed to the standard cron convention used by
/// `croner`: 0 and 7 both mean Sunday, 1-6 are Monday through Saturday.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSpec {
    #[serde(default = "wildcard")]
    pub minute: String,
    #[serde(default = "wildcard")]
    pub hour: String,
    #[serde(default = "wildcard", rename = "day_of_month")]
    pub day_of_month: String,
    #[serde(default = "wildcard")]
    pub month: String,
    #[serde(default = "wildcard", rename = "weekdays")]
    pub weekday: String,
    #[serde(rename = "tz", default)]
    pub tz_name: String,
}

fn wildcard() -> String {
    "*".to_string()
}

impl TimeSpec {
    pub fn new(
        minute: impl Into<String>,
        hour: impl Into<String>,
        day_of_month: impl Into<String>,
        month: impl Into<String>,
        weekday: impl Into<String>,
        tz_name: impl Into<String>,
    ) -> Self {
        Self {
            minute: minute.into(),
            hour: hour.into(),
            day_of_month: day_of_month.into(),
            month: month.into(),
            weekday: weekday.into(),
            tz_name: tz_name.into(),
        }
    }

    /// The synthesized standard 5-field cron expression `minute hour
    /// day-of-month month weekday` this spec reduces to.
    pub fn cron_expr(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month, self.weekday
        )
    }

    /// Validates the spec, returning the parsed timezone and cron matcher.
    fn validated(&self) -> Result<(chrono_tz::Tz, croner::Cron)> {
        let tz = self
            .tz_name
            .parse::<chrono_tz::Tz>()
            .map_err(|_| Error::InvalidSpec {
                field: "tz".to_string(),
                message: format!("unknown IANA timezone '{}'", self.tz_name),
            })?;
        let cron = croner::Cron::new(&self.cron_expr())
            .parse()
            .map_err(|e| Error::InvalidSpec {
                field: "cron_expr".to_string(),
                message: e.to_string(),
            })?;
        Ok((tz, cron))
    }

    pub fn validate(&self) -> Result<()> {
        self.validated().map(|_| ())
    }

    /// The least instant strictly greater than `now` that satisfies every
    /// field of this spec, in the spec's own zone. Always aligned to
    /// `second == 0` (standard cron granularity).
    pub fn next_time_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let (tz, cron) = self.validated()?;
        let now_tz = now.with_timezone(&tz);
        cron.find_next_occurrence(&now_tz, false)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::InvalidSpec {
                field: "cron_expr".to_string(),
                message: format!("no future occurrence: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn s1_basic_cron_every_two_minutes() {
        let spec = TimeSpec::new("*/2", "*", "*", "*", "*", "UTC");
        let next = spec.next_time_from(at("2018-01-01T00:01:59Z")).unwrap();
        assert_eq!(next, at("2018-01-01T00:02:00Z"));
    }

    #[test]
    fn s2_specific_calendar_date() {
        let spec = TimeSpec::new("30", "9", "4", "7", "*", "UTC");
        let next = spec.next_time_from(at("2018-01-01T00:00:00Z")).unwrap();
        assert_eq!(next, at("2018-07-04T09:30:00Z"));
    }

    #[test]
    fn s3_weekday_set() {
        // cron weekday 5,6 = Fri,Sat (0=Sun..6=Sat); "7" duplicates Sun (=0) per
        // the rfc-5545-adjacent convention accepted by croner.
        let spec = TimeSpec::new("30", "8", "*", "*", "5,6,0", "UTC");
        let next = spec.next_time_from(at("2018-01-07T08:30:01Z")).unwrap();
        assert_eq!(next, at("2018-01-12T08:30:00Z"));
    }

    #[test]
    fn next_time_from_is_always_strictly_greater() {
        let spec = TimeSpec::new("*", "*", "*", "*", "*", "UTC");
        let now = at("2018-01-01T00:00:00Z");
        let next = spec.next_time_from(now).unwrap();
        assert!(next > now);
    }

    #[test]
    fn invalid_timezone_is_rejected() {
        let spec = TimeSpec::new("*", "*", "*", "*", "*", "Not/AZone");
        assert!(spec.validate().is_err());
    }
}
