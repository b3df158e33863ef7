// Rule triggers
//
// A trigger is the condition that fires a rule: either a time of day on a
// set of weekdays, or a visit to a URL matching a pattern. Firing itself is
// driven from outside (a scheduler or navigation listener); this module
// only answers "does it fire for this input" and "can two triggers fire for
// the same input".

use chrono::{Datelike, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Wire format of a trigger time
pub const TIME_FORMAT: &str = "%H:%M";

/// Highest valid weekday index (0 = Sunday ... 6 = Saturday)
pub const MAX_WEEKDAY: u8 = 6;

/// Condition that fires a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trigger {
    /// Fires at `time` ("HH:MM") on each weekday in `days`
    Time {
        #[serde(default)]
        time: String,
        #[serde(default)]
        days: BTreeSet<u8>,
    },
    /// Fires when a visited URL contains `url`
    Url {
        #[serde(default)]
        url: String,
    },
}

/// Discriminant of [`Trigger`], used by filters and conflict reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Time,
    Url,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Time => write!(f, "time"),
            TriggerKind::Url => write!(f, "url"),
        }
    }
}

/// Parse an "HH:MM" clock string
pub fn parse_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT).ok()
}

/// Same minute of the day. Strings that do not parse compare as text.
fn same_clock(a: &str, b: &str) -> bool {
    match (parse_clock(a), parse_clock(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a.trim() == b.trim(),
    }
}

impl Trigger {
    /// Build a time trigger from a clock string and weekday indices
    pub fn at(time: impl Into<String>, days: impl IntoIterator<Item = u8>) -> Self {
        Trigger::Time {
            time: time.into(),
            days: days.into_iter().collect(),
        }
    }

    /// Build a URL trigger
    pub fn on_url(url: impl Into<String>) -> Self {
        Trigger::Url { url: url.into() }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Time { .. } => TriggerKind::Time,
            Trigger::Url { .. } => TriggerKind::Url,
        }
    }

    /// Canonical form: clock strings parsed and re-printed as `HH:MM`,
    /// URL patterns trimmed. Unparseable times are only trimmed and left
    /// for validation to reject.
    pub fn normalized(self) -> Self {
        match self {
            Trigger::Time { time, days } => {
                let time = match parse_clock(&time) {
                    Some(clock) => clock.format(TIME_FORMAT).to_string(),
                    None => time.trim().to_string(),
                };
                Trigger::Time { time, days }
            }
            Trigger::Url { url } => Trigger::Url {
                url: url.trim().to_string(),
            },
        }
    }

    /// Whether two triggers could fire for the same input.
    ///
    /// Time triggers overlap when they name the same minute and the
    /// weekday sets intersect. URL triggers overlap when either trimmed
    /// pattern contains the other, ignoring case. Triggers of different
    /// kinds never overlap.
    pub fn overlaps(&self, other: &Trigger) -> bool {
        match (self, other) {
            (
                Trigger::Time { time: t1, days: d1 },
                Trigger::Time { time: t2, days: d2 },
            ) => same_clock(t1, t2) && d1.intersection(d2).next().is_some(),
            (Trigger::Url { url: u1 }, Trigger::Url { url: u2 }) => {
                let a = u1.trim().to_lowercase();
                let b = u2.trim().to_lowercase();
                a.contains(&b) || b.contains(&a)
            }
            _ => false,
        }
    }

    /// Whether this trigger fires at the given local date-time
    pub fn fires_at<T: Datelike + Timelike>(&self, now: &T) -> bool {
        match self {
            Trigger::Time { time, days } => {
                let weekday = now.weekday().num_days_from_sunday() as u8;
                match parse_clock(time) {
                    Some(clock) => {
                        days.contains(&weekday)
                            && clock.hour() == now.hour()
                            && clock.minute() == now.minute()
                    }
                    None => false,
                }
            }
            Trigger::Url { .. } => false,
        }
    }

    /// Whether this trigger fires for a visited URL
    pub fn fires_on_url(&self, visited: &str) -> bool {
        match self {
            Trigger::Url { url } => {
                let pattern = url.trim().to_lowercase();
                !pattern.is_empty() && visited.to_lowercase().contains(&pattern)
            }
            Trigger::Time { .. } => false,
        }
    }
}
