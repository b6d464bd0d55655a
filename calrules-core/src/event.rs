//! Provider-neutral event types.
//!
//! These types represent calendar events in a provider-agnostic way.
//! Event sources convert their input into these types, and the rule pipeline
//! works exclusively with them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

/// A calendar event (provider-neutral)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    /// Number of attendees (0 when unknown)
    #[serde(default)]
    pub attendees: u32,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub status: EventStatus,
    /// Name of the calendar the event came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<String>,
}

impl Event {
    pub fn new(id: impl Into<String>, title: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        Event {
            id: id.into(),
            title: title.into(),
            description: None,
            location: None,
            start,
            end,
            attendees: 0,
            visibility: Visibility::Default,
            status: EventStatus::Confirmed,
            calendar: None,
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self.start, EventTime::Date(_))
    }

    /// Length of the event in minutes. All-day events count whole days.
    pub fn duration_minutes(&self) -> i64 {
        self.end.minutes_since(&self.start)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Start or end of an event.
///
/// Timed values keep the UTC offset they were recorded with so that rules see
/// the wall-clock hour of the calendar they came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventTime {
    DateTime(DateTime<FixedOffset>),
    Date(NaiveDate),
}

impl EventTime {
    /// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(EventTime::DateTime(dt));
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(EventTime::Date(d));
        }
        Err(format!(
            "Invalid time '{}'. Expected RFC 3339 (2025-01-15T09:00:00+01:00) or YYYY-MM-DD",
            s
        ))
    }

    pub fn hour(&self) -> u32 {
        match self {
            EventTime::DateTime(dt) => dt.hour(),
            EventTime::Date(_) => 0,
        }
    }

    pub fn minute(&self) -> u32 {
        match self {
            EventTime::DateTime(dt) => dt.minute(),
            EventTime::Date(_) => 0,
        }
    }

    /// Day of week with Sunday = 0, Saturday = 6.
    pub fn weekday(&self) -> u32 {
        self.date().weekday().num_days_from_sunday()
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            EventTime::DateTime(dt) => dt.date_naive(),
            EventTime::Date(d) => *d,
        }
    }

    /// Whole minutes from `earlier` to `self` (negative if `self` is earlier).
    pub fn minutes_since(&self, earlier: &EventTime) -> i64 {
        match (self, earlier) {
            (EventTime::DateTime(a), EventTime::DateTime(b)) => (*a - *b).num_minutes(),
            (a, b) => {
                let a = a.date().and_hms_opt(a.hour(), a.minute(), 0);
                let b = b.date().and_hms_opt(b.hour(), b.minute(), 0);
                match (a, b) {
                    (Some(a), Some(b)) => (a - b).num_minutes(),
                    _ => 0,
                }
            }
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EventTime::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl TryFrom<String> for EventTime {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        EventTime::parse(&s)
    }
}

impl From<EventTime> for String {
    fn from(t: EventTime) -> Self {
        t.to_string()
    }
}

/// Who can see the event on a shared calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Default,
    Public,
    Private,
    Confidential,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Default => "default",
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Confidential => "confidential",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Visibility::Default),
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "confidential" => Ok(Visibility::Confidential),
            other => Err(format!("unknown visibility '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Confirmed => "confirmed",
            EventStatus::Tentative => "tentative",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(EventStatus::Confirmed),
            "tentative" => Ok(EventStatus::Tentative),
            "cancelled" => Ok(EventStatus::Cancelled),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}
