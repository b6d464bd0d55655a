//! Events from a directory of `.ics` files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Days, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, read_calendar, unfold},
};
use tracing::warn;

use super::EventSource;
use crate::error::{CalRulesError, CalRulesResult};
use crate::event::{Event, EventStatus, EventTime, Visibility};

/// Every VEVENT of every `.ics` file in a directory. Floating times are read
/// in `zone`; the calendar name is the file stem.
#[derive(Debug, Clone)]
pub struct IcsDirSource {
    dir: PathBuf,
    zone: Tz,
}

impl IcsDirSource {
    pub fn new(dir: impl Into<PathBuf>, zone: Tz) -> Self {
        IcsDirSource { dir: dir.into(), zone }
    }

    fn read_dir(&self) -> CalRulesResult<Vec<Event>> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| CalRulesError::Source(format!("{}: {}", self.dir.display(), e)))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "ics"))
            .collect();
        paths.sort();

        let mut events = Vec::new();
        for path in paths {
            let content = std::fs::read_to_string(&path)?;
            events.extend(parse_calendar(&content, &path, self.zone)?);
        }
        Ok(events)
    }
}

#[async_trait]
impl EventSource for IcsDirSource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    async fn fetch_events(&self) -> CalRulesResult<Vec<Event>> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.read_dir())
            .await
            .map_err(|e| CalRulesError::Source(format!("reading {} failed: {}", self.dir.display(), e)))?
    }
}

fn parse_calendar(content: &str, path: &Path, zone: Tz) -> CalRulesResult<Vec<Event>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| CalRulesError::Source(format!("{}: {}", path.display(), e)))?;
    let calendar_name = path.file_stem().map(|s| s.to_string_lossy().to_string());

    let events = calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(|vevent| {
            let event = parse_event(vevent, zone);
            if event.is_none() {
                warn!(file = %path.display(), "Skipping VEVENT without UID or DTSTART");
            }
            event
        })
        .map(|mut event| {
            event.calendar = calendar_name.clone();
            event
        })
        .collect();
    Ok(events)
}

fn parse_event(vevent: &Component, zone: Tz) -> Option<Event> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());
    let start = to_event_time(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?, zone);

    // Without DTEND, an all-day event lasts one day and a timed one is instantaneous
    let end = match vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
    {
        Some(end) => to_event_time(end, zone),
        None => match &start {
            EventTime::Date(d) => EventTime::Date(d.checked_add_days(Days::new(1)).unwrap_or(*d)),
            timed => timed.clone(),
        },
    };

    let status = vevent
        .find_prop("STATUS")
        .map(|p| match p.val.as_ref() {
            "TENTATIVE" => EventStatus::Tentative,
            "CANCELLED" => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        })
        .unwrap_or_default();

    let visibility = vevent
        .find_prop("CLASS")
        .map(|p| match p.val.as_ref() {
            "PUBLIC" => Visibility::Public,
            "PRIVATE" => Visibility::Private,
            "CONFIDENTIAL" => Visibility::Confidential,
            _ => Visibility::Default,
        })
        .unwrap_or_default();

    let attendees = vevent.properties.iter().filter(|p| p.name == "ATTENDEE").count();

    Some(Event {
        id: uid,
        title,
        description: vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string()),
        location: vevent.find_prop("LOCATION").map(|p| p.val.to_string()),
        start,
        end,
        attendees: u32::try_from(attendees).unwrap_or(u32::MAX),
        visibility,
        status,
        calendar: None,
    })
}

/// Resolve an ICS time to an offset-carrying [`EventTime`].
fn to_event_time(dpt: DatePerhapsTime, zone: Tz) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => EventTime::DateTime(dt.fixed_offset()),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => localize(naive, zone),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let tz = tzid.parse::<Tz>().unwrap_or_else(|_| {
                warn!(tzid = %tzid, "Unknown TZID, using {}", zone);
                zone
            });
            localize(date_time, tz)
        }
    }
}

/// Local times inside a DST gap are read as UTC in that zone.
fn localize(naive: NaiveDateTime, tz: Tz) -> EventTime {
    let dt = tz
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive));
    EventTime::DateTime(dt.fixed_offset())
}
