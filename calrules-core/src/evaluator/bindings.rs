//! Conversion between [`Event`] and script values.

use std::collections::BTreeMap;

use super::{EvaluationError, EvaluationErrorKind};
use crate::event::{Event, EventTime};
use crate::script::Value;

/// The `event` object a rule sees.
pub(crate) fn event_to_value(event: &Event) -> Value {
    let mut map = BTreeMap::new();
    map.insert("id".to_string(), Value::str(&event.id));
    map.insert("title".to_string(), Value::str(&event.title));
    map.insert("description".to_string(), Value::opt_str(event.description.as_deref()));
    map.insert("location".to_string(), Value::opt_str(event.location.as_deref()));
    map.insert("start".to_string(), Value::str(event.start.to_string()));
    map.insert("end".to_string(), Value::str(event.end.to_string()));
    map.insert("allDay".to_string(), Value::Bool(event.is_all_day()));
    map.insert("attendees".to_string(), Value::Number(f64::from(event.attendees)));
    map.insert("visibility".to_string(), Value::str(event.visibility.as_str()));
    map.insert("status".to_string(), Value::str(event.status.as_str()));
    map.insert("calendar".to_string(), Value::opt_str(event.calendar.as_deref()));
    Value::Object(map)
}

/// Every global bound for a run against `event`.
pub(crate) fn globals(event: &Event) -> Vec<(String, Value)> {
    let number = |n: u32| Value::Number(f64::from(n));
    vec![
        ("event".to_string(), event_to_value(event)),
        ("startHour".to_string(), number(event.start.hour())),
        ("endHour".to_string(), number(event.end.hour())),
        ("startMinute".to_string(), number(event.start.minute())),
        ("endMinute".to_string(), number(event.end.minute())),
        ("dayOfWeek".to_string(), number(event.start.weekday())),
        ("durationMinutes".to_string(), Value::Number(event.duration_minutes() as f64)),
        ("allDay".to_string(), Value::Bool(event.is_all_day())),
    ]
}

fn invalid(message: impl Into<String>) -> EvaluationError {
    EvaluationError::new(EvaluationErrorKind::InvalidReturnType, message)
}

fn expect_str(key: &str, value: Value) -> Result<String, EvaluationError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(invalid(format!("'{}' must be a string, got {}", key, other.type_name()))),
    }
}

fn expect_opt_str(key: &str, value: Value) -> Result<Option<String>, EvaluationError> {
    match value {
        Value::Null => Ok(None),
        other => expect_str(key, other).map(Some),
    }
}

fn expect_time(key: &str, value: Value) -> Result<EventTime, EvaluationError> {
    let s = expect_str(key, value)?;
    EventTime::parse(&s).map_err(|e| invalid(format!("'{}': {}", key, e)))
}

/// Apply a transform result to `base`. Keys the object does not name keep
/// their value from `base`.
pub(crate) fn overlay(base: &Event, fields: BTreeMap<String, Value>) -> Result<Event, EvaluationError> {
    let mut event = base.clone();
    let mut all_day = None;

    for (key, value) in fields {
        match key.as_str() {
            "id" => {
                if value != Value::str(&base.id) {
                    return Err(EvaluationError::new(
                        EvaluationErrorKind::IdentityViolation,
                        format!("transform changed the event id from '{}' to '{}'", base.id, value),
                    ));
                }
            }
            "title" => event.title = expect_str(&key, value)?,
            "description" => event.description = expect_opt_str(&key, value)?,
            "location" => event.location = expect_opt_str(&key, value)?,
            "calendar" => event.calendar = expect_opt_str(&key, value)?,
            "start" => event.start = expect_time(&key, value)?,
            "end" => event.end = expect_time(&key, value)?,
            "allDay" => match value {
                Value::Bool(b) => all_day = Some(b),
                other => return Err(invalid(format!("'allDay' must be a boolean, got {}", other.type_name()))),
            },
            "attendees" => {
                event.attendees = match value {
                    Value::Number(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => n as u32,
                    other => {
                        return Err(invalid(format!(
                            "'attendees' must be a non-negative whole number, got {}",
                            other
                        )));
                    }
                }
            }
            "visibility" => {
                event.visibility = expect_str(&key, value)?.parse().map_err(invalid)?;
            }
            "status" => {
                event.status = expect_str(&key, value)?.parse().map_err(invalid)?;
            }
            _ => return Err(invalid(format!("unknown event field '{}'", key))),
        }
    }

    // allDay is derived from the shape of `start`
    if let Some(all_day) = all_day {
        if all_day != event.is_all_day() {
            return Err(invalid(
                "'allDay' cannot be changed directly; set 'start' and 'end' to dates or date-times instead",
            ));
        }
    }

    if event.end.minutes_since(&event.start) < 0 {
        return Err(invalid(format!(
            "event ends ({}) before it starts ({})",
            event.end, event.start
        )));
    }

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Visibility;

    fn meeting() -> Event {
        Event::new(
            "1",
            "Team Meeting",
            EventTime::parse("2025-01-15T09:00:00Z").unwrap(),
            EventTime::parse("2025-01-15T10:30:00Z").unwrap(),
        )
    }

    fn fields(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_globals_expose_wall_clock_fields() {
        let globals: BTreeMap<_, _> = globals(&meeting()).into_iter().collect();
        assert_eq!(globals["startHour"], Value::Number(9.0));
        assert_eq!(globals["endMinute"], Value::Number(30.0));
        assert_eq!(globals["durationMinutes"], Value::Number(90.0));
        assert_eq!(globals["dayOfWeek"], Value::Number(3.0));
        assert_eq!(globals["allDay"], Value::Bool(false));
    }

    #[test]
    fn test_round_trip_through_value_is_identity() {
        let event = meeting();
        let Value::Object(map) = event_to_value(&event) else {
            panic!("event must map to an object");
        };
        assert_eq!(overlay(&event, map).unwrap(), event);
    }

    #[test]
    fn test_partial_overlay_keeps_other_fields() {
        let event = meeting();
        let out = overlay(
            &event,
            fields(&[("title", Value::str("[WORK] Team Meeting")), ("visibility", Value::str("private"))]),
        )
        .unwrap();
        assert_eq!(out.title, "[WORK] Team Meeting");
        assert_eq!(out.visibility, Visibility::Private);
        assert_eq!(out.start, event.start);
    }

    #[test]
    fn test_changed_id_is_identity_violation() {
        let err = overlay(&meeting(), fields(&[("id", Value::str("2"))])).unwrap_err();
        assert_eq!(err.kind, EvaluationErrorKind::IdentityViolation);
    }

    #[test]
    fn test_unknown_and_ill_typed_fields_are_rejected() {
        let err = overlay(&meeting(), fields(&[("colour", Value::str("red"))])).unwrap_err();
        assert_eq!(err.kind, EvaluationErrorKind::InvalidReturnType);

        let err = overlay(&meeting(), fields(&[("title", Value::Number(1.0))])).unwrap_err();
        assert_eq!(err.kind, EvaluationErrorKind::InvalidReturnType);

        let err = overlay(&meeting(), fields(&[("attendees", Value::Number(-1.0))])).unwrap_err();
        assert_eq!(err.kind, EvaluationErrorKind::InvalidReturnType);
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let err = overlay(&meeting(), fields(&[("end", Value::str("2025-01-15T08:00:00Z"))])).unwrap_err();
        assert_eq!(err.kind, EvaluationErrorKind::InvalidReturnType);
    }
}
