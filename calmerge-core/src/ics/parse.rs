//! ICS feed parsing using the icalendar crate's parser.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use icalendar::{
    DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};

use crate::error::{CalMergeError, CalMergeResult};
use crate::event::{Event, EventTime, Recurrence, Transparency};

/// Parse every VEVENT of an ICS document.
///
/// VEVENTs without a usable DTSTART are skipped; a document the parser
/// rejects outright is an error.
pub fn parse_events(content: &str) -> CalMergeResult<Vec<Event>> {
    let content = content.trim_start_matches('\u{feff}');
    if !content.contains("BEGIN:VCALENDAR") {
        return Err(CalMergeError::IcsParse(
            "document does not contain a VCALENDAR".to_string(),
        ));
    }

    let unfolded = unfold(content);
    let calendar =
        read_calendar(&unfolded).map_err(|e| CalMergeError::IcsParse(e.to_string()))?;

    let mut events = Vec::new();
    collect_events(&calendar.components, &mut events);
    Ok(events)
}

fn collect_events(components: &[Component], events: &mut Vec<Event>) {
    for component in components {
        if component.name == "VEVENT" {
            match parse_vevent(component) {
                Some(event) => events.push(event),
                None => tracing::debug!("skipping VEVENT without a usable DTSTART"),
            }
        } else if component.name == "VCALENDAR" {
            collect_events(&component.components, events);
        }
    }
}

fn parse_vevent(vevent: &Component) -> Option<Event> {
    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .unwrap_or_default();
    let summary = vevent.find_prop("SUMMARY").map(|p| p.val.to_string());

    let start = parse_time_property(vevent.find_prop("DTSTART")?)?;
    let end = vevent
        .find_prop("DTEND")
        .and_then(parse_time_property)
        .or_else(|| {
            let duration = parse_duration(vevent.find_prop("DURATION")?.val.as_ref())?;
            Some(start.shifted(duration))
        })
        .unwrap_or_else(|| default_end(&start));

    let transparency = vevent
        .find_prop("TRANSP")
        .map(|p| Transparency::from_ics_str(p.val.as_ref()))
        .unwrap_or(Transparency::Opaque);

    let rrules: Vec<String> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "RRULE")
        .map(|p| p.val.to_string())
        .collect();
    let rdates: Vec<EventTime> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "RDATE")
        .flat_map(parse_date_list_property)
        .collect();
    let exdates: Vec<EventTime> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_date_list_property)
        .collect();
    let recurrence = if rrules.is_empty() && rdates.is_empty() {
        None
    } else {
        Some(Recurrence {
            rrules,
            rdates,
            exdates,
        })
    };

    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(parse_time_property);

    Some(Event {
        uid,
        summary,
        start,
        end,
        transparency,
        recurrence,
        recurrence_id,
    })
}

/// A DTSTART without DTEND or DURATION lasts one day for dates and no time
/// at all for date-times.
fn default_end(start: &EventTime) -> EventTime {
    if start.is_date() {
        start.shifted(Duration::days(1))
    } else {
        start.clone()
    }
}

fn parse_time_property(prop: &Property) -> Option<EventTime> {
    DatePerhapsTime::try_from(prop).ok().map(to_event_time)
}

/// Convert icalendar's DatePerhapsTime to our EventTime, preserving timezone info
fn to_event_time(dpt: DatePerhapsTime) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => EventTime::DateTimeUtc(dt),
            icalendar::CalendarDateTime::Floating(naive) => EventTime::DateTimeFloating(naive),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                EventTime::DateTimeZoned {
                    datetime: date_time,
                    tzid,
                }
            }
        },
    }
}

/// Parse a DURATION value (`PT1H30M`, `P2D`, `P1W`). Negative durations are ignored.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.starts_with('-') {
        return None;
    }
    let duration = iso8601::duration(value.trim_start_matches('+')).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}

/// Parse an EXDATE/RDATE property into a list of EventTime values.
///
/// Handles:
/// - TZID parameter: `EXDATE;TZID=America/New_York:20240108T100000`
/// - VALUE=DATE: `EXDATE;VALUE=DATE:20240108`
/// - UTC: `EXDATE:20240108T100000Z`
/// - Floating: `EXDATE:20240108T100000`
/// - Comma-separated values: `EXDATE;TZID=...:20240108T100000,20240115T100000`
///
/// RDATE periods (`VALUE=PERIOD`) are not supported and yield nothing.
fn parse_date_list_property(prop: &Property) -> Vec<EventTime> {
    let param = |key: &str| {
        prop.params
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
    };
    let tzid = param("TZID");
    let value_type = param("VALUE");

    if value_type.as_deref() == Some("PERIOD") {
        return Vec::new();
    }
    let is_date = value_type.as_deref() == Some("DATE");

    prop.val
        .as_ref()
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date || s.len() == 8 {
                NaiveDate::parse_from_str(s, "%Y%m%d")
                    .ok()
                    .map(EventTime::Date)
            } else if let Some(ref tz) = tzid {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| EventTime::DateTimeZoned {
                        datetime: dt,
                        tzid: tz.clone(),
                    })
            } else if let Some(s) = s.strip_suffix('Z') {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| EventTime::DateTimeUtc(dt.and_utc()))
            } else {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(EventTime::DateTimeFloating)
            }
        })
        .collect()
}
