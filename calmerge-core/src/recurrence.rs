//! RRULE expansion for recurring events.
//!
//! Expands a master recurring event into individual instances around a time
//! range, honouring RDATEs and EXDATEs and leaving out occurrences that an
//! override (RECURRENCE-ID) replaces.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::error::{CalMergeError, CalMergeResult};
use crate::event::{Event, EventTime, localize};

/// Upper bound on instances generated per master event.
const MAX_INSTANCES: u16 = 1000;

/// Time zone name to put in a TZID parameter for the rrule parser.
fn zone_name(tzid: &str, local: Tz) -> String {
    match tzid.parse::<Tz>() {
        Ok(tz) => tz.name().to_string(),
        Err(_) => local.name().to_string(),
    }
}

/// Render a time value as the `NAME[;TZID=..]:VALUE` part of a content line.
fn format_time_line(name: &str, time: &EventTime, local: Tz) -> String {
    match time {
        // The rrule crate needs a datetime, so all-day dates become midnight UTC
        EventTime::Date(d) => format!("{}:{}T000000Z", name, d.format("%Y%m%d")),
        EventTime::DateTimeUtc(dt) => format!("{}:{}", name, dt.format("%Y%m%dT%H%M%SZ")),
        EventTime::DateTimeFloating(dt) => format!(
            "{};TZID={}:{}",
            name,
            local.name(),
            dt.format("%Y%m%dT%H%M%S")
        ),
        EventTime::DateTimeZoned { datetime, tzid } => format!(
            "{};TZID={}:{}",
            name,
            zone_name(tzid, local),
            datetime.format("%Y%m%dT%H%M%S")
        ),
    }
}

/// Rewrite UNTIL into the UTC form the rrule crate requires.
///
/// All-day masters keep only the date of UNTIL, at midnight UTC like their
/// DTSTART. Other masters resolve a local UNTIL in the zone of DTSTART
/// (floating starts use `local`); a date-only UNTIL covers its whole day.
fn normalize_rrule(rrule: &str, start: &EventTime, local: Tz) -> String {
    rrule
        .split(';')
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => {
                match normalize_until(value.trim(), start, local) {
                    Some(until) => format!("{}={}", key, until),
                    None => part.to_string(),
                }
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn normalize_until(value: &str, start: &EventTime, local: Tz) -> Option<String> {
    let date = NaiveDate::parse_from_str(value.get(..8)?, "%Y%m%d").ok()?;
    if start.is_date() {
        return Some(format!("{}T000000Z", date.format("%Y%m%d")));
    }
    if value.ends_with('Z') {
        return None;
    }

    let naive = if value.len() == 8 {
        date.and_time(NaiveTime::from_hms_opt(23, 59, 59)?)
    } else {
        NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?
    };
    let zone = match start {
        EventTime::DateTimeZoned { tzid, .. } => tzid.parse::<Tz>().unwrap_or(local),
        EventTime::DateTimeUtc(_) => Tz::UTC,
        _ => local,
    };
    let until = localize(zone, naive).with_timezone(&Utc);
    Some(until.format("%Y%m%dT%H%M%SZ").to_string())
}

/// Build an iCalendar-format rule set string for the rrule crate parser.
fn build_rrule_string(master: &Event, local: Tz) -> Option<String> {
    let recurrence = master.recurrence.as_ref()?;
    let mut lines = vec![format_time_line("DTSTART", &master.start, local)];

    for rrule in &recurrence.rrules {
        lines.push(format!("RRULE:{}", normalize_rrule(rrule, &master.start, local)));
    }

    // Without an RRULE the set only yields RDATEs, so DTSTART is added as one
    if recurrence.rrules.is_empty() {
        lines.push(format_time_line("RDATE", &master.start, local));
    }
    for rdate in &recurrence.rdates {
        lines.push(format_time_line("RDATE", &coerce_variant(rdate, &master.start), local));
    }
    for exdate in &recurrence.exdates {
        lines.push(format_time_line("EXDATE", &coerce_variant(exdate, &master.start), local));
    }

    Some(lines.join("\n"))
}

/// RDATE/EXDATE values must agree with DTSTART on being date-only or not.
fn coerce_variant(time: &EventTime, master_start: &EventTime) -> EventTime {
    match (time, master_start) {
        (EventTime::Date(d), EventTime::Date(_)) => EventTime::Date(*d),
        (EventTime::Date(d), other) => {
            let reference = match other {
                EventTime::DateTimeUtc(dt) => dt.time(),
                EventTime::DateTimeFloating(dt) => dt.time(),
                EventTime::DateTimeZoned { datetime, .. } => datetime.time(),
                EventTime::Date(_) => chrono::NaiveTime::MIN,
            };
            let naive = d.and_time(reference);
            match other {
                EventTime::DateTimeUtc(_) => EventTime::DateTimeUtc(naive.and_utc()),
                EventTime::DateTimeZoned { tzid, .. } => EventTime::DateTimeZoned {
                    datetime: naive,
                    tzid: tzid.clone(),
                },
                _ => EventTime::DateTimeFloating(naive),
            }
        }
        (EventTime::DateTimeUtc(dt), EventTime::Date(_)) => EventTime::Date(dt.date_naive()),
        (EventTime::DateTimeFloating(dt), EventTime::Date(_)) => EventTime::Date(dt.date()),
        (EventTime::DateTimeZoned { datetime, .. }, EventTime::Date(_)) => {
            EventTime::Date(datetime.date())
        }
        (other, _) => other.clone(),
    }
}

/// Convert an rrule occurrence datetime back to an EventTime matching the master's variant.
fn occurrence_to_event_time(dt: &DateTime<rrule::Tz>, master_start: &EventTime) -> EventTime {
    match master_start {
        EventTime::Date(_) => EventTime::Date(dt.date_naive()),
        EventTime::DateTimeUtc(_) => EventTime::DateTimeUtc(dt.with_timezone(&Utc)),
        EventTime::DateTimeFloating(_) => EventTime::DateTimeFloating(dt.naive_local()),
        EventTime::DateTimeZoned { tzid, .. } => EventTime::DateTimeZoned {
            datetime: dt.naive_local(),
            tzid: tzid.clone(),
        },
    }
}

/// Length of the master event, measured so that it can be re-applied to each
/// occurrence without drifting across DST changes.
pub(crate) fn event_span(start: &EventTime, end: &EventTime, local: Tz) -> Duration {
    let span = match (start, end) {
        (EventTime::Date(s), EventTime::Date(e)) => Duration::days((*e - *s).num_days()),
        (EventTime::DateTimeFloating(s), EventTime::DateTimeFloating(e)) => *e - *s,
        (
            EventTime::DateTimeZoned {
                datetime: s,
                tzid: start_tz,
            },
            EventTime::DateTimeZoned {
                datetime: e,
                tzid: end_tz,
            },
        ) if start_tz == end_tz => *e - *s,
        _ => end.resolve(local) - start.resolve(local),
    };
    span.max(Duration::zero())
}

/// Expand a recurring master event into the instances that may touch
/// [range_start, range_end].
///
/// - `overridden` holds the original start instants (UTC) of occurrences that
///   an override event replaces; those occurrences are not generated.
/// - The master event itself is NOT included; only expanded instances with
///   `recurrence_id` set. Callers still filter instances against the range.
pub fn expand_recurring_event(
    master: &Event,
    local: Tz,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    overridden: &HashSet<DateTime<Utc>>,
) -> CalMergeResult<Vec<Event>> {
    let Some(rrule_str) = build_rrule_string(master, local) else {
        return Ok(Vec::new());
    };

    let rrule_set: RRuleSet = rrule_str.parse().map_err(|e| {
        CalMergeError::IcsParse(format!(
            "Failed to parse RRULE for event '{}': {}",
            master.uid, e
        ))
    })?;

    let duration = event_span(&master.start, &master.end, local);

    // Occurrences that started before the range but are still running count,
    // so the lower bound is moved back by the event length. The extra second
    // makes the bounds inclusive.
    let tz: rrule::Tz = Utc.into();
    let after = (range_start - duration - Duration::seconds(1)).with_timezone(&tz);
    let before = (range_end + Duration::seconds(1)).with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(MAX_INSTANCES);
    if result.limited {
        tracing::warn!(
            uid = %master.uid,
            limit = MAX_INSTANCES,
            "recurrence expansion truncated"
        );
    }

    let mut events = Vec::with_capacity(result.dates.len());
    for occ_dt in &result.dates {
        let occ_start = occurrence_to_event_time(occ_dt, &master.start);
        if overridden.contains(&occ_start.resolve(local).with_timezone(&Utc)) {
            continue;
        }

        events.push(Event {
            uid: master.uid.clone(),
            summary: master.summary.clone(),
            start: occ_start.clone(),
            end: occ_start.shifted(duration),
            transparency: master.transparency,
            recurrence: None,
            recurrence_id: Some(occ_start),
        });
    }

    Ok(events)
}
