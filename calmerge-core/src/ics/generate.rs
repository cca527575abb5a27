//! Busy calendar generation.

use chrono::DateTime;
use chrono_tz::Tz;
use icalendar::{Calendar, Component, Property};

use crate::event::{AggregatedCalendar, BusyEvent};

/// PRODID of every generated calendar.
pub const PRODUCT_ID: &str = "-//Calendar Merger//EN";

/// Generate the .ics document for an aggregated busy calendar.
///
/// Each VEVENT carries only DTSTART, DTEND and SUMMARY.
pub fn generate_calendar(calendar: &AggregatedCalendar) -> String {
    let mut cal = Calendar::new();
    cal.append_property(Property::new("X-WR-CALNAME", &calendar.name));
    cal.append_property(Property::new("X-WR-TIMEZONE", calendar.timezone.name()));

    for event in &calendar.events {
        cal.push(to_ics_event(event));
    }
    let cal = cal.done();

    strip_ics_bloat(&cal.to_string())
}

fn to_ics_event(event: &BusyEvent) -> icalendar::Event {
    let mut ics_event = icalendar::Event::new();
    ics_event.append_property(datetime_property("DTSTART", &event.start));
    ics_event.append_property(datetime_property("DTEND", &event.end));
    if let Some(ref summary) = event.summary {
        ics_event.summary(summary);
    }
    ics_event.done()
}

/// Local time with a TZID parameter, or the `Z` form for UTC.
fn datetime_property(name: &str, time: &DateTime<Tz>) -> Property {
    if time.timezone() == Tz::UTC {
        return Property::new(name, time.format("%Y%m%dT%H%M%SZ").to_string());
    }
    let mut prop = Property::new(name, time.format("%Y%m%dT%H%M%S").to_string());
    prop.add_parameter("TZID", time.timezone().name());
    prop
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with ours
/// - Remove CALSCALE:GREGORIAN (it's the default)
/// - Remove the UID and DTSTAMP the crate adds to every VEVENT
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());
    let mut in_vevent = false;

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:");
            result.push_str(PRODUCT_ID);
            result.push_str("\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        if line == "BEGIN:VEVENT" {
            in_vevent = true;
        } else if line == "END:VEVENT" {
            in_vevent = false;
        }

        if in_vevent && (line.starts_with("DTSTAMP:") || line.starts_with("UID:")) {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}
