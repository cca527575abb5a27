//! Event types for the aggregation pipeline.
//!
//! [`Event`] is a VEVENT as read from a source feed, with its times kept in
//! whatever form the feed used. [`BusyEvent`] is a concrete busy block after
//! expansion and normalization into the configured local timezone.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// A calendar event read from a source feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub uid: String,
    pub summary: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    /// Whether event blocks time (OPAQUE) or is free (TRANSPARENT)
    pub transparency: Transparency,
    /// RRULE/RDATE/EXDATE data for master events
    pub recurrence: Option<Recurrence>,
    /// Original start of the instance this event overrides (RECURRENCE-ID)
    pub recurrence_id: Option<EventTime>,
}

/// Recurrence data of a master event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Recurrence {
    /// RRULE values, without the `RRULE:` prefix
    pub rrules: Vec<String>,
    pub rdates: Vec<EventTime>,
    pub exdates: Vec<EventTime>,
}

/// Event transparency (busy/free status)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transparency {
    /// Event blocks time on calendar (default)
    Opaque,
    /// Event does not block time (shows as free)
    Transparent,
}

impl Transparency {
    /// Anything other than OPAQUE is treated as non-blocking.
    pub fn from_ics_str(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("OPAQUE") {
            Transparency::Opaque
        } else {
            Transparency::Transparent
        }
    }
}

/// A time value as it appears in a feed.
#[derive(Debug, Clone, PartialEq)]
pub enum EventTime {
    /// All-day value (`VALUE=DATE`)
    Date(NaiveDate),
    /// Absolute time with `Z` suffix
    DateTimeUtc(DateTime<Utc>),
    /// Local time without zone, interpreted in the configured timezone
    DateTimeFloating(NaiveDateTime),
    /// Local time qualified by a `TZID` parameter
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    pub fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Resolve to an instant in `local`.
    ///
    /// Dates become local midnight, floating times are read as local wall
    /// time and zoned times are converted from their own zone. A TZID that
    /// is not an IANA name falls back to `local`.
    pub fn resolve(&self, local: Tz) -> DateTime<Tz> {
        match self {
            EventTime::Date(d) => localize(local, d.and_time(NaiveTime::MIN)),
            EventTime::DateTimeUtc(dt) => dt.with_timezone(&local),
            EventTime::DateTimeFloating(dt) => localize(local, *dt),
            EventTime::DateTimeZoned { datetime, tzid } => match tzid.parse::<Tz>() {
                Ok(zone) => localize(zone, *datetime).with_timezone(&local),
                Err(_) => {
                    tracing::warn!(tzid = %tzid, "unknown TZID, reading as local time");
                    localize(local, *datetime)
                }
            },
        }
    }

    /// Shift by `duration`, keeping the variant where possible.
    ///
    /// A date shifted by a whole number of days stays a date; any other
    /// duration turns it into a floating time at midnight plus the offset.
    pub fn shifted(&self, duration: Duration) -> EventTime {
        match self {
            EventTime::Date(d) => {
                if duration.num_seconds() % 86_400 == 0 {
                    EventTime::Date(*d + Duration::days(duration.num_days()))
                } else {
                    EventTime::DateTimeFloating(d.and_time(NaiveTime::MIN) + duration)
                }
            }
            EventTime::DateTimeUtc(dt) => EventTime::DateTimeUtc(*dt + duration),
            EventTime::DateTimeFloating(dt) => EventTime::DateTimeFloating(*dt + duration),
            EventTime::DateTimeZoned { datetime, tzid } => EventTime::DateTimeZoned {
                datetime: *datetime + duration,
                tzid: tzid.clone(),
            },
        }
    }
}

/// Map a wall-clock time to an instant, picking the earlier reading when the
/// time is ambiguous and skipping forward past a DST gap.
pub(crate) fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    let mut candidate = naive;
    // DST gaps are at most a couple of hours; step forward until the wall
    // time exists.
    for _ in 0..4 {
        if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
            return dt;
        }
        candidate += Duration::minutes(30);
    }
    tz.from_utc_datetime(&naive)
}

/// A normalized busy block in the configured timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct BusyEvent {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub summary: Option<String>,
}

impl BusyEvent {
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        BusyEvent {
            start,
            end,
            summary: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// The merged output calendar of a single aggregation run.
#[derive(Debug, Clone)]
pub struct AggregatedCalendar {
    /// Display name (`X-WR-CALNAME`)
    pub name: String,
    /// Timezone all events are expressed in (`X-WR-TIMEZONE`)
    pub timezone: Tz,
    pub events: Vec<BusyEvent>,
}
