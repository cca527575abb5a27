//! Busy event extraction for a single source.
//!
//! Fetches a feed, expands its events over a forward-looking window starting
//! at today's local midnight, drops non-blocking events and converts every
//! remaining instance into the configured timezone.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::error::{CalMergeError, CalMergeResult};
use crate::event::{BusyEvent, Event, Transparency, localize};
use crate::fetch::{CalendarSource, SourceFetcher};
use crate::ics::parse_events;
use crate::recurrence::expand_recurring_event;

/// Time range events are expanded and filtered over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionWindow {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl ExtractionWindow {
    /// `[start of today, start of today + days)` in `tz`, relative to `now`.
    pub fn starting_today(now: DateTime<Utc>, tz: Tz, days: u32) -> CalMergeResult<Self> {
        let today = now.with_timezone(&tz).date_naive();
        let start = localize(tz, today.and_time(NaiveTime::MIN));
        let end = start
            .checked_add_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| {
                CalMergeError::Config(format!("days_limit {} is out of range", days))
            })?;
        Ok(ExtractionWindow { start, end })
    }

    /// Whether `[start, end)` intersects the window. Zero-length spans count
    /// when they fall inside it.
    pub fn intersects(&self, start: DateTime<Tz>, end: DateTime<Tz>) -> bool {
        if start == end {
            return start >= self.start && start < self.end;
        }
        start < self.end && end > self.start
    }
}

/// Extract busy events from an ICS document.
///
/// Recurring events are expanded over `window`, overrides replace the
/// occurrences they stand for, TRANSPARENT events are dropped and the rest
/// are normalized to `local`. Output order follows the document.
pub fn extract_busy_events(
    content: &str,
    window: &ExtractionWindow,
    local: Tz,
) -> CalMergeResult<Vec<BusyEvent>> {
    let events = parse_events(content)?;

    let mut overrides: HashMap<&str, HashSet<DateTime<Utc>>> = HashMap::new();
    for event in &events {
        if let Some(ref recurrence_id) = event.recurrence_id {
            overrides
                .entry(event.uid.as_str())
                .or_default()
                .insert(recurrence_id.resolve(local).with_timezone(&Utc));
        }
    }

    let range_start = window.start.with_timezone(&Utc);
    let range_end = window.end.with_timezone(&Utc);
    let no_overrides = HashSet::new();

    let mut instances: Vec<Event> = Vec::new();
    for event in &events {
        if event.recurrence.is_some() && event.recurrence_id.is_none() {
            let overridden = overrides.get(event.uid.as_str()).unwrap_or(&no_overrides);
            instances.extend(expand_recurring_event(
                event,
                local,
                range_start,
                range_end,
                overridden,
            )?);
        } else {
            instances.push(event.clone());
        }
    }

    let busy: Vec<BusyEvent> = instances
        .into_iter()
        .filter(|event| event.transparency == Transparency::Opaque)
        .filter_map(|event| {
            let start = event.start.resolve(local);
            let end = event.end.resolve(local);
            window.intersects(start, end).then_some(BusyEvent {
                start,
                end,
                summary: event.summary,
            })
        })
        .collect();

    Ok(busy)
}

/// Produces the busy events of one source.
pub struct EventExtractor {
    fetcher: SourceFetcher,
    timezone: Tz,
    days_limit: u32,
}

impl EventExtractor {
    pub fn new(fetcher: SourceFetcher, timezone: Tz, days_limit: u32) -> Self {
        EventExtractor {
            fetcher,
            timezone,
            days_limit,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn fetcher(&self) -> &SourceFetcher {
        &self.fetcher
    }

    /// Extraction window relative to `now`.
    pub fn window_at(&self, now: DateTime<Utc>) -> CalMergeResult<ExtractionWindow> {
        ExtractionWindow::starting_today(now, self.timezone, self.days_limit)
    }

    /// Fetch `source` and extract its busy events within `window`.
    pub async fn extract(
        &self,
        source: &CalendarSource,
        window: &ExtractionWindow,
    ) -> CalMergeResult<Vec<BusyEvent>> {
        let raw = self.fetcher.fetch(source).await?;
        let content = std::str::from_utf8(&raw.bytes).map_err(|e| {
            CalMergeError::IcsParse(format!("{} is not valid UTF-8: {}", raw.source, e))
        })?;

        let events = extract_busy_events(content, window, self.timezone)?;
        tracing::debug!(source = %raw.source, events = events.len(), "extracted busy events");
        Ok(events)
    }
}
