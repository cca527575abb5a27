//! Aggregation of all configured sources into one busy calendar.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::task::JoinSet;

use crate::cache::SourceCache;
use crate::config::MergerConfig;
use crate::consolidate::consolidate;
use crate::error::{CalMergeError, CalMergeResult};
use crate::event::{AggregatedCalendar, BusyEvent};
use crate::extract::{EventExtractor, ExtractionWindow};
use crate::fetch::{CalendarSource, SourceFetcher};
use crate::ics::generate_calendar;
use crate::split::{SplittingStrategy, split_into_day_chunks};

/// What to do when one source cannot be fetched or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFailurePolicy {
    /// Fail the whole aggregation
    #[default]
    Fail,
    /// Log the failure and serve the remaining sources
    Skip,
}

/// Post-processing applied to the joined events.
#[derive(Debug, Clone)]
pub struct AggregateSettings {
    pub merge_overlapping_events: bool,
    pub splitting_strategy: SplittingStrategy,
    pub calendar_name: String,
    pub busy_events_summary: String,
    pub failure_policy: SourceFailurePolicy,
}

impl From<&MergerConfig> for AggregateSettings {
    fn from(config: &MergerConfig) -> Self {
        AggregateSettings {
            merge_overlapping_events: config.merge_overlapping_events,
            splitting_strategy: config.event_splitting_strategy,
            calendar_name: config.calendar_name.clone(),
            busy_events_summary: config.busy_events_summary.clone(),
            failure_policy: config.source_failure_policy,
        }
    }
}

/// Builds the merged busy calendar from every configured source.
pub struct Aggregator {
    extractor: Arc<EventExtractor>,
    sources: Vec<CalendarSource>,
    settings: AggregateSettings,
}

impl Aggregator {
    pub fn new(
        extractor: EventExtractor,
        sources: Vec<CalendarSource>,
        settings: AggregateSettings,
    ) -> Self {
        Aggregator {
            extractor: Arc::new(extractor),
            sources,
            settings,
        }
    }

    /// Wire up cache, fetcher and extractor from configuration.
    pub fn from_config(config: &MergerConfig) -> CalMergeResult<Self> {
        let timezone = config.timezone()?;
        let cache = Arc::new(SourceCache::with_ttl_minutes(
            config.cache_expiration_minutes,
            config.cache_capacity,
        ));
        let fetcher = SourceFetcher::new(
            cache,
            Duration::from_secs(config.fetch_timeout_seconds),
        )?;
        let extractor = EventExtractor::new(fetcher, timezone, config.days_limit);
        let sources = config
            .calendar_urls
            .iter()
            .map(|id| CalendarSource::parse(id))
            .collect();

        Ok(Self::new(extractor, sources, AggregateSettings::from(config)))
    }

    pub fn sources(&self) -> &[CalendarSource] {
        &self.sources
    }

    pub fn extractor(&self) -> &EventExtractor {
        &self.extractor
    }

    /// Aggregate all sources and serialize the result as ICS.
    pub async fn aggregate(&self) -> CalMergeResult<String> {
        self.aggregate_at(Utc::now()).await
    }

    /// Like [`Aggregator::aggregate`], with the window anchored at `now`.
    pub async fn aggregate_at(&self, now: DateTime<Utc>) -> CalMergeResult<String> {
        let calendar = self.build_calendar(now).await?;
        Ok(generate_calendar(&calendar))
    }

    /// Run the pipeline: extract every source concurrently, then merge,
    /// split and relabel the joined events.
    pub async fn build_calendar(&self, now: DateTime<Utc>) -> CalMergeResult<AggregatedCalendar> {
        let window = self.extractor.window_at(now)?;
        let mut events = self.collect_events(window).await?;
        let collected = events.len();

        if self.settings.merge_overlapping_events {
            events = consolidate(events);
        }
        events = split_into_day_chunks(events, self.settings.splitting_strategy);

        for event in &mut events {
            event.summary = Some(self.settings.busy_events_summary.clone());
        }

        tracing::info!(
            sources = self.sources.len(),
            collected,
            emitted = events.len(),
            "aggregated busy calendar"
        );

        Ok(AggregatedCalendar {
            name: self.settings.calendar_name.clone(),
            timezone: self.extractor.timezone(),
            events,
        })
    }

    /// Extract all sources concurrently and concatenate their events in
    /// completion order.
    async fn collect_events(&self, window: ExtractionWindow) -> CalMergeResult<Vec<BusyEvent>> {
        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let extractor = Arc::clone(&self.extractor);
            let source = source.clone();
            tasks.spawn(async move {
                let result = extractor.extract(&source, &window).await;
                (source, result)
            });
        }

        let mut events = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (source, result) = joined.map_err(|e| CalMergeError::Task(e.to_string()))?;
            match result {
                Ok(source_events) => events.extend(source_events),
                Err(error) => match self.settings.failure_policy {
                    SourceFailurePolicy::Fail => {
                        tracing::error!(source = %source, error = %error, "source failed, aborting aggregation");
                        tasks.abort_all();
                        return Err(CalMergeError::aggregation(source.id(), error));
                    }
                    SourceFailurePolicy::Skip => {
                        tracing::warn!(source = %source, error = %error, "skipping failed source");
                    }
                },
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use std::path::Path;

    fn write_calendar(dir: &Path, name: &str, body: &str) -> CalendarSource {
        let path = dir.join(name);
        std::fs::write(
            &path,
            format!("BEGIN:VCALENDAR\nVERSION:2.0\nPRODID:TEST\n{}END:VCALENDAR\n", body),
        )
        .unwrap();
        CalendarSource::Local(path)
    }

    fn aggregator(sources: Vec<CalendarSource>, settings: AggregateSettings) -> Aggregator {
        let cache = Arc::new(SourceCache::new(Duration::from_secs(60), 10));
        let fetcher = SourceFetcher::new(cache, Duration::from_secs(5)).unwrap();
        let extractor = EventExtractor::new(fetcher, chrono_tz::Europe::Berlin, 7);
        Aggregator::new(extractor, sources, settings)
    }

    fn settings(merge: bool, strategy: SplittingStrategy) -> AggregateSettings {
        AggregateSettings {
            merge_overlapping_events: merge,
            splitting_strategy: strategy,
            calendar_name: "Busy times".to_string(),
            busy_events_summary: "Busy".to_string(),
            failure_policy: SourceFailurePolicy::Fail,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()
    }

    fn berlin(day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
        chrono_tz::Europe::Berlin
            .with_ymd_and_hms(2024, 1, day, hour, minute, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_overlapping_events_across_sources_merge() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_calendar(
            dir.path(),
            "a.ics",
            "BEGIN:VEVENT\nUID:a\nSUMMARY:Private\nDTSTART;TZID=Europe/Berlin:20240111T100000\nDTEND;TZID=Europe/Berlin:20240111T110000\nEND:VEVENT\n",
        );
        let b = write_calendar(
            dir.path(),
            "b.ics",
            "BEGIN:VEVENT\nUID:b\nSUMMARY:Work\nDTSTART;TZID=Europe/Berlin:20240111T103000\nDTEND;TZID=Europe/Berlin:20240111T120000\nEND:VEVENT\n",
        );

        let calendar = aggregator(vec![a, b], settings(true, SplittingStrategy::NoSplit))
            .build_calendar(now())
            .await
            .unwrap();

        assert_eq!(
            calendar.events,
            vec![BusyEvent {
                start: berlin(11, 10, 0),
                end: berlin(11, 12, 0),
                summary: Some("Busy".to_string()),
            }]
        );
        assert_eq!(calendar.name, "Busy times");
        assert_eq!(calendar.timezone, chrono_tz::Europe::Berlin);
    }

    #[tokio::test]
    async fn test_without_merge_every_event_is_kept_and_relabelled() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_calendar(
            dir.path(),
            "a.ics",
            "BEGIN:VEVENT\nUID:a1\nSUMMARY:Dentist\nDTSTART:20240111T090000Z\nDTEND:20240111T100000Z\nEND:VEVENT\n\
             BEGIN:VEVENT\nUID:a2\nSUMMARY:Lunch\nDTSTART:20240111T093000Z\nDTEND:20240111T103000Z\nEND:VEVENT\n",
        );

        let calendar = aggregator(vec![a], settings(false, SplittingStrategy::NoSplit))
            .build_calendar(now())
            .await
            .unwrap();

        assert_eq!(calendar.events.len(), 2);
        assert!(calendar
            .events
            .iter()
            .all(|e| e.summary.as_deref() == Some("Busy")));
    }

    #[tokio::test]
    async fn test_failing_source_fails_aggregation() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_calendar(
            dir.path(),
            "good.ics",
            "BEGIN:VEVENT\nUID:g\nDTSTART:20240111T090000Z\nDTEND:20240111T100000Z\nEND:VEVENT\n",
        );
        let missing = CalendarSource::Local(dir.path().join("missing.ics"));

        let result = aggregator(vec![good, missing], settings(true, SplittingStrategy::Split))
            .aggregate_at(now())
            .await;

        match result {
            Err(CalMergeError::Aggregation { calendar, error }) => {
                assert!(calendar.ends_with("missing.ics"));
                assert!(matches!(*error, CalMergeError::LocalRead { .. }));
            }
            other => panic!("Expected aggregation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_skip_policy_serves_remaining_sources() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_calendar(
            dir.path(),
            "good.ics",
            "BEGIN:VEVENT\nUID:g\nDTSTART:20240111T090000Z\nDTEND:20240111T100000Z\nEND:VEVENT\n",
        );
        let broken = dir.path().join("broken.ics");
        std::fs::write(&broken, "this is not a calendar").unwrap();
        let mut settings = settings(true, SplittingStrategy::Split);
        settings.failure_policy = SourceFailurePolicy::Skip;

        let calendar = aggregator(vec![good, CalendarSource::Local(broken)], settings)
            .build_calendar(now())
            .await
            .unwrap();

        assert_eq!(calendar.events.len(), 1);
    }

    #[tokio::test]
    async fn test_no_sources_yield_empty_calendar() {
        let ics = aggregator(vec![], settings(true, SplittingStrategy::Split))
            .aggregate_at(now())
            .await
            .unwrap();

        assert!(ics.contains("X-WR-CALNAME:Busy times"));
        assert!(!ics.contains("BEGIN:VEVENT"));
    }

    #[tokio::test]
    async fn test_unrepresentable_window_is_error_not_panic() {
        let cache = Arc::new(SourceCache::new(Duration::from_secs(60), 10));
        let fetcher = SourceFetcher::new(cache, Duration::from_secs(5)).unwrap();
        let extractor = EventExtractor::new(fetcher, chrono_tz::Europe::Berlin, u32::MAX);
        let aggregator = Aggregator::new(
            extractor,
            vec![],
            settings(true, SplittingStrategy::Split),
        );

        let result = aggregator.aggregate_at(now()).await;

        assert!(matches!(result, Err(CalMergeError::Config(_))));
    }

    #[test]
    fn test_from_config_parses_sources() {
        let config = MergerConfig::from_yaml_str(
            r#"
calendar_urls: ["https://example.com/a.ics", "/srv/b.ics"]
cache_expiration_minutes: 5
local_timezone: UTC
days_limit: 14
merge_overlapping_events: false
event_splitting_strategy: no_split
calendar_name: Busy
busy_events_summary: Busy
"#,
        )
        .unwrap();

        let aggregator = Aggregator::from_config(&config).unwrap();

        assert_eq!(aggregator.sources().len(), 2);
        assert!(aggregator.sources()[0].is_remote());
        assert!(!aggregator.sources()[1].is_remote());
        assert_eq!(aggregator.extractor().timezone(), chrono_tz::UTC);
        assert_eq!(
            aggregator.extractor().fetcher().cache().ttl(),
            Duration::from_secs(300)
        );
    }
}
