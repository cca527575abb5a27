//! Busy-time aggregation for iCalendar feeds.
//!
//! Fetches any number of remote or local calendars concurrently, expands
//! recurring events over a forward-looking window, keeps only busy (OPAQUE)
//! time, normalizes it into one timezone and emits a single calendar:
//! - `cache` / `fetch` for retrieving raw feeds
//! - `extract` with `ics` and `recurrence` for turning feeds into busy events
//! - `consolidate` / `split` for reshaping the joined events
//! - `aggregate` for running the whole pipeline

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod event;
pub mod extract;
pub mod fetch;
pub mod ics;
pub mod recurrence;
pub mod split;

pub use aggregate::{AggregateSettings, Aggregator, SourceFailurePolicy};
pub use cache::SourceCache;
pub use config::MergerConfig;
pub use consolidate::consolidate;
pub use error::{CalMergeError, CalMergeResult};
pub use event::{AggregatedCalendar, BusyEvent, Event, EventTime, Transparency};
pub use extract::{EventExtractor, ExtractionWindow, extract_busy_events};
pub use fetch::{CalendarSource, RawCalendar, SourceFetcher};
pub use split::{SplittingStrategy, split_into_day_chunks};
