//! Split long busy events into day-sized chunks.

use chrono::Duration;
use serde::Deserialize;

use crate::event::BusyEvent;

/// How events longer than a day are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplittingStrategy {
    /// Emit events unchanged
    #[default]
    NoSplit,
    /// 24 hour chunks that tile the original span
    Split,
    /// Chunks that end one minute before the next 24 hour boundary
    SplitAndAdjust,
}

impl SplittingStrategy {
    /// Length of a chunk starting at a 24 hour boundary.
    fn chunk_length(self) -> Duration {
        match self {
            SplittingStrategy::SplitAndAdjust => Duration::hours(23) + Duration::minutes(59),
            _ => Duration::hours(24),
        }
    }
}

/// Cut every event into consecutive chunks starting 24 hours apart.
///
/// Each chunk ends at `min(chunk start + chunk length, event end)`. With
/// [`SplittingStrategy::SplitAndAdjust`] the chunk length is 23h59m but the
/// next chunk still starts 24 hours after the previous one, leaving a
/// one-minute gap. Events with `start >= end` produce no chunks.
pub fn split_into_day_chunks(events: Vec<BusyEvent>, strategy: SplittingStrategy) -> Vec<BusyEvent> {
    if strategy == SplittingStrategy::NoSplit {
        return events;
    }

    let step = Duration::hours(24);
    let length = strategy.chunk_length();

    let mut chunks = Vec::with_capacity(events.len());
    for event in events {
        let mut cursor = event.start;
        while cursor < event.end {
            let chunk_end = (cursor + length).min(event.end);
            chunks.push(BusyEvent {
                start: cursor,
                end: chunk_end,
                summary: event.summary.clone(),
            });
            cursor += step;
        }
    }

    chunks
}
