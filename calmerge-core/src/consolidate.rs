//! Merge overlapping busy events into contiguous blocks.
//!
//! Sorts events by start time, then folds each event into the current block
//! unless it starts strictly after the block ends. Touching events
//! (`next.start == current.end`) are merged.

use crate::event::BusyEvent;

/// Merge overlapping or adjacent events.
///
/// Returns a sorted, non-overlapping list. Summaries are dropped since a
/// block may stand for several source events.
pub fn consolidate(mut events: Vec<BusyEvent>) -> Vec<BusyEvent> {
    // Stable sort keeps the input order for equal start times.
    events.sort_by_key(|event| event.start);

    let mut merged: Vec<BusyEvent> = Vec::with_capacity(events.len());
    for event in events {
        if let Some(last) = merged.last_mut() {
            if event.start <= last.end {
                // Overlapping or adjacent: extend the current block.
                last.end = last.end.max(event.end);
                continue;
            }
        }
        merged.push(BusyEvent::new(event.start, event.end));
    }

    merged
}
