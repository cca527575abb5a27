//! ICS feed parsing and busy calendar generation.
//!
//! This module handles reading and writing iCalendar data according to RFC 5545.

mod generate;
mod parse;

pub use generate::{PRODUCT_ID, generate_calendar};
pub use parse::parse_events;
