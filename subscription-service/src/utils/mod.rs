//! Shared helpers.

pub mod dates;

pub use dates::{add_months, format_compact_date, parse_compact_date, today};
