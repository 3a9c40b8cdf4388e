//! Shared CLI presentation utilities.
//!
//! Keep this module format-only; anything that queries services lives in
//! the handlers.

pub mod report;
pub mod tables;

pub use report::{StatusReport, format_event, print_report};
pub use tables::{format_optional, print_separator, truncate_string};
