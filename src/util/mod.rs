//! Utility functions.

pub mod env;
pub mod format;
pub mod time;

pub use format::{format_cost, format_percent, format_rate_per_million, format_tokens};
pub use time::{format_age, format_relative_time};
