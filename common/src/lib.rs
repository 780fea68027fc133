pub mod config;
pub mod error;
pub mod plot;
pub mod record;
pub mod stats;
pub mod table;
pub mod util;

/// Milliseconds to microseconds, used when reporting regression slopes.
pub const MS_TO_US: f64 = 1000.0;
