//! Core helpers shared by the nextdav crates: tracing setup and CalDAV time ranges.

pub mod time;
pub mod tracing;

pub use time::{TimeRange, format_caldav_datetime, parse_caldav_datetime};
pub use self::tracing::{
    CapturedLogs, TracingConfig, TracingError, TracingOutputFormat, capture_logs, init_tracing,
};
