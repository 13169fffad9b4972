//! src/util/humanize.rs

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytesize::ByteSize;
use chrono::{DateTime, Local, TimeZone};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn human_readable_size(size: u64) -> String {
    ByteSize::b(size).to_string()
}

#[expect(clippy::cast_possible_wrap, reason = "Expected")]
pub fn datetime_label(time: SystemTime) -> String {
    let dur: Duration = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| -> Duration { Duration::from_secs(0) });

    Local
        .timestamp_opt(dur.as_secs() as i64, dur.subsec_nanos())
        .single()
        .map(|dt: DateTime<Local>| dt.format(DATETIME_FORMAT).to_string())
        .unwrap_or_default()
}
