//! Revision naming: timestamps encoded as fixed-width, lexically sortable
//! file stems (`yyyy-MM-dd_HH-mm-ss-fff`).

use chrono::{Duration, NaiveDateTime, Timelike, Utc};

use crate::types::RemoteFileInfo;

/// Width of an encoded timestamp, e.g. `2024-03-01_10-20-30-400`.
pub const TIMESTAMP_LEN: usize = 23;

/// Extension of every revision archive.
pub const ARCHIVE_EXTENSION: &str = "zip";

const SECONDS_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Encode a timestamp at millisecond precision.
pub fn format(ts: NaiveDateTime) -> String {
    let millis = (ts.nanosecond() / 1_000_000).min(999);
    format!("{}-{millis:03}", ts.format(SECONDS_FORMAT))
}

/// Separator positions within an encoded timestamp; every other byte is a digit.
const SEPARATORS: [(usize, u8); 6] = [
    (4, b'-'),
    (7, b'-'),
    (10, b'_'),
    (13, b'-'),
    (16, b'-'),
    (19, b'-'),
];

/// Decode a timestamp. Anything that is not exactly the fixed-width encoding
/// yields `None` (unknown).
pub fn parse(stem: &str) -> Option<NaiveDateTime> {
    if stem.len() != TIMESTAMP_LEN {
        return None;
    }
    let strict = stem.bytes().enumerate().all(|(i, b)| {
        match SEPARATORS.iter().find(|(pos, _)| *pos == i) {
            Some((_, sep)) => b == *sep,
            None => b.is_ascii_digit(),
        }
    });
    if !strict {
        return None;
    }

    let (seconds, millis) = stem.split_at(TIMESTAMP_LEN - 4);
    let millis: i64 = millis[1..].parse().ok()?;

    let base = NaiveDateTime::parse_from_str(seconds, SECONDS_FORMAT).ok()?;
    Some(base + Duration::milliseconds(millis))
}

/// Current UTC time truncated to millisecond precision.
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    let millis = now.nanosecond() / 1_000_000;
    now.with_nanosecond(millis * 1_000_000).unwrap_or(now)
}

/// `{timestamp}.zip`
pub fn archive_filename(ts: NaiveDateTime) -> String {
    format!("{}.{ARCHIVE_EXTENSION}", format(ts))
}

/// `{root}/{timestamp}.zip`, with a single separator whatever the root looks like.
pub fn remote_filename(root: &str, ts: NaiveDateTime) -> String {
    let root = root.trim_end_matches('/');
    format!("{root}/{}", archive_filename(ts))
}

/// True when the name carries the archive extension (case-insensitive).
pub fn is_archive_name(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}

/// Order newest first. Unknown timestamps sort after every known one.
/// The sort is stable; the tie-break between equal timestamps is not part of
/// the contract.
pub fn sort_descending(mut files: Vec<RemoteFileInfo>) -> Vec<RemoteFileInfo> {
    files.sort_by(|a, b| b.store_timestamp().cmp(&a.store_timestamp()));
    files
}
