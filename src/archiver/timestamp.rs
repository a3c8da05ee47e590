//! Bundle timestamps in the fixed `YYYYMMDD_HHMM` layout.

use crate::error::ArchiveError;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M";
pub const STAMP_LEN: usize = 13;

fn stamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]{8}_[0-9]{4}").expect("static stamp regex"))
}

fn field(stamp: &str, range: std::ops::Range<usize>) -> Result<u32, ArchiveError> {
    stamp[range]
        .parse::<u32>()
        .map_err(|err| ArchiveError::Format(format!("bad stamp field in {stamp}: {err}")))
}

/// Decode the first `YYYYMMDD_HHMM` run embedded in `name`.
///
/// Fields are sliced at fixed offsets inside the matched run, so the stamp must
/// be contiguous in exactly that layout.
pub fn parse_timestamp(name: &str) -> Result<NaiveDateTime, ArchiveError> {
    let m = stamp_regex()
        .find(name)
        .ok_or_else(|| ArchiveError::Format(format!("no YYYYMMDD_HHMM stamp in {name}")))?;
    let stamp = &m.as_str()[..STAMP_LEN];

    let year = field(stamp, 0..4)? as i32;
    let month = field(stamp, 4..6)?;
    let day = field(stamp, 6..8)?;
    let hour = field(stamp, 9..11)?;
    let minute = field(stamp, 11..13)?;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .ok_or_else(|| ArchiveError::Format(format!("stamp {stamp} in {name} is not a valid instant")))
}

pub fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format(STAMP_FORMAT).to_string()
}
