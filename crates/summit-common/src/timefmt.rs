//! Timestamp layouts written by the Summit instruments.
//!
//! All instrument clocks run on UTC, so everything here yields naive UTC datetimes.

use chrono::{DateTime, NaiveDateTime};

use crate::error::{Result, SummitError};

/// LabView log stamp: year, day-of-year, time (e.g. `2019070120000`).
pub const LOG_STAMP: &str = "%Y%j%H%M%S";

/// Daily log stamp: two-digit year, day-of-year, hour and minute.
pub const DAILY_STAMP: &str = "%y%j%H%M";

/// PeakSimple batch stamp, built from two tab-separated fields.
pub const PEAK_BATCH_STAMP: &str = "%m/%d/%Y %H:%M:%S";

/// Response-factor table validity stamps.
pub const CRF_STAMP: &str = "%m/%d/%Y %H:%M";

fn parse(value: &str, format: &'static str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), format)
        .map_err(|_| SummitError::timestamp(value, format))
}

pub fn parse_log_stamp(value: &str) -> Result<NaiveDateTime> {
    parse(value, LOG_STAMP)
}

/// Daily stamps may carry a fractional suffix (`1907012.5`) which is dropped.
pub fn parse_daily_stamp(value: &str) -> Result<NaiveDateTime> {
    let head = value.split('.').next().unwrap_or(value);
    parse(head, DAILY_STAMP)
}

pub fn parse_peak_batch_stamp(date: &str, time: &str) -> Result<NaiveDateTime> {
    parse(&format!("{} {}", date.trim(), time.trim()), PEAK_BATCH_STAMP)
}

pub fn parse_crf_stamp(value: &str) -> Result<NaiveDateTime> {
    parse(value, CRF_STAMP)
}

/// Convert fractional epoch seconds to a UTC timestamp.
pub fn from_epoch_secs(epoch: f64) -> Result<NaiveDateTime> {
    if !epoch.is_finite() {
        return Err(SummitError::timestamp(epoch.to_string(), "epoch seconds"));
    }

    let secs = epoch.floor();
    let nanos = ((epoch - secs) * 1e9).round().min(999_999_999.0) as u32;

    DateTime::from_timestamp(secs as i64, nanos)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| SummitError::timestamp(epoch.to_string(), "epoch seconds"))
}

/// Leading `YYYYDDDHHMMSS` stamp of an instrument file name.
pub fn parse_file_stamp(file_name: &str) -> Result<NaiveDateTime> {
    let head: String = file_name.chars().take(13).collect();
    if head.len() < 13 || !head.chars().all(|c| c.is_ascii_digit()) {
        return Err(SummitError::timestamp(file_name, LOG_STAMP));
    }
    parse(&head, LOG_STAMP)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_log_stamp_uses_day_of_year() {
        // day 70 of 2019 is March 11th
        assert_eq!(parse_log_stamp("2019070120000").unwrap(), at(2019, 3, 11, 12, 0, 0));
    }

    #[test]
    fn test_daily_stamp_drops_fraction() {
        assert_eq!(parse_daily_stamp("190701200.25").unwrap(), at(2019, 3, 11, 12, 0, 0));
    }

    #[test]
    fn test_peak_batch_stamp() {
        let parsed = parse_peak_batch_stamp("3/11/2019", "12:03:22").unwrap();
        assert_eq!(parsed, at(2019, 3, 11, 12, 3, 22));
    }

    #[test]
    fn test_crf_stamp() {
        assert_eq!(parse_crf_stamp("01/15/2019 08:30").unwrap(), at(2019, 1, 15, 8, 30, 0));
        assert!(parse_crf_stamp("2019-01-15").is_err());
    }

    #[test]
    fn test_epoch_seconds() {
        let parsed = from_epoch_secs(1_552_305_600.5).unwrap();
        assert_eq!(parsed, at(2019, 3, 11, 12, 0, 0) + chrono::Duration::milliseconds(500));
        assert!(from_epoch_secs(f64::NAN).is_err());
    }

    #[test]
    fn test_file_stamp() {
        assert_eq!(parse_file_stamp("2019070120000a.txt").unwrap(), at(2019, 3, 11, 12, 0, 0));
        assert!(parse_file_stamp("notes.txt").is_err());
    }
}
