//! Calibration event segmentation
//!
//! Readings taken while the valve sat on one standard tank arrive as a
//! stream. Consecutive readings further apart than the gap threshold belong
//! to different events. Only the trailing `back_period` of an event is used
//! for statistics because the cavity takes time to flush the previous gas.

use chrono::{Duration, NaiveDateTime};
use std::ops::Range;
use summit_common::stats::Summary;

use crate::models::picarro::DUMP_EVENT;
use crate::models::{CalResult, Compound, RawDatum, StandardGas};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventParams {
    pub gap: Duration,
    pub back_period: Duration,
    pub min_duration: Duration,
}

impl EventParams {
    pub fn from_secs(gap: i64, back_period: i64, min_duration: i64) -> Self {
        Self {
            gap: Duration::seconds(gap),
            back_period: Duration::seconds(back_period),
            min_duration: Duration::seconds(min_duration),
        }
    }
}

/// Per-compound statistics over an event's trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalStats {
    pub co: Option<CalResult>,
    pub co2: Option<CalResult>,
    pub ch4: Option<CalResult>,
}

impl CalStats {
    pub fn get(&self, compound: Compound) -> Option<CalResult> {
        match compound {
            Compound::Co => self.co,
            Compound::Co2 => self.co2,
            Compound::Ch4 => self.ch4,
        }
    }
}

/// An event ready to be stored, along with the readings it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedEvent {
    pub standard: StandardGas,
    /// Timestamp of the last reading.
    pub date: NaiveDateTime,
    pub duration: Duration,
    pub back_period: Duration,
    /// Too short to have stabilized. Stored for audit without statistics.
    pub dump: bool,
    pub stats: CalStats,
    pub reading_ids: Vec<i64>,
}

impl DetectedEvent {
    pub fn standard_used(&self) -> &'static str {
        if self.dump {
            DUMP_EVENT
        } else {
            self.standard.as_str()
        }
    }
}

/// Split time-ordered readings wherever consecutive timestamps are more than
/// `gap` apart.
pub fn segment(readings: &[RawDatum], gap: Duration) -> Vec<Range<usize>> {
    let mut segments = Vec::new();
    let mut start = 0;

    for i in 1..readings.len() {
        let step = readings[i].reading.date - readings[i - 1].reading.date;
        if step > gap {
            segments.push(start..i);
            start = i;
        }
    }

    if !readings.is_empty() {
        segments.push(start..readings.len());
    }

    segments
}

/// Mean, median and stdev of each compound over readings at or after
/// `last - back_period`.
pub fn trailing_stats(readings: &[RawDatum], back_period: Duration) -> CalStats {
    let Some(last) = readings.last() else {
        return CalStats::default();
    };
    let cutoff = last.reading.date - back_period;
    let window: Vec<&RawDatum> = readings.iter().filter(|r| r.reading.date >= cutoff).collect();

    let of = |compound: Compound| {
        let values: Vec<f64> = window.iter().map(|r| r.reading.value(compound)).collect();
        Summary::of(&values)
    };

    CalStats {
        co: of(Compound::Co),
        co2: of(Compound::Co2),
        ch4: of(Compound::Ch4),
    }
}

/// Build events from one standard's unassigned readings.
///
/// `newest_stored` is the latest reading of any kind in the store. The final
/// segment is only closed once something newer than its end plus the gap has
/// arrived; until then the valve may still be on this standard.
pub fn detect_events(
    standard: StandardGas,
    readings: &[RawDatum],
    newest_stored: Option<NaiveDateTime>,
    params: &EventParams,
) -> Vec<DetectedEvent> {
    let segments = segment(readings, params.gap);
    let count = segments.len();

    segments
        .into_iter()
        .enumerate()
        .filter_map(|(idx, range)| {
            let slice = &readings[range];
            let first = slice.first()?.reading.date;
            let last = slice.last()?.reading.date;

            let closed = idx + 1 < count || newest_stored.is_some_and(|newest| newest > last + params.gap);
            if !closed {
                return None;
            }

            let duration = last - first;
            let dump = duration < params.min_duration;
            let stats = if dump {
                CalStats::default()
            } else {
                trailing_stats(slice, params.back_period)
            };

            Some(DetectedEvent {
                standard,
                date: last,
                duration,
                back_period: params.back_period,
                dump,
                stats,
                reading_ids: slice.iter().map(|r| r.id).collect(),
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::picarro::PicarroReading;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn datum(id: i64, secs: i64, co: f64) -> RawDatum {
        RawDatum {
            id,
            file_id: None,
            cal_id: None,
            reading: PicarroReading {
                date: t0() + Duration::seconds(secs),
                alarm_status: 0,
                instrument_status: 963,
                cavity_pressure: 140.0,
                cavity_temp: 45.0,
                das_temp: 40.0,
                etalon_temp: 45.0,
                warmbox_temp: 45.0,
                mpv_position: 2,
                outlet_valve: 30000.0,
                co,
                co2_wet: 400.0,
                co2: 405.0,
                ch4_wet: 1900.0,
                ch4: 1920.0,
                h2o: 0.1,
            },
        }
    }

    /// Readings every 5 s from `start` for `count` samples.
    fn run(first_id: i64, start: i64, count: i64, co: f64) -> Vec<RawDatum> {
        (0..count).map(|i| datum(first_id + i, start + i * 5, co)).collect()
    }

    fn params() -> EventParams {
        EventParams::from_secs(60, 20, 90)
    }

    #[test]
    fn test_segment_splits_on_gap() {
        let mut readings = run(0, 0, 25, 70.0);
        readings.extend(run(100, 1000, 25, 70.0));
        readings.extend(run(200, 2000, 10, 70.0));

        let segments = segment(&readings, Duration::seconds(60));
        assert_eq!(segments, vec![0..25, 25..50, 50..60]);
    }

    #[test]
    fn test_gap_exactly_at_threshold_does_not_split() {
        let readings = vec![datum(1, 0, 1.0), datum(2, 60, 1.0), datum(3, 121, 1.0)];
        assert_eq!(segment(&readings, Duration::seconds(60)), vec![0..2, 2..3]);
    }

    #[test]
    fn test_stats_use_trailing_window_only() {
        // 0..=100 s at co 10, then 105..=120 s at co 70
        let mut readings = run(0, 0, 21, 10.0);
        readings.extend(run(21, 105, 4, 70.0));
        // last = 120 s, window covers 100..=120 s: one reading of 10 and four of 70
        let stats = trailing_stats(&readings, Duration::seconds(20));
        let co = stats.co.unwrap();
        assert!((co.mean - 58.0).abs() < 1e-9);
        assert_eq!(co.median, 70.0);
    }

    #[test]
    fn test_no_reading_before_the_cutoff_is_kept() {
        // 7 s spacing: cutoff at 11 s falls between the readings at 7 s and 14 s
        let readings = vec![datum(1, 0, 10.0), datum(2, 7, 10.0), datum(3, 14, 70.0), datum(4, 21, 70.0)];
        let co = trailing_stats(&readings, Duration::seconds(10)).co.unwrap();
        assert_eq!(co.mean, 70.0);
        assert_eq!(co.stdev, Some(0.0));
    }

    #[test]
    fn test_short_event_is_dump() {
        let mut readings = run(0, 0, 25, 70.0); // 120 s
        readings.extend(run(100, 1000, 10, 70.0)); // 45 s
        let newest = Some(t0() + Duration::seconds(5000));

        let events = detect_events(StandardGas::Low, &readings, newest, &params());
        assert_eq!(events.len(), 2);

        assert!(!events[0].dump);
        assert_eq!(events[0].duration, Duration::seconds(120));
        assert_eq!(events[0].date, t0() + Duration::seconds(120));
        assert_eq!(events[0].standard_used(), "low_std");
        assert!(events[0].stats.co.is_some());

        assert!(events[1].dump);
        assert_eq!(events[1].standard_used(), "dump");
        assert!(events[1].stats.co.is_none());
        // dump events still claim their readings
        assert_eq!(events[1].reading_ids.len(), 10);
    }

    #[test]
    fn test_trailing_segment_waits_for_newer_data() {
        let readings = run(0, 0, 25, 70.0); // ends at 120 s

        let open = detect_events(StandardGas::High, &readings, Some(t0() + Duration::seconds(180)), &params());
        assert!(open.is_empty());

        let closed = detect_events(StandardGas::High, &readings, Some(t0() + Duration::seconds(181)), &params());
        assert_eq!(closed.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(detect_events(StandardGas::Mid, &[], None, &params()).is_empty());
    }
}
