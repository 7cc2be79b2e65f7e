//! VOC gas chromatograph
//!
//! Runs are built from a LabView log file and the VOC.LOG peak batch
//! injected closest to it. Peaks are named by retention-time window and
//! quantified with carbon response factors.

pub mod parser;
pub mod pipeline;
pub mod storage;

use chrono::{NaiveDate, NaiveDateTime};

use crate::models::CompoundWindow;

pub use pipeline::VocProcessor;

/// Compound that relative windows are offset from.
pub const REFERENCE_COMPOUND: &str = "i-butane";

fn year_start(year: i32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Retention-time windows seeded on first start.
pub fn default_windows() -> Vec<CompoundWindow> {
    let absolute = [
        ("ethane", 1.65, 1.85),
        ("ethene", 2.04, 2.152),
        ("propane", 2.85, 3.1),
        ("propene", 5.75, 5.95),
        ("i-butane", 7.3, 7.6),
        ("5a", 9.5, 10.3),
        ("5b", 11.25, 11.65),
        ("5c", 12.48, 12.55),
        ("i-pentane", 12.60, 12.78),
        ("cfc", 12.80, 13.0),
        ("n-pentane", 13.0, 13.4),
        ("hexane", 16.9, 17.05),
        ("benzene", 19.95, 20.25),
        ("toluene", 23.3, 23.75),
    ];
    let relative = [("acetylene", 0.6, 0.7), ("n-butane", 0.55, 0.60)];

    let window = |compound: &str, rt_low: f64, rt_high: f64, relative_to: Option<&str>| CompoundWindow {
        compound: compound.to_string(),
        rt_low,
        rt_high,
        relative_to: relative_to.map(str::to_string),
        date_start: year_start(1900),
        date_end: year_start(2100),
    };

    absolute
        .iter()
        .map(|(c, low, high)| window(c, *low, *high, None))
        .chain(
            relative
                .iter()
                .map(|(c, low, high)| window(c, *low, *high, Some(REFERENCE_COMPOUND))),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows() {
        let windows = default_windows();
        assert_eq!(windows.len(), 16);
        assert!(windows.iter().all(|w| w.rt_low < w.rt_high));
        let relative: Vec<&str> = windows
            .iter()
            .filter(|w| w.relative_to.is_some())
            .map(|w| w.compound.as_str())
            .collect();
        assert_eq!(relative, vec!["acetylene", "n-butane"]);
    }
}
