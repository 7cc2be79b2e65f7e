//! Methane gas chromatograph
//!
//! Each run log describes ten injections. A run is the log married to the
//! CH4.LOG peak batch within five minutes of it; every injection then takes
//! the largest peak in its retention-time window.

pub mod parser;
pub mod pipeline;
pub mod storage;

use crate::models::Peak;

pub use pipeline::MethaneProcessor;

/// Inclusive retention-time window (minutes) of each sample position, 1 to 10.
pub const SAMPLE_WINDOWS: [(f64, f64); 10] = [
    (2.0, 3.0),
    (8.3, 9.3),
    (14.65, 15.65),
    (20.9, 21.9),
    (27.3, 28.3),
    (33.6, 34.6),
    (39.9, 40.9),
    (46.2, 47.2),
    (52.6, 53.6),
    (58.9, 59.9),
];

/// Name given to the peak representing sample `position`.
pub fn sample_peak_name(position: i64) -> String {
    format!("CH4_{}", position)
}

/// Largest-area peak inside the window of `position`, if any.
pub fn peak_for_position(peaks: &[Peak], position: i64) -> Option<&Peak> {
    let index = usize::try_from(position).ok()?.checked_sub(1)?;
    let (low, high) = *SAMPLE_WINDOWS.get(index)?;

    peaks
        .iter()
        .filter(|p| low <= p.rt && p.rt <= high)
        .max_by(|a, b| a.pa.total_cmp(&b.pa))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn peak(id: i64, rt: f64, pa: f64) -> Peak {
        Peak {
            id,
            batch_id: 1,
            name: "-".to_string(),
            pa,
            rt,
            mr: None,
        }
    }

    #[test]
    fn test_largest_peak_in_window_wins() {
        let peaks = vec![peak(1, 2.5, 10.0), peak(2, 2.7, 30.0), peak(3, 8.5, 99.0)];
        assert_eq!(peak_for_position(&peaks, 1).unwrap().id, 2);
        assert_eq!(peak_for_position(&peaks, 2).unwrap().id, 3);
        assert!(peak_for_position(&peaks, 3).is_none());
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let peaks = vec![peak(1, 2.0, 1.0), peak(2, 59.9, 1.0)];
        assert_eq!(peak_for_position(&peaks, 1).unwrap().id, 1);
        assert_eq!(peak_for_position(&peaks, 10).unwrap().id, 2);
    }

    #[test]
    fn test_out_of_range_positions() {
        let peaks = vec![peak(1, 2.5, 1.0)];
        assert!(peak_for_position(&peaks, 0).is_none());
        assert!(peak_for_position(&peaks, 11).is_none());
    }
}
