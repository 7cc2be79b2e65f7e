//! Two-point standard bracketing for the methane instrument
//!
//! Ambient injections 1-2 and 4-5 are quantified against the standard at
//! position 3, injections 6-7 and 9-10 against position 8. When one standard
//! peak is unusable every ambient falls back to the other.

use summit_common::stats;

use crate::models::methane::QUANTIFIER_POSITIONS;
use crate::models::MethaneSampleType;

/// Peak area of one injection, as matched to the run's peak batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleArea {
    pub position: i64,
    pub kind: MethaneSampleType,
    pub pa: Option<f64>,
}

impl SampleArea {
    /// A peak is usable when present with positive area.
    pub fn valid_pa(&self) -> Option<f64> {
        self.pa.filter(|pa| *pa > 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantifiedSample {
    pub position: i64,
    pub quantifier_position: i64,
    pub mr: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunQuantification {
    pub samples: Vec<QuantifiedSample>,
    pub median: Option<f64>,
    pub rsd: Option<f64>,
    /// RSD between the two standard peak areas.
    pub standard_rsd: Option<f64>,
}

fn quantifier_area(samples: &[SampleArea], position: i64) -> Option<f64> {
    samples
        .iter()
        .find(|s| s.position == position && s.kind == MethaneSampleType::Standard)
        .and_then(SampleArea::valid_pa)
}

/// Quantify every ambient sample of a run against `standard_mr`.
///
/// Returns `None` when neither quantifier has a usable peak.
pub fn quantify_run(samples: &[SampleArea], standard_mr: f64) -> Option<RunQuantification> {
    let (first_pos, second_pos) = QUANTIFIER_POSITIONS;
    let first = quantifier_area(samples, first_pos).map(|pa| (first_pos, pa));
    let second = quantifier_area(samples, second_pos).map(|pa| (second_pos, pa));

    if first.is_none() && second.is_none() {
        return None;
    }

    let quantified: Vec<QuantifiedSample> = samples
        .iter()
        .filter(|s| s.kind == MethaneSampleType::Ambient)
        .filter_map(|sample| {
            let pa = sample.valid_pa()?;
            let preferred = if sample.position <= 5 { first } else { second };
            let (quantifier_position, quantifier_pa) = preferred.or(first).or(second)?;
            Some(QuantifiedSample {
                position: sample.position,
                quantifier_position,
                mr: pa / quantifier_pa * standard_mr,
            })
        })
        .collect();

    let mrs: Vec<f64> = quantified.iter().map(|q| q.mr).collect();
    let standard_rsd = match (first, second) {
        (Some((_, a)), Some((_, b))) => stats::rsd(&[a, b]),
        _ => None,
    };

    Some(RunQuantification {
        median: stats::median(&mrs),
        rsd: stats::rsd(&mrs),
        standard_rsd,
        samples: quantified,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const STANDARD_MR: f64 = 2000.0;

    fn run(areas: [Option<f64>; 10]) -> Vec<SampleArea> {
        areas
            .iter()
            .enumerate()
            .map(|(i, pa)| {
                let position = i as i64 + 1;
                let kind = if position == 3 || position == 8 {
                    MethaneSampleType::Standard
                } else {
                    MethaneSampleType::Ambient
                };
                SampleArea { position, kind, pa: *pa }
            })
            .collect()
    }

    fn mr_at(result: &RunQuantification, position: i64) -> Option<&QuantifiedSample> {
        result.samples.iter().find(|s| s.position == position)
    }

    #[test]
    fn test_both_quantifiers_bracket_their_halves() {
        let areas = [
            Some(1010.0),
            Some(990.0),
            Some(1000.0),
            Some(1020.0),
            Some(980.0),
            Some(1010.0),
            Some(1000.0),
            Some(1000.0),
            Some(995.0),
            Some(1005.0),
        ];
        let result = quantify_run(&run(areas), STANDARD_MR).unwrap();

        assert_eq!(result.samples.len(), 8);
        for position in [1, 2, 4, 5] {
            let sample = mr_at(&result, position).unwrap();
            assert_eq!(sample.quantifier_position, 3);
            let expected = areas[(position - 1) as usize].unwrap() / 1000.0 * STANDARD_MR;
            assert!((sample.mr - expected).abs() < 1e-9);
        }
        for position in [6, 7, 9, 10] {
            assert_eq!(mr_at(&result, position).unwrap().quantifier_position, 8);
        }
        assert_eq!(result.standard_rsd, Some(0.0));
        assert!(result.median.is_some());
        assert!(result.rsd.is_some());
    }

    #[test]
    fn test_missing_first_quantifier_falls_back_to_second() {
        let mut areas = [Some(1000.0); 10];
        areas[2] = None;
        areas[7] = Some(500.0);
        let result = quantify_run(&run(areas), STANDARD_MR).unwrap();

        assert!(result.samples.iter().all(|s| s.quantifier_position == 8));
        assert!((mr_at(&result, 1).unwrap().mr - 4000.0).abs() < 1e-9);
        assert!(result.standard_rsd.is_none());
    }

    #[test]
    fn test_zero_area_second_quantifier_falls_back_to_first() {
        let mut areas = [Some(1000.0); 10];
        areas[7] = Some(0.0);
        let result = quantify_run(&run(areas), STANDARD_MR).unwrap();

        assert!(result.samples.iter().all(|s| s.quantifier_position == 3));
        assert!((mr_at(&result, 10).unwrap().mr - STANDARD_MR).abs() < 1e-9);
    }

    #[test]
    fn test_no_quantifiers_leaves_run_unquantified() {
        let mut areas = [Some(1000.0); 10];
        areas[2] = None;
        areas[7] = Some(-1.0);
        assert!(quantify_run(&run(areas), STANDARD_MR).is_none());
    }

    #[test]
    fn test_ambients_without_peaks_are_skipped() {
        let mut areas = [Some(1000.0); 10];
        areas[0] = None;
        areas[9] = Some(0.0);
        let result = quantify_run(&run(areas), STANDARD_MR).unwrap();
        assert_eq!(result.samples.len(), 6);
        assert!(mr_at(&result, 1).is_none());
        assert_eq!(result.median, Some(STANDARD_MR));
    }

    #[test]
    fn test_single_ambient_has_no_rsd() {
        let areas = [None, None, Some(1000.0), Some(1100.0), None, None, None, None, None, None];
        let result = quantify_run(&run(areas), STANDARD_MR).unwrap();
        assert_eq!(result.samples.len(), 1);
        assert!(result.rsd.is_none());
        assert!((result.median.unwrap() - 2200.0).abs() < 1e-9);
    }
}
