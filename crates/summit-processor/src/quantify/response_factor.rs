//! Response-factor quantification for the VOC instrument

use crate::models::{Peak, ResponseFactorTable};

/// Unit scaling applied to every VOC mixing ratio.
const VOLUME_NORMALIZATION: f64 = 1000.0 * 1.5;

/// Expected carbon number of each quantified compound.
pub fn expected_carbon_number(compound: &str) -> Option<f64> {
    let ecn = match compound {
        "ethane" => 2.0,
        "ethene" => 1.9,
        "propane" => 3.0,
        "propene" => 2.9,
        "i-butane" => 4.0,
        "acetylene" => 1.8,
        "n-butane" => 4.0,
        "i-pentane" => 5.0,
        "n-pentane" => 5.0,
        "hexane" => 6.0,
        "benzene" => 5.7,
        "toluene" => 6.7,
        _ => return None,
    };
    Some(ecn)
}

/// `pa / (crf * ecn * sample_time * sample_flow) * 1000 * 1.5`
///
/// `None` when any divisor term is zero.
pub fn mixing_ratio(pa: f64, crf: f64, ecn: f64, sample_time: f64, sample_flow: f64) -> Option<f64> {
    let divisor = crf * ecn * sample_time * sample_flow;
    if divisor == 0.0 || !divisor.is_finite() {
        return None;
    }
    Some(pa / divisor * VOLUME_NORMALIZATION)
}

/// Mixing ratios for every named peak with both a response factor and a
/// carbon number. Peaks without either are returned with `None`.
pub fn quantify_peaks(
    peaks: &[Peak],
    crf: &ResponseFactorTable,
    sample_time: f64,
    sample_flow: f64,
) -> Vec<(i64, Option<f64>)> {
    peaks
        .iter()
        .map(|peak| {
            let mr = expected_carbon_number(&peak.name).and_then(|ecn| {
                crf.factor(&peak.name)
                    .and_then(|factor| mixing_ratio(peak.pa, factor, ecn, sample_time, sample_flow))
            });
            (peak.id, mr)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sqlx::types::Json;
    use std::collections::BTreeMap;

    #[test]
    fn test_closed_form() {
        let mr = mixing_ratio(12_000.0, 3.2, 2.0, 1200.0, 0.6).unwrap();
        let expected = 12_000.0 / (3.2 * 2.0 * 1200.0 * 0.6) * 1500.0;
        assert!((mr - expected).abs() < 1e-9);
    }

    #[test]
    fn test_zero_divisor() {
        assert!(mixing_ratio(1.0, 0.0, 2.0, 1200.0, 0.6).is_none());
        assert!(mixing_ratio(1.0, 3.2, 2.0, 1200.0, 0.0).is_none());
    }

    #[test]
    fn test_unknown_compounds_have_no_carbon_number() {
        assert_eq!(expected_carbon_number("benzene"), Some(5.7));
        assert!(expected_carbon_number("cfc").is_none());
        assert!(expected_carbon_number("-").is_none());
    }

    #[test]
    fn test_quantify_peaks_skips_missing_factors() {
        let day = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let crf = ResponseFactorTable {
            id: 1,
            date_start: day,
            date_end: day,
            revision_date: day,
            standard: "vocstd".to_string(),
            compounds: Json(BTreeMap::from([("ethane".to_string(), 3.0)])),
        };
        let peak = |id, name: &str| Peak {
            id,
            batch_id: 1,
            name: name.to_string(),
            pa: 900.0,
            rt: 1.0,
            mr: None,
        };

        let out = quantify_peaks(&[peak(1, "ethane"), peak(2, "propane"), peak(3, "-")], &crf, 1000.0, 1.0);
        let ethane = 900.0 / (3.0 * 2.0 * 1000.0) * 1500.0;
        assert!((out[0].1.unwrap() - ethane).abs() < 1e-9);
        assert_eq!(out[1], (2, None));
        assert_eq!(out[2], (3, None));
    }
}
