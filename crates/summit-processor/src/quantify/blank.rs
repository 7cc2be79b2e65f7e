//! Blank subtraction, computed on read
//!
//! Stored mixing ratios are never modified. Consumers that want
//! blank-corrected values pass the latest zero run's ratios in here.

use std::collections::BTreeMap;

/// Compound name to the mixing ratio measured in the most recent zero run.
pub type BlankMap = BTreeMap<String, f64>;

/// `mr` minus the blank for `compound`, or `mr` unchanged when no blank is known.
pub fn blank_corrected(mr: f64, compound: &str, blanks: &BlankMap) -> f64 {
    match blanks.get(compound) {
        Some(blank) => mr - blank,
        None => mr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtracts_known_blank() {
        let blanks = BlankMap::from([("ethane".to_string(), 12.5)]);
        assert_eq!(blank_corrected(1012.5, "ethane", &blanks), 1000.0);
        assert_eq!(blank_corrected(300.0, "propane", &blanks), 300.0);
    }
}
