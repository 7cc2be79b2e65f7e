//! Retention-time peak naming for the VOC instrument
//!
//! Absolute windows are applied first: every peak joins the pool of the first
//! window (ordered by lower bound) that contains it, and the largest peak in
//! each pool takes the compound's name. Relative windows are applied second,
//! as offsets from the retention time of an already-named reference peak
//! (i-butane at Summit), and only consider peaks the first pass left unnamed.
//! A name from an absolute window is therefore never overwritten by a
//! relative one, even when both windows claim the same peak.

use std::collections::BTreeMap;

use crate::models::gc::UNNAMED_PEAK;
use crate::models::{CompoundWindow, Peak};

/// Pick the index of the largest-area peak among `candidates`.
fn largest(peaks: &[Peak], candidates: impl Iterator<Item = usize>) -> Option<usize> {
    candidates.max_by(|a, b| peaks[*a].pa.total_cmp(&peaks[*b].pa))
}

/// Names for `peaks`, index-aligned. Peaks no window claims are named `-`.
pub fn name_peaks(peaks: &[Peak], windows: &[CompoundWindow]) -> Vec<String> {
    let mut names: Vec<Option<String>> = vec![None; peaks.len()];

    let mut absolute: Vec<&CompoundWindow> = windows.iter().filter(|w| w.relative_to.is_none()).collect();
    absolute.sort_by(|a, b| a.rt_low.total_cmp(&b.rt_low).then_with(|| a.compound.cmp(&b.compound)));

    // compound -> indices of peaks whose first containing window is that compound
    let mut pools: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, peak) in peaks.iter().enumerate() {
        if let Some(window) = absolute.iter().find(|w| w.contains(peak.rt)) {
            pools.entry(window.compound.as_str()).or_default().push(idx);
        }
    }

    for (compound, pool) in &pools {
        if let Some(chosen) = largest(peaks, pool.iter().copied()) {
            names[chosen] = Some((*compound).to_string());
        }
    }

    let mut relative: Vec<&CompoundWindow> = windows.iter().filter(|w| w.relative_to.is_some()).collect();
    relative.sort_by(|a, b| a.compound.cmp(&b.compound));

    for window in relative {
        let Some(reference) = window.relative_to.as_deref() else {
            continue;
        };
        let Some(reference_rt) = names
            .iter()
            .position(|n| n.as_deref() == Some(reference))
            .map(|idx| peaks[idx].rt)
        else {
            tracing::debug!(compound = %window.compound, reference, "Reference peak not named, skipping relative window");
            continue;
        };

        let candidates = (0..peaks.len()).filter(|idx| names[*idx].is_none() && window.contains(peaks[*idx].rt - reference_rt));

        if let Some(chosen) = largest(peaks, candidates) {
            names[chosen] = Some(window.compound.clone());
        }
    }

    names
        .into_iter()
        .map(|name| name.unwrap_or_else(|| UNNAMED_PEAK.to_string()))
        .collect()
}
