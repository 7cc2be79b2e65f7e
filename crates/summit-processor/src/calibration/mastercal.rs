//! Two-point MasterCal curves
//!
//! A low, high and mid event measured close together form one MasterCal. The
//! low and high means define a line against the certified values; the mid
//! point's distance from that line is kept as a quality signal. Nothing is
//! corrected with it.

use chrono::{Duration, NaiveDateTime};

use crate::config::PicarroStandards;
use crate::matching::match_nearest;
use crate::models::{CalEvent, Compound, StandardGas};

/// Line through the low and high points plus the mid point's residual.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Curve {
    pub slope: f64,
    pub intercept: f64,
    pub middle_offset: f64,
}

/// `(certified, measured)` pair.
pub type Point = (f64, f64);

/// Fit `y = m*x + b` through `low` and `high`; `None` when the certified
/// values coincide.
pub fn fit(low: Point, high: Point, mid: Point) -> Option<Curve> {
    let (lx, ly) = low;
    let (hx, hy) = high;
    let (mx, my) = mid;

    if hx == lx {
        return None;
    }

    let slope = (hy - ly) / (hx - lx);
    let intercept = ly - slope * lx;
    let middle_offset = my - (slope * mx + intercept);

    Some(Curve {
        slope,
        intercept,
        middle_offset,
    })
}

/// Indices of one low/high/mid event triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triplet {
    pub low: usize,
    pub high: usize,
    pub mid: usize,
}

/// Group events into triplets: each low takes the nearest high within
/// `window`, then that high takes the nearest mid within `window`. Each event
/// joins at most one triplet.
pub fn group_triplets(lows: &[CalEvent], highs: &[CalEvent], mids: &[CalEvent], window: Duration) -> Vec<Triplet> {
    let low_high = match_nearest(highs, lows, window);

    let paired_highs: Vec<NaiveDateTime> = low_high.iter().map(|pair| highs[pair.primary].date).collect();
    let high_mid = match_nearest(mids, &paired_highs, window);

    high_mid
        .into_iter()
        .map(|pair| {
            let lh = low_high[pair.secondary];
            Triplet {
                low: lh.secondary,
                high: lh.primary,
                mid: pair.primary,
            }
        })
        .collect()
}

/// Curves for every compound that has a mean in all three events.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MasterCalCurves {
    pub co: Option<Curve>,
    pub co2: Option<Curve>,
    pub ch4: Option<Curve>,
}

impl MasterCalCurves {
    pub fn get(&self, compound: Compound) -> Option<Curve> {
        match compound {
            Compound::Co => self.co,
            Compound::Co2 => self.co2,
            Compound::Ch4 => self.ch4,
        }
    }
}

pub fn curves_for(low: &CalEvent, high: &CalEvent, mid: &CalEvent, certified: &PicarroStandards) -> MasterCalCurves {
    let curve = |compound: Compound| {
        let point = |event: &CalEvent, gas: StandardGas| {
            event
                .result(compound)
                .map(|r| (certified.certified(gas).value(compound), r.mean))
        };
        fit(
            point(low, StandardGas::Low)?,
            point(high, StandardGas::High)?,
            point(mid, StandardGas::Mid)?,
        )
    };

    MasterCalCurves {
        co: curve(Compound::Co),
        co2: curve(Compound::Co2),
        ch4: curve(Compound::Ch4),
    }
}
