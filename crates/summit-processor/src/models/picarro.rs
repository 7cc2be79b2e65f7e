//! Picarro cavity-ringdown analyzer records

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
pub use summit_common::stats::Summary as CalResult;

use crate::matching::Timestamped;

/// Gas measured by the analyzer and calibrated against the standards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compound {
    Co,
    Co2,
    Ch4,
}

impl Compound {
    pub const ALL: [Compound; 3] = [Compound::Co, Compound::Co2, Compound::Ch4];

    pub fn as_str(&self) -> &'static str {
        match self {
            Compound::Co => "co",
            Compound::Co2 => "co2",
            Compound::Ch4 => "ch4",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

/// Standard tank selected by the multi-position valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardGas {
    #[serde(rename = "low_std")]
    Low,
    #[serde(rename = "mid_std")]
    Mid,
    #[serde(rename = "high_std")]
    High,
}

impl StandardGas {
    pub const ALL: [StandardGas; 3] = [StandardGas::Low, StandardGas::Mid, StandardGas::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            StandardGas::Low => "low_std",
            StandardGas::Mid => "mid_std",
            StandardGas::High => "high_std",
        }
    }

    pub fn mpv_code(&self) -> i64 {
        match self {
            StandardGas::Low => 2,
            StandardGas::High => 3,
            StandardGas::Mid => 4,
        }
    }
}

/// Multi-position valve state recorded with every reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpvPosition {
    Ambient,
    Standard(StandardGas),
    Other(i64),
}

impl MpvPosition {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => MpvPosition::Ambient,
            2 => MpvPosition::Standard(StandardGas::Low),
            3 => MpvPosition::Standard(StandardGas::High),
            4 => MpvPosition::Standard(StandardGas::Mid),
            other => MpvPosition::Other(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            MpvPosition::Ambient => 1,
            MpvPosition::Standard(gas) => gas.mpv_code(),
            MpvPosition::Other(code) => *code,
        }
    }
}

/// Data file written by the analyzer; re-read when it grows.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DataFile {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub size: i64,
    pub processed: bool,
}

/// One 5-second reading. CO and CH4 are in ppb, CO2 in ppm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PicarroReading {
    pub date: NaiveDateTime,
    pub alarm_status: i64,
    pub instrument_status: i64,
    pub cavity_pressure: f64,
    pub cavity_temp: f64,
    pub das_temp: f64,
    pub etalon_temp: f64,
    pub warmbox_temp: f64,
    pub mpv_position: i64,
    pub outlet_valve: f64,
    pub co: f64,
    pub co2_wet: f64,
    pub co2: f64,
    pub ch4_wet: f64,
    pub ch4: f64,
    pub h2o: f64,
}

impl PicarroReading {
    /// Dry value for the compound (CO has no wet/dry split).
    pub fn value(&self, compound: Compound) -> f64 {
        match compound {
            Compound::Co => self.co,
            Compound::Co2 => self.co2,
            Compound::Ch4 => self.ch4,
        }
    }

    pub fn mpv(&self) -> MpvPosition {
        MpvPosition::from_code(self.mpv_position)
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RawDatum {
    pub id: i64,
    pub file_id: Option<i64>,
    pub cal_id: Option<i64>,
    #[sqlx(flatten)]
    pub reading: PicarroReading,
}

impl Timestamped for RawDatum {
    fn timestamp(&self) -> NaiveDateTime {
        self.reading.date
    }
}

/// Marker stored in `standard_used` for events too short to calibrate with.
pub const DUMP_EVENT: &str = "dump";

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CalEvent {
    pub id: i64,
    /// Timestamp of the event's last reading.
    pub date: NaiveDateTime,
    pub standard_used: String,
    pub duration_secs: f64,
    pub back_period: f64,
    pub co_mean: Option<f64>,
    pub co_median: Option<f64>,
    pub co_stdev: Option<f64>,
    pub co2_mean: Option<f64>,
    pub co2_median: Option<f64>,
    pub co2_stdev: Option<f64>,
    pub ch4_mean: Option<f64>,
    pub ch4_median: Option<f64>,
    pub ch4_stdev: Option<f64>,
    pub mastercal_id: Option<i64>,
}

impl CalEvent {
    pub fn result(&self, compound: Compound) -> Option<CalResult> {
        let (mean, median, stdev) = match compound {
            Compound::Co => (self.co_mean, self.co_median, self.co_stdev),
            Compound::Co2 => (self.co2_mean, self.co2_median, self.co2_stdev),
            Compound::Ch4 => (self.ch4_mean, self.ch4_median, self.ch4_stdev),
        };
        Some(CalResult {
            mean: mean?,
            median: median?,
            stdev,
        })
    }
}

impl Timestamped for CalEvent {
    fn timestamp(&self) -> NaiveDateTime {
        self.date
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MasterCal {
    pub id: i64,
    pub date: NaiveDateTime,
    pub co_slope: Option<f64>,
    pub co_intercept: Option<f64>,
    pub co_middle_offset: Option<f64>,
    pub co2_slope: Option<f64>,
    pub co2_intercept: Option<f64>,
    pub co2_middle_offset: Option<f64>,
    pub ch4_slope: Option<f64>,
    pub ch4_intercept: Option<f64>,
    pub ch4_middle_offset: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpv_codes_round_trip_through_standards() {
        for gas in StandardGas::ALL {
            assert_eq!(MpvPosition::from_code(gas.mpv_code()), MpvPosition::Standard(gas));
        }
        assert_eq!(MpvPosition::from_code(1), MpvPosition::Ambient);
        assert_eq!(MpvPosition::from_code(7).code(), 7);
    }
}
