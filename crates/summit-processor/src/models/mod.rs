//! Domain model shared by every processor
//!
//! Rows are plain value structs loaded with `sqlx::FromRow`; associations are
//! foreign-key ids resolved by explicit queries in each storage module.

pub mod gc;
pub mod methane;
pub mod picarro;
pub mod voc;

use serde::{Deserialize, Serialize};

pub use gc::{NewPeak, NewPeakBatch, Peak, PeakBatch};
pub use methane::{MethaneRun, MethaneRunLog, MethaneSample, MethaneSampleType, NewMethaneRunLog, Standard};
pub use picarro::{CalEvent, CalResult, Compound, DataFile, MasterCal, MpvPosition, RawDatum, StandardGas};
pub use voc::{
    CompoundWindow, DailyParams, DailyReading, ResponseFactorTable, RunType, VocLogFile, VocLogParams, VocRun,
};

/// Instruments (and the daily housekeeping log) that own a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Voc,
    Methane,
    Picarro,
    Daily,
}

impl Instrument {
    pub fn as_str(&self) -> &'static str {
        match self {
            Instrument::Voc => "voc",
            Instrument::Methane => "methane",
            Instrument::Picarro => "picarro",
            Instrument::Daily => "daily",
        }
    }

    /// Capitalized name used in operator-facing messages ("Voc", "Methane").
    pub fn title(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Instrument {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "voc" => Ok(Instrument::Voc),
            "methane" => Ok(Instrument::Methane),
            "picarro" => Ok(Instrument::Picarro),
            "daily" => Ok(Instrument::Daily),
            _ => Err(anyhow::anyhow!("Unknown instrument: {}", s)),
        }
    }
}

/// Matching state of a partial record. `Single` flips to `Married` exactly
/// once, in the same transaction that creates the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Single,
    Married,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Single => "single",
            RecordStatus::Married => "married",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_title() {
        assert_eq!(Instrument::Voc.title(), "Voc");
        assert_eq!(Instrument::Picarro.title(), "Picarro");
    }

    #[test]
    fn test_instrument_from_str() {
        assert_eq!("METHANE".parse::<Instrument>().ok(), Some(Instrument::Methane));
        assert!("ozone".parse::<Instrument>().is_err());
    }
}
