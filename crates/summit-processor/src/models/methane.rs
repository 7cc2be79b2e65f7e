//! Methane gas chromatograph records
//!
//! A methane run injects ten samples in a fixed order: two ambient, a standard,
//! four ambient, a standard, two ambient. Positions 3 and 8 are the standards
//! that quantify the ambient injections around them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::RecordStatus;
use crate::matching::Timestamped;

/// Number of injections in one run.
pub const SAMPLES_PER_RUN: usize = 10;

/// Positions (1-based) of the two standard injections.
pub const QUANTIFIER_POSITIONS: (i64, i64) = (3, 8);

pub const STANDARD_SAMPLE_CODE: i64 = 2;
pub const AMBIENT_SAMPLE_CODE: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethaneSampleType {
    Standard,
    Ambient,
    Other(i64),
}

impl MethaneSampleType {
    pub fn from_code(code: i64) -> Self {
        match code {
            STANDARD_SAMPLE_CODE => MethaneSampleType::Standard,
            AMBIENT_SAMPLE_CODE => MethaneSampleType::Ambient,
            other => MethaneSampleType::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMethaneSample {
    pub position: i64,
    pub sample_type: i64,
    pub flow: f64,
    pub pressure: f64,
}

/// Parsed per-run log, before storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMethaneRunLog {
    pub filename: String,
    pub date: NaiveDateTime,
    pub samples: Vec<NewMethaneSample>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MethaneRunLog {
    pub id: i64,
    pub filename: String,
    pub date: NaiveDateTime,
    pub status: RecordStatus,
}

impl Timestamped for MethaneRunLog {
    fn timestamp(&self) -> NaiveDateTime {
        self.date
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MethaneSample {
    pub id: i64,
    pub log_id: i64,
    pub position: i64,
    pub sample_type: i64,
    pub flow: f64,
    pub pressure: f64,
    pub peak_id: Option<i64>,
    pub quantifier_id: Option<i64>,
    pub date: Option<NaiveDateTime>,
}

impl MethaneSample {
    pub fn kind(&self) -> MethaneSampleType {
        MethaneSampleType::from_code(self.sample_type)
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MethaneRun {
    pub id: i64,
    pub log_id: i64,
    pub batch_id: i64,
    pub date: NaiveDateTime,
    pub samples_assigned: bool,
    /// Set once quantification ran, even if it found nothing usable.
    pub quantified: bool,
    pub median: Option<f64>,
    pub rsd: Option<f64>,
    pub standard_rsd: Option<f64>,
}

/// Certified reference mixing ratio valid over `[date_start, date_end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Standard {
    pub name: String,
    pub mr: f64,
    pub date_start: NaiveDateTime,
    pub date_end: NaiveDateTime,
}

impl Standard {
    pub fn covers(&self, date: NaiveDateTime) -> bool {
        self.date_start <= date && date < self.date_end
    }
}
