//! Peak batches and peaks written by the chromatography software.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::RecordStatus;
use crate::matching::Timestamped;

/// Name the integration software gives a peak it did not identify.
pub const UNNAMED_PEAK: &str = "-";

/// One timestamped line of the peak-area log, as stored.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PeakBatch {
    pub id: i64,
    pub instrument: String,
    pub date: NaiveDateTime,
    pub status: RecordStatus,
}

impl Timestamped for PeakBatch {
    fn timestamp(&self) -> NaiveDateTime {
        self.date
    }
}

/// A detected signal. Area and retention time never change after load;
/// only `name` and the derived `mr` do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Peak {
    pub id: i64,
    pub batch_id: i64,
    pub name: String,
    pub pa: f64,
    pub rt: f64,
    pub mr: Option<f64>,
}

/// Peak parsed from a log line, before it has an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPeak {
    pub name: String,
    pub pa: f64,
    pub rt: f64,
}

impl NewPeak {
    pub fn new(name: impl Into<String>, pa: f64, rt: f64) -> Self {
        Self {
            name: name.into(),
            pa,
            rt,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPeakBatch {
    pub date: NaiveDateTime,
    pub peaks: Vec<NewPeak>,
}

impl Timestamped for NewPeakBatch {
    fn timestamp(&self) -> NaiveDateTime {
        self.date
    }
}
