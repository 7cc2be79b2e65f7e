//! VOC gas chromatograph records

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::BTreeMap;

use super::RecordStatus;
use crate::matching::Timestamped;

/// Operating parameters from one 36-line LabView log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocLogParams {
    pub sample_time: f64,
    pub sample_flow1: f64,
    pub sample_flow2: f64,
    pub sample_type: i64,
    pub backflush_time: f64,
    pub desorb_temp: f64,
    pub flash_heat_time: f64,
    pub inject_time: f64,
    pub bakeout_temp: f64,
    pub bakeout_time: f64,
    pub carrier_flow: f64,
    pub sample_num: i64,
    pub wt_in_use: i64,
    pub ads_t_in_use: i64,
    pub sample_pressure1: f64,
    pub sample_pressure2: f64,
    pub gc_head_p: f64,
    pub gc_head_p1: f64,
    pub sample_code: i64,
    pub chamber_temp_start: f64,
    pub wta_temp_start: f64,
    pub wtb_temp_start: f64,
    pub ads_a_temp_start: f64,
    pub ads_b_temp_start: f64,
    pub chamber_temp_end: f64,
    pub wta_temp_end: f64,
    pub wtb_temp_end: f64,
    pub ads_a_temp_end: f64,
    pub ads_b_temp_end: f64,
    pub trap_temp_fh: f64,
    pub gc_start_temp: f64,
    pub trap_temp_inject_end: f64,
    pub trap_temp_bakeout_end: f64,
    pub wta_hot_temp: f64,
    pub wtb_hot_temp: f64,
    pub gc_oven_temp: f64,
}

impl VocLogParams {
    /// Look up a parameter by its field name, for bounds checking.
    pub fn value(&self, name: &str) -> Option<f64> {
        serde_json::to_value(self)
            .ok()?
            .get(name)
            .and_then(serde_json::Value::as_f64)
    }
}

/// A parsed log file that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVocLogFile {
    pub filename: String,
    pub date: NaiveDateTime,
    pub params: VocLogParams,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VocLogFile {
    pub id: i64,
    pub filename: String,
    pub date: NaiveDateTime,
    pub sample_time: f64,
    pub sample_flow1: f64,
    pub sample_type: i64,
    pub sample_num: i64,
    pub params: Json<VocLogParams>,
    pub status: RecordStatus,
}

impl Timestamped for VocLogFile {
    fn timestamp(&self) -> NaiveDateTime {
        self.date
    }
}

/// What a VOC run sampled, decoded from the log's sample-type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Zero,
    BaStandard,
    BhStandard,
    Ambient,
    TrapBlank,
    Unknown,
}

impl RunType {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => RunType::Zero,
            1 => RunType::BaStandard,
            2 => RunType::BhStandard,
            4 => RunType::Ambient,
            6 => RunType::TrapBlank,
            _ => RunType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Zero => "zero",
            RunType::BaStandard => "ba_standard",
            RunType::BhStandard => "bh_standard",
            RunType::Ambient => "ambient",
            RunType::TrapBlank => "trap_blank",
            RunType::Unknown => "unknown",
        }
    }

    /// Only ambient and zero runs are converted to mixing ratios.
    pub fn is_quantifiable(&self) -> bool {
        matches!(self, RunType::Ambient | RunType::Zero)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VocRun {
    pub id: i64,
    pub log_id: i64,
    pub batch_id: i64,
    /// Midpoint of the log and peak-batch timestamps.
    pub date: NaiveDateTime,
    /// Later of the two constituent timestamps.
    pub date_end: NaiveDateTime,
    pub run_type: RunType,
    pub peaks_named: bool,
}

/// Carbon response factors valid over `[date_start, date_end)`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ResponseFactorTable {
    pub id: i64,
    pub date_start: NaiveDateTime,
    pub date_end: NaiveDateTime,
    pub revision_date: NaiveDateTime,
    pub standard: String,
    pub compounds: Json<BTreeMap<String, f64>>,
}

impl ResponseFactorTable {
    pub fn covers(&self, date: NaiveDateTime) -> bool {
        self.date_start <= date && date < self.date_end
    }

    pub fn factor(&self, compound: &str) -> Option<f64> {
        self.compounds.get(compound).copied()
    }
}

/// A response-factor row read from file.
#[derive(Debug, Clone, PartialEq)]
pub struct NewResponseFactorTable {
    pub date_start: NaiveDateTime,
    pub date_end: NaiveDateTime,
    pub revision_date: NaiveDateTime,
    pub standard: String,
    pub compounds: BTreeMap<String, f64>,
}

/// Half-open intervals `[a0, a1)` and `[b0, b1)` share at least one instant.
pub fn intervals_overlap(
    a: (NaiveDateTime, NaiveDateTime),
    b: (NaiveDateTime, NaiveDateTime),
) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Expected retention-time interval for one compound over `[date_start, date_end)`.
///
/// With `relative_to` set, the interval is an offset from the retention time of
/// that compound's peak in the same batch instead of an absolute time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CompoundWindow {
    pub compound: String,
    pub rt_low: f64,
    pub rt_high: f64,
    pub relative_to: Option<String>,
    pub date_start: NaiveDateTime,
    pub date_end: NaiveDateTime,
}

impl CompoundWindow {
    /// Exclusive at both ends.
    pub fn contains(&self, rt: f64) -> bool {
        self.rt_low < rt && rt < self.rt_high
    }

    pub fn covers(&self, date: NaiveDateTime) -> bool {
        self.date_start <= date && date < self.date_end
    }
}

/// Housekeeping values from the VOC daily log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyParams {
    pub ads_xfer_a: f64,
    pub ads_xfer_b: f64,
    pub valves_temp: f64,
    pub gc_xfer_temp: f64,
    pub cj1: f64,
    pub catalyst: f64,
    pub molsieve_a: f64,
    pub molsieve_b: f64,
    pub inlet_long: f64,
    pub inlet_short: f64,
    pub std_temp: f64,
    pub cj2: f64,
    pub battv: f64,
    pub v12a: f64,
    pub v12b: f64,
    pub v15a: f64,
    pub v15b: f64,
    pub v24: f64,
    pub v5a: f64,
    pub mfc1: f64,
    pub mfc4: f64,
    pub mfc2: f64,
    pub mfc5: f64,
    pub mfc3a: f64,
    pub mfc3b: f64,
    pub h2_gen_p: f64,
    pub line_p: f64,
    pub zero_p: f64,
    pub fid_p: f64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DailyReading {
    pub date: NaiveDateTime,
    pub filename: String,
    pub params: Json<DailyParams>,
}
