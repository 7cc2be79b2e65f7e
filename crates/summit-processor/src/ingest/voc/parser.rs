//! VOC LabView log and response-factor file parsers
//!
//! # Log file format
//! Exactly 36 lines, one parameter per line, value in tab field 1. Line 15
//! holds the sample code in field 0, which doubles as the `%Y%j%H%M%S`
//! acquisition timestamp.
//!
//! # Response-factor format
//! ```text
//! date_start\tdate_end\tdate_revision\tethane\tethene\t...
//! 01/01/2019 00:00\t06/01/2019 00:00\t01/15/2019 09:30\t3.21\t3.05\t...
//! ```

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use summit_common::timefmt::{parse_crf_stamp, parse_log_stamp};
use tracing::warn;

use crate::config::Bounds;
use crate::models::voc::{NewResponseFactorTable, NewVocLogFile};
use crate::models::VocLogParams;

/// Lines in a complete LabView log.
pub const LOG_LINE_COUNT: usize = 36;

/// Name stored on tables read from the response-factor file.
pub const WORKING_STANDARD: &str = "working standard";

struct LogLines<'a> {
    lines: Vec<&'a str>,
}

impl<'a> LogLines<'a> {
    fn field(&self, line: usize, column: usize) -> Result<&'a str> {
        self.lines
            .get(line)
            .and_then(|l| l.split('\t').nth(column))
            .map(str::trim)
            .ok_or_else(|| anyhow!("Line {}: missing field {}", line, column))
    }

    fn float(&self, line: usize) -> Result<f64> {
        let raw = self.field(line, 1)?;
        raw.parse::<f64>()
            .with_context(|| format!("Line {}: invalid number '{}'", line, raw))
    }

    /// Integer parameters are written as floats ("4.000000").
    fn int(&self, line: usize) -> Result<i64> {
        Ok(self.float(line)? as i64)
    }
}

/// Parse one LabView log file.
pub fn parse_log_file(filename: &str, content: &str) -> Result<NewVocLogFile> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() != LOG_LINE_COUNT {
        return Err(anyhow!(
            "{}: expected {} lines, got {}",
            filename,
            LOG_LINE_COUNT,
            lines.len()
        ));
    }
    let log = LogLines { lines };

    let stamp = log.field(15, 0)?;
    let date = parse_log_stamp(stamp).with_context(|| format!("{}: invalid sample code", filename))?;
    let sample_code = stamp
        .parse::<f64>()
        .with_context(|| format!("{}: invalid sample code '{}'", filename, stamp))? as i64;

    let params = VocLogParams {
        sample_time: log.float(0)?,
        sample_flow1: log.float(1)?,
        sample_type: log.int(2)?,
        backflush_time: log.float(3)?,
        desorb_temp: log.float(4)?,
        flash_heat_time: log.float(5)?,
        inject_time: log.float(6)?,
        bakeout_temp: log.float(7)?,
        bakeout_time: log.float(8)?,
        carrier_flow: log.float(9)?,
        sample_num: log.int(10)?,
        wt_in_use: log.int(11)?,
        ads_t_in_use: log.int(12)?,
        sample_pressure1: log.float(13)?,
        gc_head_p: log.float(14)?,
        sample_code,
        chamber_temp_start: log.float(16)?,
        wta_temp_start: log.float(17)?,
        wtb_temp_start: log.float(18)?,
        ads_a_temp_start: log.float(19)?,
        ads_b_temp_start: log.float(20)?,
        sample_pressure2: log.float(21)?,
        sample_flow2: log.float(22)?,
        chamber_temp_end: log.float(23)?,
        wta_temp_end: log.float(24)?,
        wtb_temp_end: log.float(25)?,
        ads_a_temp_end: log.float(26)?,
        ads_b_temp_end: log.float(27)?,
        trap_temp_fh: log.float(28)?,
        gc_start_temp: log.float(29)?,
        trap_temp_inject_end: log.float(30)?,
        trap_temp_bakeout_end: log.float(31)?,
        wta_hot_temp: log.float(32)?,
        wtb_hot_temp: log.float(33)?,
        gc_head_p1: log.float(34)?,
        gc_oven_temp: log.float(35)?,
    };

    Ok(NewVocLogFile {
        filename: filename.to_string(),
        date,
        params,
    })
}

/// Parse the response-factor file. Rows that fail are logged and skipped.
pub fn parse_crf_file(content: &str) -> Result<Vec<NewResponseFactorTable>> {
    let mut lines = content.lines();
    let header = lines.next().ok_or_else(|| anyhow!("Response factor file is empty"))?;

    let compounds: Vec<String> = header
        .split('\t')
        .skip(3)
        .map(|name| name.trim().to_lowercase())
        .collect();

    if compounds.is_empty() {
        return Err(anyhow!("Response factor header names no compounds"));
    }

    let mut tables = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line_num = idx + 2;
        if line.trim().is_empty() {
            continue;
        }

        match parse_crf_line(line, &compounds) {
            Ok(table) => tables.push(table),
            Err(e) => warn!("Failed to parse response factor line {}: {}", line_num, e),
        }
    }

    Ok(tables)
}

fn parse_crf_line(line: &str, compounds: &[String]) -> Result<NewResponseFactorTable> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() < 3 + compounds.len() {
        return Err(anyhow!(
            "Expected {} fields, got {}",
            3 + compounds.len(),
            fields.len()
        ));
    }

    let date_start = parse_crf_stamp(fields[0])?;
    let date_end = parse_crf_stamp(fields[1])?;
    let revision_date = parse_crf_stamp(fields[2])?;

    if date_end <= date_start {
        return Err(anyhow!("Interval {} to {} is empty", date_start, date_end));
    }

    let mut factors = BTreeMap::new();
    for (compound, raw) in compounds.iter().zip(&fields[3..]) {
        let factor = raw
            .parse::<f64>()
            .with_context(|| format!("Invalid factor '{}' for {}", raw, compound))?;
        factors.insert(compound.clone(), factor);
    }

    Ok(NewResponseFactorTable {
        date_start,
        date_end,
        revision_date,
        standard: WORKING_STANDARD.to_string(),
        compounds: factors,
    })
}

/// A log parameter outside its configured range.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundViolation {
    pub parameter: String,
    pub value: f64,
    pub bounds: Bounds,
}

/// Every configured parameter whose value lies outside its bounds.
pub fn bound_violations(params: &VocLogParams, bounds: &BTreeMap<String, Bounds>) -> Vec<BoundViolation> {
    bounds
        .iter()
        .filter_map(|(name, range)| {
            let value = params.value(name)?;
            (!range.contains(value)).then(|| BoundViolation {
                parameter: name.clone(),
                value,
                bounds: *range,
            })
        })
        .collect()
}
