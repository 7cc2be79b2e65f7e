//! VOC daily housekeeping log parser
//!
//! One tab-delimited reading per line: a `%y%j%H%M` stamp (any fractional
//! suffix dropped) followed by 29 temperatures, voltages, flows and pressures.

use anyhow::{anyhow, Context, Result};
use sqlx::types::Json;
use summit_common::timefmt::parse_daily_stamp;
use tracing::warn;

use crate::models::{DailyParams, DailyReading};

/// Values following the stamp on every line.
pub const DAILY_PARAM_COUNT: usize = 29;

pub fn parse_daily_line(line: &str, line_num: usize) -> Result<(chrono::NaiveDateTime, DailyParams)> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() < DAILY_PARAM_COUNT + 1 {
        return Err(anyhow!(
            "Line {}: Expected {} fields, got {}",
            line_num,
            DAILY_PARAM_COUNT + 1,
            fields.len()
        ));
    }

    let date = parse_daily_stamp(fields[0]).with_context(|| format!("Line {}: invalid stamp", line_num))?;

    let v = fields[1..=DAILY_PARAM_COUNT]
        .iter()
        .map(|raw| {
            raw.parse::<f64>()
                .with_context(|| format!("Line {}: invalid number '{}'", line_num, raw))
        })
        .collect::<Result<Vec<f64>>>()?;

    let params = DailyParams {
        ads_xfer_a: v[0],
        ads_xfer_b: v[1],
        valves_temp: v[2],
        gc_xfer_temp: v[3],
        cj1: v[4],
        catalyst: v[5],
        molsieve_a: v[6],
        molsieve_b: v[7],
        inlet_long: v[8],
        inlet_short: v[9],
        std_temp: v[10],
        cj2: v[11],
        battv: v[12],
        v12a: v[13],
        v12b: v[14],
        v15a: v[15],
        v15b: v[16],
        v24: v[17],
        v5a: v[18],
        mfc1: v[19],
        mfc4: v[20],
        mfc2: v[21],
        mfc5: v[22],
        mfc3a: v[23],
        mfc3b: v[24],
        h2_gen_p: v[25],
        line_p: v[26],
        zero_p: v[27],
        fid_p: v[28],
    };

    Ok((date, params))
}

/// Parse every line of a daily file, skipping lines that fail.
pub fn parse_daily_file(filename: &str, content: &str) -> Vec<DailyReading> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match parse_daily_line(line, idx + 1) {
            Ok((date, params)) => Some(DailyReading {
                date,
                filename: filename.to_string(),
                params: Json(params),
            }),
            Err(e) => {
                warn!(file = %filename, error = %e, "Skipping unparseable daily line");
                None
            },
        })
        .collect()
}
