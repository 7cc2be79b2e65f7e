//! Picarro analyzer data files
//!
//! Whitespace-delimited with a header row. Columns are located by name so
//! extra or reordered columns are tolerated.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use summit_common::timefmt::from_epoch_secs;
use tracing::warn;

use crate::models::picarro::PicarroReading;

/// ppm to ppb, applied to CO and both CH4 columns.
const PPM_TO_PPB: f64 = 1000.0;

const REQUIRED_COLUMNS: [&str; 16] = [
    "ALARM_STATUS",
    "INST_STATUS",
    "CavityPressure",
    "CavityTemp",
    "DasTemp",
    "EtalonTemp",
    "WarmBoxTemp",
    "MPVPosition",
    "OutletValve",
    "CO_sync",
    "CO2_sync",
    "CO2_dry_sync",
    "CH4_sync",
    "CH4_dry_sync",
    "H2O_sync",
    "EPOCH_TIME",
];

struct Header {
    columns: HashMap<String, usize>,
}

impl Header {
    fn parse(line: &str) -> Result<Self> {
        let columns: HashMap<String, usize> = line
            .split_whitespace()
            .enumerate()
            .map(|(idx, name)| (name.to_string(), idx))
            .collect();

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|name| !columns.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            return Err(anyhow!("Header is missing columns: {}", missing.join(", ")));
        }

        Ok(Self { columns })
    }

    fn float(&self, fields: &[&str], name: &str, line_num: usize) -> Result<f64> {
        let raw = self
            .columns
            .get(name)
            .and_then(|idx| fields.get(*idx))
            .ok_or_else(|| anyhow!("Line {}: missing {}", line_num, name))?;
        raw.parse::<f64>()
            .with_context(|| format!("Line {}: invalid {} '{}'", line_num, name, raw))
    }

    /// Status and valve columns are written as floats.
    fn int(&self, fields: &[&str], name: &str, line_num: usize) -> Result<i64> {
        Ok(self.float(fields, name, line_num)?.round() as i64)
    }
}

fn parse_reading_line(header: &Header, line: &str, line_num: usize) -> Result<PicarroReading> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let f = |name: &str| header.float(&fields, name, line_num);
    let i = |name: &str| header.int(&fields, name, line_num);

    Ok(PicarroReading {
        date: from_epoch_secs(f("EPOCH_TIME")?)?,
        alarm_status: i("ALARM_STATUS")?,
        instrument_status: i("INST_STATUS")?,
        cavity_pressure: f("CavityPressure")?,
        cavity_temp: f("CavityTemp")?,
        das_temp: f("DasTemp")?,
        etalon_temp: f("EtalonTemp")?,
        warmbox_temp: f("WarmBoxTemp")?,
        mpv_position: i("MPVPosition")?,
        outlet_valve: f("OutletValve")?,
        co: f("CO_sync")? * PPM_TO_PPB,
        co2_wet: f("CO2_sync")?,
        co2: f("CO2_dry_sync")?,
        ch4_wet: f("CH4_sync")? * PPM_TO_PPB,
        ch4: f("CH4_dry_sync")? * PPM_TO_PPB,
        h2o: f("H2O_sync")?,
    })
}

/// Parse a whole data file. A bad header rejects the file; bad data lines
/// are skipped with a warning.
pub fn parse_data_file(filename: &str, content: &str) -> Result<Vec<PicarroReading>> {
    let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header_line) = lines.next().ok_or_else(|| anyhow!("{}: empty file", filename))?;
    let header = Header::parse(header_line).with_context(|| format!("{}: invalid header", filename))?;

    let mut readings = Vec::new();
    for (idx, line) in lines {
        match parse_reading_line(&header, line, idx + 1) {
            Ok(reading) => readings.push(reading),
            Err(e) => warn!(file = %filename, error = %e, "Skipping unparseable reading"),
        }
    }

    Ok(readings)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Header in the analyzer's own column order, with a few unused columns.
    pub(crate) const HEADER: &str = "DATE TIME FRAC_DAYS_SINCE_JAN1 EPOCH_TIME ALARM_STATUS INST_STATUS \
        CavityPressure CavityTemp DasTemp EtalonTemp WarmBoxTemp species MPVPosition OutletValve \
        solenoid_valves CO_sync CO2_sync CO2_dry_sync CH4_sync CH4_dry_sync H2O_sync";

    /// One data line at `epoch` with the valve on `mpv`.
    pub(crate) fn data_line(epoch: f64, mpv: i64, co_ppm: f64) -> String {
        format!(
            "2019-06-01 00:00:00.000 151.0 {:.3} 0 963 140.00 45.00 40.1 45.1 45.0 3 {}.000 30000.0 0 \
             {} 405.1 410.2 1.92 1.95 0.12",
            epoch, mpv, co_ppm
        )
    }

    #[test]
    fn test_parse_data_file_converts_units() {
        let content = format!("{}\n{}\n", HEADER, data_line(1_559_347_200.0, 2, 0.0696));
        let readings = parse_data_file("test.dat", &content).unwrap();

        assert_eq!(readings.len(), 1);
        let r = &readings[0];
        assert_eq!(
            r.date,
            NaiveDate::from_ymd_opt(2019, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(r.mpv_position, 2);
        assert!((r.co - 69.6).abs() < 1e-9);
        assert_eq!(r.co2_wet, 405.1);
        assert_eq!(r.co2, 410.2);
        assert!((r.ch4 - 1950.0).abs() < 1e-9);
        assert_eq!(r.instrument_status, 963);
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let content = format!(
            "{}\n{}\nnot a reading\n{}\n",
            HEADER,
            data_line(1_559_347_200.0, 1, 0.1),
            data_line(1_559_347_205.0, 1, 0.1)
        );
        assert_eq!(parse_data_file("test.dat", &content).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_column_rejects_file() {
        let header = HEADER.replace("CH4_dry_sync ", "");
        let content = format!("{}\n{}\n", header, data_line(1_559_347_200.0, 1, 0.1));
        let err = parse_data_file("test.dat", &content).unwrap_err();
        assert!(format!("{:#}", err).contains("CH4_dry_sync"));
    }
}
