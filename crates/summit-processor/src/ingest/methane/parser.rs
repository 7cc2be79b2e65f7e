//! Methane per-run sample logs
//!
//! # Format
//! The file name starts with the `YYYYDDDHHMMSS` run start. The body holds
//! one tab-delimited line per injection:
//! ```text
//! <position>\t<sample_type>\t<flow>\t<pressure>
//! ```

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::sync::LazyLock;
use summit_common::timefmt::parse_file_stamp;

use crate::models::methane::{NewMethaneRunLog, NewMethaneSample, SAMPLES_PER_RUN};

#[allow(clippy::expect_used)]
static RUN_LOG_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{13}").expect("run log name pattern is valid"));

/// Run logs are named by their 13-digit start stamp.
pub fn is_run_log_name(name: &str) -> bool {
    RUN_LOG_NAME.is_match(name)
}

fn parse_sample_line(line: &str, line_num: usize) -> Result<NewMethaneSample> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() < 4 {
        return Err(anyhow!("Line {}: Expected 4 fields, got {}", line_num, fields.len()));
    }

    let int = |idx: usize| -> Result<i64> {
        let raw = fields[idx];
        raw.parse::<f64>()
            .map(|v| v as i64)
            .with_context(|| format!("Line {}: invalid integer '{}'", line_num, raw))
    };
    let float = |idx: usize| -> Result<f64> {
        let raw = fields[idx];
        raw.parse::<f64>()
            .with_context(|| format!("Line {}: invalid number '{}'", line_num, raw))
    };

    Ok(NewMethaneSample {
        position: int(0)?,
        sample_type: int(1)?,
        flow: float(2)?,
        pressure: float(3)?,
    })
}

/// Parse one run log. A file without exactly ten valid sample lines, one
/// per position, is rejected whole.
pub fn parse_run_log(filename: &str, content: &str) -> Result<NewMethaneRunLog> {
    let date = parse_file_stamp(filename).with_context(|| format!("{}: no run stamp in name", filename))?;

    let samples = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_sample_line(line, idx + 1))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("{}: invalid sample line", filename))?;

    if samples.len() != SAMPLES_PER_RUN {
        return Err(anyhow!(
            "{}: expected {} samples, got {}",
            filename,
            SAMPLES_PER_RUN,
            samples.len()
        ));
    }

    let mut positions: Vec<i64> = samples.iter().map(|s| s.position).collect();
    positions.sort_unstable();
    let expected: Vec<i64> = (1..=SAMPLES_PER_RUN as i64).collect();
    if positions != expected {
        return Err(anyhow!("{}: positions {:?} are not 1 to {}", filename, positions, SAMPLES_PER_RUN));
    }

    Ok(NewMethaneRunLog {
        filename: filename.to_string(),
        date,
        samples,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Ten samples: standards at 3 and 8, ambient elsewhere.
    pub(crate) fn run_log_content() -> String {
        (1..=10)
            .map(|pos| {
                let kind = if pos == 3 || pos == 8 { 2 } else { 3 };
                format!("{}\t{}\t{:.1}\t{:.2}", pos, kind, 80.0 + pos as f64, 11.5)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_parse_run_log() {
        let log = parse_run_log("2019152120000.txt", &run_log_content()).unwrap();
        assert_eq!(
            log.date,
            NaiveDate::from_ymd_opt(2019, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap()
        );
        assert_eq!(log.samples.len(), 10);
        assert_eq!(log.samples[2].sample_type, 2);
        assert_eq!(log.samples[9].flow, 90.0);
    }

    #[test]
    fn test_rejects_incomplete_or_bad_logs() {
        let content = run_log_content();
        let nine: Vec<&str> = content.lines().take(9).collect();
        assert!(parse_run_log("2019152120000.txt", &nine.join("\n")).is_err());

        let duplicated = content.replace("10\t3", "9\t3");
        assert!(parse_run_log("2019152120000.txt", &duplicated).is_err());

        assert!(parse_run_log("run.txt", &content).is_err());
    }

    #[test]
    fn test_run_log_names() {
        assert!(is_run_log_name("2019152120000.txt"));
        assert!(!is_run_log_name("notes.txt"));
    }
}
