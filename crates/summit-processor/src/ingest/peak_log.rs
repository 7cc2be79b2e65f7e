//! PeakSimple peak-area logs (VOC.LOG, CH4.LOG)
//!
//! # Format
//! One tab-delimited line per injection:
//! ```text
//! <id>\t06/01/2019\t12:03:22\t"ethane"\t1.75\t12034.2\t"-"\t2.10\t85.1 ...
//! ```
//! Every field containing a double quote starts a `"name" rt area` triple.
//! The file only ever grows, so reads resume from a line cursor.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use summit_common::timefmt::parse_peak_batch_stamp;
use tracing::{debug, warn};

use crate::db::ProcessorCursor;
use crate::models::{NewPeak, NewPeakBatch};

/// Parse one line. `Ok(None)` for a line that carries no peaks.
pub fn parse_peak_line(line: &str, line_num: usize) -> Result<Option<NewPeakBatch>> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();

    if fields.len() < 3 {
        return Err(anyhow!(
            "Line {}: Expected at least 3 fields, got {}",
            line_num,
            fields.len()
        ));
    }

    let date = parse_peak_batch_stamp(fields[1].trim(), fields[2].trim())
        .with_context(|| format!("Line {}: Invalid batch timestamp", line_num))?;

    let mut peaks = Vec::new();
    for (idx, field) in fields.iter().enumerate().skip(3) {
        if !field.contains('"') {
            continue;
        }

        let name = field.trim().trim_matches('"');
        let rt = fields.get(idx + 1).and_then(|f| f.trim().parse::<f64>().ok());
        let pa = fields.get(idx + 2).and_then(|f| f.trim().parse::<f64>().ok());

        match (rt, pa) {
            (Some(rt), Some(pa)) => peaks.push(NewPeak::new(name, pa, rt)),
            _ => debug!("Line {}: Dropping peak {} with unreadable rt or area", line_num, name),
        }
    }

    if peaks.is_empty() {
        return Ok(None);
    }

    Ok(Some(NewPeakBatch { date, peaks }))
}

/// Parse every line, skipping (and logging) the ones that fail.
/// `first_line_num` is the 1-based number of the first line given.
pub fn parse_peak_lines<'a>(lines: impl IntoIterator<Item = &'a str>, first_line_num: usize) -> Vec<NewPeakBatch> {
    let mut batches = Vec::new();

    for (offset, line) in lines.into_iter().enumerate() {
        let line_num = first_line_num + offset;

        if line.trim().is_empty() {
            continue;
        }

        match parse_peak_line(line, line_num) {
            Ok(Some(batch)) => batches.push(batch),
            Ok(None) => debug!("Line {} has no peaks", line_num),
            Err(e) => warn!("Failed to parse peak line {}: {}", line_num, e),
        }
    }

    batches
}

/// Newly appended batches and the cursor values to store once they commit.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakLogTail {
    pub batches: Vec<NewPeakBatch>,
    /// Bytes covered by complete lines.
    pub filesize: i64,
    /// Complete lines read so far.
    pub startline: i64,
}

/// Read whatever was appended since `cursor`. `Ok(None)` when the file has
/// not grown. A file smaller than the cursor was replaced and is re-read from
/// the start.
pub async fn read_tail(path: &Path, cursor: &ProcessorCursor) -> Result<Option<PeakLogTail>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "Peak log not written yet");
        return Ok(None);
    }

    let size = super::file_size(path).await? as i64;

    let (mut filesize, mut startline) = (cursor.filesize, cursor.pa_startline);
    let shrank = size < filesize;
    if shrank {
        warn!(
            path = %path.display(),
            size,
            cursor = filesize,
            "Peak log shrank, re-reading from the start"
        );
        filesize = 0;
        startline = 0;
    }

    if size == filesize && !shrank {
        return Ok(None);
    }

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read peak log {}", path.display()))?;
    let content = String::from_utf8_lossy(&bytes);

    // a trailing line without a newline may still be being written
    let complete: Vec<&str> = content.split_inclusive('\n').filter(|l| l.ends_with('\n')).collect();
    let consumed: usize = complete.iter().map(|l| l.len()).sum();

    let skip = usize::try_from(startline).unwrap_or(0).min(complete.len());
    let batches = parse_peak_lines(complete[skip..].iter().copied(), skip + 1);

    filesize = consumed as i64;
    startline = complete.len() as i64;

    debug!(
        path = %path.display(),
        new_lines = complete.len() - skip,
        batches = batches.len(),
        "Read peak log tail"
    );

    Ok(Some(PeakLogTail {
        batches,
        filesize,
        startline,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    const LINE: &str = "1\t06/01/2019\t12:03:22\t\"ethane\"\t1.75\t12034.2\t\"-\"\t2.10\t85.1";

    fn cursor(filesize: i64, startline: i64) -> ProcessorCursor {
        ProcessorCursor {
            id: 1,
            processor: "voc".to_string(),
            filesize,
            pa_startline: startline,
            last_data_date: NaiveDate::from_ymd_opt(1900, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            days_to_plot: 7,
        }
    }

    #[test]
    fn test_parse_peak_line() {
        let batch = parse_peak_line(LINE, 1).unwrap().unwrap();
        assert_eq!(
            batch.date,
            NaiveDate::from_ymd_opt(2019, 6, 1).unwrap().and_hms_opt(12, 3, 22).unwrap()
        );
        assert_eq!(batch.peaks.len(), 2);
        assert_eq!(batch.peaks[0], NewPeak::new("ethane", 12034.2, 1.75));
        assert_eq!(batch.peaks[1].name, "-");
    }

    #[test]
    fn test_unreadable_triples_are_dropped() {
        let line = "1\t06/01/2019\t12:03:22\t\"ethane\"\tx\t12034.2\t\"propane\"\t2.9\t400";
        let batch = parse_peak_line(line, 1).unwrap().unwrap();
        assert_eq!(batch.peaks.len(), 1);
        assert_eq!(batch.peaks[0].name, "propane");
    }

    #[test]
    fn test_line_without_peaks_is_not_a_batch() {
        assert!(parse_peak_line("1\t06/01/2019\t12:03:22", 1).unwrap().is_none());
    }

    #[test]
    fn test_bad_date_is_an_error() {
        assert!(parse_peak_line("1\t13/45/2019\t12:03:22\t\"a\"\t1\t2", 1).is_err());
        assert!(parse_peak_line("garbage", 1).is_err());
    }

    #[test]
    fn test_parse_lines_skips_failures() {
        let batches = parse_peak_lines(vec!["garbage", "", LINE], 1);
        assert_eq!(batches.len(), 1);
    }

    #[tokio::test]
    async fn test_tail_resumes_and_resets() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", LINE).unwrap();
        file.flush().unwrap();

        let first = read_tail(file.path(), &cursor(0, 0)).await.unwrap().unwrap();
        assert_eq!(first.batches.len(), 1);
        assert_eq!(first.startline, 1);

        // unchanged file
        let after = cursor(first.filesize, first.startline);
        assert!(read_tail(file.path(), &after).await.unwrap().is_none());

        // appended line plus a partial one
        write!(file, "{}\n1\t06/01/2019", LINE.replace("12:03:22", "12:45:00")).unwrap();
        file.flush().unwrap();
        let second = read_tail(file.path(), &after).await.unwrap().unwrap();
        assert_eq!(second.batches.len(), 1);
        assert_eq!(second.startline, 2);
        assert!(second.filesize < file.as_file().metadata().unwrap().len() as i64);

        // a cursor beyond the file means it was replaced
        let reset = read_tail(file.path(), &cursor(1_000_000, 50)).await.unwrap().unwrap();
        assert_eq!(reset.batches.len(), 2);
    }
}
