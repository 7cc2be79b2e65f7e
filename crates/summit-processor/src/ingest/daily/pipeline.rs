//! Daily processor: load and plot only

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

use super::{parser, storage};
use crate::db::ProcessorCursor;
use crate::ingest::list_files;
use crate::models::{DailyReading, Instrument};
use crate::pipeline::plot::{build_series, plot_window};
use crate::pipeline::{InstrumentProcessor, PlotSink, StageOutcome};

pub struct DailyProcessor {
    pool: SqlitePool,
    daily_dir: std::path::PathBuf,
    plot_sink: Arc<dyn PlotSink>,
}

impl DailyProcessor {
    pub fn new(pool: SqlitePool, daily_dir: impl Into<std::path::PathBuf>, plot_sink: Arc<dyn PlotSink>) -> Self {
        Self {
            pool,
            daily_dir: daily_dir.into(),
            plot_sink,
        }
    }
}

/// One `(date, parameter, value)` row per housekeeping parameter.
fn parameter_rows(reading: &DailyReading) -> Result<Vec<(chrono::NaiveDateTime, String, f64)>> {
    let value = serde_json::to_value(&reading.params.0).context("Failed to serialize daily parameters")?;
    let Some(fields) = value.as_object() else {
        return Ok(Vec::new());
    };

    Ok(fields
        .iter()
        .filter_map(|(name, v)| v.as_f64().map(|v| (reading.date, name.clone(), v)))
        .collect())
}

#[async_trait]
impl InstrumentProcessor for DailyProcessor {
    fn instrument(&self) -> Instrument {
        Instrument::Daily
    }

    async fn load_raw(&self) -> Result<StageOutcome> {
        let known = storage::known_filenames(&self.pool).await?;
        let files = list_files(&self.daily_dir, "txt").await?;

        let mut readings = Vec::new();
        for file in files.into_iter().filter(|f| !known.contains(&f.name)) {
            match tokio::fs::read_to_string(&file.path).await {
                Ok(content) => readings.extend(parser::parse_daily_file(&file.name, &content)),
                Err(e) => warn!(file = %file.name, error = %e, "Failed to read daily file"),
            }
        }

        let stats = storage::store_dailies(&self.pool, &readings).await?;
        info!(processor = self.name(), readings = stats.inserted, "Loaded daily data");
        Ok(StageOutcome::from_count(stats.inserted))
    }

    async fn plot(&self) -> Result<StageOutcome> {
        let mut cursor = ProcessorCursor::get_or_create(&self.pool, self.name()).await?;
        let newest = storage::newest_daily_date(&self.pool).await?;

        let Some(window) = plot_window(&cursor, newest) else {
            return Ok(StageOutcome::NoNewData);
        };

        let mut rows = Vec::new();
        for reading in storage::dailies_since(&self.pool, window.0).await? {
            rows.extend(parameter_rows(&reading)?);
        }

        let series = build_series(Instrument::Daily, rows, |_| None, window);
        self.plot_sink.publish(&series).await?;

        cursor.last_data_date = window.1;
        cursor.save(&self.pool).await?;

        Ok(StageOutcome::NewData(series.len()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ingest::daily::parser::{parse_daily_file, tests::daily_line, DAILY_PARAM_COUNT};

    #[test]
    fn test_every_parameter_becomes_a_row() {
        let readings = parse_daily_file("d.txt", &daily_line("191521200"));
        let rows = parameter_rows(&readings[0]).unwrap();
        assert_eq!(rows.len(), DAILY_PARAM_COUNT);
        assert!(rows.iter().any(|(_, name, v)| name == "fid_p" && *v == 29.0));
    }
}
