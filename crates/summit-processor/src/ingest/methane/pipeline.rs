//! Methane processor stages

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{parser, peak_for_position, sample_peak_name, storage};
use crate::config::MethaneConfig;
use crate::db::ProcessorCursor;
use crate::ingest::gc_storage::{batch_by_id, peaks_for_batch, rename_peak, set_peak_mr, store_batches, unmatched_batches};
use crate::ingest::list_files;
use crate::ingest::peak_log::read_tail;
use crate::matching::{match_nearest, midpoint};
use crate::models::{Instrument, MethaneRun};
use crate::pipeline::plot::{build_series, plot_window};
use crate::pipeline::{InstrumentProcessor, PlotSink, StageOutcome};
use crate::quantify::{quantify_run, SampleArea};

/// Elution time of a peak `rt` minutes into a batch injected at `start`.
/// The first minute of every chromatogram is dead time.
fn elution_time(start: NaiveDateTime, rt: f64) -> NaiveDateTime {
    start + Duration::milliseconds(((rt - 1.0) * 60_000.0).round() as i64)
}

pub struct MethaneProcessor {
    pool: SqlitePool,
    config: MethaneConfig,
    plot_sink: Arc<dyn PlotSink>,
}

impl MethaneProcessor {
    pub fn new(pool: SqlitePool, config: MethaneConfig, plot_sink: Arc<dyn PlotSink>) -> Self {
        Self {
            pool,
            config,
            plot_sink,
        }
    }

    async fn load_run_logs(&self) -> Result<usize> {
        let known = storage::known_log_filenames(&self.pool).await?;
        let files = list_files(&self.config.log_dir, "txt").await?;

        let mut parsed = Vec::new();
        for file in files {
            if known.contains(&file.name) || !parser::is_run_log_name(&file.name) {
                continue;
            }

            let content = match tokio::fs::read_to_string(&file.path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %file.name, error = %e, "Failed to read run log");
                    continue;
                },
            };

            match parser::parse_run_log(&file.name, &content) {
                Ok(log) => parsed.push(log),
                Err(e) => warn!(file = %file.name, error = %e, "Skipping malformed run log"),
            }
        }

        let stats = storage::store_run_logs(&self.pool, &parsed).await?;
        Ok(stats.inserted)
    }

    /// Read the appended tail of CH4.LOG and advance the cursor.
    async fn load_peaks(&self) -> Result<usize> {
        let mut cursor = ProcessorCursor::get_or_create(&self.pool, self.name()).await?;

        let Some(tail) = read_tail(&self.config.pa_file, &cursor).await? else {
            debug!(path = %self.config.pa_file.display(), "Peak log unchanged");
            return Ok(0);
        };

        let stats = store_batches(&self.pool, Instrument::Methane, &tail.batches).await?;

        cursor.filesize = tail.filesize;
        cursor.pa_startline = tail.startline;
        cursor.save(&self.pool).await?;

        Ok(stats.inserted)
    }

    async fn assign_run(&self, run: &MethaneRun) -> Result<usize> {
        let batch = batch_by_id(&self.pool, run.batch_id).await?;
        let peaks = peaks_for_batch(&self.pool, run.batch_id).await?;
        let samples = storage::samples_for_log(&self.pool, run.log_id).await?;

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut assigned = 0;
        for sample in &samples {
            let Some(peak) = peak_for_position(&peaks, sample.position) else {
                debug!(run_id = run.id, position = sample.position, "No peak in sample window");
                continue;
            };
            rename_peak(&mut *tx, peak.id, &sample_peak_name(sample.position)).await?;
            storage::assign_sample(&mut *tx, sample.id, peak.id, elution_time(batch.date, peak.rt)).await?;
            assigned += 1;
        }
        storage::mark_samples_assigned(&mut *tx, run.id).await?;
        tx.commit().await.context("Failed to commit sample assignment")?;

        Ok(assigned)
    }

    /// Returns false when the run must be retried on a later cycle.
    async fn quantify_run(&self, run: &MethaneRun) -> Result<bool> {
        let Some(standard) = storage::standard_for(&self.pool, run.date).await? else {
            warn!(run_id = run.id, date = %run.date, "No standard covers run, leaving unquantified");
            return Ok(false);
        };

        let samples = storage::samples_for_log(&self.pool, run.log_id).await?;
        let areas: HashMap<i64, f64> = peaks_for_batch(&self.pool, run.batch_id)
            .await?
            .into_iter()
            .map(|p| (p.id, p.pa))
            .collect();

        let sample_areas: Vec<SampleArea> = samples
            .iter()
            .map(|s| SampleArea {
                position: s.position,
                kind: s.kind(),
                pa: s.peak_id.and_then(|id| areas.get(&id).copied()),
            })
            .collect();

        let Some(result) = quantify_run(&sample_areas, standard.mr) else {
            warn!(run_id = run.id, date = %run.date, "Both standard peaks unusable, leaving unquantified");
            return Ok(false);
        };

        let by_position: HashMap<i64, _> = samples.iter().map(|s| (s.position, s)).collect();
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for q in &result.samples {
            let (Some(sample), Some(quantifier)) = (by_position.get(&q.position), by_position.get(&q.quantifier_position))
            else {
                continue;
            };
            if let Some(peak_id) = sample.peak_id {
                set_peak_mr(&mut *tx, peak_id, Some(q.mr)).await?;
            }
            storage::set_quantifier(&mut *tx, sample.id, quantifier.id).await?;
        }
        storage::save_quantification(&mut *tx, run.id, &result).await?;
        tx.commit().await.context("Failed to commit methane quantification")?;

        debug!(
            run_id = run.id,
            standard = %standard.name,
            median = ?result.median,
            "Quantified methane run"
        );
        Ok(true)
    }
}

#[async_trait]
impl InstrumentProcessor for MethaneProcessor {
    fn instrument(&self) -> Instrument {
        Instrument::Methane
    }

    async fn load_raw(&self) -> Result<StageOutcome> {
        let standards = storage::store_standards(&self.pool, &self.config.standards).await?;
        if standards.inserted > 0 {
            info!(inserted = standards.inserted, "Stored methane standards");
        }

        let logs = self.load_run_logs().await?;
        let batches = self.load_peaks().await?;

        info!(processor = self.name(), logs, batches, "Loaded raw methane data");
        Ok(StageOutcome::from_count(logs + batches))
    }

    async fn match_records(&self) -> Result<StageOutcome> {
        let logs = storage::unmatched_logs(&self.pool).await?;
        let batches = unmatched_batches(&self.pool, Instrument::Methane).await?;

        if logs.is_empty() || batches.is_empty() {
            return Ok(StageOutcome::NoNewData);
        }

        let runs: Vec<storage::NewMethaneRun> = match_nearest(&batches, &logs, self.config.match_tolerance())
            .into_iter()
            .map(|pair| {
                let batch = &batches[pair.primary];
                let log = &logs[pair.secondary];
                storage::NewMethaneRun {
                    log_id: log.id,
                    batch_id: batch.id,
                    date: midpoint(log.date, batch.date),
                }
            })
            .collect();

        let created = storage::create_runs(&self.pool, &runs).await?;
        debug!(created, "Matched methane run logs to peak batches");
        Ok(StageOutcome::from_count(created))
    }

    async fn assign_peaks(&self) -> Result<StageOutcome> {
        let runs = storage::runs_needing_samples(&self.pool).await?;
        let mut done = 0;

        for run in &runs {
            let assigned = self.assign_run(run).await?;
            debug!(run_id = run.id, assigned, "Assigned methane sample peaks");
            done += 1;
        }

        Ok(StageOutcome::from_count(done))
    }

    async fn quantify(&self) -> Result<StageOutcome> {
        let runs = storage::runs_to_quantify(&self.pool).await?;
        let mut quantified = 0;

        for run in &runs {
            if self.quantify_run(run).await? {
                quantified += 1;
            }
        }

        Ok(StageOutcome::from_count(quantified))
    }

    async fn plot(&self) -> Result<StageOutcome> {
        let mut cursor = ProcessorCursor::get_or_create(&self.pool, self.name()).await?;
        let newest = storage::newest_result_date(&self.pool).await?;

        let Some(window) = plot_window(&cursor, newest) else {
            return Ok(StageOutcome::NoNewData);
        };

        let rows = storage::ambient_results_since(&self.pool, window.0)
            .await?
            .into_iter()
            .map(|(date, mr)| (date, "ch4".to_string(), mr));

        let range = self.config.plot_range;
        let series = build_series(Instrument::Methane, rows, |_| Some(range), window);
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
    use chrono::NaiveDate;

    #[test]
    fn test_elution_time() {
        let start = NaiveDate::from_ymd_opt(2019, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(elution_time(start, 2.5), start + Duration::seconds(90));
        assert_eq!(elution_time(start, 1.0), start);
    }
}
