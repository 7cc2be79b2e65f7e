//! VOC processor stages

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{default_windows, parser, storage};
use crate::config::VocConfig;
use crate::db::ProcessorCursor;
use crate::ingest::gc_storage::{peaks_for_batch, rename_peak, set_peak_mr, store_batches, unmatched_batches};
use crate::ingest::peak_log::read_tail;
use crate::ingest::list_files;
use crate::matching::{match_nearest, midpoint};
use crate::models::voc::NewVocLogFile;
use crate::models::{Instrument, RunType};
use crate::notify::{deliver, Notification, Notifier};
use crate::pipeline::plot::{build_series, plot_window};
use crate::pipeline::{InstrumentProcessor, PlotSink, StageOutcome};
use crate::quantify::{blank_corrected, name_peaks, quantify_peaks};

pub struct VocProcessor {
    pool: SqlitePool,
    config: VocConfig,
    notifier: Arc<dyn Notifier>,
    plot_sink: Arc<dyn PlotSink>,
}

impl VocProcessor {
    pub fn new(pool: SqlitePool, config: VocConfig, notifier: Arc<dyn Notifier>, plot_sink: Arc<dyn PlotSink>) -> Self {
        Self {
            pool,
            config,
            notifier,
            plot_sink,
        }
    }

    /// Parse and store log files not seen before. Returns the number inserted.
    async fn load_logs(&self) -> Result<usize> {
        let known = storage::known_log_filenames(&self.pool).await?;
        let files = list_files(&self.config.log_dir, "txt").await?;

        let mut parsed = Vec::new();
        for file in files.into_iter().filter(|f| !known.contains(&f.name)) {
            let content = match tokio::fs::read_to_string(&file.path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %file.name, error = %e, "Failed to read log file");
                    continue;
                },
            };

            match parser::parse_log_file(&file.name, &content) {
                Ok(log) => parsed.push(log),
                Err(e) => warn!(file = %file.name, error = %e, "Skipping unparseable log file"),
            }
        }

        let (stats, inserted) = storage::store_log_files(&self.pool, &parsed).await?;
        for log in &inserted {
            self.check_bounds(log).await;
        }

        Ok(stats.inserted)
    }

    async fn check_bounds(&self, log: &NewVocLogFile) {
        let violations = parser::bound_violations(&log.params, &self.config.log_bounds);
        if violations.is_empty() {
            return;
        }

        warn!(
            file = %log.filename,
            count = violations.len(),
            "Log parameters outside configured bounds"
        );
        deliver(
            self.notifier.as_ref(),
            &Notification::log_parameters(&log.filename, &violations),
        )
        .await;
    }

    /// Read the appended tail of VOC.LOG and advance the cursor.
    async fn load_peaks(&self) -> Result<usize> {
        let mut cursor = ProcessorCursor::get_or_create(&self.pool, self.name()).await?;

        let Some(tail) = read_tail(&self.config.pa_file, &cursor).await? else {
            debug!(path = %self.config.pa_file.display(), "Peak log unchanged");
            return Ok(0);
        };

        let stats = store_batches(&self.pool, Instrument::Voc, &tail.batches).await?;

        cursor.filesize = tail.filesize;
        cursor.pa_startline = tail.startline;
        cursor.save(&self.pool).await?;

        Ok(stats.inserted)
    }

    async fn load_reference_data(&self) -> Result<()> {
        let windows = storage::store_windows(&self.pool, &default_windows()).await?;
        if windows.inserted > 0 {
            info!(inserted = windows.inserted, "Seeded default compound windows");
        }

        let path = &self.config.crf_file;
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!(path = %path.display(), "No response factor file");
            return Ok(());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read response factors {}", path.display()))?;
        let tables = parser::parse_crf_file(&content)?;
        let stats = storage::store_crfs(&self.pool, &tables).await?;

        if stats.inserted > 0 {
            info!(inserted = stats.inserted, skipped = stats.skipped, "Loaded response factors");
        }
        Ok(())
    }
}

#[async_trait]
impl InstrumentProcessor for VocProcessor {
    fn instrument(&self) -> Instrument {
        Instrument::Voc
    }

    async fn load_raw(&self) -> Result<StageOutcome> {
        self.load_reference_data().await?;
        let logs = self.load_logs().await?;
        let batches = self.load_peaks().await?;

        info!(processor = self.name(), logs, batches, "Loaded raw VOC data");
        Ok(StageOutcome::from_count(logs + batches))
    }

    async fn match_records(&self) -> Result<StageOutcome> {
        let logs = storage::unmatched_logs(&self.pool).await?;
        let batches = unmatched_batches(&self.pool, Instrument::Voc).await?;

        if logs.is_empty() || batches.is_empty() {
            return Ok(StageOutcome::NoNewData);
        }

        let runs: Vec<storage::NewVocRun> = match_nearest(&batches, &logs, self.config.match_tolerance())
            .into_iter()
            .map(|pair| {
                let batch = &batches[pair.primary];
                let log = &logs[pair.secondary];
                storage::NewVocRun {
                    log_id: log.id,
                    batch_id: batch.id,
                    date: midpoint(log.date, batch.date),
                    date_end: batch.date,
                    run_type: RunType::from_code(log.sample_type),
                }
            })
            .collect();

        let created = storage::create_runs(&self.pool, &runs).await?;
        debug!(
            created,
            unmatched_logs = logs.len() - created,
            "Matched VOC logs to peak batches"
        );
        Ok(StageOutcome::from_count(created))
    }

    async fn assign_peaks(&self) -> Result<StageOutcome> {
        let runs = storage::runs_needing_names(&self.pool).await?;
        let mut named = 0;

        for run in &runs {
            let windows = storage::windows_for(&self.pool, run.date).await?;
            if windows.is_empty() {
                warn!(run_id = run.id, date = %run.date, "No compound windows cover run, leaving peaks unnamed");
                continue;
            }

            let peaks = peaks_for_batch(&self.pool, run.batch_id).await?;
            let names = name_peaks(&peaks, &windows);

            let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
            for (peak, name) in peaks.iter().zip(&names) {
                if peak.name != *name {
                    rename_peak(&mut *tx, peak.id, name).await?;
                }
            }
            storage::mark_peaks_named(&mut *tx, run.id).await?;
            tx.commit().await.context("Failed to commit peak names")?;

            named += 1;
        }

        Ok(StageOutcome::from_count(named))
    }

    async fn quantify(&self) -> Result<StageOutcome> {
        let runs = storage::runs_to_quantify(&self.pool).await?;
        let mut quantified = 0;

        for run in &runs {
            let Some(crf) = storage::crf_for(&self.pool, run.date_end).await? else {
                warn!(run_id = run.id, date = %run.date_end, "No response factors cover run, leaving unquantified");
                continue;
            };

            let log = storage::log_by_id(&self.pool, run.log_id).await?;
            let peaks = peaks_for_batch(&self.pool, run.batch_id).await?;
            let ratios = quantify_peaks(&peaks, &crf, log.sample_time, log.sample_flow1);

            let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
            for (peak_id, mr) in &ratios {
                set_peak_mr(&mut *tx, *peak_id, *mr).await?;
            }
            storage::insert_result(&mut *tx, run.id, crf.id, run.date).await?;
            tx.commit().await.context("Failed to commit VOC result")?;

            debug!(
                run_id = run.id,
                date = %run.date,
                quantified = ratios.iter().filter(|(_, mr)| mr.is_some()).count(),
                "Quantified VOC run"
            );
            quantified += 1;
        }

        Ok(StageOutcome::from_count(quantified))
    }

    async fn plot(&self) -> Result<StageOutcome> {
        let mut cursor = ProcessorCursor::get_or_create(&self.pool, self.name()).await?;
        let newest = storage::newest_result_date(&self.pool).await?;

        let Some(window) = plot_window(&cursor, newest) else {
            return Ok(StageOutcome::NoNewData);
        };

        let blanks = storage::latest_blanks(&self.pool, window.1).await?;
        let rows = storage::ambient_results_since(&self.pool, window.0)
            .await?
            .into_iter()
            .map(|(date, compound, mr)| {
                let corrected = blank_corrected(mr, &compound, &blanks);
                (date, compound, corrected)
            });

        let range = self.config.plot_range;
        let series = build_series(Instrument::Voc, rows, |_| Some(range), window);
        self.plot_sink.publish(&series).await?;

        cursor.last_data_date = window.1;
        cursor.save(&self.pool).await?;

        Ok(StageOutcome::NewData(series.len()))
    }
}
