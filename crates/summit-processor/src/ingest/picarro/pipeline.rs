//! Picarro processor stages
//!
//! The analyzer has no partial records to marry, so the match stage is where
//! standard readings are segmented into calibration events, and quantify is
//! where low/high/mid events become MasterCals. Neither gates the plot: the
//! plotted values are ambient readings straight from `load_raw`.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{parser, storage};
use crate::calibration::{curves_for, detect_events, group_triplets, EventParams};
use crate::config::PicarroConfig;
use crate::db::ProcessorCursor;
use crate::ingest::list_files;
use crate::models::{Compound, Instrument, StandardGas};
use crate::pipeline::plot::{build_series, plot_window};
use crate::pipeline::{InstrumentProcessor, PlotSink, Stage, StageOutcome};

/// Data files written by the analyzer.
pub const DATA_FILE_EXTENSION: &str = "dat";

pub struct PicarroProcessor {
    pool: SqlitePool,
    config: PicarroConfig,
    plot_sink: Arc<dyn PlotSink>,
}

impl PicarroProcessor {
    pub fn new(pool: SqlitePool, config: PicarroConfig, plot_sink: Arc<dyn PlotSink>) -> Self {
        Self {
            pool,
            config,
            plot_sink,
        }
    }

    fn event_params(&self) -> EventParams {
        EventParams::from_secs(
            self.config.gap_secs,
            self.config.back_period_secs,
            self.config.min_event_secs,
        )
    }
}

#[async_trait]
impl InstrumentProcessor for PicarroProcessor {
    fn instrument(&self) -> Instrument {
        Instrument::Picarro
    }

    fn gates(&self, stage: Stage) -> bool {
        !matches!(stage, Stage::Match | Stage::Quantify)
    }

    /// Load new files and re-read known files that grew.
    async fn load_raw(&self) -> Result<StageOutcome> {
        let known = storage::known_files(&self.pool).await?;
        let files = list_files(&self.config.data_dir, DATA_FILE_EXTENSION).await?;

        let mut inserted = 0;
        for file in files {
            let size = file.size as i64;
            if known.get(&file.name).is_some_and(|stored| stored.size == size) {
                continue;
            }

            let content = match tokio::fs::read_to_string(&file.path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %file.name, error = %e, "Failed to read data file");
                    continue;
                },
            };

            let readings = match parser::parse_data_file(&file.name, &content) {
                Ok(readings) => readings,
                Err(e) => {
                    warn!(file = %file.name, error = %e, "Skipping unparseable data file");
                    continue;
                },
            };

            let path = file.path.to_string_lossy();
            let stats = storage::store_file_readings(&self.pool, &file.name, &path, size, &readings).await?;
            inserted += stats.inserted;
        }

        info!(processor = self.name(), readings = inserted, "Loaded raw Picarro data");
        Ok(StageOutcome::from_count(inserted))
    }

    /// Segment unassigned standard readings into calibration events.
    async fn match_records(&self) -> Result<StageOutcome> {
        let params = self.event_params();
        let newest = storage::newest_reading_date(&self.pool).await?;
        let mut stored = 0;

        for gas in StandardGas::ALL {
            let readings = storage::unassigned_readings(&self.pool, gas).await?;
            if readings.is_empty() {
                continue;
            }

            let events = detect_events(gas, &readings, newest, &params);
            let dumps = events.iter().filter(|e| e.dump).count();
            if dumps > 0 {
                info!(standard = gas.as_str(), dumps, "Calibration events too short to use");
            }

            stored += storage::store_events(&self.pool, &events).await?;
        }

        debug!(stored, "Stored calibration events");
        Ok(StageOutcome::from_count(stored))
    }

    /// Combine low, high and mid events into MasterCals.
    async fn quantify(&self) -> Result<StageOutcome> {
        let lows = storage::unassigned_events(&self.pool, StandardGas::Low).await?;
        let highs = storage::unassigned_events(&self.pool, StandardGas::High).await?;
        let mids = storage::unassigned_events(&self.pool, StandardGas::Mid).await?;

        if lows.is_empty() || highs.is_empty() || mids.is_empty() {
            return Ok(StageOutcome::NoNewData);
        }

        let window = chrono::Duration::seconds(self.config.mastercal_window_secs);
        let mastercals: Vec<storage::NewMasterCal> = group_triplets(&lows, &highs, &mids, window)
            .into_iter()
            .map(|t| {
                let (low, high, mid) = (&lows[t.low], &highs[t.high], &mids[t.mid]);
                storage::NewMasterCal {
                    date: low.date.max(high.date).max(mid.date),
                    curves: curves_for(low, high, mid, &self.config.standards),
                    event_ids: [low.id, high.id, mid.id],
                }
            })
            .collect();

        let created = storage::store_mastercals(&self.pool, &mastercals).await?;
        if created > 0 {
            info!(created, "Created MasterCals");
        }
        Ok(StageOutcome::from_count(created))
    }

    async fn plot(&self) -> Result<StageOutcome> {
        let mut cursor = ProcessorCursor::get_or_create(&self.pool, self.name()).await?;
        let newest = storage::newest_reading_date(&self.pool).await?;

        let Some(window) = plot_window(&cursor, newest) else {
            return Ok(StageOutcome::NoNewData);
        };

        let rows = storage::ambient_readings_since(&self.pool, window.0).await?;
        let ranges = &self.config.plot_ranges;
        let series = build_series(
            Instrument::Picarro,
            rows,
            |name| Compound::from_name(name).map(|c| ranges.range(c)),
            window,
        );
        self.plot_sink.publish(&series).await?;

        cursor.last_data_date = window.1;
        cursor.save(&self.pool).await?;

        Ok(StageOutcome::NewData(series.len()))
    }
}
