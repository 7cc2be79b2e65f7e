//! Plot hook
//!
//! Processors build [`PlotSeries`] from stored results and hand them to a
//! [`PlotSink`]. Outliers are dropped from the series only; stored values are
//! never touched.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tracing::info;

use crate::config::Bounds;
use crate::db::ProcessorCursor;
use crate::models::Instrument;

/// One compound's values over a plotting window.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSeries {
    pub instrument: Instrument,
    pub compound: String,
    pub points: Vec<(NaiveDateTime, f64)>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[async_trait]
pub trait PlotSink: Send + Sync {
    async fn publish(&self, series: &[PlotSeries]) -> Result<()>;
}

/// Logs a summary of each series instead of rendering it.
#[derive(Debug, Default, Clone)]
pub struct LogPlotSink;

#[async_trait]
impl PlotSink for LogPlotSink {
    async fn publish(&self, series: &[PlotSeries]) -> Result<()> {
        for s in series {
            info!(
                instrument = %s.instrument,
                compound = %s.compound,
                points = s.points.len(),
                start = %s.start,
                end = %s.end,
                "Plot series"
            );
        }
        Ok(())
    }
}

/// Window to plot, or `None` when nothing newer than the last plot exists.
pub fn plot_window(cursor: &ProcessorCursor, newest: Option<NaiveDateTime>) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let newest = newest?;
    (newest > cursor.last_data_date).then(|| (cursor.plot_start(newest), newest))
}

/// Group `(date, compound, value)` rows into one series per compound,
/// dropping values outside the compound's bounds.
pub fn build_series<F>(
    instrument: Instrument,
    rows: impl IntoIterator<Item = (NaiveDateTime, String, f64)>,
    bounds: F,
    window: (NaiveDateTime, NaiveDateTime),
) -> Vec<PlotSeries>
where
    F: Fn(&str) -> Option<Bounds>,
{
    let mut grouped: BTreeMap<String, Vec<(NaiveDateTime, f64)>> = BTreeMap::new();

    for (date, compound, value) in rows {
        let keep = bounds(&compound).map_or(true, |b| b.contains(value));
        let points = grouped.entry(compound).or_default();
        if keep {
            points.push((date, value));
        }
    }

    grouped
        .into_iter()
        .map(|(compound, mut points)| {
            points.sort_by_key(|(date, _)| *date);
            PlotSeries {
                instrument,
                compound,
                points,
                start: window.0,
                end: window.1,
            }
        })
        .collect()
}
