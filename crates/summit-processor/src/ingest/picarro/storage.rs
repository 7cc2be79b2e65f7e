//! Picarro files, readings, calibration events and MasterCals

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::info;

use crate::calibration::{DetectedEvent, MasterCalCurves};
use crate::ingest::gc_storage::StorageStats;
use crate::models::picarro::PicarroReading;
use crate::models::{CalEvent, Compound, DataFile, MpvPosition, RawDatum, StandardGas};

const DATUM_COLUMNS: &str = "id, file_id, cal_id, date, alarm_status, instrument_status, cavity_pressure, \
    cavity_temp, das_temp, etalon_temp, warmbox_temp, mpv_position, outlet_valve, co, co2_wet, co2, \
    ch4_wet, ch4, h2o";

const EVENT_COLUMNS: &str = "id, date, standard_used, duration_secs, back_period, co_mean, co_median, \
    co_stdev, co2_mean, co2_median, co2_stdev, ch4_mean, ch4_median, ch4_stdev, mastercal_id";

/// Stored files keyed by name.
pub async fn known_files(pool: &SqlitePool) -> Result<HashMap<String, DataFile>> {
    let files = sqlx::query_as::<_, DataFile>("SELECT id, name, path, size, processed FROM picarro_files")
        .fetch_all(pool)
        .await
        .context("Failed to load stored Picarro files")?;
    Ok(files.into_iter().map(|f| (f.name.clone(), f)).collect())
}

/// Record a file at its current size and insert readings whose timestamp is
/// not stored yet, all in one transaction.
pub async fn store_file_readings(
    pool: &SqlitePool,
    name: &str,
    path: &str,
    size: i64,
    readings: &[PicarroReading],
) -> Result<StorageStats> {
    let mut stats = StorageStats::default();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let file_id: i64 = sqlx::query_scalar(
        "INSERT INTO picarro_files (name, path, size, processed) VALUES (?, ?, ?, 1)
         ON CONFLICT (name) DO UPDATE SET path = excluded.path, size = excluded.size, processed = 1
         RETURNING id",
    )
    .bind(name)
    .bind(path)
    .bind(size)
    .fetch_one(&mut *tx)
    .await
    .with_context(|| format!("Failed to record Picarro file {}", name))?;

    for r in readings {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO picarro_data (
                date, file_id, alarm_status, instrument_status, cavity_pressure, cavity_temp, das_temp,
                etalon_temp, warmbox_temp, mpv_position, outlet_valve, co, co2_wet, co2, ch4_wet, ch4, h2o
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(r.date)
        .bind(file_id)
        .bind(r.alarm_status)
        .bind(r.instrument_status)
        .bind(r.cavity_pressure)
        .bind(r.cavity_temp)
        .bind(r.das_temp)
        .bind(r.etalon_temp)
        .bind(r.warmbox_temp)
        .bind(r.mpv_position)
        .bind(r.outlet_valve)
        .bind(r.co)
        .bind(r.co2_wet)
        .bind(r.co2)
        .bind(r.ch4_wet)
        .bind(r.ch4)
        .bind(r.h2o)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert reading at {}", r.date))?;

        stats.record(result.rows_affected() > 0);
    }

    tx.commit().await.context("Failed to commit Picarro readings")?;

    info!(file = name, inserted = stats.inserted, skipped = stats.skipped, "Stored Picarro readings");
    Ok(stats)
}

/// Readings taken on `gas` that no event owns yet, oldest first.
pub async fn unassigned_readings(pool: &SqlitePool, gas: StandardGas) -> Result<Vec<RawDatum>> {
    let sql = format!(
        "SELECT {} FROM picarro_data WHERE mpv_position = ? AND cal_id IS NULL ORDER BY date",
        DATUM_COLUMNS
    );
    sqlx::query_as::<_, RawDatum>(&sql)
        .bind(gas.mpv_code())
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to load unassigned {} readings", gas.as_str()))
}

pub async fn newest_reading_date(pool: &SqlitePool) -> Result<Option<NaiveDateTime>> {
    let (date,): (Option<NaiveDateTime>,) = sqlx::query_as("SELECT MAX(date) FROM picarro_data")
        .fetch_one(pool)
        .await
        .context("Failed to query newest Picarro reading")?;
    Ok(date)
}

/// Insert events and hand each its readings. Returns the number stored.
pub async fn store_events(pool: &SqlitePool, events: &[DetectedEvent]) -> Result<usize> {
    if events.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for event in events {
        let stat = |compound: Compound| event.stats.get(compound);
        let cal_id: i64 = sqlx::query_scalar(
            "INSERT INTO picarro_cal_events (
                date, standard_used, duration_secs, back_period,
                co_mean, co_median, co_stdev, co2_mean, co2_median, co2_stdev, ch4_mean, ch4_median, ch4_stdev
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(event.date)
        .bind(event.standard_used())
        .bind(event.duration.num_milliseconds() as f64 / 1000.0)
        .bind(event.back_period.num_milliseconds() as f64 / 1000.0)
        .bind(stat(Compound::Co).map(|s| s.mean))
        .bind(stat(Compound::Co).map(|s| s.median))
        .bind(stat(Compound::Co).and_then(|s| s.stdev))
        .bind(stat(Compound::Co2).map(|s| s.mean))
        .bind(stat(Compound::Co2).map(|s| s.median))
        .bind(stat(Compound::Co2).and_then(|s| s.stdev))
        .bind(stat(Compound::Ch4).map(|s| s.mean))
        .bind(stat(Compound::Ch4).map(|s| s.median))
        .bind(stat(Compound::Ch4).and_then(|s| s.stdev))
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert {} event at {}", event.standard_used(), event.date))?;

        for reading_id in &event.reading_ids {
            sqlx::query("UPDATE picarro_data SET cal_id = ? WHERE id = ?")
                .bind(cal_id)
                .bind(reading_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await.context("Failed to commit calibration events")?;
    Ok(events.len())
}

/// Non-dump events of `gas` not yet part of a MasterCal, oldest first.
pub async fn unassigned_events(pool: &SqlitePool, gas: StandardGas) -> Result<Vec<CalEvent>> {
    let sql = format!(
        "SELECT {} FROM picarro_cal_events WHERE standard_used = ? AND mastercal_id IS NULL ORDER BY date",
        EVENT_COLUMNS
    );
    sqlx::query_as::<_, CalEvent>(&sql)
        .bind(gas.as_str())
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to load unassigned {} events", gas.as_str()))
}

/// A MasterCal to store, with the ids of its three events.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMasterCal {
    pub date: NaiveDateTime,
    pub curves: MasterCalCurves,
    pub event_ids: [i64; 3],
}

pub async fn store_mastercals(pool: &SqlitePool, mastercals: &[NewMasterCal]) -> Result<usize> {
    if mastercals.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for mc in mastercals {
        let curve = |compound: Compound| mc.curves.get(compound);
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO picarro_mastercals (
                date, co_slope, co_intercept, co_middle_offset, co2_slope, co2_intercept, co2_middle_offset,
                ch4_slope, ch4_intercept, ch4_middle_offset
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(mc.date)
        .bind(curve(Compound::Co).map(|c| c.slope))
        .bind(curve(Compound::Co).map(|c| c.intercept))
        .bind(curve(Compound::Co).map(|c| c.middle_offset))
        .bind(curve(Compound::Co2).map(|c| c.slope))
        .bind(curve(Compound::Co2).map(|c| c.intercept))
        .bind(curve(Compound::Co2).map(|c| c.middle_offset))
        .bind(curve(Compound::Ch4).map(|c| c.slope))
        .bind(curve(Compound::Ch4).map(|c| c.intercept))
        .bind(curve(Compound::Ch4).map(|c| c.middle_offset))
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert MasterCal at {}", mc.date))?;

        for event_id in mc.event_ids {
            sqlx::query("UPDATE picarro_cal_events SET mastercal_id = ? WHERE id = ?")
                .bind(id)
                .bind(event_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await.context("Failed to commit MasterCals")?;
    Ok(mastercals.len())
}

/// `(date, compound, value)` of ambient readings at or after `start`.
pub async fn ambient_readings_since(pool: &SqlitePool, start: NaiveDateTime) -> Result<Vec<(NaiveDateTime, String, f64)>> {
    let rows: Vec<(NaiveDateTime, f64, f64, f64)> = sqlx::query_as(
        "SELECT date, co, co2, ch4 FROM picarro_data WHERE mpv_position = ? AND date >= ? ORDER BY date",
    )
    .bind(MpvPosition::Ambient.code())
    .bind(start)
    .fetch_all(pool)
    .await
    .context("Failed to load ambient Picarro readings")?;

    Ok(rows
        .into_iter()
        .flat_map(|(date, co, co2, ch4)| {
            [(Compound::Co, co), (Compound::Co2, co2), (Compound::Ch4, ch4)]
                .into_iter()
                .map(move |(compound, value)| (date, compound.as_str().to_string(), value))
        })
        .collect())
}
