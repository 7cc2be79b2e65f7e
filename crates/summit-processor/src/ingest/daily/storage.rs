//! Daily housekeeping reading storage

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::info;

use crate::ingest::gc_storage::StorageStats;
use crate::models::DailyReading;

pub async fn known_filenames(pool: &SqlitePool) -> Result<HashSet<String>> {
    let names: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT filename FROM voc_dailies")
        .fetch_all(pool)
        .await
        .context("Failed to load stored daily file names")?;
    Ok(names.into_iter().map(|(name,)| name).collect())
}

/// Insert readings; a reading whose date is already stored is skipped.
pub async fn store_dailies(pool: &SqlitePool, readings: &[DailyReading]) -> Result<StorageStats> {
    let mut stats = StorageStats::default();
    if readings.is_empty() {
        return Ok(stats);
    }

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for reading in readings {
        let result = sqlx::query("INSERT OR IGNORE INTO voc_dailies (date, filename, params) VALUES (?, ?, ?)")
            .bind(reading.date)
            .bind(&reading.filename)
            .bind(&reading.params)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert daily reading at {}", reading.date))?;
        stats.record(result.rows_affected() > 0);
    }

    tx.commit().await.context("Failed to commit daily readings")?;

    info!(inserted = stats.inserted, skipped = stats.skipped, "Stored daily readings");
    Ok(stats)
}

pub async fn newest_daily_date(pool: &SqlitePool) -> Result<Option<NaiveDateTime>> {
    let (date,): (Option<NaiveDateTime>,) = sqlx::query_as("SELECT MAX(date) FROM voc_dailies")
        .fetch_one(pool)
        .await
        .context("Failed to query newest daily reading")?;
    Ok(date)
}

pub async fn dailies_since(pool: &SqlitePool, start: NaiveDateTime) -> Result<Vec<DailyReading>> {
    sqlx::query_as::<_, DailyReading>(
        "SELECT date, filename, params FROM voc_dailies WHERE date >= ? ORDER BY date",
    )
    .bind(start)
    .fetch_all(pool)
    .await
    .context("Failed to load daily readings")
}
