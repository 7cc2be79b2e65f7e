//! Peak batch storage shared by both gas chromatographs

use anyhow::{Context, Result};
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::models::{Instrument, NewPeakBatch, Peak, PeakBatch, RecordStatus};

/// Storage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub total: usize,
    pub inserted: usize,
    pub skipped: usize,
}

impl StorageStats {
    pub fn record(&mut self, inserted: bool) {
        self.total += 1;
        if inserted {
            self.inserted += 1;
        } else {
            self.skipped += 1;
        }
    }
}

/// Insert batches and their peaks in one transaction. A batch whose date is
/// already stored for this instrument is skipped along with its peaks.
pub async fn store_batches(pool: &SqlitePool, instrument: Instrument, batches: &[NewPeakBatch]) -> Result<StorageStats> {
    let mut stats = StorageStats::default();
    if batches.is_empty() {
        return Ok(stats);
    }

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for batch in batches {
        let result = sqlx::query("INSERT OR IGNORE INTO peak_batches (instrument, date, status) VALUES (?, ?, ?)")
            .bind(instrument.as_str())
            .bind(batch.date)
            .bind(RecordStatus::Single)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert peak batch for {}", batch.date))?;

        if result.rows_affected() == 0 {
            debug!(date = %batch.date, "Peak batch already stored");
            stats.record(false);
            continue;
        }

        let batch_id = result.last_insert_rowid();
        for peak in &batch.peaks {
            sqlx::query("INSERT INTO peaks (batch_id, name, pa, rt) VALUES (?, ?, ?, ?)")
                .bind(batch_id)
                .bind(&peak.name)
                .bind(peak.pa)
                .bind(peak.rt)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert peak {} for batch {}", peak.name, batch.date))?;
        }
        stats.record(true);
    }

    tx.commit().await.context("Failed to commit peak batches")?;

    info!(
        instrument = %instrument,
        inserted = stats.inserted,
        skipped = stats.skipped,
        "Stored peak batches"
    );

    Ok(stats)
}

pub async fn unmatched_batches(pool: &SqlitePool, instrument: Instrument) -> Result<Vec<PeakBatch>> {
    let batches = sqlx::query_as::<_, PeakBatch>(
        "SELECT id, instrument, date, status FROM peak_batches
         WHERE instrument = ? AND status = ? ORDER BY date",
    )
    .bind(instrument.as_str())
    .bind(RecordStatus::Single)
    .fetch_all(pool)
    .await
    .context("Failed to load unmatched peak batches")?;

    Ok(batches)
}

pub async fn batch_by_id<'e, E>(executor: E, id: i64) -> Result<PeakBatch>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, PeakBatch>("SELECT id, instrument, date, status FROM peak_batches WHERE id = ?")
        .bind(id)
        .fetch_one(executor)
        .await
        .with_context(|| format!("Failed to load peak batch {}", id))
}

pub async fn peaks_for_batch<'e, E>(executor: E, batch_id: i64) -> Result<Vec<Peak>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Peak>("SELECT id, batch_id, name, pa, rt, mr FROM peaks WHERE batch_id = ? ORDER BY rt")
        .bind(batch_id)
        .fetch_all(executor)
        .await
        .with_context(|| format!("Failed to load peaks for batch {}", batch_id))
}

pub async fn mark_batch_married<'e, E>(executor: E, batch_id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE peak_batches SET status = ? WHERE id = ?")
        .bind(RecordStatus::Married)
        .bind(batch_id)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to mark peak batch {} married", batch_id))?;
    Ok(())
}

pub async fn rename_peak<'e, E>(executor: E, peak_id: i64, name: &str) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE peaks SET name = ? WHERE id = ?")
        .bind(name)
        .bind(peak_id)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to rename peak {}", peak_id))?;
    Ok(())
}

pub async fn set_peak_mr<'e, E>(executor: E, peak_id: i64, mr: Option<f64>) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE peaks SET mr = ? WHERE id = ?")
        .bind(mr)
        .bind(peak_id)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to set mixing ratio of peak {}", peak_id))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::models::NewPeak;
    use chrono::NaiveDate;

    async fn pool() -> SqlitePool {
        let pool = crate::db::create_pool(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            connect_timeout_secs: 5,
        })
        .await
        .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    fn batch(hour: u32) -> NewPeakBatch {
        NewPeakBatch {
            date: NaiveDate::from_ymd_opt(2019, 6, 1).unwrap().and_hms_opt(hour, 0, 0).unwrap(),
            peaks: vec![NewPeak::new("ethane", 1000.0, 1.7), NewPeak::new("-", 20.0, 2.5)],
        }
    }

    #[tokio::test]
    async fn test_store_is_idempotent_per_instrument() {
        let pool = pool().await;

        let first = store_batches(&pool, Instrument::Voc, &[batch(1), batch(2)]).await.unwrap();
        assert_eq!(first.inserted, 2);

        let again = store_batches(&pool, Instrument::Voc, &[batch(1), batch(3)]).await.unwrap();
        assert_eq!((again.inserted, again.skipped), (1, 1));

        // same date, other instrument
        let methane = store_batches(&pool, Instrument::Methane, &[batch(1)]).await.unwrap();
        assert_eq!(methane.inserted, 1);

        let voc = unmatched_batches(&pool, Instrument::Voc).await.unwrap();
        assert_eq!(voc.len(), 3);
        let peaks = peaks_for_batch(&pool, voc[0].id).await.unwrap();
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].name, "ethane");
    }

    #[tokio::test]
    async fn test_married_batches_leave_unmatched_set() {
        let pool = pool().await;
        store_batches(&pool, Instrument::Voc, &[batch(1)]).await.unwrap();
        let batches = unmatched_batches(&pool, Instrument::Voc).await.unwrap();

        mark_batch_married(&pool, batches[0].id).await.unwrap();
        assert!(unmatched_batches(&pool, Instrument::Voc).await.unwrap().is_empty());
        let stored = batch_by_id(&pool, batches[0].id).await.unwrap();
        assert_eq!(stored.status, RecordStatus::Married);
    }
}
