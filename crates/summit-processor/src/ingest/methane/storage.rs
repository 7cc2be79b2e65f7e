//! Methane run logs, samples, runs and standards

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::{Executor, Sqlite, SqlitePool};
use std::collections::HashSet;
use tracing::info;

use crate::ingest::gc_storage::{mark_batch_married, StorageStats};
use crate::models::methane::AMBIENT_SAMPLE_CODE;
use crate::models::{MethaneRun, MethaneRunLog, MethaneSample, NewMethaneRunLog, RecordStatus, Standard};
use crate::quantify::RunQuantification;

const RUN_COLUMNS: &str = "id, log_id, batch_id, date, samples_assigned, quantified, median, rsd, standard_rsd";

pub async fn known_log_filenames(pool: &SqlitePool) -> Result<HashSet<String>> {
    let names: Vec<(String,)> = sqlx::query_as("SELECT filename FROM methane_run_logs")
        .fetch_all(pool)
        .await
        .context("Failed to load stored run log names")?;
    Ok(names.into_iter().map(|(name,)| name).collect())
}

/// Insert run logs with their samples. A log whose run start is already
/// stored is skipped along with its samples.
pub async fn store_run_logs(pool: &SqlitePool, logs: &[NewMethaneRunLog]) -> Result<StorageStats> {
    let mut stats = StorageStats::default();
    if logs.is_empty() {
        return Ok(stats);
    }

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for log in logs {
        let result = sqlx::query("INSERT OR IGNORE INTO methane_run_logs (filename, date, status) VALUES (?, ?, ?)")
            .bind(&log.filename)
            .bind(log.date)
            .bind(RecordStatus::Single)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert run log {}", log.filename))?;

        if result.rows_affected() == 0 {
            stats.record(false);
            continue;
        }

        let log_id = result.last_insert_rowid();
        for sample in &log.samples {
            sqlx::query(
                "INSERT INTO methane_samples (log_id, position, sample_type, flow, pressure)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(log_id)
            .bind(sample.position)
            .bind(sample.sample_type)
            .bind(sample.flow)
            .bind(sample.pressure)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert sample {} of {}", sample.position, log.filename))?;
        }
        stats.record(true);
    }

    tx.commit().await.context("Failed to commit run logs")?;

    info!(inserted = stats.inserted, skipped = stats.skipped, "Stored methane run logs");
    Ok(stats)
}

pub async fn unmatched_logs(pool: &SqlitePool) -> Result<Vec<MethaneRunLog>> {
    sqlx::query_as::<_, MethaneRunLog>(
        "SELECT id, filename, date, status FROM methane_run_logs WHERE status = ? ORDER BY date",
    )
    .bind(RecordStatus::Single)
    .fetch_all(pool)
    .await
    .context("Failed to load unmatched run logs")
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMethaneRun {
    pub log_id: i64,
    pub batch_id: i64,
    pub date: NaiveDateTime,
}

/// Create runs and marry their constituents in one transaction.
pub async fn create_runs(pool: &SqlitePool, runs: &[NewMethaneRun]) -> Result<usize> {
    if runs.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for run in runs {
        sqlx::query("INSERT INTO methane_runs (log_id, batch_id, date) VALUES (?, ?, ?)")
            .bind(run.log_id)
            .bind(run.batch_id)
            .bind(run.date)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to create methane run for log {}", run.log_id))?;

        sqlx::query("UPDATE methane_run_logs SET status = ? WHERE id = ?")
            .bind(RecordStatus::Married)
            .bind(run.log_id)
            .execute(&mut *tx)
            .await?;

        mark_batch_married(&mut *tx, run.batch_id).await?;
    }

    tx.commit().await.context("Failed to commit methane runs")?;
    Ok(runs.len())
}

pub async fn runs_needing_samples(pool: &SqlitePool) -> Result<Vec<MethaneRun>> {
    let sql = format!(
        "SELECT {} FROM methane_runs WHERE samples_assigned = 0 ORDER BY date",
        RUN_COLUMNS
    );
    sqlx::query_as::<_, MethaneRun>(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to load runs needing samples")
}

pub async fn runs_to_quantify(pool: &SqlitePool) -> Result<Vec<MethaneRun>> {
    let sql = format!(
        "SELECT {} FROM methane_runs WHERE samples_assigned = 1 AND quantified = 0 ORDER BY date",
        RUN_COLUMNS
    );
    sqlx::query_as::<_, MethaneRun>(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to load runs to quantify")
}

pub async fn samples_for_log<'e, E>(executor: E, log_id: i64) -> Result<Vec<MethaneSample>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, MethaneSample>(
        "SELECT id, log_id, position, sample_type, flow, pressure, peak_id, quantifier_id, date
         FROM methane_samples WHERE log_id = ? ORDER BY position",
    )
    .bind(log_id)
    .fetch_all(executor)
    .await
    .with_context(|| format!("Failed to load samples of run log {}", log_id))
}

pub async fn assign_sample<'e, E>(executor: E, sample_id: i64, peak_id: i64, date: NaiveDateTime) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE methane_samples SET peak_id = ?, date = ? WHERE id = ?")
        .bind(peak_id)
        .bind(date)
        .bind(sample_id)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to assign peak to sample {}", sample_id))?;
    Ok(())
}

pub async fn mark_samples_assigned<'e, E>(executor: E, run_id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE methane_runs SET samples_assigned = 1 WHERE id = ?")
        .bind(run_id)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to mark samples of run {} assigned", run_id))?;
    Ok(())
}

pub async fn set_quantifier<'e, E>(executor: E, sample_id: i64, quantifier_id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE methane_samples SET quantifier_id = ? WHERE id = ?")
        .bind(quantifier_id)
        .bind(sample_id)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to set quantifier of sample {}", sample_id))?;
    Ok(())
}

/// Record the run statistics and close the run.
pub async fn save_quantification<'e, E>(executor: E, run_id: i64, result: &RunQuantification) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE methane_runs SET quantified = 1, median = ?, rsd = ?, standard_rsd = ? WHERE id = ?")
        .bind(result.median)
        .bind(result.rsd)
        .bind(result.standard_rsd)
        .bind(run_id)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to save quantification of run {}", run_id))?;
    Ok(())
}

/// Insert standards by name; existing names are left untouched.
pub async fn store_standards(pool: &SqlitePool, standards: &[Standard]) -> Result<StorageStats> {
    let mut stats = StorageStats::default();

    for standard in standards {
        let result = sqlx::query("INSERT OR IGNORE INTO standards (name, mr, date_start, date_end) VALUES (?, ?, ?, ?)")
            .bind(&standard.name)
            .bind(standard.mr)
            .bind(standard.date_start)
            .bind(standard.date_end)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to insert standard {}", standard.name))?;
        stats.record(result.rows_affected() > 0);
    }

    Ok(stats)
}

/// Standard valid at `date`; the latest-starting one wins on overlap.
pub async fn standard_for(pool: &SqlitePool, date: NaiveDateTime) -> Result<Option<Standard>> {
    sqlx::query_as::<_, Standard>(
        "SELECT name, mr, date_start, date_end FROM standards
         WHERE date_start <= ? AND ? < date_end ORDER BY date_start DESC LIMIT 1",
    )
    .bind(date)
    .bind(date)
    .fetch_optional(pool)
    .await
    .context("Failed to look up methane standard")
}

/// Newest run with a median.
pub async fn newest_result_date(pool: &SqlitePool) -> Result<Option<NaiveDateTime>> {
    let (date,): (Option<NaiveDateTime>,) =
        sqlx::query_as("SELECT MAX(date) FROM methane_runs WHERE median IS NOT NULL")
            .fetch_one(pool)
            .await
            .context("Failed to query newest methane result")?;
    Ok(date)
}

/// `(date, mr)` of quantified ambient samples at or after `start`.
pub async fn ambient_results_since(pool: &SqlitePool, start: NaiveDateTime) -> Result<Vec<(NaiveDateTime, f64)>> {
    sqlx::query_as(
        "SELECT s.date, p.mr FROM methane_samples s
         JOIN peaks p ON p.id = s.peak_id
         WHERE s.sample_type = ? AND s.date >= ? AND p.mr IS NOT NULL
         ORDER BY s.date",
    )
    .bind(AMBIENT_SAMPLE_CODE)
    .bind(start)
    .fetch_all(pool)
    .await
    .context("Failed to load methane results")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{Config, DatabaseConfig};
    use crate::ingest::methane::parser::{parse_run_log, tests::run_log_content};
    use crate::models::MethaneSampleType;
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

    #[tokio::test]
    async fn test_run_logs_are_idempotent() {
        let pool = pool().await;
        let log = parse_run_log("2019152120000.txt", &run_log_content()).unwrap();

        assert_eq!(store_run_logs(&pool, &[log.clone()]).await.unwrap().inserted, 1);
        assert_eq!(store_run_logs(&pool, &[log]).await.unwrap().skipped, 1);

        let logs = unmatched_logs(&pool).await.unwrap();
        assert_eq!(logs.len(), 1);
        let samples = samples_for_log(&pool, logs[0].id).await.unwrap();
        assert_eq!(samples.len(), 10);
        assert_eq!(samples[7].kind(), MethaneSampleType::Standard);
    }

    #[tokio::test]
    async fn test_standard_lookup_is_half_open() {
        let pool = pool().await;
        let standards = Config::default().methane.standards;
        store_standards(&pool, &standards).await.unwrap();
        assert_eq!(store_standards(&pool, &standards).await.unwrap().inserted, 0);

        let inside = NaiveDate::from_ymd_opt(2019, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let end = NaiveDate::from_ymd_opt(2019, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(standard_for(&pool, inside).await.unwrap().unwrap().mr, 2067.16);
        assert!(standard_for(&pool, end).await.unwrap().is_none());
    }
}
