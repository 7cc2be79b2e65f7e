//! VOC storage: log files, runs, response factors, windows and results

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::types::Json;
use sqlx::{Executor, Sqlite, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::ingest::gc_storage::{mark_batch_married, StorageStats};
use crate::models::voc::{intervals_overlap, NewResponseFactorTable, NewVocLogFile};
use crate::models::{CompoundWindow, RecordStatus, ResponseFactorTable, RunType, VocLogFile, VocRun};
use crate::quantify::BlankMap;

const LOG_COLUMNS: &str = "id, filename, date, sample_time, sample_flow1, sample_type, sample_num, params, status";
const RUN_COLUMNS: &str = "id, log_id, batch_id, date, date_end, run_type, peaks_named";
const CRF_COLUMNS: &str = "id, date_start, date_end, revision_date, standard, compounds";

pub async fn known_log_filenames(pool: &SqlitePool) -> Result<HashSet<String>> {
    let names: Vec<(String,)> = sqlx::query_as("SELECT filename FROM voc_log_files")
        .fetch_all(pool)
        .await
        .context("Failed to load stored log file names")?;
    Ok(names.into_iter().map(|(name,)| name).collect())
}

/// Insert log files; a file whose timestamp is already stored is skipped.
/// Returns the stats and the logs that were actually inserted.
pub async fn store_log_files(pool: &SqlitePool, logs: &[NewVocLogFile]) -> Result<(StorageStats, Vec<NewVocLogFile>)> {
    let mut stats = StorageStats::default();
    let mut inserted = Vec::new();
    if logs.is_empty() {
        return Ok((stats, inserted));
    }

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for log in logs {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO voc_log_files
             (filename, date, sample_time, sample_flow1, sample_type, sample_num, params, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.filename)
        .bind(log.date)
        .bind(log.params.sample_time)
        .bind(log.params.sample_flow1)
        .bind(log.params.sample_type)
        .bind(log.params.sample_num)
        .bind(Json(&log.params))
        .bind(RecordStatus::Single)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert log file {}", log.filename))?;

        let was_new = result.rows_affected() > 0;
        stats.record(was_new);
        if was_new {
            inserted.push(log.clone());
        }
    }

    tx.commit().await.context("Failed to commit log files")?;

    info!(inserted = stats.inserted, skipped = stats.skipped, "Stored VOC log files");
    Ok((stats, inserted))
}

pub async fn unmatched_logs(pool: &SqlitePool) -> Result<Vec<VocLogFile>> {
    let sql = format!("SELECT {} FROM voc_log_files WHERE status = ? ORDER BY date", LOG_COLUMNS);
    sqlx::query_as::<_, VocLogFile>(&sql)
        .bind(RecordStatus::Single)
        .fetch_all(pool)
        .await
        .context("Failed to load unmatched log files")
}

pub async fn log_by_id<'e, E>(executor: E, id: i64) -> Result<VocLogFile>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, VocLogFile>(
        "SELECT id, filename, date, sample_time, sample_flow1, sample_type, sample_num, params, status
         FROM voc_log_files WHERE id = ?",
    )
    .bind(id)
    .fetch_one(executor)
    .await
    .with_context(|| format!("Failed to load log file {}", id))
}

/// A run about to be created from a matched pair.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVocRun {
    pub log_id: i64,
    pub batch_id: i64,
    pub date: NaiveDateTime,
    pub date_end: NaiveDateTime,
    pub run_type: RunType,
}

/// Create runs and marry their constituents in one transaction.
pub async fn create_runs(pool: &SqlitePool, runs: &[NewVocRun]) -> Result<usize> {
    if runs.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for run in runs {
        sqlx::query(
            "INSERT INTO voc_runs (log_id, batch_id, date, date_end, run_type, peaks_named)
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(run.log_id)
        .bind(run.batch_id)
        .bind(run.date)
        .bind(run.date_end)
        .bind(run.run_type)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to create run for log {}", run.log_id))?;

        sqlx::query("UPDATE voc_log_files SET status = ? WHERE id = ?")
            .bind(RecordStatus::Married)
            .bind(run.log_id)
            .execute(&mut *tx)
            .await?;

        mark_batch_married(&mut *tx, run.batch_id).await?;
    }

    tx.commit().await.context("Failed to commit runs")?;
    Ok(runs.len())
}

pub async fn runs_needing_names(pool: &SqlitePool) -> Result<Vec<VocRun>> {
    let sql = format!("SELECT {} FROM voc_runs WHERE peaks_named = 0 ORDER BY date", RUN_COLUMNS);
    sqlx::query_as::<_, VocRun>(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to load runs needing peak names")
}

pub async fn mark_peaks_named<'e, E>(executor: E, run_id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE voc_runs SET peaks_named = 1 WHERE id = ?")
        .bind(run_id)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to mark run {} named", run_id))?;
    Ok(())
}

/// Named ambient and zero runs that have no result row yet.
pub async fn runs_to_quantify(pool: &SqlitePool) -> Result<Vec<VocRun>> {
    let sql = "SELECT r.id, r.log_id, r.batch_id, r.date, r.date_end, r.run_type, r.peaks_named
               FROM voc_runs r
               WHERE r.peaks_named = 1
                 AND NOT EXISTS (SELECT 1 FROM voc_data d WHERE d.run_id = r.id)
               ORDER BY r.date";
    let runs = sqlx::query_as::<_, VocRun>(sql)
        .fetch_all(pool)
        .await
        .context("Failed to load runs to quantify")?;

    Ok(runs.into_iter().filter(|r| r.run_type.is_quantifiable()).collect())
}

pub async fn insert_result<'e, E>(executor: E, run_id: i64, crf_id: i64, date: NaiveDateTime) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO voc_data (run_id, crf_id, date) VALUES (?, ?, ?)")
        .bind(run_id)
        .bind(crf_id)
        .bind(date)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to insert result for run {}", run_id))?;
    Ok(())
}

/// Response-factor table valid at `date`.
pub async fn crf_for(pool: &SqlitePool, date: NaiveDateTime) -> Result<Option<ResponseFactorTable>> {
    let sql = format!(
        "SELECT {} FROM voc_crfs WHERE date_start <= ? AND ? < date_end ORDER BY revision_date DESC LIMIT 1",
        CRF_COLUMNS
    );
    sqlx::query_as::<_, ResponseFactorTable>(&sql)
        .bind(date)
        .bind(date)
        .fetch_optional(pool)
        .await
        .context("Failed to look up response factors")
}

/// Insert response-factor tables, resolving interval conflicts in storage.
///
/// A table with an already-stored `date_start` is skipped. A table that
/// overlaps stored tables replaces them when its revision is at least as
/// recent as all of them, and is skipped otherwise.
pub async fn store_crfs(pool: &SqlitePool, tables: &[NewResponseFactorTable]) -> Result<StorageStats> {
    let mut stats = StorageStats::default();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for table in tables {
        let existing = sqlx::query_as::<_, ResponseFactorTable>(&format!("SELECT {} FROM voc_crfs", CRF_COLUMNS))
            .fetch_all(&mut *tx)
            .await
            .context("Failed to load stored response factors")?;

        if existing.iter().any(|e| e.date_start == table.date_start) {
            stats.record(false);
            continue;
        }

        let overlapping: Vec<&ResponseFactorTable> = existing
            .iter()
            .filter(|e| intervals_overlap((e.date_start, e.date_end), (table.date_start, table.date_end)))
            .collect();

        if overlapping.iter().any(|e| e.revision_date > table.revision_date) {
            warn!(
                date_start = %table.date_start,
                "Response factors overlap a newer revision, skipping"
            );
            stats.record(false);
            continue;
        }

        for stale in &overlapping {
            info!(
                date_start = %stale.date_start,
                replaced_by = %table.date_start,
                "Deleting outdated response factors"
            );
            sqlx::query("DELETE FROM voc_crfs WHERE id = ?")
                .bind(stale.id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO voc_crfs (date_start, date_end, revision_date, standard, compounds)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(table.date_start)
        .bind(table.date_end)
        .bind(table.revision_date)
        .bind(&table.standard)
        .bind(Json(&table.compounds))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert response factors starting {}", table.date_start))?;
        stats.record(true);
    }

    tx.commit().await.context("Failed to commit response factors")?;
    Ok(stats)
}

/// Insert compound windows. Per compound, an overlapping stored window is
/// replaced unless it starts later than the incoming one.
pub async fn store_windows(pool: &SqlitePool, windows: &[CompoundWindow]) -> Result<StorageStats> {
    let mut stats = StorageStats::default();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for window in windows {
        let existing: Vec<(i64, NaiveDateTime, NaiveDateTime)> =
            sqlx::query_as("SELECT id, date_start, date_end FROM compound_windows WHERE compound = ?")
                .bind(&window.compound)
                .fetch_all(&mut *tx)
                .await?;

        if existing.iter().any(|(_, start, _)| *start == window.date_start) {
            stats.record(false);
            continue;
        }

        let overlapping: Vec<&(i64, NaiveDateTime, NaiveDateTime)> = existing
            .iter()
            .filter(|(_, start, end)| intervals_overlap((*start, *end), (window.date_start, window.date_end)))
            .collect();

        if overlapping.iter().any(|(_, start, _)| *start > window.date_start) {
            debug!(compound = %window.compound, "Window overlaps a newer one, skipping");
            stats.record(false);
            continue;
        }

        for (id, _, _) in overlapping {
            sqlx::query("DELETE FROM compound_windows WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO compound_windows (compound, rt_low, rt_high, relative_to, date_start, date_end)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&window.compound)
        .bind(window.rt_low)
        .bind(window.rt_high)
        .bind(&window.relative_to)
        .bind(window.date_start)
        .bind(window.date_end)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert window for {}", window.compound))?;
        stats.record(true);
    }

    tx.commit().await.context("Failed to commit compound windows")?;
    Ok(stats)
}

pub async fn windows_for(pool: &SqlitePool, date: NaiveDateTime) -> Result<Vec<CompoundWindow>> {
    sqlx::query_as::<_, CompoundWindow>(
        "SELECT compound, rt_low, rt_high, relative_to, date_start, date_end
         FROM compound_windows WHERE date_start <= ? AND ? < date_end",
    )
    .bind(date)
    .bind(date)
    .fetch_all(pool)
    .await
    .context("Failed to load compound windows")
}

/// Mixing ratios of the newest quantified zero run at or before `date`.
pub async fn latest_blanks(pool: &SqlitePool, date: NaiveDateTime) -> Result<BlankMap> {
    let rows: Vec<(String, f64)> = sqlx::query_as(
        "SELECT p.name, p.mr FROM peaks p
         JOIN voc_runs r ON r.batch_id = p.batch_id
         WHERE r.id = (
             SELECT r2.id FROM voc_runs r2
             JOIN voc_data d ON d.run_id = r2.id
             WHERE r2.run_type = ? AND r2.date <= ?
             ORDER BY r2.date DESC LIMIT 1
         )
         AND p.mr IS NOT NULL",
    )
    .bind(RunType::Zero)
    .bind(date)
    .fetch_all(pool)
    .await
    .context("Failed to load blank mixing ratios")?;

    Ok(rows.into_iter().collect())
}

/// `(date, compound, mr)` of ambient results at or after `start`.
pub async fn ambient_results_since(pool: &SqlitePool, start: NaiveDateTime) -> Result<Vec<(NaiveDateTime, String, f64)>> {
    sqlx::query_as(
        "SELECT r.date, p.name, p.mr FROM voc_runs r
         JOIN voc_data d ON d.run_id = r.id
         JOIN peaks p ON p.batch_id = r.batch_id
         WHERE r.run_type = ? AND r.date >= ? AND p.mr IS NOT NULL
         ORDER BY r.date",
    )
    .bind(RunType::Ambient)
    .bind(start)
    .fetch_all(pool)
    .await
    .context("Failed to load ambient results")
}

pub async fn newest_result_date(pool: &SqlitePool) -> Result<Option<NaiveDateTime>> {
    let (date,): (Option<NaiveDateTime>,) = sqlx::query_as("SELECT MAX(date) FROM voc_data")
        .fetch_one(pool)
        .await
        .context("Failed to query newest VOC result")?;
    Ok(date)
}
