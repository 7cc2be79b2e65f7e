//! Resume cursors
//!
//! One row per processor. `filesize` and `pa_startline` track how much of the
//! append-only peak log has been read; `last_data_date` and `days_to_plot`
//! drive the plot stage.

use chrono::{Duration, NaiveDateTime};
use sqlx::{Sqlite, SqlitePool};

use super::DbResult;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProcessorCursor {
    pub id: i64,
    pub processor: String,
    pub filesize: i64,
    pub pa_startline: i64,
    pub last_data_date: NaiveDateTime,
    pub days_to_plot: i64,
}

impl ProcessorCursor {
    /// Fetch the cursor for `processor`, inserting the defaults on first use.
    pub async fn get_or_create(pool: &SqlitePool, processor: &str) -> DbResult<Self> {
        sqlx::query("INSERT OR IGNORE INTO processor_cursors (processor) VALUES (?)")
            .bind(processor)
            .execute(pool)
            .await?;

        let cursor = sqlx::query_as::<_, ProcessorCursor>(
            "SELECT id, processor, filesize, pa_startline, last_data_date, days_to_plot
             FROM processor_cursors WHERE processor = ?",
        )
        .bind(processor)
        .fetch_one(pool)
        .await?;

        Ok(cursor)
    }

    /// Persist every mutable field.
    pub async fn save<'e, E>(&self, executor: E) -> DbResult<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "UPDATE processor_cursors
             SET filesize = ?, pa_startline = ?, last_data_date = ?, days_to_plot = ?
             WHERE id = ?",
        )
        .bind(self.filesize)
        .bind(self.pa_startline)
        .bind(self.last_data_date)
        .bind(self.days_to_plot)
        .bind(self.id)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Start of the plotting window ending at `newest`.
    pub fn plot_start(&self, newest: NaiveDateTime) -> NaiveDateTime {
        newest - Duration::days(self.days_to_plot)
    }
}
