//! No-new-data checks

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

use super::{FaultContext, FaultManager, FaultReason, RegisterOutcome, ResolutionPredicate};
use crate::config::FaultConfig;
use crate::models::Instrument;

/// Instruments watched for staleness, in check order.
pub const WATCHED: [Instrument; 3] = [Instrument::Voc, Instrument::Methane, Instrument::Picarro];

/// Timestamp of the instrument's newest high-level record: runs for the
/// chromatographs, readings for the Picarro.
pub async fn last_data_date(pool: &SqlitePool, instrument: Instrument) -> Result<Option<NaiveDateTime>> {
    let sql = match instrument {
        Instrument::Voc => "SELECT MAX(date) FROM voc_runs",
        Instrument::Methane => "SELECT MAX(date) FROM methane_runs",
        Instrument::Picarro => "SELECT MAX(date) FROM picarro_data",
        Instrument::Daily => "SELECT MAX(date) FROM voc_dailies",
    };

    let (date,): (Option<NaiveDateTime>,) = sqlx::query_as(sql)
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to query last {} data date", instrument))?;
    Ok(date)
}

/// Resolved once the instrument has a record newer than the one the fault
/// was opened with.
pub struct NewDataSince {
    pool: SqlitePool,
}

impl NewDataSince {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResolutionPredicate for NewDataSince {
    async fn is_resolved(&self, context: &FaultContext) -> Result<bool> {
        let latest = last_data_date(&self.pool, context.instrument).await?;
        Ok(match (latest, context.last_data_date) {
            (Some(latest), Some(seen)) => latest > seen,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }
}

/// Periodic staleness check over every watched instrument.
pub struct StalenessMonitor {
    pool: SqlitePool,
    config: FaultConfig,
    manager: Arc<FaultManager>,
    predicate: Arc<NewDataSince>,
}

impl StalenessMonitor {
    pub fn new(pool: SqlitePool, config: FaultConfig, manager: Arc<FaultManager>) -> Self {
        let predicate = Arc::new(NewDataSince::new(pool.clone()));
        Self {
            pool,
            config,
            manager,
            predicate,
        }
    }

    pub fn manager(&self) -> &Arc<FaultManager> {
        &self.manager
    }

    /// Open a fault for each instrument whose newest record is older than
    /// its threshold. Instruments that never produced data are skipped.
    pub async fn check_for_new_data(&self, now: NaiveDateTime) -> Result<Vec<(Instrument, RegisterOutcome)>> {
        let mut opened = Vec::new();

        for instrument in WATCHED {
            let Some(threshold) = self.config.stale_after(instrument) else {
                continue;
            };

            let Some(last) = last_data_date(&self.pool, instrument).await? else {
                debug!(%instrument, "No data recorded yet, skipping staleness check");
                continue;
            };

            if now - last <= threshold {
                continue;
            }

            info!(%instrument, last = %last, "Instrument data is stale");
            let outcome = self
                .manager
                .register(
                    FaultReason::NoNewData,
                    self.predicate.clone(),
                    FaultContext {
                        instrument,
                        last_data_date: Some(last),
                    },
                )
                .await;
            opened.push((instrument, outcome));
        }

        Ok(opened)
    }

    /// Resolve what has recovered, then look for newly stale instruments.
    pub async fn run(&self, now: NaiveDateTime) -> Result<()> {
        let resolved = self.manager.check_all().await;
        let opened = self.check_for_new_data(now).await?;
        debug!(resolved, stale = opened.len(), "Fault check finished");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{Config, DatabaseConfig};
    use crate::notify::LogNotifier;
    use chrono::{Duration, NaiveDate};

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

    async fn insert_daily(pool: &SqlitePool, date: NaiveDateTime) {
        sqlx::query("INSERT INTO voc_dailies (date, filename, params) VALUES (?, 'd.txt', '{}')")
            .bind(date)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn insert_reading(pool: &SqlitePool, date: NaiveDateTime) {
        sqlx::query(
            "INSERT INTO picarro_data (date, alarm_status, instrument_status, cavity_pressure, cavity_temp,
             das_temp, etalon_temp, warmbox_temp, mpv_position, outlet_valve, co, co2_wet, co2, ch4_wet, ch4, h2o)
             VALUES (?, 0, 963, 140, 45, 40, 45, 45, 1, 20000, 100, 410, 405, 1900, 1890, 0.5)",
        )
        .bind(date)
        .execute(pool)
        .await
        .unwrap();
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_stale_picarro_opens_and_resolves() {
        let pool = pool().await;
        insert_reading(&pool, noon()).await;
        insert_daily(&pool, noon() - Duration::days(30)).await;

        let manager = Arc::new(FaultManager::new(Arc::new(LogNotifier)));
        let monitor = StalenessMonitor::new(pool.clone(), Config::default().faults, manager.clone());

        // exactly at the threshold is not stale
        let opened = monitor.check_for_new_data(noon() + Duration::hours(5)).await.unwrap();
        assert!(opened.is_empty());

        let later = noon() + Duration::hours(6);
        let opened = monitor.check_for_new_data(later).await.unwrap();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].0, Instrument::Picarro);

        let again = monitor.check_for_new_data(later).await.unwrap();
        assert!(matches!(again[0].1, RegisterOutcome::AlreadyOpen(_)));

        monitor.run(later).await.unwrap();
        assert!(manager.is_open(Instrument::Picarro, FaultReason::NoNewData).await);

        insert_reading(&pool, later).await;
        assert_eq!(manager.check_all().await, 1);
        assert!(manager.active().await.is_empty());
    }
}
