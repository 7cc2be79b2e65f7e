//! Shared helpers for processor integration tests
//!
//! Every test gets its own in-memory SQLite store with migrations applied.
//! The pool holds a single connection so the in-memory database lives as
//! long as the pool does.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::{Arc, Mutex};
use summit_processor::config::DatabaseConfig;
use summit_processor::db;
use summit_processor::notify::{Notification, Notifier, NotifyError};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("summit_processor=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub async fn memory_pool() -> Result<SqlitePool> {
    let pool = db::create_pool(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        connect_timeout_secs: 5,
    })
    .await?;
    db::run_migrations(&pool).await?;
    Ok(pool)
}

/// Keeps every notification for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|n| n.subject.clone()).collect()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// A complete 36-line VOC LabView log stamped `stamp` (`%Y%j%H%M%S`).
pub fn voc_log_content(stamp: &str, sample_type: i64) -> String {
    let mut lines: Vec<String> = [
        "1200.0", "0.6", "4.0", "20.0", "250.0", "5.0", "60.0", "300.0", "600.0", "5.0", "12.0", "1.0", "1.0", "2.0",
        "6.5", "", "25.0", "-30.0", "-30.0", "-30.0", "-30.0", "8.0", "0.5", "25.0", "-30.0", "-30.0", "-30.0",
        "-30.0", "35.0", "35.0", "200.0", "250.0", "150.0", "150.0", "11.0", "35.0",
    ]
    .iter()
    .map(|v| format!("param\t{}", v))
    .collect();
    lines[2] = format!("param\t{}.000000", sample_type);
    lines[15] = format!("{}\tcode", stamp);
    lines.join("\n")
}

/// One PeakSimple line; `peaks` are `(name, rt, area)`.
pub fn peak_line(date: &str, time: &str, peaks: &[(&str, f64, f64)]) -> String {
    let mut fields = vec!["1".to_string(), date.to_string(), time.to_string()];
    for (name, rt, pa) in peaks {
        fields.push(format!("\"{}\"", name));
        fields.push(format!("{:.3}", rt));
        fields.push(format!("{:.1}", pa));
    }
    fields.join("\t")
}

/// Ten methane samples: standards (type 2) at 3 and 8, ambient (type 3) elsewhere.
pub fn methane_run_log_content() -> String {
    (1..=10)
        .map(|pos| {
            let kind = if pos == 3 || pos == 8 { 2 } else { 3 };
            format!("{}\t{}\t{:.1}\t11.50", pos, kind, 80.0 + pos as f64)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

pub fn append(path: &Path, line: &str) {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    writeln!(file, "{}", line).unwrap();
}

pub const PICARRO_HEADER: &str = "DATE TIME FRAC_DAYS_SINCE_JAN1 EPOCH_TIME ALARM_STATUS INST_STATUS \
    CavityPressure CavityTemp DasTemp EtalonTemp WarmBoxTemp species MPVPosition OutletValve \
    solenoid_valves CO_sync CO2_sync CO2_dry_sync CH4_sync CH4_dry_sync H2O_sync";

/// One ambient Picarro reading at `epoch` seconds.
pub fn picarro_line(epoch: i64) -> String {
    format!(
        "2019-06-01 00:00:00.000 151.0 {}.000 0 963 140.00 45.00 40.1 45.1 45.0 3 1.000 30000.0 0 \
         0.1 405.1 410.2 1.92 1.95 0.12",
        epoch
    )
}
