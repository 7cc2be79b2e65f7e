//! Methane runs from sample log and CH4.LOG through quantification

mod common;

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use summit_processor::config::{Config, MethaneConfig};
use summit_processor::ingest::methane::MethaneProcessor;
use summit_processor::pipeline::{run_stages, LogPlotSink, Stage, StageOutcome};

use common::{init_tracing, memory_pool, methane_run_log_content, peak_line, write};

/// Retention times at the centre of each sample window.
const CENTRES: [f64; 10] = [2.5, 8.8, 15.15, 21.4, 27.8, 34.1, 40.4, 46.7, 53.1, 59.4];

fn methane_config(root: &Path) -> MethaneConfig {
    MethaneConfig {
        log_dir: root.join("logs"),
        pa_file: root.join("CH4.LOG"),
        ..Config::default().methane
    }
}

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 3, 11).unwrap().and_hms_opt(h, m, s).unwrap()
}

/// Run log for 2019-03-11 12:00:00 and one peak batch two minutes later.
fn write_run(root: &Path, standard_areas: (f64, f64)) {
    write(&root.join("logs").join("2019070120000.txt"), &methane_run_log_content());

    let peaks: Vec<(&str, f64, f64)> = CENTRES
        .iter()
        .enumerate()
        .map(|(i, rt)| {
            let pa = match i + 1 {
                3 => standard_areas.0,
                8 => standard_areas.1,
                _ => 1000.0,
            };
            ("-", *rt, pa)
        })
        .collect();
    write(
        &root.join("CH4.LOG"),
        &format!("{}\n", peak_line("03/11/2019", "12:02:00", &peaks)),
    );
}

async fn run_row(pool: &SqlitePool) -> Result<(NaiveDateTime, bool, bool, Option<f64>)> {
    Ok(
        sqlx::query_as("SELECT date, samples_assigned, quantified, median FROM methane_runs")
            .fetch_one(pool)
            .await?,
    )
}

#[tokio::test]
async fn test_unusable_standard_falls_back_to_the_other() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write_run(root, (0.0, 500.0));

    let pool = memory_pool().await?;
    let processor = MethaneProcessor::new(pool.clone(), methane_config(root), Arc::new(LogPlotSink));

    let report = run_stages(&processor).await?;
    assert_eq!(report.outcome(Stage::Match), Some(StageOutcome::NewData(1)));
    assert_eq!(report.outcome(Stage::Quantify), Some(StageOutcome::NewData(1)));
    assert!(matches!(report.outcome(Stage::Plot), Some(StageOutcome::NewData(_))));

    let (date, assigned, quantified, median) = run_row(&pool).await?;
    assert_eq!(date, at(12, 1, 0));
    assert!(assigned && quantified);
    // 1000 / 500 * 2067.16
    assert!((median.unwrap() - 4134.32).abs() < 1e-6);

    let quantifier: i64 = sqlx::query_scalar("SELECT id FROM methane_samples WHERE position = 8")
        .fetch_one(&pool)
        .await?;
    let used: Vec<(Option<i64>,)> =
        sqlx::query_as("SELECT quantifier_id FROM methane_samples WHERE sample_type = 3")
            .fetch_all(&pool)
            .await?;
    assert_eq!(used.len(), 8);
    assert!(used.iter().all(|(q,)| *q == Some(quantifier)));

    let (name, sample_date): (String, NaiveDateTime) = sqlx::query_as(
        "SELECT p.name, s.date FROM methane_samples s JOIN peaks p ON p.id = s.peak_id WHERE s.position = 1",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(name, "CH4_1");
    assert_eq!(sample_date, at(12, 3, 30));

    Ok(())
}

#[tokio::test]
async fn test_run_without_usable_standards_stays_unquantified() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write_run(root, (0.0, 0.0));

    let pool = memory_pool().await?;
    let processor = MethaneProcessor::new(pool.clone(), methane_config(root), Arc::new(LogPlotSink));

    let report = run_stages(&processor).await?;
    assert_eq!(report.outcome(Stage::AssignPeaks), Some(StageOutcome::NewData(1)));
    assert_eq!(report.outcome(Stage::Quantify), Some(StageOutcome::NoNewData));
    assert_eq!(report.outcome(Stage::Plot), None);

    let (_, assigned, quantified, median) = run_row(&pool).await?;
    assert!(assigned);
    assert!(!quantified);
    assert_eq!(median, None);

    let mrs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM peaks WHERE mr IS NOT NULL")
        .fetch_one(&pool)
        .await?;
    assert_eq!(mrs, 0);

    // still waiting on the next cycle
    let report = run_stages(&processor).await?;
    assert_eq!(report.outcome(Stage::LoadRaw), Some(StageOutcome::NoNewData));
    let (_, _, quantified, _) = run_row(&pool).await?;
    assert!(!quantified);

    Ok(())
}

#[tokio::test]
async fn test_run_outside_every_standard_waits() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write_run(root, (500.0, 500.0));

    let pool = memory_pool().await?;
    let config = MethaneConfig {
        standards: Vec::new(),
        ..methane_config(root)
    };
    let processor = MethaneProcessor::new(pool.clone(), config, Arc::new(LogPlotSink));

    let report = run_stages(&processor).await?;
    assert_eq!(report.outcome(Stage::AssignPeaks), Some(StageOutcome::NewData(1)));
    assert_eq!(report.outcome(Stage::Quantify), Some(StageOutcome::NoNewData));

    let (_, assigned, quantified, _) = run_row(&pool).await?;
    assert!(assigned);
    assert!(!quantified);

    Ok(())
}
