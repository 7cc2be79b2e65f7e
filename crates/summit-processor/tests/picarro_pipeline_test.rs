//! Picarro cycles without calibration events still publish ambient data

mod common;

use anyhow::Result;
use std::sync::Arc;
use summit_processor::config::{Config, PicarroConfig};
use summit_processor::ingest::picarro::PicarroProcessor;
use summit_processor::pipeline::{run_stages, LogPlotSink, Stage, StageOutcome};

use common::{append, init_tracing, memory_pool, picarro_line, write, PICARRO_HEADER};

/// 2019-06-01 12:00:00 UTC
const T: i64 = 1_559_390_400;

#[tokio::test]
async fn test_ambient_readings_reach_plot_without_calibrations() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let data_file = dir.path().join("picarro").join("CFKADS2012-20190601-120000Z-DataLog_User.dat");
    let lines: Vec<String> = (0..10).map(|i| picarro_line(T + i * 5)).collect();
    write(&data_file, &format!("{}\n{}\n", PICARRO_HEADER, lines.join("\n")));

    let pool = memory_pool().await?;
    let config = PicarroConfig {
        data_dir: dir.path().join("picarro"),
        ..Config::default().picarro
    };
    let processor = PicarroProcessor::new(pool.clone(), config, Arc::new(LogPlotSink));

    let report = run_stages(&processor).await?;
    assert_eq!(report.outcome(Stage::LoadRaw), Some(StageOutcome::NewData(10)));
    assert_eq!(report.outcome(Stage::Match), Some(StageOutcome::NoNewData));
    assert_eq!(report.outcome(Stage::Quantify), Some(StageOutcome::NoNewData));
    assert!(matches!(report.outcome(Stage::Plot), Some(StageOutcome::NewData(_))));

    // nothing new: the cycle ends after load_raw
    let report = run_stages(&processor).await?;
    assert_eq!(report.stages, vec![(Stage::LoadRaw, StageOutcome::NoNewData)]);

    // the file grows by one ambient reading
    append(&data_file, &picarro_line(T + 60));
    let report = run_stages(&processor).await?;
    assert_eq!(report.outcome(Stage::LoadRaw), Some(StageOutcome::NewData(1)));
    assert!(matches!(report.outcome(Stage::Plot), Some(StageOutcome::NewData(_))));

    Ok(())
}
