//! Staged instrument processing
//!
//! Each instrument implements [`InstrumentProcessor`]. A cycle walks the
//! stages in order:
//!
//! ```text
//! load_raw -> match -> assign_peaks_to_samples -> quantify -> plot
//! ```
//!
//! `load_raw` always runs. Every later stage runs only if the last gating
//! stage that applies to the instrument produced new data. A stage that fails ends the
//! cycle for that instrument; the error is logged and sent to the operator.

pub mod plot;
pub mod scheduler;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::error::StageError;
use crate::models::Instrument;
use crate::notify::{deliver, Notification, Notifier};

pub use plot::{LogPlotSink, PlotSeries, PlotSink};
pub use scheduler::{Scheduler, SchedulerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    LoadRaw,
    Match,
    AssignPeaks,
    Quantify,
    Plot,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::LoadRaw,
        Stage::Match,
        Stage::AssignPeaks,
        Stage::Quantify,
        Stage::Plot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LoadRaw => "load_raw",
            Stage::Match => "match",
            Stage::AssignPeaks => "assign_peaks_to_samples",
            Stage::Quantify => "quantify",
            Stage::Plot => "plot",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage reported back to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Records written or updated.
    NewData(usize),
    NoNewData,
    /// The instrument has no such stage; the gate looks through it.
    NotApplicable,
}

impl StageOutcome {
    /// Shorthand for stages that report a count.
    pub fn from_count(count: usize) -> Self {
        if count > 0 {
            StageOutcome::NewData(count)
        } else {
            StageOutcome::NoNewData
        }
    }

    pub fn count(&self) -> usize {
        match self {
            StageOutcome::NewData(count) => *count,
            _ => 0,
        }
    }
}

/// One instrument's stages. Stages an instrument does not have keep the
/// default `NotApplicable` body.
#[async_trait]
pub trait InstrumentProcessor: Send + Sync {
    fn instrument(&self) -> Instrument;

    fn name(&self) -> &'static str {
        self.instrument().as_str()
    }

    /// Whether a `NoNewData` from `stage` closes the gate. Stages that do
    /// side work the later stages don't read from can opt out.
    fn gates(&self, _stage: Stage) -> bool {
        true
    }

    async fn load_raw(&self) -> Result<StageOutcome>;

    async fn match_records(&self) -> Result<StageOutcome> {
        Ok(StageOutcome::NotApplicable)
    }

    async fn assign_peaks(&self) -> Result<StageOutcome> {
        Ok(StageOutcome::NotApplicable)
    }

    async fn quantify(&self) -> Result<StageOutcome> {
        Ok(StageOutcome::NotApplicable)
    }

    async fn plot(&self) -> Result<StageOutcome> {
        Ok(StageOutcome::NotApplicable)
    }
}

/// Stages run in one cycle and what each produced. Skipped stages are absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub processor: String,
    pub stages: Vec<(Stage, StageOutcome)>,
}

impl CycleReport {
    pub fn outcome(&self, stage: Stage) -> Option<StageOutcome> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, o)| *o)
    }

    pub fn ran(&self, stage: Stage) -> bool {
        self.outcome(stage).is_some()
    }
}

async fn run_stage(processor: &dyn InstrumentProcessor, stage: Stage) -> Result<StageOutcome> {
    match stage {
        Stage::LoadRaw => processor.load_raw().await,
        Stage::Match => processor.match_records().await,
        Stage::AssignPeaks => processor.assign_peaks().await,
        Stage::Quantify => processor.quantify().await,
        Stage::Plot => processor.plot().await,
    }
}

/// Run the gated stage sequence once, stopping at the first failure.
pub async fn run_stages(processor: &dyn InstrumentProcessor) -> Result<CycleReport, StageError> {
    let name = processor.name();
    let mut report = CycleReport {
        processor: name.to_string(),
        stages: Vec::new(),
    };

    // load_raw always runs
    let mut gate_open = true;

    for stage in Stage::ALL {
        if !gate_open {
            debug!(processor = name, stage = %stage, "Skipping stage, no new data upstream");
            continue;
        }

        let started = Instant::now();
        info!(processor = name, stage = %stage, "Stage started");

        let outcome = run_stage(processor, stage)
            .await
            .map_err(|e| StageError::new(name, stage, e))?;

        info!(
            processor = name,
            stage = %stage,
            count = outcome.count(),
            outcome = ?outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stage finished"
        );

        match outcome {
            StageOutcome::NewData(_) => gate_open = true,
            StageOutcome::NoNewData if processor.gates(stage) => gate_open = false,
            StageOutcome::NoNewData | StageOutcome::NotApplicable => {},
        }
        report.stages.push((stage, outcome));
    }

    Ok(report)
}

/// One contained cycle: failures are logged and notified, never returned.
pub async fn run_cycle(processor: &dyn InstrumentProcessor, notifier: &dyn Notifier) -> Option<CycleReport> {
    match run_stages(processor).await {
        Ok(report) => Some(report),
        Err(e) => {
            let chain = e.chain();
            error!(processor = %e.processor, stage = %e.stage, error = %chain, "Processor cycle failed");
            deliver(notifier, &Notification::stage_failure(&e.processor, &chain)).await;
            None
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use std::sync::Mutex;

    struct Scripted {
        instrument: Instrument,
        load: StageOutcome,
        matched: StageOutcome,
        fail_quantify: bool,
        match_gates: bool,
        calls: Mutex<Vec<Stage>>,
    }

    impl Scripted {
        fn new(load: StageOutcome, matched: StageOutcome) -> Self {
            Self {
                instrument: Instrument::Voc,
                load,
                matched,
                fail_quantify: false,
                match_gates: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn called(&self, stage: Stage) {
            self.calls.lock().unwrap().push(stage);
        }
    }

    #[async_trait]
    impl InstrumentProcessor for Scripted {
        fn instrument(&self) -> Instrument {
            self.instrument
        }

        fn gates(&self, stage: Stage) -> bool {
            stage != Stage::Match || self.match_gates
        }

        async fn load_raw(&self) -> Result<StageOutcome> {
            self.called(Stage::LoadRaw);
            Ok(self.load)
        }

        async fn match_records(&self) -> Result<StageOutcome> {
            self.called(Stage::Match);
            Ok(self.matched)
        }

        async fn quantify(&self) -> Result<StageOutcome> {
            self.called(Stage::Quantify);
            if self.fail_quantify {
                anyhow::bail!("no connection");
            }
            Ok(StageOutcome::NewData(1))
        }

        async fn plot(&self) -> Result<StageOutcome> {
            self.called(Stage::Plot);
            Ok(StageOutcome::NewData(1))
        }
    }

    #[derive(Default)]
    struct Collecting(Mutex<Vec<Notification>>);

    #[async_trait]
    impl Notifier for Collecting {
        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_no_new_data_closes_the_gate() {
        let p = Scripted::new(StageOutcome::NoNewData, StageOutcome::NewData(1));
        let report = run_stages(&p).await.unwrap();
        assert_eq!(*p.calls.lock().unwrap(), vec![Stage::LoadRaw]);
        assert!(!report.ran(Stage::Match));
    }

    #[tokio::test]
    async fn test_not_applicable_passes_the_gate_through() {
        let p = Scripted::new(StageOutcome::NewData(3), StageOutcome::NewData(1));
        let report = run_stages(&p).await.unwrap();
        assert_eq!(
            *p.calls.lock().unwrap(),
            vec![Stage::LoadRaw, Stage::Match, Stage::Quantify, Stage::Plot]
        );
        assert_eq!(report.outcome(Stage::AssignPeaks), Some(StageOutcome::NotApplicable));
    }

    #[tokio::test]
    async fn test_non_gating_stage_leaves_the_gate_open() {
        let mut p = Scripted::new(StageOutcome::NewData(2), StageOutcome::NoNewData);
        p.match_gates = false;
        let report = run_stages(&p).await.unwrap();
        assert_eq!(report.outcome(Stage::Match), Some(StageOutcome::NoNewData));
        assert!(report.ran(Stage::Plot));

        let p = Scripted::new(StageOutcome::NewData(2), StageOutcome::NoNewData);
        let report = run_stages(&p).await.unwrap();
        assert!(!report.ran(Stage::Quantify));
    }

    #[tokio::test]
    async fn test_failure_stops_cycle_and_notifies() {
        let mut p = Scripted::new(StageOutcome::NewData(1), StageOutcome::NewData(1));
        p.fail_quantify = true;
        let notifier = Collecting::default();

        assert!(run_cycle(&p, &notifier).await.is_none());
        assert!(!p.calls.lock().unwrap().contains(&Stage::Plot));

        let sent = notifier.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Voc Error");
        assert!(sent[0].body.contains("quantify"));
        assert!(sent[0].body.contains("no connection"));
    }
}
