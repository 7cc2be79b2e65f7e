//! Recurring processor and fault-check loops
//!
//! Every processor runs in its own task on a fixed interval, so a slow or
//! failing instrument never delays the others. All loops stop at their next
//! suspension point once the shared [`CancellationToken`] is cancelled.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{run_cycle, InstrumentProcessor};
use crate::config::ScheduleConfig;
use crate::faults::StalenessMonitor;
use crate::notify::Notifier;

pub struct Scheduler {
    processors: Vec<Arc<dyn InstrumentProcessor>>,
    monitor: Option<Arc<StalenessMonitor>>,
    notifier: Arc<dyn Notifier>,
    config: ScheduleConfig,
}

/// Running loops. Cancel the token, then [`SchedulerHandle::join`].
pub struct SchedulerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Wait for every loop to exit.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
    }
}

impl Scheduler {
    pub fn new(config: ScheduleConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            processors: Vec::new(),
            monitor: None,
            notifier,
            config,
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn InstrumentProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<StalenessMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Spawn one loop per processor plus the fault check.
    pub fn start(self, token: CancellationToken) -> SchedulerHandle {
        let cycle = Duration::from_secs(self.config.cycle_interval_secs);
        let delay = Duration::from_secs(self.config.startup_delay_secs);
        let mut tasks = Vec::new();

        for processor in self.processors {
            let notifier = self.notifier.clone();
            let token = token.clone();
            info!(processor = processor.name(), interval_secs = cycle.as_secs(), "Starting processor loop");
            tasks.push(tokio::spawn(processor_loop(processor, notifier, cycle, delay, token)));
        }

        if let Some(monitor) = self.monitor {
            let every = Duration::from_secs(self.config.fault_check_interval_secs);
            tasks.push(tokio::spawn(fault_loop(monitor, every, delay, token.clone())));
        }

        SchedulerHandle { token, tasks }
    }
}

async fn processor_loop(
    processor: Arc<dyn InstrumentProcessor>,
    notifier: Arc<dyn Notifier>,
    every: Duration,
    delay: Duration,
    token: CancellationToken,
) {
    let name = processor.name();

    tokio::select! {
        _ = token.cancelled() => return,
        _ = sleep(delay) => {},
    }

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {},
        }

        let cycle = AssertUnwindSafe(run_cycle(processor.as_ref(), notifier.as_ref())).catch_unwind();

        tokio::select! {
            _ = token.cancelled() => {
                warn!(processor = name, "Shutdown during cycle, open stage rolled back");
                break;
            },
            result = cycle => {
                if result.is_err() {
                    error!(processor = name, "Processor cycle panicked");
                }
            },
        }
    }

    info!(processor = name, "Processor loop stopped");
}

async fn fault_loop(monitor: Arc<StalenessMonitor>, every: Duration, delay: Duration, token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = sleep(delay) => {},
    }

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {},
        }

        let now = chrono::Utc::now().naive_utc();
        let check = AssertUnwindSafe(monitor.run(now)).catch_unwind();

        tokio::select! {
            _ = token.cancelled() => break,
            result = check => match result {
                Ok(Ok(())) => {},
                Ok(Err(e)) => error!(error = %e, "Fault check failed"),
                Err(_) => error!("Fault check panicked"),
            },
        }
    }

    info!("Fault check loop stopped");
}
