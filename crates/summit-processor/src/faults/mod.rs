//! Long-lived fault conditions
//!
//! A condition is opened once per (instrument, reason), notifies the operator,
//! and stays open until its resolution predicate reports true. Conditions
//! live in memory only and are forgotten on restart.

pub mod staleness;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::models::Instrument;
use crate::notify::{deliver, Notification, Notifier};

pub use staleness::{last_data_date, NewDataSince, StalenessMonitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultReason {
    /// The instrument's newest record is older than its threshold.
    NoNewData,
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultReason::NoNewData => f.write_str("no_new_data"),
        }
    }
}

/// What a resolution predicate is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultContext {
    pub instrument: Instrument,
    /// Newest record when the fault opened.
    pub last_data_date: Option<NaiveDateTime>,
}

impl FaultContext {
    fn describe(&self) -> String {
        match self.last_data_date {
            Some(date) => format!("Last {} data was recorded at {}.", self.instrument, date),
            None => format!("No {} data has been recorded.", self.instrument),
        }
    }
}

#[async_trait]
pub trait ResolutionPredicate: Send + Sync {
    async fn is_resolved(&self, context: &FaultContext) -> Result<bool>;
}

#[derive(Clone)]
pub struct FaultCondition {
    pub id: u64,
    pub reason: FaultReason,
    pub context: FaultContext,
    pub notification: Notification,
    predicate: Arc<dyn ResolutionPredicate>,
}

impl fmt::Debug for FaultCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultCondition")
            .field("id", &self.id)
            .field("reason", &self.reason)
            .field("context", &self.context)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Opened(u64),
    /// A condition for the same instrument and reason was already open.
    AlreadyOpen(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    StillOpen,
    /// No open condition has this id.
    Unknown,
}

pub struct FaultManager {
    ids: Arc<AtomicU64>,
    active: Mutex<Vec<FaultCondition>>,
    notifier: Arc<dyn Notifier>,
}

impl FaultManager {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self::with_ids(notifier, Arc::new(AtomicU64::new(1)))
    }

    /// Share an id sequence with other managers.
    pub fn with_ids(notifier: Arc<dyn Notifier>, ids: Arc<AtomicU64>) -> Self {
        Self {
            ids,
            active: Mutex::new(Vec::new()),
            notifier,
        }
    }

    /// Open a condition and notify, unless one is already open for the same
    /// instrument and reason.
    pub async fn register(
        &self,
        reason: FaultReason,
        predicate: Arc<dyn ResolutionPredicate>,
        context: FaultContext,
    ) -> RegisterOutcome {
        let (id, notification) = {
            let mut active = self.active.lock().await;

            if let Some(open) = active
                .iter()
                .find(|c| c.reason == reason && c.context.instrument == context.instrument)
            {
                info!(id = open.id, instrument = %context.instrument, %reason, "Fault already open");
                return RegisterOutcome::AlreadyOpen(open.id);
            }

            let id = self.ids.fetch_add(1, Ordering::Relaxed);
            let notification = match reason {
                FaultReason::NoNewData => Notification::no_new_data(context.instrument, context.describe()),
            };

            warn!(id, instrument = %context.instrument, %reason, "Fault opened");
            active.push(FaultCondition {
                id,
                reason,
                context,
                notification: notification.clone(),
                predicate,
            });
            (id, notification)
        };

        deliver(self.notifier.as_ref(), &notification).await;
        RegisterOutcome::Opened(id)
    }

    /// Evaluate one condition's predicate, closing it when it holds.
    pub async fn check_resolution(&self, id: u64) -> Result<Resolution> {
        let condition = {
            let active = self.active.lock().await;
            active.iter().find(|c| c.id == id).cloned()
        };

        let Some(condition) = condition else {
            return Ok(Resolution::Unknown);
        };

        if !condition.predicate.is_resolved(&condition.context).await? {
            info!(id, instrument = %condition.context.instrument, reason = %condition.reason, "Fault still unresolved");
            return Ok(Resolution::StillOpen);
        }

        self.active.lock().await.retain(|c| c.id != id);
        info!(id, instrument = %condition.context.instrument, reason = %condition.reason, "Fault resolved");

        let body = format!("{} has new data again.", condition.context.instrument.title());
        deliver(
            self.notifier.as_ref(),
            &Notification::resolved(&condition.notification, body),
        )
        .await;

        Ok(Resolution::Resolved)
    }

    /// Check every open condition. A predicate that errors leaves its
    /// condition open.
    pub async fn check_all(&self) -> usize {
        let ids: Vec<u64> = self.active.lock().await.iter().map(|c| c.id).collect();

        let mut resolved = 0;
        for id in ids {
            match self.check_resolution(id).await {
                Ok(Resolution::Resolved) => resolved += 1,
                Ok(_) => {},
                Err(e) => warn!(id, error = %e, "Failed to evaluate fault resolution"),
            }
        }
        resolved
    }

    pub async fn active(&self) -> Vec<FaultCondition> {
        self.active.lock().await.clone()
    }

    pub async fn is_open(&self, instrument: Instrument, reason: FaultReason) -> bool {
        self.active
            .lock()
            .await
            .iter()
            .any(|c| c.reason == reason && c.context.instrument == instrument)
    }
}
