//! Processor error types

use std::error::Error as StdError;
use thiserror::Error;

use crate::pipeline::Stage;

/// A stage that failed, with the processor it belongs to.
///
/// The orchestrator turns this into an operator notification and moves on to
/// the next cycle; it never escapes the scheduler loop.
#[derive(Error, Debug)]
#[error("{processor} processor failed in {stage} stage")]
pub struct StageError {
    pub processor: String,
    pub stage: Stage,
    #[source]
    pub source: Box<dyn StdError + Send + Sync + 'static>,
}

impl StageError {
    pub fn new(processor: impl Into<String>, stage: Stage, source: anyhow::Error) -> Self {
        Self {
            processor: processor.into(),
            stage,
            source: source.into(),
        }
    }

    /// Full cause chain, one cause per line, for notification bodies.
    pub fn chain(&self) -> String {
        let mut lines = vec![self.to_string()];
        let mut cause: Option<&(dyn StdError + 'static)> = Some(self.source.as_ref());
        while let Some(err) = cause {
            lines.push(format!("  caused by: {}", err));
            cause = err.source();
        }
        lines.join("\n")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_chain_lists_every_cause() {
        let inner: anyhow::Result<()> = Err(anyhow::anyhow!("disk full"));
        let err = inner.context("writing peaks").unwrap_err();

        let stage_err = StageError::new("voc", Stage::LoadRaw, err);
        let chain = stage_err.chain();

        assert!(chain.starts_with("voc processor failed in load_raw stage"));
        assert!(chain.contains("writing peaks"));
        assert!(chain.contains("disk full"));
    }
}
