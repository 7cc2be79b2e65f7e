//! Summit Processor Library
//!
//! Continuous processing of the Summit station's trace-gas instruments.
//!
//! # Overview
//!
//! Every instrument writes raw files on its own schedule. The processor
//! ingests them into one SQLite store, marries the partial records that
//! belong to the same measurement, names and quantifies peaks, and builds
//! plot series from the calibrated results.
//!
//! - **Ingest**: per-instrument parsers and idempotent storage ([`ingest`])
//! - **Matching**: greedy nearest-in-time pairing of partial records ([`matching`])
//! - **Quantification**: standard bracketing and response factors ([`quantify`])
//! - **Calibration**: Picarro calibration events and MasterCals ([`calibration`])
//! - **Pipeline**: the stage contract and the scheduler loops ([`pipeline`])
//! - **Faults**: staleness detection and operator notification ([`faults`], [`notify`])
//!
//! # Stages
//!
//! Each processor runs `load_raw`, `match_records`, `assign_peaks`,
//! `quantify` and `plot` in order once per cycle. A stage reporting no new
//! data skips the rest of the cycle; a failing stage aborts only its own
//! processor's cycle and notifies the operators.

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod calibration;
pub mod config;
pub mod db;
pub mod error;
pub mod faults;
pub mod ingest;
pub mod matching;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod quantify;

pub use config::Config;
pub use error::StageError;
