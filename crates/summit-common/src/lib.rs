//! Summit Common Library
//!
//! Shared types, utilities, and error handling for the Summit processing workspace.
//!
//! # Overview
//!
//! - **Error Handling**: `SummitError` and the `Result` alias
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Statistics**: mean/median/stdev helpers used by calibration and quantification
//! - **Time formats**: the timestamp layouts written by the instruments
//!
//! # Example
//!
//! ```no_run
//! use summit_common::{stats, timefmt};
//!
//! fn main() -> summit_common::Result<()> {
//!     let date = timefmt::parse_log_stamp("2019070120000")?;
//!     let median = stats::median(&[1.0, 2.0, 4.0]);
//!     tracing::info!(%date, ?median, "parsed");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod stats;
pub mod timefmt;

// Re-export commonly used types
pub use error::{Result, SummitError};
