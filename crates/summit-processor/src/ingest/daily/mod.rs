//! VOC daily housekeeping logs
//!
//! Stored for plotting only. There is nothing to match or quantify and no
//! staleness fault is raised for them.

pub mod parser;
pub mod pipeline;
pub mod storage;

pub use pipeline::DailyProcessor;
