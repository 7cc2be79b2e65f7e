//! Picarro cavity-ringdown analyzer
//!
//! Readings arrive every few seconds in `.dat` files that keep growing while
//! the analyzer writes them. Standard readings are grouped into calibration
//! events; a low, high and mid event together form a MasterCal.

pub mod parser;
pub mod pipeline;
pub mod storage;

pub use pipeline::PicarroProcessor;
