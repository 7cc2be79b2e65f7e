//! Picarro calibration: event segmentation and MasterCal curves

pub mod events;
pub mod mastercal;

pub use events::{detect_events, CalStats, DetectedEvent, EventParams};
pub use mastercal::{curves_for, fit, group_triplets, Curve, MasterCalCurves, Triplet};
