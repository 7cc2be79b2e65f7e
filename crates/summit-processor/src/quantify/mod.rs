//! Mixing-ratio quantification and the peak naming that precedes it

pub mod blank;
pub mod bracketing;
pub mod naming;
pub mod response_factor;

pub use blank::{blank_corrected, BlankMap};
pub use bracketing::{quantify_run, QuantifiedSample, RunQuantification, SampleArea};
pub use naming::name_peaks;
pub use response_factor::{expected_carbon_number, mixing_ratio, quantify_peaks};
