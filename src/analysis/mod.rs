//! Population-level helpers over flagged cases.
//!
//! Used by the report renderers and the binary's summary output.

pub mod aggregator;

pub use aggregator::*;
