//! Network diagnostics

pub mod probe;
