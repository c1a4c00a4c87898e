//! Report writers for the persisted metric rows.

pub mod generator;

pub use generator::*;
