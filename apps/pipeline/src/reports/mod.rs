//! Report Generator: statistics, narrative analysis, PDF, persisted once per job.

pub mod analysis;
pub mod generator;
pub mod pdf;
pub mod prompts;
pub mod stats;

pub use generator::{ReportError, ReportGenerator};
