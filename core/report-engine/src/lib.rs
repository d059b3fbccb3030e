//! FILENAME: core/report-engine/src/lib.rs
//! Report execution subsystem.
//!
//! This crate drives the expression and cursor engine over a report's rows.
//! It depends on `tabula-engine` for values, expressions and cursors.
//!
//! Layers:
//! - `definition`: Serializable declarations (what the report IS)
//! - `breaks`: Group-change detection
//! - `variables`: Running aggregates bound to break scopes
//! - `engine`: The row loop, callbacks and the delayed pre-pass

pub mod breaks;
pub mod definition;
pub mod engine;
pub mod error;
pub mod variables;

pub use breaks::{Break, BreakCallback, BreakEvent, BreakTable};
pub use definition::*;
pub use engine::{Executor, NoCallbacks, Part, Report, ReportCallbacks, RunOutcome, StopSignal};
pub use error::{ReportError, ReportResult};
pub use variables::{Variable, VariableTable};

#[cfg(test)]
mod tests;
