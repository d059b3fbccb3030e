//! FILENAME: core/report-engine/src/error.rs
//! PURPOSE: Error type for report declarations and runs.

use tabula_engine::EngineError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("break '{0}' already exists")]
    DuplicateBreak(String),

    #[error("unknown break '{0}'")]
    UnknownBreak(String),

    #[error("break '{0}' has no fields")]
    EmptyBreak(String),

    #[error("variable '{name}' of kind {kind} needs a base expression")]
    MissingBase { name: String, kind: String },

    #[error("variable '{name}' cannot reference expression variable '{referenced}'")]
    ExpressionReference { name: String, referenced: String },

    #[error("report '{0}' has no main cursor")]
    NoMainCursor(String),
}

pub type ReportResult<T> = Result<T, ReportError>;
