//! FILENAME: core/engine/src/error.rs
//! PURPOSE: Error type for parse, resolve and structural failures.
//! CONTEXT: Data-caused failures during evaluation are never Rust errors; they
//! travel in-band as `ResultValue` errors. This enum covers everything that is
//! rejected before evaluation or that leaves engine state unchanged.

use tabula_parser::ParseError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} argument(s), got {given}")]
    Arity {
        name: String,
        expected: String,
        given: usize,
    },

    #[error("invalid identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown domain '{0}'")]
    UnknownDomain(String),

    #[error("unknown cursor: {0}")]
    UnknownCursor(String),

    #[error("cursor '{0}' already exists")]
    DuplicateCursor(String),

    #[error("invalid follower: {0}")]
    InvalidFollower(String),

    #[error("cursor already has a follower: {0}")]
    FollowerAlreadyLinked(String),

    #[error("invalid match expression: {0}")]
    InvalidMatch(String),

    #[error("datasource error: {0}")]
    Datasource(String),

    #[error("internal invariant broken: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
