//! FILENAME: core/engine/src/lib.rs
//! PURPOSE: Main library entry point for the report expression and cursor engine.
//! CONTEXT: Re-exports public types and modules for use by other crates.
//!
//! Typical flow: build an `Engine`, add cursors over datasources, link
//! followers, then `compile` expressions and `evaluate` them row by row while
//! `next()` walks the main cursor.

pub mod cursor;
pub mod datetime;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod follower;
pub mod format;
pub mod functions;
pub mod number;
pub mod optimizer;
pub mod options;
pub mod resolver;
pub mod value;

// Re-export commonly used types at the crate root
pub use bigdecimal::BigDecimal;
pub use cursor::{ArrayDatasource, Cursor, CursorSet, Datasource};
pub use datetime::{Datetime, Interval};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use evaluator::{Evaluator, RowSource};
pub use expr::{Binding, BreakId, CursorId, Domain, Expr, Ident, Node, NodeKind, VariableId};
pub use follower::{FollowerEdge, FollowerGraph, FollowerKind};
pub use format::{format_value, printf};
pub use functions::{Arity, ExternalFn, FunctionDef, FunctionImpl, FunctionRegistry, Special};
pub use optimizer::optimize;
pub use options::{EngineOptions, EnvValue, Environment};
pub use resolver::{resolve, ResolveScope};
pub use value::{Data, ResultValue, ValueKind};
