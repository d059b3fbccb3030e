//! FILENAME: core/report-engine/src/definition.rs
//! Report Definition - The serializable declarations.
//!
//! This module contains the types needed to DESCRIBE a report: its main
//! query, breaks and variables. They are plain data so a host can load them
//! from any serde format; `Report::from_definition` compiles them against an
//! engine.

use serde::{Deserialize, Serialize};
use tabula_engine::ResultValue;

// ============================================================================
// OPTIONS
// ============================================================================

/// Tunables of one report run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    /// How many times the report is executed over its data.
    pub iterations: u32,
    /// Run the silent pre-pass even without delayed variables.
    pub precalculate: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            iterations: 1,
            precalculate: false,
        }
    }
}

// ============================================================================
// VARIABLES
// ============================================================================

/// Aggregations a variable maintains over the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariableKind {
    /// Rows, or non-null base values when a base is given.
    #[default]
    Count,
    /// Every row of the whole stream; never reset.
    CountAll,
    Sum,
    Highest,
    Lowest,
    /// Sum over count of non-null values.
    Average,
    /// Sum of non-null values over all rows of the whole stream; never reset.
    AverageAll,
    /// The base expression itself, with `r.self` as the previous value.
    Expression,
}

impl VariableKind {
    /// Kinds that can run without a base expression.
    pub fn base_optional(self) -> bool {
        matches!(self, VariableKind::Count | VariableKind::CountAll)
    }

    /// Kinds that keep accumulating across break resets.
    pub fn is_cumulative(self) -> bool {
        matches!(self, VariableKind::CountAll | VariableKind::AverageAll)
    }
}

impl std::fmt::Display for VariableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VariableKind::Count => "count",
            VariableKind::CountAll => "count-all",
            VariableKind::Sum => "sum",
            VariableKind::Highest => "highest",
            VariableKind::Lowest => "lowest",
            VariableKind::Average => "average",
            VariableKind::AverageAll => "average-all",
            VariableKind::Expression => "expression",
        };
        f.write_str(name)
    }
}

/// Declaration of a report variable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableDef {
    pub name: String,
    pub kind: VariableKind,
    /// Expression folded into the aggregate on each row.
    pub base: Option<String>,
    /// Name of the break whose trigger resets this variable; None for the whole report.
    pub reset_on: Option<String>,
    /// Rows for which this evaluates true are not folded in.
    pub ignore: Option<String>,
    /// Shows the final value of its group on every row, computed in a pre-pass.
    pub delayed: bool,
    /// Initial `r.self` of an expression variable.
    pub seed: Option<ResultValue>,
}

impl VariableDef {
    pub fn new(name: &str, kind: VariableKind) -> Self {
        VariableDef {
            name: name.to_string(),
            kind,
            ..Default::default()
        }
    }

    pub fn base(mut self, expr: &str) -> Self {
        self.base = Some(expr.to_string());
        self
    }

    pub fn reset_on(mut self, break_name: &str) -> Self {
        self.reset_on = Some(break_name.to_string());
        self
    }

    pub fn ignore(mut self, expr: &str) -> Self {
        self.ignore = Some(expr.to_string());
        self
    }

    pub fn delayed(mut self) -> Self {
        self.delayed = true;
        self
    }

    pub fn seed(mut self, value: ResultValue) -> Self {
        self.seed = Some(value);
        self
    }
}

// ============================================================================
// BREAKS AND REPORTS
// ============================================================================

/// A group boundary: triggers whenever any field value changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakDef {
    pub name: String,
    pub fields: Vec<String>,
}

impl BreakDef {
    pub fn new(name: &str, fields: &[&str]) -> Self {
        BreakDef {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Everything needed to build a `Report` over an engine's cursors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub name: String,
    /// Name of the main cursor.
    pub query: String,
    /// Outermost first.
    #[serde(default)]
    pub breaks: Vec<BreakDef>,
    /// Declaration order matters: a variable sees only earlier ones.
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub options: ReportOptions,
}
