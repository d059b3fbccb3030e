//! FILENAME: core/engine/src/evaluator.rs
//! PURPOSE: Evaluates resolved expressions against the current row.
//! CONTEXT: Evaluation is a post-order walk. Each node writes its result into
//! the slot of the current evaluation, so the previous slot still holds the
//! value from the evaluation before; `r.self` and `prevval()` read from there.
//! Data-caused failures are Error values, never panics or Rust errors, so one
//! bad row never stops a report.
//!
//! SPECIAL FUNCTIONS (implemented here, not in the registry tables):
//! - iif(c, a, b): evaluates only the chosen branch
//! - prevval(x): x's value from the previous evaluation
//! - rownum(), brrownum('break'): row counters from the row source
//! - random(): uniform in [0, 1), seeded from `EngineOptions::random_seed`

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

use crate::expr::{Binding, CursorId, Expr, Node, NodeKind, VariableId};
use crate::functions::{FunctionImpl, Special, INVALID_OPERANDS};
use crate::number;
use crate::options::EngineOptions;
use crate::value::{ResultValue, ValueKind};

/// Row-dependent values an expression may read.
pub trait RowSource {
    /// A column of a cursor's current row; null when the cursor has no row.
    fn column_value(&self, cursor: CursorId, column: usize) -> ResultValue;

    fn variable_value(&self, _variable: VariableId) -> ResultValue {
        ResultValue::null(ValueKind::Number)
    }

    /// 1-based row number of the main cursor.
    fn row_number(&self) -> u64;

    /// Row number within the current group of the named break.
    fn break_row_number(&self, _name: &str) -> Option<u64> {
        None
    }
}

/// A row source with no rows, used for constant folding.
pub struct NoRows;

impl RowSource for NoRows {
    fn column_value(&self, _cursor: CursorId, _column: usize) -> ResultValue {
        ResultValue::null(ValueKind::Number)
    }

    fn row_number(&self) -> u64 {
        0
    }
}

/// Per-evaluation state threaded through the walk.
struct Frame<'r> {
    rows: &'r dyn RowSource,
    slot: usize,
    previous: usize,
    self_value: ResultValue,
}

pub struct Evaluator {
    rng: StdRng,
}

impl Evaluator {
    pub fn new(options: &EngineOptions) -> Self {
        let rng = match options.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Evaluator { rng }
    }

    /// An evaluator with a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Evaluator {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Evaluates the expression for the current row and records the result.
    pub fn evaluate(&mut self, expr: &mut Expr, rows: &dyn RowSource) -> ResultValue {
        let previous = expr.current;
        let slot = (previous + 1) % expr.slots();
        // Slot `previous` holds the seed (or null) before the first evaluation.
        let self_value = expr.root.result(previous).clone();

        let result = if expr.evaluations == 0 && expr.start_with_seed() && expr.seed().is_some() {
            let seed = self_value;
            expr.root.results[slot] = seed.clone();
            seed
        } else {
            let mut frame = Frame {
                rows,
                slot,
                previous,
                self_value,
            };
            self.eval_node(&mut expr.root, &mut frame)
        };

        expr.current = slot;
        expr.evaluations += 1;
        result
    }

    /// Evaluates a detached node once, writing slot 0. Used by the optimizer.
    pub(crate) fn evaluate_node_once(&mut self, node: &mut Node) -> ResultValue {
        let mut frame = Frame {
            rows: &NoRows,
            slot: 0,
            previous: 0,
            self_value: ResultValue::default(),
        };
        self.eval_node(node, &mut frame)
    }

    fn eval_node(&mut self, node: &mut Node, frame: &mut Frame<'_>) -> ResultValue {
        let result = match &mut node.kind {
            NodeKind::Constant(v) => v.clone(),
            NodeKind::Ident(ident) => match &ident.binding {
                Binding::Column { cursor, column } => frame.rows.column_value(*cursor, *column),
                Binding::Variable(id) => frame.rows.variable_value(*id),
                Binding::SelfValue => frame.self_value.clone(),
                Binding::RowNumber => ResultValue::from_i64(frame.rows.row_number() as i64),
                Binding::Environment(v) | Binding::UserVariable(v) => v.clone(),
                Binding::Unresolved => ResultValue::error(format!("unresolved identifier '{}'", ident)),
            },
            NodeKind::Call { name, func, args } => match func.clone() {
                None => ResultValue::error(format!("unresolved function '{}'", name)),
                Some(def) => match &def.imp {
                    FunctionImpl::Special(special) => self.eval_special(*special, args, frame),
                    _ => {
                        let mut values: SmallVec<[ResultValue; 4]> = SmallVec::with_capacity(args.len());
                        for arg in args.iter_mut() {
                            values.push(self.eval_node(arg, frame));
                        }
                        def.apply(&values)
                            .unwrap_or_else(|| ResultValue::error(INVALID_OPERANDS))
                    }
                },
            },
        };
        let slot = frame.slot % node.results.len();
        node.results[slot] = result.clone();
        result
    }

    fn eval_special(&mut self, special: Special, args: &mut [Node], frame: &mut Frame<'_>) -> ResultValue {
        match special {
            Special::Iif => {
                let condition = self.eval_node(&mut args[0], frame);
                if condition.is_error() {
                    return condition;
                }
                let branch = if condition.is_truthy() { 1 } else { 2 };
                self.eval_node(&mut args[branch], frame)
            }
            Special::PrevVal => {
                // Keep the operand's history current, then report the slot before.
                self.eval_node(&mut args[0], frame);
                args[0].result(frame.previous).clone()
            }
            Special::RowNum => ResultValue::from_i64(frame.rows.row_number() as i64),
            Special::BrRowNum => {
                let name = self.eval_node(&mut args[0], frame);
                if name.is_error() {
                    return name;
                }
                match name.as_str() {
                    Some(n) => match frame.rows.break_row_number(n) {
                        Some(row) => ResultValue::from_i64(row as i64),
                        None => ResultValue::error("brrownum(): no such break"),
                    },
                    None => ResultValue::error(INVALID_OPERANDS),
                }
            }
            Special::Random => {
                let x: f64 = self.rng.random();
                number::from_f64(x)
                    .map(ResultValue::number)
                    .unwrap_or_else(|| ResultValue::error(INVALID_OPERANDS))
            }
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(&EngineOptions::default())
    }
}
