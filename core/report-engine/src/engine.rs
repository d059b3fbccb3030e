//! FILENAME: core/report-engine/src/engine.rs
//! Report Engine - The row loop that drives cursors, breaks and variables.
//!
//! A `Report` owns its expression engine together with its breaks and
//! variables, so independent reports never share state. Per row:
//! 1. Fetch the next row of the main cursor (followers move with it)
//! 2. Evaluate every break field and find the outermost changed break
//! 3. For each triggered break, outer to inner: reset its variables,
//!    restart its row counter, fire its callbacks
//! 4. Fold the row into every variable, in declaration order
//! 5. Notify the sink of the new row
//!
//! Delayed variables need the final value of their group before the group
//! is shown, so a silent pre-pass over the whole stream records those finals
//! first; the stream is then rewound and run again with callbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tabula_engine::{
    BreakId, CursorId, CursorSet, Engine, Expr, ResultValue, RowSource, VariableId,
};

use crate::breaks::{Break, BreakCallback, BreakEvent, BreakTable, FieldValues};
use crate::definition::{BreakDef, ReportDefinition, ReportOptions, VariableDef, VariableKind};
use crate::error::{ReportError, ReportResult};
use crate::variables::{Variable, VariableTable};

// ============================================================================
// CALLBACKS AND CANCELLATION
// ============================================================================

/// Lifecycle notifications of a run. Every method defaults to a no-op.
pub trait ReportCallbacks {
    fn part_started(&mut self, _part: &str) {}
    fn report_started(&mut self, _report: &Report) {}
    /// The silent pre-pass finished and delayed values are known.
    fn precalculation_done(&mut self, _report: &Report) {}
    fn break_triggered(&mut self, _report: &Report, _event: &BreakEvent<'_>) {}
    fn new_row(&mut self, _report: &Report) {}
    fn report_iteration_done(&mut self, _report: &Report, _iteration: u32) {}
    fn report_done(&mut self, _report: &Report) {}
    fn part_done(&mut self, _part: &str) {}
}

/// A sink that ignores everything.
pub struct NoCallbacks;

impl ReportCallbacks for NoCallbacks {}

/// Cooperative cancellation flag, checked before every row fetch.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a flag owned by the host.
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        StopSignal(flag)
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The stop signal was seen; state reflects the rows processed so far.
    Cancelled,
}

// ============================================================================
// ROW SOURCE
// ============================================================================

/// Cursor columns plus the report's `v.` and `brrownum` values.
struct ReportRows<'a> {
    cursors: &'a CursorSet,
    values: &'a [ResultValue],
    breaks: Option<&'a BreakTable>,
}

impl RowSource for ReportRows<'_> {
    fn column_value(&self, cursor: CursorId, column: usize) -> ResultValue {
        self.cursors.column_value(cursor, column)
    }

    fn variable_value(&self, variable: VariableId) -> ResultValue {
        self.values
            .get(variable.0)
            .cloned()
            .unwrap_or_else(|| ResultValue::error("unknown variable"))
    }

    fn row_number(&self) -> u64 {
        self.cursors.row_number()
    }

    fn break_row_number(&self, name: &str) -> Option<u64> {
        self.breaks.and_then(|b| b.row_number(name))
    }
}

// ============================================================================
// REPORT
// ============================================================================

pub struct Report {
    name: String,
    engine: Engine,
    main: CursorId,
    options: ReportOptions,
    breaks: BreakTable,
    variables: VariableTable,
}

impl std::fmt::Debug for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Report")
            .field("name", &self.name)
            .field("main", &self.main)
            .field("options", &self.options)
            .field("breaks", &self.breaks)
            .field("variables", &self.variables)
            .finish()
    }
}

impl Report {
    /// A report over `main`, one of `engine`'s cursors.
    pub fn new(name: &str, mut engine: Engine, main: CursorId) -> ReportResult<Report> {
        if !engine.cursors().contains(main) {
            return Err(ReportError::NoMainCursor(name.to_string()));
        }
        engine.set_main_cursor(main)?;
        Ok(Report {
            name: name.to_string(),
            engine,
            main,
            options: ReportOptions::default(),
            breaks: BreakTable::default(),
            variables: VariableTable::default(),
        })
    }

    /// Builds a report from its declarations. Breaks are declared before
    /// variables so variables can name them as their reset scope.
    pub fn from_definition(def: &ReportDefinition, engine: Engine) -> ReportResult<Report> {
        let main = engine
            .cursor_id(&def.query)
            .ok_or_else(|| ReportError::NoMainCursor(def.name.clone()))?;
        let mut report = Report::new(&def.name, engine, main)?;
        report.options = def.options.clone();
        for brk in &def.breaks {
            report.declare_break(brk)?;
        }
        for var in &def.variables {
            report.declare_variable(var)?;
        }
        Ok(report)
    }

    pub fn with_options(mut self, options: ReportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ReportOptions {
        &self.options
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn main_cursor(&self) -> CursorId {
        self.main
    }

    pub fn breaks(&self) -> &BreakTable {
        &self.breaks
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    // ========================================================================
    // DECLARATIONS
    // ========================================================================

    /// Adds a break finer than every break declared so far.
    pub fn declare_break(&mut self, def: &BreakDef) -> ReportResult<BreakId> {
        if self.breaks.find(&def.name).is_some() {
            log::warn!("BREAK '{}' rejected: duplicate name", def.name);
            return Err(ReportError::DuplicateBreak(def.name.clone()));
        }
        if def.fields.is_empty() {
            log::warn!("BREAK '{}' rejected: no fields", def.name);
            return Err(ReportError::EmptyBreak(def.name.clone()));
        }
        let fields = def
            .fields
            .iter()
            .map(|f| self.compile(f))
            .collect::<ReportResult<Vec<_>>>()?;
        let id = self.breaks.push(Break::new(&def.name, fields));
        log::debug!("BREAK '{}' declared as {:?}", def.name, id);
        Ok(id)
    }

    /// Declares a variable. A name that is already declared returns the
    /// existing variable and ignores the new declaration.
    pub fn declare_variable(&mut self, def: &VariableDef) -> ReportResult<VariableId> {
        if let Some(id) = self.variables.find(&def.name) {
            log::debug!("VARIABLE '{}' already declared", def.name);
            return Ok(id);
        }
        self.try_declare_variable(def)
            .inspect_err(|e| log::warn!("VARIABLE '{}' rejected: {}", def.name, e))
    }

    fn try_declare_variable(&mut self, def: &VariableDef) -> ReportResult<VariableId> {
        let reset_on = match &def.reset_on {
            Some(name) => Some(
                self.breaks
                    .find(name)
                    .ok_or_else(|| ReportError::UnknownBreak(name.clone()))?,
            ),
            None => None,
        };
        let base = match &def.base {
            Some(text) => Some(self.compile(text)?),
            None if def.kind.base_optional() => None,
            None => {
                return Err(ReportError::MissingBase {
                    name: def.name.clone(),
                    kind: def.kind.to_string(),
                })
            }
        };
        if def.kind != VariableKind::Expression {
            if let Some(expr) = &base {
                self.check_no_expression_reference(&def.name, expr)?;
            }
        }
        let ignore = def.ignore.as_deref().map(|t| self.compile(t)).transpose()?;

        let id = self.variables.push(
            &def.name,
            def.kind,
            reset_on,
            def.delayed,
            def.seed.clone(),
            base,
            ignore,
        );
        log::debug!("VARIABLE '{}' declared as {} {:?}", def.name, def.kind, id);
        Ok(id)
    }

    fn check_no_expression_reference(&self, name: &str, expr: &Expr) -> ReportResult<()> {
        let referenced = expr
            .referenced_variables()
            .into_iter()
            .filter_map(|id| self.variables.get(id))
            .find(|v| v.kind() == VariableKind::Expression);
        match referenced {
            Some(var) => Err(ReportError::ExpressionReference {
                name: name.to_string(),
                referenced: var.name().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Registers a callback fired whenever the named break triggers.
    pub fn on_break(&mut self, name: &str, callback: BreakCallback) -> ReportResult<()> {
        let id = self
            .breaks
            .find(name)
            .ok_or_else(|| ReportError::UnknownBreak(name.to_string()))?;
        self.breaks.breaks[id.0].callbacks.push(callback);
        Ok(())
    }

    // ========================================================================
    // EXPRESSIONS
    // ========================================================================

    /// Compiles with `v.` names bound to the variables declared so far.
    pub fn compile(&self, text: &str) -> ReportResult<Expr> {
        let mut expr = self.engine.parse(text)?;
        let variables = &self.variables;
        self.engine
            .resolve_with_variables(&mut expr, &|name| variables.find(name))?;
        self.engine.optimize(&mut expr)?;
        Ok(expr)
    }

    /// Evaluates against the current row and variable values.
    pub fn evaluate(&mut self, expr: &mut Expr) -> ResultValue {
        let (evaluator, cursors) = self.engine.evaluation_parts();
        let rows = ReportRows {
            cursors,
            values: &self.variables.values,
            breaks: Some(&self.breaks),
        };
        evaluator.evaluate(expr, &rows)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.find(name).and_then(|id| self.variables.get(id))
    }

    /// Current visible value of a variable.
    pub fn variable_value(&self, name: &str) -> Option<&ResultValue> {
        self.variables.find(name).and_then(|id| self.variables.value(id))
    }

    /// Value of `query.column` in the current row.
    pub fn column_value(&self, query: &str, column: &str) -> Option<ResultValue> {
        let cursors = self.engine.cursors();
        let cursor = cursors.get(cursors.find(query)?)?;
        let index = cursor.column_index(column, self.engine.options().case_insensitive_columns)?;
        Some(cursor.value(index))
    }

    /// Row number of the main cursor.
    pub fn row_number(&self) -> u64 {
        self.engine.cursors().get(self.main).map_or(0, |c| c.row_number())
    }

    pub fn break_row_number(&self, name: &str) -> Option<u64> {
        self.breaks.row_number(name)
    }

    // ========================================================================
    // EXECUTION
    // ========================================================================

    fn needs_prepass(&self) -> bool {
        self.options.precalculate || self.variables.has_delayed()
    }

    /// Runs the report: the pre-pass when needed, then every iteration.
    pub fn run(&mut self, sink: &mut dyn ReportCallbacks, stop: &StopSignal) -> ReportResult<RunOutcome> {
        sink.report_started(self);
        if self.needs_prepass() {
            log::debug!("REPORT '{}' pre-pass started", self.name);
            self.variables.clear_finals();
            if self.pass(&mut NoCallbacks, true, stop)? == RunOutcome::Cancelled {
                return Ok(RunOutcome::Cancelled);
            }
            self.variables.record_finals();
            log::debug!("REPORT '{}' pre-pass finished", self.name);
            sink.precalculation_done(self);
        }
        for iteration in 0..self.options.iterations.max(1) {
            if self.pass(&mut *sink, false, stop)? == RunOutcome::Cancelled {
                return Ok(RunOutcome::Cancelled);
            }
            sink.report_iteration_done(self, iteration);
        }
        sink.report_done(self);
        Ok(RunOutcome::Completed)
    }

    /// Rewinds cursors, breaks and variables. Recorded finals survive.
    pub fn rewind(&mut self) -> ReportResult<()> {
        self.engine.start(self.main)?;
        self.breaks.rewind();
        self.variables.rewind();
        Ok(())
    }

    /// One pass over the stream. A silent pass fires no callbacks and
    /// records the finals of delayed variables.
    fn pass(
        &mut self,
        sink: &mut dyn ReportCallbacks,
        silent: bool,
        stop: &StopSignal,
    ) -> ReportResult<RunOutcome> {
        self.rewind()?;
        loop {
            if stop.is_stopped() {
                log::warn!(
                    "REPORT '{}' cancelled after row {}",
                    self.name,
                    self.row_number()
                );
                return Ok(RunOutcome::Cancelled);
            }
            if !self.engine.next(self.main)? {
                return Ok(RunOutcome::Completed);
            }
            self.process_row(&mut *sink, silent);
        }
    }

    fn process_row(&mut self, sink: &mut dyn ReportCallbacks, silent: bool) {
        let snapshots = self.break_values();
        let triggered = self.breaks.first_triggered(&snapshots);

        // Groups are counted before any callback runs, so brrownum() reads 1
        // for the row that opened a group.
        if let Some(first) = triggered {
            for (i, values) in snapshots.into_iter().enumerate().skip(first) {
                self.breaks.breaks[i].capture(values);
            }
        }
        self.breaks.count_row();

        if let Some(first) = triggered {
            let row_number = self.row_number();
            for i in first..self.breaks.len() {
                let id = BreakId(i);
                self.variables.reset_scoped(&[id], silent);
                log::debug!(
                    "BREAK '{}' triggered at row {}",
                    self.breaks.breaks[i].name,
                    row_number
                );

                if silent {
                    continue;
                }
                {
                    let brk = &mut self.breaks.breaks[i];
                    let event = BreakEvent {
                        id,
                        name: &brk.name,
                        row_number,
                    };
                    for callback in &mut brk.callbacks {
                        callback(&event);
                    }
                }
                let event = BreakEvent {
                    id,
                    name: &self.breaks.breaks[i].name,
                    row_number,
                };
                sink.break_triggered(self, &event);
            }
        }

        self.update_variables();
        if !silent {
            sink.new_row(self);
        }
    }

    fn break_values(&mut self) -> Vec<FieldValues> {
        let (evaluator, cursors) = self.engine.evaluation_parts();
        let rows = ReportRows {
            cursors,
            values: &self.variables.values,
            breaks: None,
        };
        self.breaks
            .breaks
            .iter_mut()
            .map(|brk| {
                brk.fields
                    .iter_mut()
                    .map(|f| evaluator.evaluate(f, &rows))
                    .collect::<FieldValues>()
            })
            .collect()
    }

    fn update_variables(&mut self) {
        let (evaluator, cursors) = self.engine.evaluation_parts();
        let vars = &mut self.variables;
        for i in 0..vars.len() {
            let rows = ReportRows {
                cursors,
                values: &vars.values,
                breaks: Some(&self.breaks),
            };
            let ignored = vars.ignores[i]
                .as_mut()
                .is_some_and(|e| evaluator.evaluate(e, &rows).is_truthy());
            if ignored {
                vars.skip(i);
                continue;
            }
            let base = vars.bases[i].as_mut().map(|e| evaluator.evaluate(e, &rows));
            vars.fold(i, base);
        }
    }
}

// ============================================================================
// PARTS AND EXECUTOR
// ============================================================================

/// A named group of reports run one after another.
#[derive(Debug, Default)]
pub struct Part {
    pub name: String,
    pub reports: Vec<Report>,
}

impl Part {
    pub fn new(name: &str) -> Self {
        Part {
            name: name.to_string(),
            reports: Vec::new(),
        }
    }

    pub fn with_report(mut self, report: Report) -> Self {
        self.reports.push(report);
        self
    }
}

/// Runs parts in order, stopping at the first cancellation or error.
#[derive(Debug, Default)]
pub struct Executor {
    parts: Vec<Part>,
    stop: StopSignal,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// A handle that cancels the run from another thread.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn add_part(&mut self, part: Part) {
        self.parts.push(part);
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn report(&self, name: &str) -> Option<&Report> {
        self.parts
            .iter()
            .flat_map(|p| &p.reports)
            .find(|r| r.name == name)
    }

    pub fn run(&mut self, sink: &mut dyn ReportCallbacks) -> ReportResult<RunOutcome> {
        for part in &mut self.parts {
            sink.part_started(&part.name);
            for report in &mut part.reports {
                if report.run(sink, &self.stop)? == RunOutcome::Cancelled {
                    return Ok(RunOutcome::Cancelled);
                }
            }
            sink.part_done(&part.name);
        }
        Ok(RunOutcome::Completed)
    }
}
