//! FILENAME: core/report-engine/src/tests.rs
//! PURPOSE: Report runs over in-memory cursors: breaks, variables, callbacks.

use std::cell::RefCell;
use std::rc::Rc;

use tabula_engine::{ArrayDatasource, Engine, ResultValue, ValueKind};

use crate::definition::{BreakDef, ReportDefinition, ReportOptions, VariableDef, VariableKind};
use crate::engine::{Executor, NoCallbacks, Part, Report, ReportCallbacks, RunOutcome, StopSignal};
use crate::error::ReportError;
use crate::breaks::BreakEvent;

fn n(v: i64) -> ResultValue {
    ResultValue::from_i64(v)
}

/// Engine with a `sales(region, amount)` cursor.
fn sales_engine(rows: &[(&str, &str)]) -> Engine {
    let mut ds = ArrayDatasource::new([("region", ValueKind::String), ("amount", ValueKind::Number)]);
    for (region, amount) in rows {
        ds.push_row(&[*region, *amount]);
    }
    let mut engine = Engine::default();
    engine.add_cursor("sales", Box::new(ds)).unwrap();
    engine
}

fn sales_report(rows: &[(&str, &str)]) -> Report {
    let engine = sales_engine(rows);
    let main = engine.cursor_id("sales").unwrap();
    Report::new("sales", engine, main).unwrap()
}

fn by_region(report: &mut Report) {
    report.declare_break(&BreakDef::new("region", &["sales.region"])).unwrap();
}

/// Records every callback as a line of text.
#[derive(Default)]
struct Recorder {
    events: Vec<String>,
    /// Variables sampled on each row.
    watch: Vec<&'static str>,
    rows: Vec<Vec<ResultValue>>,
}

impl Recorder {
    fn watching(names: &[&'static str]) -> Self {
        Recorder {
            watch: names.to_vec(),
            ..Default::default()
        }
    }

    fn column(&self, i: usize) -> Vec<ResultValue> {
        self.rows.iter().map(|r| r[i].clone()).collect()
    }
}

impl ReportCallbacks for Recorder {
    fn part_started(&mut self, part: &str) {
        self.events.push(format!("part_started {}", part));
    }

    fn report_started(&mut self, report: &Report) {
        self.events.push(format!("report_started {}", report.name()));
    }

    fn precalculation_done(&mut self, report: &Report) {
        self.events.push(format!("precalculation_done {}", report.name()));
    }

    fn break_triggered(&mut self, _report: &Report, event: &BreakEvent<'_>) {
        self.events.push(format!("break {} {}", event.name, event.row_number));
    }

    fn new_row(&mut self, report: &Report) {
        self.events.push(format!("row {}", report.row_number()));
        let sampled = self
            .watch
            .iter()
            .map(|name| report.variable_value(name).cloned().unwrap())
            .collect();
        self.rows.push(sampled);
    }

    fn report_iteration_done(&mut self, _report: &Report, iteration: u32) {
        self.events.push(format!("iteration {}", iteration));
    }

    fn report_done(&mut self, report: &Report) {
        self.events.push(format!("report_done {}", report.name()));
    }

    fn part_done(&mut self, part: &str) {
        self.events.push(format!("part_done {}", part));
    }
}

fn run(report: &mut Report, sink: &mut dyn ReportCallbacks) -> RunOutcome {
    report.run(sink, &StopSignal::new()).unwrap()
}

// ========================================
// AGGREGATES
// ========================================

#[test]
fn aggregates_over_ten_twenty_thirty() {
    let mut report = sales_report(&[("A", "10"), ("A", "20"), ("A", "30")]);
    for (name, kind) in [
        ("total", VariableKind::Sum),
        ("rows", VariableKind::Count),
        ("top", VariableKind::Highest),
        ("mean", VariableKind::Average),
    ] {
        report
            .declare_variable(&VariableDef::new(name, kind).base("sales.amount"))
            .unwrap();
    }
    assert_eq!(run(&mut report, &mut NoCallbacks), RunOutcome::Completed);

    assert_eq!(report.variable_value("total"), Some(&n(60)));
    assert_eq!(report.variable_value("rows"), Some(&n(3)));
    assert_eq!(report.variable_value("top"), Some(&n(30)));
    assert_eq!(report.variable_value("mean"), Some(&n(20)));
}

#[test]
fn break_reset_restarts_scoped_variables_only() {
    let mut report = sales_report(&[("A", "10"), ("A", "20"), ("B", "30")]);
    by_region(&mut report);
    report
        .declare_variable(&VariableDef::new("subtotal", VariableKind::Sum).base("amount").reset_on("region"))
        .unwrap();
    report
        .declare_variable(&VariableDef::new("all_rows", VariableKind::CountAll).reset_on("region"))
        .unwrap();
    report
        .declare_variable(
            &VariableDef::new("all_mean", VariableKind::AverageAll)
                .base("amount")
                .reset_on("region"),
        )
        .unwrap();

    let mut rec = Recorder::watching(&["subtotal", "all_rows", "all_mean"]);
    run(&mut report, &mut rec);
    assert_eq!(rec.column(0), vec![n(10), n(30), n(30)]);
    assert_eq!(rec.column(1), vec![n(1), n(2), n(3)]);
    assert_eq!(rec.column(2), vec![n(10), n(15), n(20)]);
}

#[test]
fn ignored_rows_are_not_folded() {
    let mut report = sales_report(&[("A", "10"), ("A", "20"), ("A", "5")]);
    report
        .declare_variable(
            &VariableDef::new("small", VariableKind::Sum)
                .base("amount")
                .ignore("amount > 15"),
        )
        .unwrap();
    run(&mut report, &mut NoCallbacks);
    assert_eq!(report.variable_value("small"), Some(&n(15)));
}

#[test]
fn expression_variable_runs_over_its_previous_value() {
    let mut report = sales_report(&[("A", "10"), ("A", "20"), ("B", "5")]);
    by_region(&mut report);
    report
        .declare_variable(
            &VariableDef::new("running", VariableKind::Expression)
                .base("r.self + sales.amount")
                .reset_on("region")
                .seed(n(0)),
        )
        .unwrap();
    report
        .declare_variable(&VariableDef::new("doubled", VariableKind::Expression).base("v.running * 2"))
        .unwrap();

    let mut rec = Recorder::watching(&["running", "doubled"]);
    run(&mut report, &mut rec);
    assert_eq!(rec.column(0), vec![n(10), n(30), n(5)]);
    assert_eq!(rec.column(1), vec![n(20), n(60), n(10)]);
}

#[test]
fn row_numbers_inside_variables() {
    let mut report = sales_report(&[("A", "1"), ("A", "1"), ("B", "1")]);
    by_region(&mut report);
    report
        .declare_variable(&VariableDef::new("in_group", VariableKind::Expression).base("brrownum('region')"))
        .unwrap();
    report
        .declare_variable(&VariableDef::new("overall", VariableKind::Expression).base("r.rownum"))
        .unwrap();

    let mut rec = Recorder::watching(&["in_group", "overall"]);
    run(&mut report, &mut rec);
    assert_eq!(rec.column(0), vec![n(1), n(2), n(1)]);
    assert_eq!(rec.column(1), vec![n(1), n(2), n(3)]);
}

#[test]
fn break_callbacks_see_the_opening_row_counted() {
    #[derive(Default)]
    struct GroupRows(Vec<(u64, Option<u64>)>);

    impl ReportCallbacks for GroupRows {
        fn break_triggered(&mut self, report: &Report, event: &BreakEvent<'_>) {
            self.0.push((event.row_number, report.break_row_number("region")));
        }
    }

    let mut report = sales_report(&[("A", "1"), ("A", "1"), ("B", "1")]);
    by_region(&mut report);
    let mut rows = GroupRows::default();
    run(&mut report, &mut rows);
    assert_eq!(rows.0, vec![(1, Some(1)), (3, Some(1))]);
}

#[test]
fn follower_columns_feed_variables() {
    let mut engine = sales_engine(&[("A", "1"), ("B", "2"), ("B", "3")]);
    let rates = ArrayDatasource::new([("region", ValueKind::String), ("rate", ValueKind::Number)])
        .row(&["A", "10"])
        .row(&["B", "100"]);
    let sales = engine.cursor_id("sales").unwrap();
    let rates = engine.add_cursor("rates", Box::new(rates)).unwrap();
    engine
        .add_matched_follower(sales, rates, "sales.region = rates.region")
        .unwrap();

    let mut report = Report::new("joined", engine, sales).unwrap();
    report
        .declare_variable(&VariableDef::new("weighted", VariableKind::Sum).base("amount * rates.rate"))
        .unwrap();
    run(&mut report, &mut NoCallbacks);
    assert_eq!(report.variable_value("weighted"), Some(&n(510)));
}

// ========================================
// DECLARATIONS
// ========================================

#[test]
fn aggregate_over_expression_variable_is_rejected() {
    let mut report = sales_report(&[]);
    report
        .declare_variable(&VariableDef::new("running", VariableKind::Expression).base("r.self + amount"))
        .unwrap();
    let err = report
        .declare_variable(&VariableDef::new("total", VariableKind::Sum).base("v.running"))
        .unwrap_err();
    assert_eq!(
        err,
        ReportError::ExpressionReference {
            name: "total".into(),
            referenced: "running".into()
        }
    );
    assert_eq!(report.variables().len(), 1);

    // Expression variables may build on each other.
    report
        .declare_variable(&VariableDef::new("twice", VariableKind::Expression).base("v.running * 2"))
        .unwrap();
}

#[test]
fn redeclaring_returns_the_original_variable() {
    let mut report = sales_report(&[]);
    let first = report
        .declare_variable(&VariableDef::new("total", VariableKind::Sum).base("amount"))
        .unwrap();
    let again = report
        .declare_variable(&VariableDef::new("total", VariableKind::Count))
        .unwrap();
    assert_eq!(first, again);
    assert_eq!(report.variable("total").unwrap().kind(), VariableKind::Sum);
}

#[test]
fn invalid_declarations_change_nothing() {
    let mut report = sales_report(&[]);
    by_region(&mut report);

    assert!(report
        .declare_variable(&VariableDef::new("x", VariableKind::Sum).base("v.undeclared"))
        .is_err());
    assert_eq!(
        report.declare_variable(&VariableDef::new("x", VariableKind::Sum)),
        Err(ReportError::MissingBase {
            name: "x".into(),
            kind: "sum".into()
        })
    );
    assert_eq!(
        report.declare_variable(&VariableDef::new("x", VariableKind::Count).reset_on("city")),
        Err(ReportError::UnknownBreak("city".into()))
    );
    assert_eq!(
        report.declare_break(&BreakDef::new("region", &["amount"])),
        Err(ReportError::DuplicateBreak("region".into()))
    );
    assert_eq!(
        report.declare_break(&BreakDef::new("empty", &[])),
        Err(ReportError::EmptyBreak("empty".into()))
    );
    assert!(report.variables().is_empty());
    assert_eq!(report.breaks().len(), 1);
}

#[test]
fn definition_loads_from_json() {
    let json = r#"{
        "name": "by_region",
        "query": "sales",
        "breaks": [{ "name": "region", "fields": ["region"] }],
        "variables": [
            { "name": "subtotal", "kind": "sum", "base": "amount", "reset_on": "region" },
            { "name": "rows", "kind": "count-all" }
        ],
        "options": { "iterations": 2 }
    }"#;
    let def: ReportDefinition = serde_json::from_str(json).unwrap();
    assert!(!def.options.precalculate);

    let engine = sales_engine(&[("A", "1"), ("B", "2")]);
    let mut report = Report::from_definition(&def, engine).unwrap();
    let mut rec = Recorder::watching(&["subtotal", "rows"]);
    run(&mut report, &mut rec);
    // Each iteration starts over.
    assert_eq!(rec.column(0), vec![n(1), n(2), n(1), n(2)]);
    assert_eq!(rec.column(1), vec![n(1), n(2), n(1), n(2)]);

    let missing = ReportDefinition {
        query: "nope".into(),
        ..def
    };
    assert!(matches!(
        Report::from_definition(&missing, sales_engine(&[])),
        Err(ReportError::NoMainCursor(_))
    ));
}

// ========================================
// DELAYED VARIABLES
// ========================================

#[test]
fn delayed_total_is_known_on_every_row_of_its_group() {
    let mut report = sales_report(&[("A", "10"), ("A", "10"), ("B", "5")]);
    by_region(&mut report);
    report
        .declare_variable(
            &VariableDef::new("total", VariableKind::Sum)
                .base("amount")
                .reset_on("region")
                .delayed(),
        )
        .unwrap();
    report
        .declare_variable(&VariableDef::new("share", VariableKind::Expression).base("amount / v.total"))
        .unwrap();

    let mut rec = Recorder::watching(&["total", "share"]);
    run(&mut report, &mut rec);
    assert_eq!(rec.column(0), vec![n(20), n(20), n(5)]);
    assert_eq!(rec.column(1)[2], n(1));
    assert_eq!(rec.column(1)[0], ResultValue::number("0.5".parse().unwrap()));
    assert_eq!(
        rec.events.iter().filter(|e| e.starts_with("precalculation_done")).count(),
        1
    );
    // The pre-pass is silent.
    assert_eq!(rec.events.iter().filter(|e| e.starts_with("row")).count(), 3);
}

#[test]
fn precalculate_option_runs_the_pre_pass_without_delayed_variables() {
    let mut report = sales_report(&[("A", "1")]).with_options(ReportOptions {
        precalculate: true,
        ..Default::default()
    });
    let mut rec = Recorder::default();
    run(&mut report, &mut rec);
    assert_eq!(
        rec.events,
        vec!["report_started sales", "precalculation_done sales", "row 1", "iteration 0", "report_done sales"]
    );
}

// ========================================
// EXECUTION
// ========================================

#[test]
fn callbacks_fire_in_lifecycle_order() {
    let mut report = sales_report(&[("A", "1"), ("B", "2")]);
    report
        .declare_break(&BreakDef::new("all", &["1"]))
        .unwrap();
    by_region(&mut report);

    let fired = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&fired);
    report
        .on_break("region", Box::new(move |e: &BreakEvent<'_>| log.borrow_mut().push(e.row_number)))
        .unwrap();
    assert!(report.on_break("city", Box::new(|_: &BreakEvent<'_>| {})).is_err());

    let mut executor = Executor::new();
    executor.add_part(Part::new("p").with_report(report));
    let mut rec = Recorder::default();
    assert_eq!(executor.run(&mut rec).unwrap(), RunOutcome::Completed);

    assert_eq!(
        rec.events,
        vec![
            "part_started p",
            "report_started sales",
            "break all 1",
            "break region 1",
            "row 1",
            "break region 2",
            "row 2",
            "iteration 0",
            "report_done sales",
            "part_done p",
        ]
    );
    assert_eq!(*fired.borrow(), vec![1, 2]);
}

/// Stops the run once the given row has been seen.
struct StopAt {
    row: u64,
    stop: StopSignal,
    done: bool,
}

impl ReportCallbacks for StopAt {
    fn new_row(&mut self, report: &Report) {
        if report.row_number() == self.row {
            self.stop.stop();
        }
    }

    fn report_done(&mut self, _report: &Report) {
        self.done = true;
    }
}

#[test]
fn stop_signal_cancels_before_the_next_fetch() {
    let mut report = sales_report(&[("A", "1"), ("A", "2"), ("A", "3"), ("A", "4")]);
    report
        .declare_variable(&VariableDef::new("total", VariableKind::Sum).base("amount"))
        .unwrap();

    let mut executor = Executor::new();
    executor.add_part(Part::new("p").with_report(report));
    let mut sink = StopAt {
        row: 2,
        stop: executor.stop_signal(),
        done: false,
    };
    assert_eq!(executor.run(&mut sink).unwrap(), RunOutcome::Cancelled);
    assert!(!sink.done);

    let report = executor.report("sales").unwrap();
    assert_eq!(report.variable_value("total"), Some(&n(3)));
    assert_eq!(report.row_number(), 2);
}

#[test]
fn stopped_signal_skips_every_row() {
    let mut report = sales_report(&[("A", "1")]);
    let stop = StopSignal::new();
    stop.stop();
    let mut rec = Recorder::default();
    assert_eq!(report.run(&mut rec, &stop).unwrap(), RunOutcome::Cancelled);
    assert_eq!(rec.events, vec!["report_started sales"]);

    stop.reset();
    assert_eq!(report.run(&mut rec, &stop).unwrap(), RunOutcome::Completed);
}
