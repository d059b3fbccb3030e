//! FILENAME: core/report-engine/src/variables.rs
//! PURPOSE: Report variables and their running aggregates.
//! CONTEXT: Expressions and values live in separate vectors of the table so a
//! variable's base expression can be evaluated mutably while every earlier
//! variable's value is read through `v.name`.
//!
//! Identity values after a reset: zero for count and sum, null for highest,
//! lowest and the averages. `count-all` and `average-all` never reset.

use rustc_hash::FxHashMap;
use tabula_engine::number;
use tabula_engine::{BigDecimal, BreakId, Expr, ResultValue, ValueKind, VariableId};

use crate::definition::VariableKind;

// ============================================================================
// ACCUMULATOR
// ============================================================================

/// Running state of one aggregate.
#[derive(Debug, Clone, Default)]
struct Accumulator {
    /// Counted rows or non-null values, by kind.
    count: u64,
    /// Every folded row, for `average-all`.
    rows: u64,
    sum: BigDecimal,
    extreme: Option<ResultValue>,
    error: Option<ResultValue>,
}

impl Accumulator {
    fn fold(&mut self, kind: VariableKind, value: Option<&ResultValue>) {
        self.rows += 1;
        let Some(value) = value else {
            // No base: only the counting kinds get here.
            self.count += 1;
            return;
        };
        match kind {
            VariableKind::CountAll => self.count += 1,
            VariableKind::Count => {
                if !value.is_null() {
                    self.count += 1;
                }
            }
            VariableKind::Sum | VariableKind::Average | VariableKind::AverageAll => {
                if value.is_null() {
                    return;
                }
                match value.as_number().and_then(|n| number::add(&self.sum, n)) {
                    Some(sum) => {
                        self.sum = sum;
                        self.count += 1;
                    }
                    None if value.as_number().is_some() => {
                        self.error = Some(ResultValue::error("numeric overflow"));
                    }
                    None => self.error = Some(ResultValue::error("invalid operand(s)")),
                }
            }
            VariableKind::Highest | VariableKind::Lowest => {
                if value.is_null() {
                    return;
                }
                let wanted = if kind == VariableKind::Highest {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Less
                };
                match &self.extreme {
                    None => self.extreme = Some(value.clone()),
                    Some(current) => match value.compare(current) {
                        Some(ord) if ord == wanted => self.extreme = Some(value.clone()),
                        Some(_) => {}
                        None => self.error = Some(ResultValue::error("invalid operand(s)")),
                    },
                }
            }
            VariableKind::Expression => {}
        }
    }

    fn value(&self, kind: VariableKind) -> ResultValue {
        if let Some(err) = &self.error {
            return err.clone();
        }
        let ratio = |n: u64| {
            if n == 0 {
                return ResultValue::null(ValueKind::Number);
            }
            number::div(&self.sum, &BigDecimal::from(n))
                .map_or_else(|| ResultValue::error("numeric overflow"), ResultValue::number)
        };
        match kind {
            VariableKind::Count | VariableKind::CountAll => ResultValue::number(BigDecimal::from(self.count)),
            VariableKind::Sum => ResultValue::number(self.sum.clone()),
            VariableKind::Highest | VariableKind::Lowest => self
                .extreme
                .clone()
                .unwrap_or_else(|| ResultValue::null(ValueKind::Number)),
            VariableKind::Average => ratio(self.count),
            VariableKind::AverageAll => ratio(self.rows),
            VariableKind::Expression => ResultValue::null(ValueKind::Number),
        }
    }
}

// ============================================================================
// VARIABLES
// ============================================================================

#[derive(Debug, Clone)]
pub struct Variable {
    pub(crate) name: String,
    pub(crate) kind: VariableKind,
    pub(crate) reset_on: Option<BreakId>,
    pub(crate) delayed: bool,
    seed: Option<ResultValue>,
    acc: Accumulator,
    /// Rows folded since the last reset.
    rows_in_group: u64,
    /// Index of the current reset group.
    group: usize,
    /// Final value of every group, recorded by the pre-pass.
    finals: Vec<ResultValue>,
}

impl Variable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn is_delayed(&self) -> bool {
        self.delayed
    }

    /// Per-group finals recorded by the last pre-pass.
    pub fn finals(&self) -> &[ResultValue] {
        &self.finals
    }

    fn identity(&self) -> ResultValue {
        match self.kind {
            VariableKind::Expression => self
                .seed
                .clone()
                .unwrap_or_else(|| ResultValue::null(ValueKind::Number)),
            kind => Accumulator::default().value(kind),
        }
    }
}

/// The declared variables of a report, in declaration order.
#[derive(Debug, Default)]
pub struct VariableTable {
    pub(crate) vars: Vec<Variable>,
    pub(crate) bases: Vec<Option<Expr>>,
    pub(crate) ignores: Vec<Option<Expr>>,
    pub(crate) values: Vec<ResultValue>,
    by_name: FxHashMap<String, VariableId>,
}

impl VariableTable {
    pub fn find(&self, name: &str) -> Option<VariableId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.vars.get(id.0)
    }

    pub fn value(&self, id: VariableId) -> Option<&ResultValue> {
        self.values.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn has_delayed(&self) -> bool {
        self.vars.iter().any(|v| v.delayed)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn push(
        &mut self,
        name: &str,
        kind: VariableKind,
        reset_on: Option<BreakId>,
        delayed: bool,
        seed: Option<ResultValue>,
        mut base: Option<Expr>,
        ignore: Option<Expr>,
    ) -> VariableId {
        if let (Some(expr), Some(seed)) = (base.as_mut(), seed.as_ref()) {
            if kind == VariableKind::Expression {
                expr.set_seed(seed.clone());
            }
        }
        let var = Variable {
            name: name.to_string(),
            kind,
            reset_on,
            delayed,
            seed,
            acc: Accumulator::default(),
            rows_in_group: 0,
            group: 0,
            finals: Vec::new(),
        };
        let id = VariableId(self.vars.len());
        self.by_name.insert(name.to_string(), id);
        self.values.push(var.identity());
        self.vars.push(var);
        self.bases.push(base);
        self.ignores.push(ignore);
        id
    }

    /// Folds this row's base value (None without a base) into variable `i`.
    pub(crate) fn fold(&mut self, i: usize, base_value: Option<ResultValue>) {
        let var = &mut self.vars[i];
        self.values[i] = match var.kind {
            VariableKind::Expression => base_value.unwrap_or_else(|| var.identity()),
            // The row shows the error; the aggregate is left as it was.
            _ if base_value.as_ref().is_some_and(ResultValue::is_error) => {
                base_value.unwrap_or_else(|| var.identity())
            }
            kind => {
                var.acc.fold(kind, base_value.as_ref());
                var.acc.value(kind)
            }
        };
        self.finish_row(i);
    }

    /// Counts an ignored row into the group without folding it.
    pub(crate) fn skip(&mut self, i: usize) {
        self.finish_row(i);
    }

    fn finish_row(&mut self, i: usize) {
        let var = &mut self.vars[i];
        var.rows_in_group += 1;
        if var.delayed {
            if let Some(fin) = var.finals.get(var.group) {
                self.values[i] = fin.clone();
            }
        }
    }

    /// Resets the variables scoped to any of `triggered`. With `recording`,
    /// the value each group ended with is kept as that group's final.
    pub(crate) fn reset_scoped(&mut self, triggered: &[BreakId], recording: bool) {
        for i in 0..self.vars.len() {
            let var = &self.vars[i];
            if var.kind.is_cumulative() || !var.reset_on.is_some_and(|b| triggered.contains(&b)) {
                continue;
            }
            self.reset_one(i, recording);
        }
    }

    fn reset_one(&mut self, i: usize, recording: bool) {
        let var = &mut self.vars[i];
        if var.rows_in_group > 0 {
            if recording && var.delayed {
                var.finals.push(self.values[i].clone());
            }
            var.group += 1;
        }
        var.rows_in_group = 0;
        var.acc = Accumulator::default();
        self.values[i] = var.identity();
        if let Some(expr) = self.bases[i].as_mut() {
            if var.kind == VariableKind::Expression {
                expr.rewind();
            }
        }
    }

    /// Closes the open group of every delayed variable at the end of a pre-pass.
    pub(crate) fn record_finals(&mut self) {
        for (var, value) in self.vars.iter_mut().zip(&self.values) {
            if var.delayed && var.rows_in_group > 0 {
                var.finals.push(value.clone());
            }
        }
    }

    pub(crate) fn clear_finals(&mut self) {
        self.vars.iter_mut().for_each(|v| v.finals.clear());
    }

    /// Back to the state before the first row; recorded finals are kept.
    pub(crate) fn rewind(&mut self) {
        for i in 0..self.vars.len() {
            let var = &mut self.vars[i];
            var.acc = Accumulator::default();
            var.rows_in_group = 0;
            var.group = 0;
            self.values[i] = var.identity();
            for expr in [self.bases[i].as_mut(), self.ignores[i].as_mut()].into_iter().flatten() {
                expr.rewind();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: i64) -> ResultValue {
        ResultValue::from_i64(v)
    }

    fn table_of(kinds: &[VariableKind]) -> VariableTable {
        let mut t = VariableTable::default();
        for (i, kind) in kinds.iter().enumerate() {
            t.push(&format!("v{}", i), *kind, Some(BreakId(0)), false, None, None, None);
        }
        t
    }

    fn feed(t: &mut VariableTable, rows: &[ResultValue]) {
        for row in rows {
            for i in 0..t.len() {
                t.fold(i, Some(row.clone()));
            }
        }
    }

    #[test]
    fn aggregates_over_ten_twenty_thirty() {
        use VariableKind::*;
        let mut t = table_of(&[Count, Sum, Highest, Lowest, Average, AverageAll, CountAll]);
        feed(&mut t, &[n(10), n(20), n(30)]);
        let values: Vec<_> = t.values.clone();
        assert_eq!(values, vec![n(3), n(60), n(30), n(10), n(20), n(20), n(3)]);
    }

    #[test]
    fn nulls_are_skipped_except_by_count_all() {
        use VariableKind::*;
        let mut t = table_of(&[Count, CountAll, Average, AverageAll]);
        feed(&mut t, &[n(10), ResultValue::null(ValueKind::Number), n(20)]);
        assert_eq!(t.values[0], n(2));
        assert_eq!(t.values[1], n(3));
        assert_eq!(t.values[2], n(15));
        assert_eq!(t.values[3], n(10));
    }

    #[test]
    fn reset_restores_identity_but_keeps_cumulative() {
        use VariableKind::*;
        let mut t = table_of(&[Sum, Highest, CountAll]);
        feed(&mut t, &[n(5), n(7)]);
        t.reset_scoped(&[BreakId(0)], false);
        assert_eq!(t.values[0], n(0));
        assert!(t.values[1].is_null());
        feed(&mut t, &[n(1)]);
        assert_eq!(t.values[0], n(1));
        assert_eq!(t.values[1], n(1));
        assert_eq!(t.values[2], n(3));
    }

    #[test]
    fn unrelated_break_does_not_reset() {
        let mut t = table_of(&[VariableKind::Sum]);
        feed(&mut t, &[n(5)]);
        t.reset_scoped(&[BreakId(1)], false);
        assert_eq!(t.values[0], n(5));
    }

    #[test]
    fn error_rows_show_the_error_without_folding() {
        let mut t = table_of(&[VariableKind::Sum]);
        feed(&mut t, &[n(1), ResultValue::error("bad")]);
        assert_eq!(t.values[0].error_message(), Some("bad"));
        feed(&mut t, &[n(2)]);
        assert_eq!(t.values[0], n(3));
    }

    #[test]
    fn overflow_sticks_until_reset() {
        let mut t = table_of(&[VariableKind::Sum]);
        let widest: BigDecimal = "9".repeat(10_000).parse().unwrap();
        feed(&mut t, &[ResultValue::number(widest), n(1)]);
        assert!(t.values[0].is_error());
        feed(&mut t, &[n(1)]);
        assert!(t.values[0].is_error());
        t.reset_scoped(&[BreakId(0)], false);
        feed(&mut t, &[n(2)]);
        assert_eq!(t.values[0], n(2));
    }

    #[test]
    fn mixed_types_in_highest_are_an_error() {
        let mut t = table_of(&[VariableKind::Highest]);
        feed(&mut t, &[n(1), ResultValue::string("x")]);
        assert!(t.values[0].is_error());
    }

    #[test]
    fn delayed_variable_shows_recorded_finals() {
        let mut t = VariableTable::default();
        t.push("total", VariableKind::Sum, Some(BreakId(0)), true, None, None, None);

        // Pre-pass: groups [1, 2] and [3].
        for (reset, v) in [(false, 1), (false, 2), (true, 3)] {
            if reset {
                t.reset_scoped(&[BreakId(0)], true);
            }
            t.fold(0, Some(n(v)));
        }
        t.record_finals();
        assert_eq!(t.vars[0].finals(), &[n(3), n(3)]);

        t.rewind();
        t.fold(0, Some(n(1)));
        assert_eq!(t.values[0], n(3));
    }
}
