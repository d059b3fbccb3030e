//! FILENAME: core/report-engine/src/breaks.rs
//! PURPOSE: Group-change detection.
//! CONTEXT: Breaks are kept outermost first. Each row, every break's field
//! values are compared with the values captured at its last trigger; the
//! first break that differs triggers together with every finer break after
//! it. The first row after a rewind triggers all of them.

use smallvec::SmallVec;
use tabula_engine::{BreakId, Expr, ResultValue};

/// Snapshot of one break's field values.
pub(crate) type FieldValues = SmallVec<[ResultValue; 4]>;

/// Passed to per-break callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakEvent<'a> {
    pub id: BreakId,
    pub name: &'a str,
    /// Row number of the main cursor at the trigger.
    pub row_number: u64,
}

pub type BreakCallback = Box<dyn FnMut(&BreakEvent<'_>)>;

pub struct Break {
    pub(crate) name: String,
    pub(crate) fields: Vec<Expr>,
    last: Option<FieldValues>,
    /// Rows seen since the last trigger, including the current one.
    pub(crate) row_number: u64,
    pub(crate) callbacks: Vec<BreakCallback>,
}

impl std::fmt::Debug for Break {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Break")
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .field("row_number", &self.row_number)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl Break {
    pub(crate) fn new(name: &str, fields: Vec<Expr>) -> Self {
        Break {
            name: name.to_string(),
            fields,
            last: None,
            row_number: 0,
            callbacks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn row_number(&self) -> u64 {
        self.row_number
    }

    /// True if the values differ from the last captured ones.
    pub(crate) fn differs(&self, values: &FieldValues) -> bool {
        self.last.as_ref() != Some(values)
    }

    pub(crate) fn capture(&mut self, values: FieldValues) {
        self.last = Some(values);
        self.row_number = 0;
    }

    fn rewind(&mut self) {
        self.last = None;
        self.row_number = 0;
        for field in &mut self.fields {
            field.rewind();
        }
    }
}

/// All breaks of a report, outermost first.
#[derive(Debug, Default)]
pub struct BreakTable {
    pub(crate) breaks: Vec<Break>,
}

impl BreakTable {
    pub fn find(&self, name: &str) -> Option<BreakId> {
        self.breaks.iter().position(|b| b.name == name).map(BreakId)
    }

    pub fn get(&self, id: BreakId) -> Option<&Break> {
        self.breaks.get(id.0)
    }

    pub(crate) fn push(&mut self, brk: Break) -> BreakId {
        self.breaks.push(brk);
        BreakId(self.breaks.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.breaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breaks.is_empty()
    }

    /// Index of the outermost break whose values changed, given the values of
    /// every break in order.
    pub(crate) fn first_triggered(&self, values: &[FieldValues]) -> Option<usize> {
        self.breaks
            .iter()
            .zip(values)
            .position(|(brk, v)| brk.differs(v))
    }

    /// Counts the current row in every break's group.
    pub(crate) fn count_row(&mut self) {
        for brk in &mut self.breaks {
            brk.row_number += 1;
        }
    }

    pub(crate) fn rewind(&mut self) {
        self.breaks.iter_mut().for_each(Break::rewind);
    }

    /// Within-group row number of the named break.
    pub fn row_number(&self, name: &str) -> Option<u64> {
        self.breaks
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.row_number)
    }
}
