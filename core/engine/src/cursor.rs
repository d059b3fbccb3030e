//! FILENAME: core/engine/src/cursor.rs
//! PURPOSE: Forward-only row streams over datasources.
//! CONTEXT: A `Cursor` wraps one query's `Datasource` and snapshots each fetched
//! row, so the previous row stays available for break detection and a matched
//! follower can un-read rows it scanned past. `CursorSet` owns every cursor of
//! an engine and answers column lookups for resolution and evaluation.

use std::collections::VecDeque;

use crate::datetime::{Datetime, Interval};
use crate::error::{EngineError, EngineResult};
use crate::evaluator::RowSource;
use crate::expr::CursorId;
use crate::number;
use crate::resolver::ResolveScope;
use crate::value::{ResultValue, ValueKind};

// ============================================================================
// DATASOURCE
// ============================================================================

/// A provider of rows for one query.
pub trait Datasource {
    /// Rewinds to before the first row.
    fn start(&mut self) -> EngineResult<()>;

    /// Moves to the next row; false at end of data.
    fn next(&mut self) -> EngineResult<bool>;

    fn column_count(&self) -> usize;

    fn column_name(&self, index: usize) -> Option<&str>;

    /// Value of a column in the current row.
    fn column_value(&self, index: usize) -> ResultValue;

    fn column_type(&self, index: usize) -> ValueKind;
}

/// In-memory rows given as text, converted by declared column type.
/// Empty cells are nulls.
#[derive(Debug, Clone)]
pub struct ArrayDatasource {
    columns: Vec<(String, ValueKind)>,
    rows: Vec<Vec<String>>,
    /// Index of the current row plus one; 0 before the first row.
    position: usize,
}

impl ArrayDatasource {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = (S, ValueKind)>) -> Self {
        ArrayDatasource {
            columns: columns.into_iter().map(|(n, k)| (n.into(), k)).collect(),
            rows: Vec::new(),
            position: 0,
        }
    }

    /// Appends a row; missing trailing cells are nulls.
    pub fn row<S: AsRef<str>>(mut self, cells: &[S]) -> Self {
        self.push_row(cells);
        self
    }

    pub fn push_row<S: AsRef<str>>(&mut self, cells: &[S]) {
        self.rows.push(cells.iter().map(|c| c.as_ref().to_string()).collect());
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn convert(text: &str, kind: ValueKind) -> ResultValue {
        if text.is_empty() {
            return ResultValue::null(kind);
        }
        match kind {
            ValueKind::Number => number::parse(text)
                .map(ResultValue::number)
                .unwrap_or_else(|| ResultValue::error(format!("invalid number '{}'", text))),
            ValueKind::Datetime => Datetime::parse(text)
                .map(ResultValue::datetime)
                .unwrap_or_else(|| ResultValue::error(format!("invalid datetime '{}'", text))),
            ValueKind::Interval => Interval::parse(text)
                .map(ResultValue::interval)
                .unwrap_or_else(|| ResultValue::error(format!("invalid interval '{}'", text))),
            ValueKind::String => ResultValue::string(text),
            ValueKind::Error => ResultValue::error(text),
        }
    }
}

impl Datasource for ArrayDatasource {
    fn start(&mut self) -> EngineResult<()> {
        self.position = 0;
        Ok(())
    }

    fn next(&mut self) -> EngineResult<bool> {
        if self.position < self.rows.len() {
            self.position += 1;
            Ok(true)
        } else {
            self.position = self.rows.len() + 1;
            Ok(false)
        }
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|(name, _)| name.as_str())
    }

    fn column_value(&self, index: usize) -> ResultValue {
        let kind = self.column_type(index);
        let cell = self
            .position
            .checked_sub(1)
            .and_then(|row| self.rows.get(row))
            .and_then(|row| row.get(index));
        match cell {
            Some(text) => Self::convert(text, kind),
            None => ResultValue::null(kind),
        }
    }

    fn column_type(&self, index: usize) -> ValueKind {
        self.columns
            .get(index)
            .map_or(ValueKind::String, |(_, kind)| *kind)
    }
}

// ============================================================================
// CURSOR
// ============================================================================

type Row = Vec<ResultValue>;

/// A named, forward-only position in a datasource.
pub struct Cursor {
    name: String,
    source: Box<dyn Datasource>,
    columns: Vec<String>,
    kinds: Vec<ValueKind>,
    current: Option<Row>,
    previous: Option<Row>,
    /// Rows handed back by a matched scan, returned before fetching again.
    pushback: VecDeque<Row>,
    row_number: u64,
    source_done: bool,
    eof: bool,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("row_number", &self.row_number)
            .field("eof", &self.eof)
            .finish()
    }
}

impl Cursor {
    pub fn new(name: &str, source: Box<dyn Datasource>) -> Self {
        let count = source.column_count();
        let columns = (0..count)
            .map(|i| source.column_name(i).unwrap_or_default().to_string())
            .collect();
        let kinds = (0..count).map(|i| source.column_type(i)).collect();
        Cursor {
            name: name.to_string(),
            source,
            columns,
            kinds,
            current: None,
            previous: None,
            pushback: VecDeque::new(),
            row_number: 0,
            source_done: false,
            eof: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rewinds to before the first row.
    pub fn start(&mut self) -> EngineResult<()> {
        self.source.start()?;
        self.current = None;
        self.previous = None;
        self.pushback.clear();
        self.row_number = 0;
        self.source_done = false;
        self.eof = false;
        Ok(())
    }

    /// Advances one row, keeping the row left behind as the previous row.
    pub fn next(&mut self) -> EngineResult<bool> {
        self.previous = self.current.take();
        let row = match self.pushback.pop_front() {
            Some(row) => Some(row),
            None if self.source_done => None,
            None => {
                if self.source.next()? {
                    Some(self.snapshot())
                } else {
                    self.source_done = true;
                    None
                }
            }
        };
        match row {
            Some(row) => {
                self.current = Some(row);
                self.row_number += 1;
                log::trace!("CURSOR '{}' at row {}", self.name, self.row_number);
                Ok(true)
            }
            None => {
                self.eof = true;
                Ok(false)
            }
        }
    }

    fn snapshot(&self) -> Row {
        (0..self.columns.len()).map(|i| self.source.column_value(i)).collect()
    }

    /// Returns scanned rows to the stream. The cursor is left without a
    /// current row and the rows come back, in order, on the next fetches.
    pub(crate) fn unread(&mut self, rows: Vec<Row>) {
        self.row_number = self.row_number.saturating_sub(rows.len() as u64);
        for row in rows.into_iter().rev() {
            self.pushback.push_front(row);
        }
        self.current = None;
        self.eof = false;
    }

    pub(crate) fn current_row(&self) -> Option<&[ResultValue]> {
        self.current.as_deref()
    }

    pub fn has_row(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// 1-based number of the current row; 0 before the first fetch.
    pub fn row_number(&self) -> u64 {
        self.row_number
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(String::as_str)
    }

    pub fn column_type(&self, index: usize) -> ValueKind {
        self.kinds.get(index).copied().unwrap_or(ValueKind::String)
    }

    /// Column index by name: exact match first, then ASCII case-insensitive.
    pub fn column_index(&self, name: &str, case_insensitive: bool) -> Option<usize> {
        self.columns.iter().position(|c| c == name).or_else(|| {
            case_insensitive
                .then(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
                .flatten()
        })
    }

    /// Current row's value, or a typed null without a current row.
    pub fn value(&self, index: usize) -> ResultValue {
        Self::read(self.current.as_deref(), index, self.column_type(index))
    }

    /// Value of the row before the current one.
    pub fn previous_value(&self, index: usize) -> ResultValue {
        Self::read(self.previous.as_deref(), index, self.column_type(index))
    }

    fn read(row: Option<&[ResultValue]>, index: usize, kind: ValueKind) -> ResultValue {
        row.and_then(|r| r.get(index))
            .cloned()
            .unwrap_or_else(|| ResultValue::null(kind))
    }
}

// ============================================================================
// CURSOR SET
// ============================================================================

/// All cursors of one engine, addressed by `CursorId`. Ids are never reused.
#[derive(Debug, Default)]
pub struct CursorSet {
    cursors: Vec<Option<Cursor>>,
    main: Option<CursorId>,
    case_insensitive: bool,
}

impl CursorSet {
    pub fn new(case_insensitive: bool) -> Self {
        CursorSet {
            cursors: Vec::new(),
            main: None,
            case_insensitive,
        }
    }

    pub fn add(&mut self, name: &str, source: Box<dyn Datasource>) -> EngineResult<CursorId> {
        if self.find(name).is_some() {
            return Err(EngineError::DuplicateCursor(name.to_string()));
        }
        let id = CursorId(self.cursors.len());
        self.cursors.push(Some(Cursor::new(name, source)));
        if self.main.is_none() {
            self.main = Some(id);
        }
        log::debug!("FOLLOWER added cursor '{}' as {:?}", name, id);
        Ok(id)
    }

    /// Destroys a cursor. Edges touching it must be dropped by the caller.
    pub fn remove(&mut self, id: CursorId) -> EngineResult<Cursor> {
        let cursor = self
            .cursors
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or_else(|| EngineError::UnknownCursor(format!("{:?}", id)))?;
        if self.main == Some(id) {
            let first = self.ids().next();
            self.main = first;
        }
        Ok(cursor)
    }

    pub fn find(&self, name: &str) -> Option<CursorId> {
        self.ids().find(|id| self.get(*id).is_some_and(|c| c.name() == name))
    }

    pub fn contains(&self, id: CursorId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: CursorId) -> Option<&Cursor> {
        self.cursors.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: CursorId) -> Option<&mut Cursor> {
        self.cursors.get_mut(id.0).and_then(Option::as_mut)
    }

    pub(crate) fn cursor_mut(&mut self, id: CursorId) -> EngineResult<&mut Cursor> {
        self.get_mut(id)
            .ok_or_else(|| EngineError::UnknownCursor(format!("{:?}", id)))
    }

    /// Live cursor ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = CursorId> + '_ {
        self.cursors
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_some())
            .map(|(i, _)| CursorId(i))
    }

    pub fn len(&self) -> usize {
        self.ids().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The cursor whose row number `r.rownum` reports; the first one added by default.
    pub fn main(&self) -> Option<CursorId> {
        self.main
    }

    pub fn set_main(&mut self, id: CursorId) -> EngineResult<()> {
        if !self.contains(id) {
            return Err(EngineError::UnknownCursor(format!("{:?}", id)));
        }
        self.main = Some(id);
        Ok(())
    }

    /// Column lookup limited to `allowed` cursors, all live cursors when None.
    pub(crate) fn lookup_column(
        &self,
        query: Option<&str>,
        name: &str,
        allowed: Option<&[CursorId]>,
    ) -> Option<(CursorId, usize)> {
        let candidates: Vec<CursorId> = match query {
            Some(q) => self.find(q).into_iter().collect(),
            None => self.ids().collect(),
        };
        let visible = |id: &CursorId| allowed.map_or(true, |a| a.contains(id));
        let search = |insensitive: bool| {
            candidates.iter().filter(|id| visible(id)).find_map(|id| {
                let cursor = self.get(*id)?;
                cursor.column_index(name, insensitive).map(|i| (*id, i))
            })
        };
        search(false).or_else(|| if self.case_insensitive { search(true) } else { None })
    }
}

impl ResolveScope for CursorSet {
    fn resolve_column(&self, query: Option<&str>, name: &str) -> Option<(CursorId, usize)> {
        self.lookup_column(query, name, None)
    }

    fn has_query(&self, query: &str) -> bool {
        self.find(query).is_some()
    }
}

impl RowSource for CursorSet {
    fn column_value(&self, cursor: CursorId, column: usize) -> ResultValue {
        match self.get(cursor) {
            Some(c) => c.value(column),
            None => ResultValue::error(format!("cursor {:?} no longer exists", cursor)),
        }
    }

    fn row_number(&self) -> u64 {
        self.main
            .and_then(|id| self.get(id))
            .map_or(0, Cursor::row_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> ArrayDatasource {
        ArrayDatasource::new([("id", ValueKind::Number), ("Name", ValueKind::String)])
            .row(&["1", "Ann"])
            .row(&["2", ""])
            .row(&["x", "Cy"])
    }

    #[test]
    fn array_datasource_converts_by_column_type() {
        let mut c = Cursor::new("p", Box::new(people()));
        c.start().unwrap();
        assert!(c.next().unwrap());
        assert_eq!(c.value(0), ResultValue::from_i64(1));
        assert_eq!(c.value(1), ResultValue::string("Ann"));
        assert!(c.next().unwrap());
        assert!(c.value(1).is_null());
        assert_eq!(c.value(1).kind(), ValueKind::String);
        assert!(c.next().unwrap());
        assert!(c.value(0).is_error());
        assert!(!c.next().unwrap());
        assert!(c.is_eof());
        assert!(c.value(0).is_null());
    }

    #[test]
    fn keeps_previous_row_and_row_number() {
        let mut c = Cursor::new("p", Box::new(people()));
        c.start().unwrap();
        c.next().unwrap();
        c.next().unwrap();
        assert_eq!(c.row_number(), 2);
        assert_eq!(c.previous_value(1), ResultValue::string("Ann"));
        c.start().unwrap();
        assert_eq!(c.row_number(), 0);
        assert!(!c.has_row());
    }

    #[test]
    fn unread_rows_come_back_in_order() {
        let mut c = Cursor::new("p", Box::new(people()));
        c.start().unwrap();
        c.next().unwrap();
        let mut scanned = Vec::new();
        while c.next().unwrap() {
            scanned.push(c.current_row().unwrap().to_vec());
        }
        assert!(c.is_eof());
        c.unread(scanned);
        assert!(!c.is_eof());
        assert!(!c.has_row());
        assert_eq!(c.row_number(), 1);
        assert!(c.next().unwrap());
        assert_eq!(c.row_number(), 2);
        assert!(c.value(1).is_null());
    }

    #[test]
    fn column_lookup_prefers_exact_case() {
        let mut set = CursorSet::new(true);
        let p = set.add("p", Box::new(people())).unwrap();
        assert_eq!(set.resolve_column(None, "Name"), Some((p, 1)));
        assert_eq!(set.resolve_column(None, "name"), Some((p, 1)));
        assert_eq!(set.resolve_column(Some("p"), "ID"), Some((p, 0)));
        assert_eq!(set.resolve_column(Some("q"), "id"), None);

        let strict = {
            let mut s = CursorSet::new(false);
            s.add("p", Box::new(people())).unwrap();
            s
        };
        assert_eq!(strict.resolve_column(None, "name"), None);
    }

    #[test]
    fn duplicate_names_and_removal() {
        let mut set = CursorSet::new(true);
        let p = set.add("p", Box::new(people())).unwrap();
        assert_eq!(
            set.add("p", Box::new(people())).unwrap_err(),
            EngineError::DuplicateCursor("p".into())
        );
        let q = set.add("q", Box::new(people())).unwrap();
        assert_eq!(set.main(), Some(p));
        set.remove(p).unwrap();
        assert_eq!(set.main(), Some(q));
        assert!(set.remove(p).is_err());
        assert_eq!(set.len(), 1);
        set.remove(q).unwrap();
        assert_eq!(set.main(), None);
    }
}
