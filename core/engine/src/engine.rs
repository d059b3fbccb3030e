//! FILENAME: core/engine/src/engine.rs
//! PURPOSE: The engine facade: expressions, cursors and followers in one place.
//! CONTEXT: `Engine` owns the function registry, the environment, every cursor,
//! the follower graph and the evaluator. Navigation goes through `next()`,
//! which advances a cursor and then its followers, depth first:
//! - lockstep followers move one row; once exhausted they read as nulls
//! - matched followers keep their row while it still matches (N:1), else scan
//!   forward for the first matching row; with no match the scanned rows are
//!   handed back and the follower reads as nulls for this owner row
//!
//! A follower that moved cascades to its own followers.

use crate::cursor::{CursorSet, Datasource};
use crate::error::{EngineError, EngineResult};
use crate::evaluator::{Evaluator, RowSource};
use crate::expr::{Binding, CursorId, Expr, VariableId};
use crate::follower::{FollowerEdge, FollowerGraph, FollowerKind};
use crate::functions::FunctionRegistry;
use crate::optimizer;
use crate::options::{EngineOptions, Environment};
use crate::resolver::{self, ResolveScope};
use crate::value::ResultValue;

/// Cursor columns plus the `m.` environment.
struct Scope<'a> {
    cursors: &'a CursorSet,
    environment: &'a Environment,
}

impl ResolveScope for Scope<'_> {
    fn resolve_column(&self, query: Option<&str>, name: &str) -> Option<(CursorId, usize)> {
        self.cursors.resolve_column(query, name)
    }

    fn has_query(&self, query: &str) -> bool {
        self.cursors.has_query(query)
    }

    fn environment(&self) -> Option<&Environment> {
        Some(self.environment)
    }
}

/// Columns of exactly two cursors, nothing else.
struct MatchScope<'a> {
    cursors: &'a CursorSet,
    pair: [CursorId; 2],
}

impl ResolveScope for MatchScope<'_> {
    fn resolve_column(&self, query: Option<&str>, name: &str) -> Option<(CursorId, usize)> {
        self.cursors.lookup_column(query, name, Some(&self.pair))
    }

    fn has_query(&self, query: &str) -> bool {
        self.cursors
            .find(query)
            .is_some_and(|id| self.pair.contains(&id))
    }
}

pub struct Engine {
    options: EngineOptions,
    functions: FunctionRegistry,
    environment: Environment,
    cursors: CursorSet,
    graph: FollowerGraph,
    evaluator: Evaluator,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Engine {
            functions: FunctionRegistry::with_builtins(),
            environment: Environment::new(),
            cursors: CursorSet::new(options.case_insensitive_columns),
            graph: FollowerGraph::new(),
            evaluator: Evaluator::new(&options),
            options,
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Registry access for registering host functions. Expressions resolved
    /// earlier keep the definitions they were bound to.
    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn cursors(&self) -> &CursorSet {
        &self.cursors
    }

    pub fn graph(&self) -> &FollowerGraph {
        &self.graph
    }

    /// The evaluator and the cursors it reads, borrowed together so callers
    /// can evaluate against their own `RowSource` layered over the cursors.
    pub fn evaluation_parts(&mut self) -> (&mut Evaluator, &CursorSet) {
        (&mut self.evaluator, &self.cursors)
    }

    // ========================================================================
    // EXPRESSIONS
    // ========================================================================

    pub fn parse(&self, text: &str) -> EngineResult<Expr> {
        Expr::parse(text, self.options.slots())
    }

    /// Binds columns, `r.` and `m.` names and functions.
    pub fn resolve(&self, expr: &mut Expr) -> EngineResult<()> {
        let scope = Scope {
            cursors: &self.cursors,
            environment: &self.environment,
        };
        resolver::resolve(expr, &self.functions, &scope)
    }

    /// Resolves with variables looked up through `variables`.
    pub fn resolve_with_variables(
        &self,
        expr: &mut Expr,
        variables: &dyn Fn(&str) -> Option<VariableId>,
    ) -> EngineResult<()> {
        struct WithVariables<'a> {
            inner: Scope<'a>,
            variables: &'a dyn Fn(&str) -> Option<VariableId>,
        }

        impl ResolveScope for WithVariables<'_> {
            fn resolve_column(&self, query: Option<&str>, name: &str) -> Option<(CursorId, usize)> {
                self.inner.resolve_column(query, name)
            }

            fn has_query(&self, query: &str) -> bool {
                self.inner.has_query(query)
            }

            fn resolve_variable(&self, name: &str) -> Option<VariableId> {
                (self.variables)(name)
            }

            fn environment(&self) -> Option<&Environment> {
                self.inner.environment()
            }
        }

        let scope = WithVariables {
            inner: Scope {
                cursors: &self.cursors,
                environment: &self.environment,
            },
            variables,
        };
        resolver::resolve(expr, &self.functions, &scope)
    }

    pub fn optimize(&self, expr: &mut Expr) -> EngineResult<()> {
        optimizer::optimize(expr)
    }

    /// Parses, resolves and optimizes.
    pub fn compile(&self, text: &str) -> EngineResult<Expr> {
        let mut expr = self.parse(text)?;
        self.resolve(&mut expr)?;
        self.optimize(&mut expr)?;
        Ok(expr)
    }

    /// Evaluates against the cursors' current rows.
    pub fn evaluate(&mut self, expr: &mut Expr) -> ResultValue {
        self.evaluator.evaluate(expr, &self.cursors)
    }

    pub fn evaluate_with(&mut self, expr: &mut Expr, rows: &dyn RowSource) -> ResultValue {
        self.evaluator.evaluate(expr, rows)
    }

    // ========================================================================
    // CURSORS AND FOLLOWERS
    // ========================================================================

    pub fn add_cursor(&mut self, name: &str, source: Box<dyn Datasource>) -> EngineResult<CursorId> {
        self.cursors.add(name, source)
    }

    pub fn cursor_id(&self, name: &str) -> Option<CursorId> {
        self.cursors.find(name)
    }

    /// Destroys a cursor along with every follower edge touching it.
    pub fn remove_cursor(&mut self, id: CursorId) -> EngineResult<()> {
        self.cursors.remove(id)?;
        let dropped = self.graph.remove_cursor(id);
        log::debug!("FOLLOWER removed {:?} and {} edge(s)", id, dropped);
        Ok(())
    }

    pub fn set_main_cursor(&mut self, id: CursorId) -> EngineResult<()> {
        self.cursors.set_main(id)
    }

    fn check_endpoints(&self, owner: CursorId, target: CursorId) -> EngineResult<()> {
        for id in [owner, target] {
            if !self.cursors.contains(id) {
                return Err(EngineError::InvalidFollower(format!("cursor {:?} does not exist", id)));
            }
        }
        Ok(())
    }

    /// Makes `target` advance one row with every row of `owner`.
    pub fn add_follower(&mut self, owner: CursorId, target: CursorId) -> EngineResult<()> {
        let edge = FollowerEdge {
            owner,
            target,
            kind: FollowerKind::Lockstep,
            matcher: None,
        };
        self.check_endpoints(owner, target)
            .and_then(|()| self.graph.insert(edge))
            .inspect_err(|e| log::warn!("FOLLOWER rejected: {}", e))
    }

    /// Makes `target` follow `owner` by a join condition over the two
    /// cursors' columns, e.g. `a.id = b.a_id`.
    pub fn add_matched_follower(&mut self, owner: CursorId, target: CursorId, condition: &str) -> EngineResult<()> {
        self.try_add_matched(owner, target, condition)
            .inspect_err(|e| log::warn!("FOLLOWER rejected: {}", e))
    }

    fn try_add_matched(&mut self, owner: CursorId, target: CursorId, condition: &str) -> EngineResult<()> {
        self.check_endpoints(owner, target)?;
        self.graph.validate(owner, target)?;
        let matcher = self.compile_match(owner, target, condition)?;
        self.graph.insert(FollowerEdge {
            owner,
            target,
            kind: FollowerKind::Matched,
            matcher: Some(matcher),
        })
    }

    fn compile_match(&self, owner: CursorId, target: CursorId, condition: &str) -> EngineResult<Expr> {
        let invalid = |what: String| EngineError::InvalidMatch(format!("'{}': {}", condition, what));
        let mut expr = self.parse(condition)?;
        let scope = MatchScope {
            cursors: &self.cursors,
            pair: [owner, target],
        };
        resolver::resolve(&mut expr, &self.functions, &scope).map_err(|e| match e {
            EngineError::Syntax(_) => e,
            other => invalid(other.to_string()),
        })?;
        if let Some(ident) = expr
            .identifiers()
            .into_iter()
            .find(|i| !matches!(i.binding, Binding::Column { .. }))
        {
            return Err(invalid(format!("'{}' is not a column of the joined cursors", ident)));
        }
        optimizer::optimize(&mut expr)?;
        Ok(expr)
    }

    /// Rewinds a cursor and all of its followers.
    pub fn start(&mut self, id: CursorId) -> EngineResult<()> {
        self.cursors.cursor_mut(id)?.start()?;
        if let Some(edge) = self.graph.outgoing(id) {
            if let Some(expr) = self.graph.edges[edge].matcher.as_mut() {
                expr.rewind();
            }
            let target = self.graph.edges[edge].target;
            self.start(target)?;
        }
        Ok(())
    }

    /// Advances a cursor and its followers; false at the end of the cursor's data.
    pub fn next(&mut self, id: CursorId) -> EngineResult<bool> {
        if !self.cursors.cursor_mut(id)?.next()? {
            return Ok(false);
        }
        self.advance_followers(id)?;
        Ok(true)
    }

    fn advance_followers(&mut self, owner: CursorId) -> EngineResult<()> {
        let mut current = owner;
        while let Some(edge) = self.graph.outgoing(current) {
            let target = self.graph.edges[edge].target;
            let moved = match self.graph.edges[edge].kind {
                FollowerKind::Lockstep => {
                    let cursor = self.cursors.cursor_mut(target)?;
                    if cursor.is_eof() {
                        false
                    } else {
                        cursor.next()?
                    }
                }
                FollowerKind::Matched => self.advance_matched(edge)?,
            };
            if !moved {
                break;
            }
            current = target;
        }
        Ok(())
    }

    fn matches(&mut self, edge: usize) -> bool {
        let Some(expr) = self.graph.edges[edge].matcher.as_mut() else {
            return false;
        };
        let value = self.evaluator.evaluate(expr, &self.cursors);
        !value.is_error() && !value.is_null() && value.is_truthy()
    }

    /// Positions a matched follower for the owner's current row. Returns true
    /// if the follower now shows a matching row it did not show before.
    fn advance_matched(&mut self, edge: usize) -> EngineResult<bool> {
        let target = self.graph.edges[edge].target;
        if self.cursors.cursor_mut(target)?.has_row() && self.matches(edge) {
            return Ok(false);
        }

        let mut scanned = Vec::new();
        loop {
            let cursor = self.cursors.cursor_mut(target)?;
            if !cursor.next()? {
                break;
            }
            if self.matches(edge) {
                log::trace!("FOLLOWER {:?} matched after {} skipped row(s)", target, scanned.len());
                return Ok(true);
            }
            if let Some(row) = self.cursors.get(target).and_then(|c| c.current_row()) {
                scanned.push(row.to_vec());
            }
        }

        log::trace!("FOLLOWER {:?} has no match, handing back {} row(s)", target, scanned.len());
        self.cursors.cursor_mut(target)?.unread(scanned);
        Ok(false)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}
