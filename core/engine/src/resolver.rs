//! FILENAME: core/engine/src/resolver.rs
//! PURPOSE: Binds identifiers and function names of a compiled expression.
//! CONTEXT: Resolution turns every name into a direct reference (cursor and
//! column index, variable index, function definition) so evaluation never
//! looks anything up by name. The lookup context is passed in explicitly
//! through `ResolveScope`; nothing is read from global state.
//!
//! DOMAINS:
//! - none / `query.`: a column of a cursor in scope
//! - `v.`: a report variable
//! - `r.`: `self` (previous value) and `rownum`
//! - `m.`: a user variable or environment entry; unknown names are null strings
//!
//! Resolution is all-or-nothing: on error the expression keeps its previous
//! bindings.

use crate::error::{EngineError, EngineResult};
use crate::expr::{Binding, CursorId, Domain, Expr, Ident, Node, NodeKind, VariableId};
use crate::functions::FunctionRegistry;
use crate::options::{EnvValue, Environment};
use crate::value::{ResultValue, ValueKind};

/// Name lookups available to the resolver.
pub trait ResolveScope {
    /// A column by name, in the named query or in any cursor when `query` is None.
    fn resolve_column(&self, query: Option<&str>, name: &str) -> Option<(CursorId, usize)>;

    /// True if a cursor of this name exists, used to tell an unknown domain
    /// from an unknown column.
    fn has_query(&self, query: &str) -> bool;

    fn resolve_variable(&self, _name: &str) -> Option<VariableId> {
        None
    }

    fn environment(&self) -> Option<&Environment> {
        None
    }
}

/// Binds every identifier and call in `expr`.
pub fn resolve(expr: &mut Expr, functions: &FunctionRegistry, scope: &dyn ResolveScope) -> EngineResult<()> {
    let mut root = expr.root.clone();
    resolve_node(&mut root, functions, scope)?;
    expr.root = root;
    expr.resolved = true;
    log::debug!("RESOLVE bound '{}'", expr.source());
    Ok(())
}

fn resolve_node(node: &mut Node, functions: &FunctionRegistry, scope: &dyn ResolveScope) -> EngineResult<()> {
    match &mut node.kind {
        NodeKind::Constant(_) => Ok(()),
        NodeKind::Ident(ident) => {
            ident.binding = bind_identifier(ident, scope)?;
            Ok(())
        }
        NodeKind::Call { name, func, args } => {
            let def = functions
                .get(name)
                .ok_or_else(|| EngineError::UnknownFunction(name.clone()))?;
            if !def.arity.accepts(args.len()) {
                return Err(EngineError::Arity {
                    name: name.clone(),
                    expected: def.arity.to_string(),
                    given: args.len(),
                });
            }
            *func = Some(def);
            for arg in args.iter_mut() {
                resolve_node(arg, functions, scope)?;
            }
            Ok(())
        }
    }
}

fn bind_identifier(ident: &Ident, scope: &dyn ResolveScope) -> EngineResult<Binding> {
    let unknown = || EngineError::UnknownIdentifier(ident.to_string());
    match ident.domain() {
        Domain::Any => scope
            .resolve_column(None, &ident.name)
            .map(|(cursor, column)| Binding::Column { cursor, column })
            .ok_or_else(unknown),
        Domain::Query(query) => {
            if !scope.has_query(query) {
                return Err(EngineError::UnknownDomain(query.to_string()));
            }
            scope
                .resolve_column(Some(query), &ident.name)
                .map(|(cursor, column)| Binding::Column { cursor, column })
                .ok_or_else(unknown)
        }
        Domain::Variable => scope
            .resolve_variable(&ident.name)
            .map(Binding::Variable)
            .ok_or_else(unknown),
        Domain::Report => match ident.name.as_str() {
            "self" => Ok(Binding::SelfValue),
            "rownum" => Ok(Binding::RowNumber),
            _ => Err(unknown()),
        },
        Domain::Environment => {
            let found = scope.environment().and_then(|env| env.lookup(&ident.name));
            Ok(match found {
                Some(EnvValue::User(v)) => Binding::UserVariable(v),
                Some(EnvValue::Environment(v)) => Binding::Environment(v),
                None => Binding::Environment(ResultValue::null(ValueKind::String)),
            })
        }
    }
}
