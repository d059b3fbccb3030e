//! FILENAME: core/engine/src/expr.rs
//! PURPOSE: The compiled expression tree owned by the engine and by reports.
//! CONTEXT: The parser's surface AST is lowered here into a uniform tree where
//! every operator is a call to a registry function (`1 + 2` becomes `add(1, 2)`).
//! Each node keeps a small ring of result slots so an expression can look at its
//! own previous evaluation (`r.self`) or at an operand's previous value
//! (`prevval()`), and so the last results can be reprinted for diagnostics.
//!
//! LIFECYCLE: compile -> resolve -> optimize (optional) -> evaluate (many times).

use std::sync::Arc;

use smallvec::SmallVec;
use tabula_parser::{Expression, Identifier, Value};

use crate::error::EngineResult;
use crate::functions::FunctionDef;
use crate::value::{Data, ResultValue, ValueKind};

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Index of a cursor inside a `CursorSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorId(pub usize);

/// Index of a report variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub usize);

/// Index of a report break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakId(pub usize);

/// What an identifier was bound to by the resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Unresolved,
    /// A column of a cursor's current row.
    Column { cursor: CursorId, column: usize },
    /// `v.name`
    Variable(VariableId),
    /// `r.self`: the enclosing expression's previous value.
    SelfValue,
    /// `r.rownum`
    RowNumber,
    /// `m.name` satisfied from the environment snapshot.
    Environment(ResultValue),
    /// `m.name` satisfied from a user-set variable.
    UserVariable(ResultValue),
}

/// The domains an identifier may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain<'a> {
    /// No domain: a column of any cursor in scope.
    Any,
    /// A named query / cursor.
    Query(&'a str),
    /// `m.`
    Environment,
    /// `r.`
    Report,
    /// `v.`
    Variable,
}

/// An identifier reference inside a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub domain: Option<String>,
    pub domain_quoted: bool,
    pub name: String,
    pub dot_prefixed: bool,
    pub binding: Binding,
}

impl Ident {
    fn from_ast(ident: &Identifier) -> Self {
        Ident {
            domain: ident.domain.clone(),
            domain_quoted: ident.domain_quoted,
            name: ident.name.clone(),
            dot_prefixed: ident.dot_prefixed,
            binding: Binding::Unresolved,
        }
    }

    /// The domain this identifier selects. Quoted domains are always queries.
    pub fn domain(&self) -> Domain<'_> {
        match self.domain.as_deref() {
            None => Domain::Any,
            Some(d) if self.domain_quoted => Domain::Query(d),
            Some("m") => Domain::Environment,
            Some("r") => Domain::Report,
            Some("v") => Domain::Variable,
            Some(d) => Domain::Query(d),
        }
    }

    fn to_ast(&self) -> Identifier {
        Identifier {
            domain: self.domain.clone(),
            domain_quoted: self.domain_quoted,
            name: self.name.clone(),
            dot_prefixed: self.dot_prefixed,
        }
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_ast())
    }
}

// ============================================================================
// NODES
// ============================================================================

#[derive(Debug, Clone)]
pub enum NodeKind {
    Constant(ResultValue),
    Ident(Ident),
    Call {
        /// Lowercased function name.
        name: String,
        /// Filled in by the resolver.
        func: Option<Arc<FunctionDef>>,
        args: Vec<Node>,
    },
}

/// A node of the compiled tree with its result ring.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Written with explicit parentheses in the source.
    pub parenthesized: bool,
    pub(crate) results: SmallVec<[ResultValue; 2]>,
}

impl Node {
    pub fn new(kind: NodeKind, slots: usize) -> Self {
        Node {
            kind,
            parenthesized: false,
            results: SmallVec::from_elem(ResultValue::default(), slots),
        }
    }

    pub fn constant(value: ResultValue, slots: usize) -> Self {
        Node::new(NodeKind::Constant(value), slots)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Constant(_))
    }

    /// The function name for call nodes.
    pub fn function_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Call { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Cached result of the given slot.
    pub fn result(&self, slot: usize) -> &ResultValue {
        &self.results[slot % self.results.len()]
    }

    pub(crate) fn reset_results(&mut self) {
        for slot in self.results.iter_mut() {
            *slot = ResultValue::default();
        }
        if let NodeKind::Call { args, .. } = &mut self.kind {
            args.iter_mut().for_each(Node::reset_results);
        }
    }

    fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Node)) {
        f(self);
        if let NodeKind::Call { args, .. } = &self.kind {
            for arg in args {
                arg.visit(f);
            }
        }
    }

    pub(crate) fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Node)) {
        f(self);
        if let NodeKind::Call { args, .. } = &mut self.kind {
            for arg in args {
                arg.visit_mut(f);
            }
        }
    }

    fn compile(expr: &Expression, slots: usize) -> Node {
        match expr {
            Expression::Literal(value) => {
                let v = match value {
                    Value::Number(n) => ResultValue::number(n.clone()),
                    Value::String(s) => ResultValue::string(s.as_str()),
                    Value::Boolean(b) => ResultValue::boolean(*b),
                };
                Node::constant(v, slots)
            }
            Expression::Identifier(ident) => Node::new(NodeKind::Ident(Ident::from_ast(ident)), slots),
            Expression::UnaryOp { op, operand } => {
                Node::call(op.function_name(), vec![Node::compile(operand, slots)], slots)
            }
            Expression::BinaryOp { left, op, right } => Node::call(
                op.function_name(),
                vec![Node::compile(left, slots), Node::compile(right, slots)],
                slots,
            ),
            Expression::Ternary {
                condition,
                then_branch,
                else_branch,
            } => Node::call(
                "iif",
                vec![
                    Node::compile(condition, slots),
                    Node::compile(then_branch, slots),
                    Node::compile(else_branch, slots),
                ],
                slots,
            ),
            Expression::FunctionCall { name, args } => Node::call(
                name,
                args.iter().map(|a| Node::compile(a, slots)).collect(),
                slots,
            ),
            Expression::Grouped(inner) => {
                let mut node = Node::compile(inner, slots);
                node.parenthesized = true;
                node
            }
        }
    }

    fn call(name: &str, args: Vec<Node>, slots: usize) -> Node {
        Node::new(
            NodeKind::Call {
                name: name.to_lowercase(),
                func: None,
                args,
            },
            slots,
        )
    }
}

/// Writes a constant so that it parses and evaluates back to the same value.
fn write_constant(f: &mut std::fmt::Formatter<'_>, value: &ResultValue) -> std::fmt::Result {
    if value.is_null() {
        let ctor = match value.kind() {
            ValueKind::String => "nulls()",
            ValueKind::Datetime => "nulldt()",
            _ => "nulln()",
        };
        return write!(f, "{}", ctor);
    }
    match &value.data {
        Data::Number(n) => write!(f, "{}", crate::number::to_plain(n)),
        Data::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
        Data::Datetime(dt) => write!(f, "stodt(\"{}\")", dt),
        Data::Interval(iv) => write!(f, "interval(\"{}\")", iv),
        Data::Error(msg) => write!(f, "error(\"{}\")", msg.replace('"', "\"\"")),
    }
}

/// Prints in function-call form, e.g. `add(1, mul(2, v.x))`.
impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            NodeKind::Constant(value) => write_constant(f, value),
            NodeKind::Ident(ident) => write!(f, "{}", ident),
            NodeKind::Call { name, args, .. } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

// ============================================================================
// EXPRESSION
// ============================================================================

/// A compiled, independently evaluable expression.
#[derive(Debug, Clone)]
pub struct Expr {
    source: String,
    pub(crate) root: Node,
    slots: usize,
    /// Slot written by the latest evaluation.
    pub(crate) current: usize,
    pub(crate) evaluations: u64,
    seed: Option<ResultValue>,
    start_with_seed: bool,
    pub(crate) resolved: bool,
}

impl Expr {
    /// Parses and compiles formula text.
    pub fn parse(source: &str, slots: usize) -> EngineResult<Expr> {
        let ast = tabula_parser::parse(source)?;
        log::debug!("EXPR parsed '{}'", source);
        Ok(Expr::from_ast(source, &ast, slots))
    }

    pub fn from_ast(source: &str, ast: &Expression, slots: usize) -> Expr {
        let slots = slots.max(2);
        Expr {
            source: source.to_string(),
            root: Node::compile(ast, slots),
            slots,
            current: 0,
            evaluations: 0,
            seed: None,
            start_with_seed: false,
            resolved: false,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// True if the whole tree folded into a single constant.
    pub fn is_constant(&self) -> bool {
        self.root.is_constant()
    }

    /// Result of the latest evaluation.
    pub fn result(&self) -> &ResultValue {
        self.root.result(self.current)
    }

    /// Result of the evaluation before the latest one.
    pub fn previous_result(&self) -> &ResultValue {
        self.root.result(self.previous_slot())
    }

    pub(crate) fn previous_slot(&self) -> usize {
        (self.current + self.slots - 1) % self.slots
    }

    pub fn evaluation_count(&self) -> u64 {
        self.evaluations
    }

    /// Sets the value `r.self` sees before the first evaluation.
    pub fn set_seed(&mut self, seed: ResultValue) {
        self.seed = Some(seed);
        self.rewind();
    }

    pub fn seed(&self) -> Option<&ResultValue> {
        self.seed.as_ref()
    }

    /// When set, the first evaluation returns the seed instead of evaluating.
    pub fn set_start_with_seed(&mut self, start_with_seed: bool) {
        self.start_with_seed = start_with_seed;
    }

    pub fn start_with_seed(&self) -> bool {
        self.start_with_seed
    }

    /// Forgets all previous results so evaluation starts over from the seed.
    pub fn rewind(&mut self) {
        self.root.reset_results();
        self.current = 0;
        self.evaluations = 0;
        if let Some(seed) = &self.seed {
            for slot in self.root.results.iter_mut() {
                *slot = seed.clone();
            }
        }
    }

    /// Identifiers in the tree, in evaluation order.
    pub fn identifiers(&self) -> Vec<&Ident> {
        let mut found = Vec::new();
        self.root.visit(&mut |node| {
            if let NodeKind::Ident(ident) = &node.kind {
                found.push(ident);
            }
        });
        found
    }

    /// True if any identifier is bound to `r.self`.
    pub fn references_self(&self) -> bool {
        self.identifiers()
            .iter()
            .any(|i| i.binding == Binding::SelfValue)
    }

    /// Variables referenced by this expression after resolution.
    pub fn referenced_variables(&self) -> Vec<VariableId> {
        let mut ids: Vec<VariableId> = self
            .identifiers()
            .iter()
            .filter_map(|i| match i.binding {
                Binding::Variable(id) => Some(id),
                _ => None,
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.root.visit(&mut |_| count += 1);
        count
    }
}

/// Prints the compiled tree; the text parses back to an equivalent expression.
impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root)
    }
}
