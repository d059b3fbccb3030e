//! FILENAME: core/engine/src/functions/mod.rs
//! PURPOSE: The function registry: built-in and user-registered functions.
//! CONTEXT: Every operator and function call in a compiled expression refers to
//! an entry of this registry. Names are bound once, at resolve time, so the
//! per-row evaluation never repeats a name lookup.
//!
//! Each entry carries its arity and the flags the optimizer relies on:
//! - commutative + associative: same-function operands may be flattened and
//!   their constants folded together (`add`, `mul`, `land`, ...)
//! - dont_optimize: never folded, even with constant operands (`random`, `now`)
//!
//! Null and error handling is declared per entry. By default the evaluator
//! short-circuits: the first Error operand is returned unchanged and any null
//! operand yields a null. Functions with their own rules opt out.

mod datetime;
mod logic;
mod math;
mod string;

pub(crate) use logic::compare;

use std::sync::Arc;

use bigdecimal::BigDecimal;
use rustc_hash::FxHashMap;

use crate::value::ResultValue;

pub(crate) const INVALID_OPERANDS: &str = "invalid operand(s)";

// ============================================================================
// DEFINITIONS
// ============================================================================

/// Number of arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    /// Any number of arguments, at least `min`.
    Variadic { min: usize },
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::Range(lo, hi) => count >= lo && count <= hi,
            Arity::Variadic { min } => count >= min,
        }
    }

    /// Fixed argument count, or -1 for anything not fixed.
    pub fn code(&self) -> i32 {
        match *self {
            Arity::Exact(n) => n as i32,
            _ => -1,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::Range(lo, hi) => write!(f, "{} to {}", lo, hi),
            Arity::Variadic { min } => write!(f, "at least {}", min),
        }
    }
}

/// A plain function of its evaluated operands.
pub type PureFn = fn(&[ResultValue]) -> ResultValue;

/// A host-supplied callback.
pub type ExternalFn = Arc<dyn Fn(&[ResultValue]) -> ResultValue + Send + Sync>;

/// Functions the evaluator implements itself because they need lazy
/// operands, row context or slot history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    Iif,
    PrevVal,
    RowNum,
    BrRowNum,
    Random,
}

#[derive(Clone)]
pub enum FunctionImpl {
    Pure(PureFn),
    External(ExternalFn),
    Special(Special),
}

impl std::fmt::Debug for FunctionImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionImpl::Pure(_) => write!(f, "Pure"),
            FunctionImpl::External(_) => write!(f, "External"),
            FunctionImpl::Special(s) => write!(f, "Special({:?})", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub arity: Arity,
    pub commutative: bool,
    pub associative: bool,
    pub dont_optimize: bool,
    /// Any null operand makes the result null.
    pub null_propagation: bool,
    /// The first Error operand is the result.
    pub error_propagation: bool,
    pub imp: FunctionImpl,
}

impl FunctionDef {
    pub fn new(name: &str, arity: Arity, imp: FunctionImpl) -> Self {
        FunctionDef {
            name: name.to_lowercase(),
            arity,
            commutative: false,
            associative: false,
            dont_optimize: false,
            null_propagation: true,
            error_propagation: true,
            imp,
        }
    }

    pub fn pure(name: &str, arity: Arity, f: PureFn) -> Self {
        Self::new(name, arity, FunctionImpl::Pure(f))
    }

    fn special(name: &str, arity: Arity, special: Special) -> Self {
        Self::new(name, arity, FunctionImpl::Special(special))
    }

    /// Marks the function commutative and associative.
    pub fn commutative_associative(mut self) -> Self {
        self.commutative = true;
        self.associative = true;
        self
    }

    pub fn dont_optimize(mut self) -> Self {
        self.dont_optimize = true;
        self
    }

    /// The function sees null operands itself.
    pub fn handles_nulls(mut self) -> Self {
        self.null_propagation = false;
        self
    }

    /// The function sees Error operands itself.
    pub fn handles_errors(mut self) -> Self {
        self.error_propagation = false;
        self
    }

    /// Applies a non-special function to evaluated operands, including the
    /// declared null and error short-circuits. Returns None for specials.
    pub fn apply(&self, args: &[ResultValue]) -> Option<ResultValue> {
        let f: &dyn Fn(&[ResultValue]) -> ResultValue = match &self.imp {
            FunctionImpl::Pure(f) => f,
            FunctionImpl::External(f) => f.as_ref(),
            FunctionImpl::Special(_) => return None,
        };
        if self.error_propagation {
            if let Some(err) = args.iter().find(|a| a.is_error()) {
                return Some(err.clone());
            }
        }
        if self.null_propagation {
            if let Some(null) = args.iter().find(|a| a.is_null()) {
                return Some(ResultValue::null(null.kind()));
            }
        }
        Some(f(args))
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Name-keyed function table. Cloning is cheap; definitions are shared.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: FxHashMap<String, Arc<FunctionDef>>,
}

impl FunctionRegistry {
    /// A registry without any function.
    pub fn empty() -> Self {
        FunctionRegistry {
            functions: FxHashMap::default(),
        }
    }

    /// A registry holding every built-in function.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        math::register(&mut registry);
        logic::register(&mut registry);
        string::register(&mut registry);
        datetime::register(&mut registry);

        registry.register(FunctionDef::special("iif", Arity::Exact(3), Special::Iif).handles_nulls());
        registry.register(
            FunctionDef::special("prevval", Arity::Exact(1), Special::PrevVal)
                .handles_nulls()
                .dont_optimize(),
        );
        registry.register(
            FunctionDef::special("rownum", Arity::Exact(0), Special::RowNum).dont_optimize(),
        );
        registry.register(
            FunctionDef::special("brrownum", Arity::Exact(1), Special::BrRowNum).dont_optimize(),
        );
        registry.register(
            FunctionDef::special("random", Arity::Exact(0), Special::Random).dont_optimize(),
        );
        registry
    }

    /// Adds a definition, replacing any previous one with the same name.
    pub fn register(&mut self, def: FunctionDef) {
        if self.functions.contains_key(&def.name) {
            log::debug!("FUNCTIONS replacing '{}'", def.name);
        }
        self.functions.insert(def.name.clone(), Arc::new(def));
    }

    /// Registers a host callback. Errors short-circuit before the callback
    /// runs; nulls are passed through for the callback to handle.
    pub fn register_external<F>(&mut self, name: &str, arity: Arity, callback: F)
    where
        F: Fn(&[ResultValue]) -> ResultValue + Send + Sync + 'static,
    {
        let def = FunctionDef::new(name, arity, FunctionImpl::External(Arc::new(callback)))
            .handles_nulls()
            .dont_optimize();
        self.register(def);
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.functions.remove(&name.to_lowercase()).is_some()
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<Arc<FunctionDef>> {
        match self.functions.get(name) {
            Some(def) => Some(def.clone()),
            None => self.functions.get(&name.to_lowercase()).cloned(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

pub(crate) fn invalid() -> ResultValue {
    ResultValue::error(INVALID_OPERANDS)
}

pub(crate) fn overflow() -> ResultValue {
    ResultValue::error("numeric overflow")
}

/// A number result, or an overflow error when the computation failed.
pub(crate) fn checked(n: Option<BigDecimal>) -> ResultValue {
    n.map(ResultValue::number).unwrap_or_else(overflow)
}

/// All operands as numbers, or None if any is not a number.
pub(crate) fn numbers(args: &[ResultValue]) -> Option<Vec<&BigDecimal>> {
    args.iter().map(ResultValue::as_number).collect()
}

/// Applies `f` to a single numeric operand.
pub(crate) fn unary_number(
    args: &[ResultValue],
    f: impl Fn(&BigDecimal) -> Option<BigDecimal>,
) -> ResultValue {
    match args.first().and_then(ResultValue::as_number) {
        Some(n) => f(n).map(ResultValue::number).unwrap_or_else(invalid),
        None => invalid(),
    }
}

/// Null of the given kind if any operand is null.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_operator_functions() {
        let registry = FunctionRegistry::with_builtins();
        for name in [
            "add", "sub", "mul", "div", "mod", "pow", "uminus", "uplus", "inc", "dec", "factorial",
            "eq", "ne", "lt", "le", "gt", "ge", "land", "lor", "lnot", "and", "or", "not", "xor",
            "shl", "shr", "iif",
        ] {
            assert!(registry.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn flags_follow_operator_algebra() {
        let registry = FunctionRegistry::with_builtins();
        let add = registry.get("add").unwrap();
        assert!(add.commutative && add.associative);
        assert_eq!(add.arity.code(), -1);

        let div = registry.get("div").unwrap();
        assert!(!div.commutative && !div.associative);
        let sub = registry.get("sub").unwrap();
        assert!(!sub.associative);

        for name in ["random", "now", "rownum", "brrownum", "prevval"] {
            assert!(registry.get(name).unwrap().dont_optimize, "{}", name);
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry.get("UPPER").is_some());
    }

    #[test]
    fn registering_existing_name_replaces_it() {
        let mut registry = FunctionRegistry::with_builtins();
        let before = registry.len();
        registry.register_external("upper", Arity::Exact(1), |_| ResultValue::string("replaced"));
        assert_eq!(registry.len(), before);

        let upper = registry.get("upper").unwrap();
        let out = upper.apply(&[ResultValue::string("x")]).unwrap();
        assert_eq!(out, ResultValue::string("replaced"));
    }

    #[test]
    fn errors_short_circuit_before_callbacks() {
        let mut registry = FunctionRegistry::empty();
        registry.register_external("twice", Arity::Exact(1), |_| ResultValue::from_i64(2));
        let def = registry.get("twice").unwrap();
        let out = def.apply(&[ResultValue::error("boom")]).unwrap();
        assert_eq!(out.error_message(), Some("boom"));
    }

    #[test]
    fn arity_display_and_acceptance() {
        assert!(Arity::Range(1, 2).accepts(2));
        assert!(!Arity::Exact(1).accepts(0));
        assert!(Arity::Variadic { min: 1 }.accepts(7));
        assert_eq!(Arity::Range(2, 3).to_string(), "2 to 3");
    }
}
