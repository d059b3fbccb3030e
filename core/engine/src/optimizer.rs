//! FILENAME: core/engine/src/optimizer.rs
//! PURPOSE: Value-preserving rewrites of resolved expressions.
//! CONTEXT: Runs once between resolve and the first evaluation. Rewrites are
//! applied bottom-up:
//! 1. `uplus(x)` is replaced by `x`
//! 2. left-nested chains of one associative function merge into one call,
//!    `add(add(a, b), c)` becomes `add(a, b, c)`
//! 3. calls whose operands are all constants are evaluated and replaced by
//!    the result, unless the function is marked dont_optimize
//! 4. runs of adjacent constants inside a merged call fold together
//! 5. `iif` with a constant condition becomes the chosen branch
//!
//! Operand order never changes, so grouping stays left to right.

use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::evaluator::Evaluator;
use crate::expr::{Expr, Node, NodeKind};
use crate::functions::{FunctionDef, FunctionImpl, Special};
use crate::value::{Data, ResultValue};

/// Optimizes a resolved expression in place.
pub fn optimize(expr: &mut Expr) -> EngineResult<()> {
    if !expr.is_resolved() {
        return Err(EngineError::Internal(format!(
            "optimize called on unresolved expression '{}'",
            expr.source()
        )));
    }
    let before = expr.node_count();
    // Only dont_optimize functions read the generator, so the seed is irrelevant.
    let mut evaluator = Evaluator::with_seed(0);
    optimize_node(&mut expr.root, &mut evaluator);
    expr.rewind();
    log::debug!(
        "EXPR optimized '{}': {} -> {} nodes",
        expr.source(),
        before,
        expr.node_count()
    );
    Ok(())
}

fn optimize_node(node: &mut Node, evaluator: &mut Evaluator) {
    let NodeKind::Call { name, func, args } = &mut node.kind else {
        return;
    };
    for arg in args.iter_mut() {
        optimize_node(arg, evaluator);
    }
    let Some(def) = func.clone() else {
        return;
    };

    if name == "uplus" && args.len() == 1 {
        let parenthesized = node.parenthesized;
        *node = args.swap_remove(0);
        node.parenthesized |= parenthesized;
        return;
    }

    if def.associative {
        merge_left_chain(name, args);
    }

    if def.dont_optimize {
        return;
    }

    if let FunctionImpl::Special(Special::Iif) = def.imp {
        if let Some(condition) = constant_value(&args[0]) {
            if !condition.is_error() {
                let branch = if condition.is_truthy() { 1 } else { 2 };
                let chosen = args.swap_remove(branch);
                *node = chosen;
                return;
            }
        }
    }

    if args.iter().all(Node::is_constant) {
        let value = evaluator.evaluate_node_once(node);
        let slots = node.results.len();
        *node = Node::constant(value, slots);
        return;
    }

    if def.associative {
        fold_constant_runs(node, evaluator);
    }
}

fn constant_value(node: &Node) -> Option<&ResultValue> {
    match &node.kind {
        NodeKind::Constant(v) => Some(v),
        _ => None,
    }
}

/// Splices the operands of a left-most operand calling the same function.
fn merge_left_chain(name: &str, args: &mut Vec<Node>) {
    let same = matches!(args.first().and_then(Node::function_name), Some(n) if n == name);
    if !same {
        return;
    }
    let first = args.remove(0);
    if let NodeKind::Call { args: inner, .. } = first.kind {
        args.splice(0..0, inner);
    }
}

/// Folds runs of two or more adjacent constants of the same plain type.
fn fold_constant_runs(node: &mut Node, evaluator: &mut Evaluator) {
    let slots = node.results.len();
    let NodeKind::Call { name, func, args } = &mut node.kind else {
        return;
    };
    let mut out: Vec<Node> = Vec::with_capacity(args.len());
    let mut run: Vec<Node> = Vec::new();
    for arg in args.drain(..) {
        let foldable = matches!(
            constant_value(&arg),
            Some(v) if !v.is_null() && matches!(v.data, Data::Number(_) | Data::String(_))
        );
        let same_kind = run
            .first()
            .and_then(constant_value)
            .zip(constant_value(&arg))
            .map_or(true, |(a, b)| a.kind() == b.kind());
        if foldable && same_kind {
            run.push(arg);
            continue;
        }
        flush_run(&mut run, &mut out, name, func, slots, evaluator);
        if foldable {
            run.push(arg);
        } else {
            out.push(arg);
        }
    }
    flush_run(&mut run, &mut out, name, func, slots, evaluator);
    *args = out;
}

fn flush_run(
    run: &mut Vec<Node>,
    out: &mut Vec<Node>,
    name: &str,
    func: &Option<Arc<FunctionDef>>,
    slots: usize,
    evaluator: &mut Evaluator,
) {
    if run.len() < 2 {
        out.append(run);
        return;
    }
    let mut partial = Node::new(
        NodeKind::Call {
            name: name.to_string(),
            func: func.clone(),
            args: std::mem::take(run),
        },
        slots,
    );
    let value = evaluator.evaluate_node_once(&mut partial);
    out.push(Node::constant(value, slots));
}
