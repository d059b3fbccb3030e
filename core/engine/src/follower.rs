//! FILENAME: core/engine/src/follower.rs
//! PURPOSE: The follower graph: which cursors advance along with which owners.
//! CONTEXT: Edges run from an owner cursor to a follower (target) cursor.
//! Every insertion is validated against the whole graph before anything is
//! stored, so a rejected edge never leaves partial state behind.
//!
//! INVARIANTS:
//! - a cursor has at most one owner (one incoming edge)
//! - a cursor has at most one follower (one outgoing edge), lockstep or matched
//! - no edge duplicating or reversing an existing one
//! - no cycle
//! - both endpoints exist
//!
//! With one edge in and one edge out per cursor the graph is a set of chains.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::expr::{CursorId, Expr};

/// How a follower advances with its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowerKind {
    /// One follower row per owner row.
    Lockstep,
    /// The follower row matching the owner row by a join expression (N:1).
    Matched,
}

/// One owner-to-target edge.
#[derive(Debug, Clone)]
pub struct FollowerEdge {
    pub owner: CursorId,
    pub target: CursorId,
    pub kind: FollowerKind,
    /// Resolved join condition of a matched edge.
    pub(crate) matcher: Option<Expr>,
}

impl FollowerEdge {
    pub fn match_expression(&self) -> Option<&Expr> {
        self.matcher.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct FollowerGraph {
    pub(crate) edges: Vec<FollowerEdge>,
    /// target -> index of the single edge leading to it
    owner_of: FxHashMap<CursorId, usize>,
    /// owner -> index of the single edge leaving it
    follower_of: FxHashMap<CursorId, usize>,
}

impl FollowerGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks a proposed edge against every invariant.
    pub fn validate(&self, owner: CursorId, target: CursorId) -> EngineResult<()> {
        let reject = |why: &str| {
            Err(EngineError::InvalidFollower(format!(
                "{:?} -> {:?}: {}",
                owner, target, why
            )))
        };
        if owner == target {
            return reject("a cursor cannot follow itself");
        }
        if self.edge_between(owner, target).is_some() {
            return reject("edge already exists");
        }
        if self.edge_between(target, owner).is_some() {
            return reject("reverse edge exists");
        }
        if let Some(existing) = self.follower(owner) {
            return Err(EngineError::FollowerAlreadyLinked(format!(
                "{:?} already drives {:?}",
                owner, existing
            )));
        }
        if self.owner_of.contains_key(&target) {
            return reject("target already follows another cursor");
        }
        if self.can_reach(target, owner) {
            return reject("edge would create a cycle");
        }
        Ok(())
    }

    /// Stores an edge after validation.
    pub(crate) fn insert(&mut self, edge: FollowerEdge) -> EngineResult<()> {
        self.validate(edge.owner, edge.target)?;
        log::debug!(
            "FOLLOWER {:?} edge {:?} -> {:?}",
            edge.kind,
            edge.owner,
            edge.target
        );
        self.owner_of.insert(edge.target, self.edges.len());
        self.follower_of.insert(edge.owner, self.edges.len());
        self.edges.push(edge);
        Ok(())
    }

    /// Drops every edge touching `cursor`; returns how many were dropped.
    pub fn remove_cursor(&mut self, cursor: CursorId) -> usize {
        let before = self.edges.len();
        self.edges.retain(|e| e.owner != cursor && e.target != cursor);
        self.reindex();
        before - self.edges.len()
    }

    fn reindex(&mut self) {
        self.owner_of = self
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| (e.target, i))
            .collect();
        self.follower_of = self
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| (e.owner, i))
            .collect();
    }

    pub fn edge_between(&self, owner: CursorId, target: CursorId) -> Option<&FollowerEdge> {
        self.owner_of
            .get(&target)
            .map(|&i| &self.edges[i])
            .filter(|e| e.owner == owner)
    }

    /// The owner a cursor follows, if any.
    pub fn owner(&self, target: CursorId) -> Option<CursorId> {
        self.owner_of.get(&target).map(|&i| self.edges[i].owner)
    }

    /// Index of the edge leaving `owner`.
    pub(crate) fn outgoing(&self, owner: CursorId) -> Option<usize> {
        self.follower_of.get(&owner).copied()
    }

    /// The cursor that follows `owner`, if any.
    pub fn follower(&self, owner: CursorId) -> Option<CursorId> {
        self.outgoing(owner).map(|i| self.edges[i].target)
    }

    pub fn edges(&self) -> &[FollowerEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// True if `target` is reachable from `start` along the chain.
    fn can_reach(&self, start: CursorId, target: CursorId) -> bool {
        let mut visited = FxHashSet::default();
        let mut current = Some(start);

        while let Some(cursor) = current {
            if cursor == target {
                return true;
            }
            if !visited.insert(cursor) {
                break;
            }
            current = self.follower(cursor);
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lockstep(owner: usize, target: usize) -> FollowerEdge {
        FollowerEdge {
            owner: CursorId(owner),
            target: CursorId(target),
            kind: FollowerKind::Lockstep,
            matcher: None,
        }
    }

    fn graph(edges: &[(usize, usize)]) -> FollowerGraph {
        let mut g = FollowerGraph::new();
        for &(o, t) in edges {
            g.insert(lockstep(o, t)).unwrap();
        }
        g
    }

    fn assert_rejected(g: &mut FollowerGraph, owner: usize, target: usize) {
        let before = g.len();
        assert!(matches!(
            g.insert(lockstep(owner, target)),
            Err(EngineError::InvalidFollower(_) | EngineError::FollowerAlreadyLinked(_))
        ));
        assert_eq!(g.len(), before);
    }

    #[test]
    fn rejects_duplicate_and_reverse_edges() {
        let mut g = graph(&[(0, 1)]);
        assert_rejected(&mut g, 0, 1);
        assert_rejected(&mut g, 1, 0);
        assert_rejected(&mut g, 1, 1);
    }

    #[test]
    fn rejects_cycles() {
        let mut g = graph(&[(0, 1), (1, 2)]);
        assert_rejected(&mut g, 2, 0);
        g.insert(lockstep(2, 3)).unwrap();
        assert_rejected(&mut g, 3, 0);
        assert_rejected(&mut g, 3, 1);
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn an_owner_drives_a_single_follower() {
        let mut g = graph(&[(0, 1), (1, 2)]);
        assert_eq!(g.follower(CursorId(0)), Some(CursorId(1)));
        assert_eq!(g.owner(CursorId(2)), Some(CursorId(1)));
        assert!(matches!(
            g.validate(CursorId(0), CursorId(3)),
            Err(EngineError::FollowerAlreadyLinked(_))
        ));
        assert_rejected(&mut g, 0, 3);
        assert_rejected(&mut g, 0, 2);
        assert_eq!(g.follower(CursorId(0)), Some(CursorId(1)));
        g.insert(lockstep(2, 3)).unwrap();
    }

    #[test]
    fn removing_a_cursor_drops_its_edges() {
        let mut g = graph(&[(0, 1), (1, 2)]);
        assert_eq!(g.remove_cursor(CursorId(1)), 2);
        assert_eq!(g.follower(CursorId(0)), None);
        assert_eq!(g.owner(CursorId(2)), None);
        g.insert(lockstep(0, 2)).unwrap();
        g.insert(lockstep(2, 3)).unwrap();
    }

    #[test]
    fn kind_serializes_lowercase() {
        let text = serde_json::to_string(&FollowerKind::Matched).unwrap();
        assert_eq!(text, "\"matched\"");
    }
}
