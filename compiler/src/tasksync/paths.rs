//! Control-flow path enumeration
//!
//! Enumerates every maximal acyclic path from the entry node of a
//! single-entry graph. A path ends at a node without successors
//! ([`PathEnd::Exit`]) or right before a successor that is already on the
//! path ([`PathEnd::BackEdge`]), so loop headers are recorded once.
//!
//! The walk is an iterative depth-first work-list; branching clones the
//! path-so-far. Path counts grow exponentially with sequential branches, so
//! the walk is bounded by a configurable limit.

use crate::hlir::{BlockId, IrFunction};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::ControlFlow;
use thiserror::Error;

/// Default bound on the number of enumerated paths
pub const DEFAULT_MAX_PATHS: usize = 4096;

/// Read-only view of a single-entry control-flow graph
pub trait ControlFlowGraph {
    type Node: Copy + Eq + Hash + Debug;

    /// Entry node, if the graph has any nodes
    fn entry(&self) -> Option<Self::Node>;

    /// Successors of a node in edge order; may contain duplicates
    fn successors(&self, node: Self::Node) -> Vec<Self::Node>;
}

impl ControlFlowGraph for IrFunction {
    type Node = BlockId;

    fn entry(&self) -> Option<BlockId> {
        self.entry_id()
    }

    fn successors(&self, node: BlockId) -> Vec<BlockId> {
        IrFunction::successors(self, node)
    }
}

/// Path identifier; ids are handed out in discovery order starting at 0
pub type PathId = usize;

/// How a path ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathEnd {
    /// Last node has no successors
    Exit,
    /// Next node is already on the path
    BackEdge,
}

/// One enumerated path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path<N> {
    pub id: PathId,
    pub nodes: Vec<N>,
    pub end: PathEnd,
}

impl<N: PartialEq> Path<N> {
    pub fn contains(&self, node: &N) -> bool {
        self.nodes.contains(node)
    }

    pub fn is_exit(&self) -> bool {
        self.end == PathEnd::Exit
    }
}

/// Enumerated paths keyed by id
pub type PathSet<N> = BTreeMap<PathId, Path<N>>;

/// The walk produced more paths than allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("control-flow path limit of {limit} exceeded")]
pub struct PathLimitExceeded {
    pub limit: usize,
}

struct Pending<N> {
    id: PathId,
    nodes: Vec<N>,
    next: N,
}

/// Path enumerator over a [`ControlFlowGraph`]
pub struct PathEnumerator<'g, G: ControlFlowGraph> {
    graph: &'g G,
    max_paths: usize,
}

impl<'g, G: ControlFlowGraph> PathEnumerator<'g, G> {
    pub fn new(graph: &'g G) -> Self {
        Self::with_limit(graph, DEFAULT_MAX_PATHS)
    }

    pub fn with_limit(graph: &'g G, max_paths: usize) -> Self {
        Self { graph, max_paths }
    }

    /// Stream every path to `visit`, stopping as soon as it breaks
    ///
    /// Paths are delivered in completion order, which differs from id order
    /// once the graph branches.
    pub fn try_for_each_path<B, F>(&self, mut visit: F) -> Result<ControlFlow<B>, PathLimitExceeded>
    where
        F: FnMut(&Path<G::Node>) -> ControlFlow<B>,
    {
        let Some(entry) = self.graph.entry() else {
            return Ok(ControlFlow::Continue(()));
        };
        let limit = PathLimitExceeded {
            limit: self.max_paths,
        };
        if self.max_paths == 0 {
            return Err(limit);
        }

        let mut next_id: PathId = 1;
        let mut stack = vec![Pending {
            id: 0,
            nodes: Vec::new(),
            next: entry,
        }];

        while let Some(Pending {
            id,
            mut nodes,
            next,
        }) = stack.pop()
        {
            let mut node = next;
            let path = loop {
                if nodes.contains(&node) {
                    break Path {
                        id,
                        nodes,
                        end: PathEnd::BackEdge,
                    };
                }
                nodes.push(node);

                let mut succs = self.graph.successors(node);
                dedup_in_order(&mut succs);
                let Some((&first, rest)) = succs.split_first() else {
                    break Path {
                        id,
                        nodes,
                        end: PathEnd::Exit,
                    };
                };

                if next_id + rest.len() > self.max_paths {
                    return Err(limit);
                }
                let first_new = next_id;
                next_id += rest.len();
                // Reverse push so lower ids come off the stack first
                for (offset, &succ) in rest.iter().enumerate().rev() {
                    stack.push(Pending {
                        id: first_new + offset,
                        nodes: nodes.clone(),
                        next: succ,
                    });
                }
                node = first;
            };

            if let ControlFlow::Break(b) = visit(&path) {
                return Ok(ControlFlow::Break(b));
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    /// Collect every path
    pub fn enumerate(&self) -> Result<PathSet<G::Node>, PathLimitExceeded> {
        let mut paths = PathSet::new();
        let flow = self.try_for_each_path::<Infallible, _>(|path| {
            paths.insert(path.id, path.clone());
            ControlFlow::Continue(())
        })?;
        match flow {
            ControlFlow::Continue(()) => Ok(paths),
            ControlFlow::Break(never) => match never {},
        }
    }
}

fn dedup_in_order<N: PartialEq>(items: &mut Vec<N>) {
    let mut i = 0;
    while i < items.len() {
        if items[..i].contains(&items[i]) {
            items.remove(i);
        } else {
            i += 1;
        }
    }
}
