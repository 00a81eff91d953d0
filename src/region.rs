#![deny(missing_docs)]
//! The input region tree, rendered as a flat, index-addressed forest.
//!
//! The source region tree (§3) is genuinely recursive: a `Region` has a
//! graph of children, each of which is either an IL block or another
//! nested `Region`. Modeling that directly as `Box<Region>` recursion
//! fights the borrow checker the moment the driver (§4.1) needs to walk
//! down into a nested region and then write the structured result back
//! into the *parent's* graph in place. This module generalizes the same
//! arena technique the rest of this codebase uses for its own region
//! graph: every region lives in one flat `Vec`, addressed by [`RegionId`],
//! and a nested region is referenced by id rather than owned inline. The
//! driver in [`crate::structuring`] can then use a plain explicit stack
//! and a `parent_map: HashMap<RegionId, RegionId>` (per §9's "worklists
//! vs recursion" note) with no recursive ownership and no unsafe code.

use std::fmt::{self, Display};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::ast::AstNode;
use crate::cfg_dot::RenderableNode;
use crate::il::{Addr, IlBlock};

/// An index into a [`RegionForest`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RegionId {
    index: usize,
}

impl RegionId {
    /// Creates a `RegionId` from a raw arena index. Only [`RegionForest`]
    /// should mint these in practice; exposed for test fixtures.
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Region({})", self.index)
    }
}

/// How a node's successor was reached, mirroring the IL terminator it came
/// from. Used by the reaching-condition solver to know whether an edge's
/// predicate is a branch condition or unconditional fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlFlowEdgeType {
    /// The edge is the taken side of a `ConditionalJump`.
    Branch {
        /// Whether this edge is the true-branch (`false` for the
        /// fallthrough/false side).
        is_true_branch: bool,
    },
    /// The edge is an unconditional `Jump` or implicit fallthrough.
    Fallthrough,
}

/// A single member of a region's graph: either a raw IL block, a
/// reference to another region in the same forest, or the already-
/// structured replacement for one of the above (written in place by the
/// driver once a sub-region or block has been structured).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegionMember {
    /// An unstructured IL block.
    Block(IlBlock),
    /// A nested region, referenced by id.
    SubRegion(RegionId),
    /// The structured replacement for a `Block` or `SubRegion` slot.
    Structured(AstNode),
}

impl RegionMember {
    /// The address this member is reachable at, used to resolve jump
    /// targets and successor identities.
    pub fn addr(&self, forest: &RegionForest) -> Option<Addr> {
        match self {
            RegionMember::Block(block) => Some(block.addr),
            RegionMember::SubRegion(id) => forest.get(*id).ok().map(|r| r.head_addr(forest)),
            RegionMember::Structured(node) => node.addr(),
        }
    }

    /// True if this member is already a [`RegionMember::SubRegion`].
    pub fn is_sub_region(&self) -> bool {
        matches!(self, RegionMember::SubRegion(_))
    }

    /// A best-effort address lookup that does not require the owning
    /// [`RegionForest`] -- `None` only for an unsubstituted `SubRegion`,
    /// which the cyclic structurer never encounters (children are always
    /// structured before their parent).
    pub(crate) fn addr_no_forest(&self) -> Option<Addr> {
        match self {
            RegionMember::Block(block) => Some(block.addr),
            RegionMember::Structured(node) => node.addr(),
            RegionMember::SubRegion(_) => None,
        }
    }
}

impl RenderableNode for RegionMember {
    fn render_node(&self, padding: usize) -> String {
        let pad = " ".repeat(padding);
        match self {
            RegionMember::Block(block) => block.render_node(padding),
            RegionMember::SubRegion(id) => format!("{pad}<b>{id}</b>\n"),
            RegionMember::Structured(_) => format!("{pad}&lt;structured&gt;\n"),
        }
    }
}

/// A single region: its member graph, entry node, and the addresses of
/// nodes outside the region that are reachable from it (the augmented
/// sink set the reaching-condition solver needs).
#[derive(Debug, Clone)]
pub struct RegionNode {
    id: RegionId,
    /// The member graph. Node weights are [`RegionMember`]s; edge weights
    /// record whether the edge is a taken branch or a fallthrough.
    pub graph: DiGraph<RegionMember, ControlFlowEdgeType>,
    head: NodeIndex,
    /// Addresses of nodes outside the region reachable from it.
    pub successors: Vec<Addr>,
}

impl RegionNode {
    /// The entry node of the region.
    pub fn head(&self) -> NodeIndex {
        self.head
    }

    /// The address of the entry node.
    pub fn head_addr(&self, forest: &RegionForest) -> Addr {
        self.graph[self.head]
            .addr(forest)
            .expect("region head must resolve to an address")
    }

    /// The nodes with no outgoing edges within the region.
    pub fn end_nodes(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&n| self.graph.edges(n).next().is_none())
            .collect()
    }

    /// True if the region's member graph contains a cycle.
    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Predecessors of `node`, in a deterministic (insertion) order.
    pub fn predecessors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(node, petgraph::Direction::Incoming)
            .map(|e| e.source())
            .collect()
    }

    /// Successors of `node` within the region, in a deterministic order.
    pub fn node_successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.graph.edges(node).map(|e| e.target()).collect()
    }

    /// The edge type from `from` to `to`, if such an edge exists.
    pub fn edge_type(&self, from: NodeIndex, to: NodeIndex) -> Option<ControlFlowEdgeType> {
        self.graph
            .edges(from)
            .find(|e| e.target() == to)
            .map(|e| *e.weight())
    }
}

/// The arena owning every region produced by the upstream region
/// identifier, flattened so nested regions are references rather than
/// owned recursion.
#[derive(Debug, Clone, Default)]
pub struct RegionForest {
    regions: Vec<RegionNode>,
}

impl RegionForest {
    /// Creates an empty forest.
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Registers a new region, returning its id.
    pub fn add_region(
        &mut self,
        graph: DiGraph<RegionMember, ControlFlowEdgeType>,
        head: NodeIndex,
        successors: Vec<Addr>,
    ) -> RegionId {
        let id = RegionId::new(self.regions.len());
        self.regions.push(RegionNode {
            id,
            graph,
            head,
            successors,
        });
        id
    }

    /// Looks up a region by id.
    pub fn get(&self, id: RegionId) -> Result<&RegionNode, crate::error::StructureError> {
        self.regions
            .get(id.index)
            .ok_or_else(|| crate::error::StructureError::RegionNotFound {
                region_id: id,
                backtrace: std::backtrace::Backtrace::capture(),
            })
    }

    /// Looks up a region by id, mutably.
    pub fn get_mut(&mut self, id: RegionId) -> Result<&mut RegionNode, crate::error::StructureError> {
        self.regions
            .get_mut(id.index)
            .ok_or_else(|| crate::error::StructureError::RegionNotFound {
                region_id: id,
                backtrace: std::backtrace::Backtrace::capture(),
            })
    }

    /// The number of regions in the forest.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True if the forest has no regions.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Replaces the member at `node` within `region_id`'s graph with its
    /// structured AST form -- the substitution step of the driver (§4.1).
    pub fn substitute(
        &mut self,
        region_id: RegionId,
        node: NodeIndex,
        ast: AstNode,
    ) -> Result<(), crate::error::StructureError> {
        let region = self.get_mut(region_id)?;
        if let Some(weight) = region.graph.node_weight_mut(node) {
            *weight = RegionMember::Structured(ast);
        }
        Ok(())
    }

    /// Finds the graph node in `region_id` that holds `SubRegion(child)`,
    /// used by the driver to locate where to substitute a child region's
    /// result back into its parent.
    pub fn find_sub_region_node(
        &self,
        region_id: RegionId,
        child: RegionId,
    ) -> Result<Option<NodeIndex>, crate::error::StructureError> {
        let region = self.get(region_id)?;
        Ok(region.graph.node_indices().find(|&n| {
            matches!(region.graph[n], RegionMember::SubRegion(id) if id == child)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_region(forest: &mut RegionForest, addrs: &[Addr]) -> RegionId {
        let mut graph = DiGraph::new();
        let nodes: Vec<_> = addrs
            .iter()
            .map(|&a| graph.add_node(RegionMember::Block(IlBlock::new(a))))
            .collect();
        for w in nodes.windows(2) {
            graph.add_edge(w[0], w[1], ControlFlowEdgeType::Fallthrough);
        }
        forest.add_region(graph, nodes[0], vec![])
    }

    #[test]
    fn test_add_and_get_region() {
        let mut forest = RegionForest::new();
        let id = block_region(&mut forest, &[0x10, 0x20, 0x30]);
        let region = forest.get(id).unwrap();
        assert_eq!(region.head_addr(&forest), 0x10);
        assert_eq!(region.end_nodes().len(), 1);
        assert!(!region.is_cyclic());
    }

    #[test]
    fn test_get_missing_region_errors() {
        let forest = RegionForest::new();
        assert!(forest.get(RegionId::new(0)).is_err());
    }

    #[test]
    fn test_substitute_replaces_member() {
        let mut forest = RegionForest::new();
        let id = block_region(&mut forest, &[0x10, 0x20]);
        let head = forest.get(id).unwrap().head();
        forest
            .substitute(id, head, AstNode::IlBlock(IlBlock::new(0x10)))
            .unwrap();
        assert!(matches!(
            forest.get(id).unwrap().graph[head],
            RegionMember::Structured(_)
        ));
    }

    #[test]
    fn test_find_sub_region_node() {
        let mut forest = RegionForest::new();
        let child = block_region(&mut forest, &[0x100]);
        let mut parent_graph = DiGraph::new();
        let parent_head = parent_graph.add_node(RegionMember::Block(IlBlock::new(0x0)));
        let sub = parent_graph.add_node(RegionMember::SubRegion(child));
        parent_graph.add_edge(parent_head, sub, ControlFlowEdgeType::Fallthrough);
        let parent = forest.add_region(parent_graph, parent_head, vec![]);

        let found = forest.find_sub_region_node(parent, child).unwrap();
        assert_eq!(found, Some(sub));
    }
}
