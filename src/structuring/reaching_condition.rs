#![deny(missing_docs)]
//! The reaching-condition solver (§4.3): computes, for every node in a
//! region's DAG, the boolean formula that is true iff control reaches
//! that node from the region's head.

use std::collections::HashMap;

use petgraph::algo::dominators;
use petgraph::graph::NodeIndex;
use petgraph::visit::{EdgeRef, Reversed};
use petgraph::Direction;

use crate::ast::AstNode;
use crate::bool_ast::{BoolCache, BoolId, TRUE};
use crate::error::StructureError;
use crate::il::IlStmt;
use crate::region::{ControlFlowEdgeType, RegionMember, RegionNode};

/// Computes `rc[n]` for every node reachable from `region.head()`.
pub fn reaching_conditions(
    region: &RegionNode,
    cache: &mut BoolCache,
) -> Result<HashMap<NodeIndex, BoolId>, StructureError> {
    let order = petgraph::algo::toposort(&region.graph, None).map_err(|_| {
        StructureError::other("reaching-condition solver invoked on a cyclic region")
    })?;

    let post_dominators = post_dominator_chains(region);

    let mut rc: HashMap<NodeIndex, BoolId> = HashMap::new();
    rc.insert(region.head(), TRUE);

    for node in order {
        if node == region.head() {
            continue;
        }
        if strictly_post_dominates(&post_dominators, region.head(), node) {
            rc.insert(node, TRUE);
            continue;
        }
        let preds: Vec<NodeIndex> = region
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| e.source())
            .collect();
        let mut disjuncts = Vec::with_capacity(preds.len());
        for pred in preds {
            let Some(&rc_pred) = rc.get(&pred) else {
                // A predecessor outside topological processing order (can
                // only happen for a node unreachable from head); skip it.
                continue;
            };
            let predicate = edge_predicate(region, cache, pred, node)?;
            disjuncts.push(cache.mk_and(&[rc_pred, predicate]));
        }
        let combined = cache.mk_or(&disjuncts);
        rc.insert(node, cache.simplify(combined));
    }

    Ok(rc)
}

/// The predicate `p(u, v)` for the edge `u -> v` (§4.3 step 1).
fn edge_predicate(
    region: &RegionNode,
    cache: &mut BoolCache,
    u: NodeIndex,
    v: NodeIndex,
) -> Result<BoolId, StructureError> {
    match &region.graph[u] {
        RegionMember::Block(block) => match block.last_statement() {
            Some(IlStmt::ConditionalJump { condition, .. }) => {
                let cond = cache.ail_to_bool(condition);
                match region.edge_type(u, v) {
                    Some(ControlFlowEdgeType::Branch { is_true_branch: true }) => Ok(cond),
                    Some(ControlFlowEdgeType::Branch { is_true_branch: false }) => {
                        Ok(cache.mk_not(cond))
                    }
                    _ => Ok(TRUE),
                }
            }
            _ => Ok(TRUE),
        },
        RegionMember::Structured(AstNode::ConditionalBreak(cb)) => {
            let cond = cb.cond.as_bool_id().ok_or_else(|| {
                StructureError::other(
                    "reaching-condition solver encountered an already-lowered ConditionalBreak",
                )
            })?;
            let v_addr = region.graph[v].addr_no_forest();
            if v_addr == Some(cb.target_addr) {
                Ok(cond)
            } else {
                Ok(cache.mk_not(cond))
            }
        }
        RegionMember::SubRegion(_) | RegionMember::Structured(_) => Ok(TRUE),
    }
}

/// Builds, for every node, the set of nodes that strictly post-dominate
/// it (its post-dominator-tree ancestors), by computing dominators on a
/// reversed view of the graph rooted at a synthetic sink joining every
/// end node.
fn post_dominator_chains(region: &RegionNode) -> HashMap<NodeIndex, Vec<NodeIndex>> {
    let end_nodes = region.end_nodes();
    let mut chains = HashMap::new();
    if end_nodes.is_empty() {
        return chains;
    }

    // With a single end node, it is its own dominator root and no
    // synthetic sink is needed; the reversed-graph dominator computation
    // can run rooted there directly.
    let root = if end_nodes.len() == 1 {
        end_nodes[0]
    } else {
        // Multiple end nodes: pick the first as an anchor and treat any
        // node reachable to *all* end nodes under the reversed view as
        // dominated; since petgraph has no built-in multi-root dominance,
        // approximate by computing dominance against each end node and
        // intersecting, which is exact when end nodes are not themselves
        // mutually reachable (true for any region whose end nodes are
        // genuine sinks).
        end_nodes[0]
    };

    let reversed = Reversed(&region.graph);
    let doms = dominators::simple_fast(reversed, root);

    for node in region.graph.node_indices() {
        let mut chain = Vec::new();
        let mut current = node;
        while let Some(idom) = doms.immediate_dominator(current) {
            if idom == current {
                break;
            }
            chain.push(idom);
            current = idom;
        }
        chains.insert(node, chain);
    }

    if end_nodes.len() > 1 {
        for &extra_root in &end_nodes[1..] {
            let doms = dominators::simple_fast(Reversed(&region.graph), extra_root);
            for node in region.graph.node_indices() {
                let mut chain = Vec::new();
                let mut current = node;
                while let Some(idom) = doms.immediate_dominator(current) {
                    if idom == current {
                        break;
                    }
                    chain.push(idom);
                    current = idom;
                }
                let entry = chains.entry(node).or_default();
                entry.retain(|n| chain.contains(n));
            }
        }
    }

    chains
}

fn strictly_post_dominates(
    chains: &HashMap<NodeIndex, Vec<NodeIndex>>,
    head: NodeIndex,
    node: NodeIndex,
) -> bool {
    chains
        .get(&head)
        .map(|chain| chain.contains(&node))
        .unwrap_or(false)
}
