#![deny(missing_docs)]
//! The cyclic structuring pipeline (§4.4-4.5): folds a region whose graph
//! contains a back edge into head into a `while`, `do-while`, or endless
//! `Loop` node, emitting `Break`/`ConditionalBreak` for every other exit.
//!
//! By the time this runs, the driver (§4.1) has already structured every
//! child region bottom-up, so a region handed here never contains an
//! un-substituted `RegionMember::SubRegion`; every non-loop-body member is
//! either a raw block or an already-structured node representing the
//! control flow that continues past the loop.
//!
//! The body walk below is a direct, single-path-with-one-branch-point
//! traversal rather than a reuse of the acyclic reaching-condition solver:
//! deleting a loop's back edges to make it acyclic would also corrupt the
//! post-dominance relationships that solver depends on (a node that is
//! genuinely conditional inside the loop can appear to unconditionally
//! post-dominate head once the edge that used to go around it is gone).
//! Loop headers and latches in practice branch at most once per node, so
//! this direct walk covers the common shapes; a node with more than two
//! successors, or a two-successor branch whose edges cannot both be
//! classified as true/false sides of the same `ConditionalJump`, is
//! reported as [`StructureError::LoopExitAmbiguous`] rather than guessed
//! at (documented limitation, see `DESIGN.md`).

use std::collections::HashSet;

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::ast::{
    AstNode, BreakNode, Cond, ConditionNode, ConditionalBreakNode, LoopKind, LoopNode, SequenceNode,
};
use crate::bool_ast::BoolCache;
use crate::error::StructureError;
use crate::il::{IlExpr, IlStmt};
use crate::jump_table::JumpTables;
use crate::region::{ControlFlowEdgeType, RegionMember, RegionNode};
use crate::structuring::StructureConfig;

/// Structures a cyclic region into a single [`AstNode::Loop`].
pub fn structure_cyclic(
    region: &RegionNode,
    _cache: &mut BoolCache,
    _jump_tables: &JumpTables,
    _config: &StructureConfig,
) -> Result<AstNode, StructureError> {
    let loop_nodes = loop_body_nodes(region);
    ensure_has_exit(region, &loop_nodes)?;
    ensure_no_foreign_content(region, &loop_nodes)?;

    let head_addr = region.graph[region.head()].addr_no_forest().unwrap_or_default();
    let body = build_loop_body(region, &loop_nodes)?;
    ensure_no_stray_back_edge(&body, head_addr)?;
    let (kind, cond, body) = refine_loop_shape(body);
    Ok(AstNode::Loop(LoopNode { kind, cond, body }))
}

/// The strongly-connected component containing `region.head()` -- the set
/// of nodes that form the repeating body (§4.4 step 1; SCC computation is
/// already the fixed point of successor absorption, since a node
/// reachable from and back to the head is by definition in head's SCC).
fn loop_body_nodes(region: &RegionNode) -> HashSet<NodeIndex> {
    let sccs = petgraph::algo::kosaraju_scc(&region.graph);
    sccs.into_iter()
        .find(|scc| scc.contains(&region.head()))
        .map(|scc| scc.into_iter().collect())
        .unwrap_or_else(|| HashSet::from([region.head()]))
}

fn ensure_has_exit(region: &RegionNode, loop_nodes: &HashSet<NodeIndex>) -> Result<(), StructureError> {
    let has_exit_edge = loop_nodes.iter().any(|&n| {
        region
            .graph
            .edges(n)
            .any(|e| !loop_nodes.contains(&e.target()))
    });
    if has_exit_edge || !region.successors.is_empty() {
        Ok(())
    } else {
        let head_addr = region.graph[region.head()].addr_no_forest().unwrap_or_default();
        Err(StructureError::MalformedRegion {
            head: head_addr,
            backtrace: std::backtrace::Backtrace::capture(),
        })
    }
}

/// Rejects a region whose graph carries a node outside the loop body that
/// is not a bare, empty sink placeholder -- i.e. it holds real content the
/// loop body walk (`build_loop_body`) would never visit and so would
/// silently drop. Per this crate's region-tree contract (mirrored by
/// `s6_break_from_inside_an_if_becomes_loop_condition`), successor content
/// belongs in the *parent* region, spliced in after the `Loop` node by
/// that parent's own acyclic pipeline; a cyclic region's own graph may
/// only carry empty placeholders for the addresses its breaks target.
fn ensure_no_foreign_content(
    region: &RegionNode,
    loop_nodes: &HashSet<NodeIndex>,
) -> Result<(), StructureError> {
    let head_addr = region.graph[region.head()].addr_no_forest().unwrap_or_default();
    for node in region.graph.node_indices() {
        if loop_nodes.contains(&node) {
            continue;
        }
        let has_content = match &region.graph[node] {
            RegionMember::Block(block) => !block.is_empty(),
            RegionMember::Structured(_) => true,
            RegionMember::SubRegion(_) => true,
        };
        if has_content {
            let addr = region.graph[node].addr_no_forest().unwrap_or_default();
            return Err(StructureError::StrayLoopSuccessorContent {
                head: head_addr,
                addr,
                backtrace: std::backtrace::Backtrace::capture(),
            });
        }
    }
    Ok(())
}

fn node_to_ast(member: &RegionMember) -> AstNode {
    match member {
        RegionMember::Block(block) => AstNode::IlBlock(block.clone()),
        RegionMember::Structured(ast) => ast.clone(),
        RegionMember::SubRegion(_) => {
            // The driver structures children before their parent; reaching
            // this would mean a loop was structured before one of its own
            // sub-regions. Surface as an empty block rather than panicking.
            AstNode::IlBlock(crate::il::IlBlock::new(0))
        }
    }
}

fn strip_conditional_jump(block: &crate::il::IlBlock) -> crate::il::IlBlock {
    let mut block = block.clone();
    if matches!(block.last_statement(), Some(IlStmt::ConditionalJump { .. })) {
        block.remove_last_statement();
    }
    block
}

fn branch_condition(member: &RegionMember) -> Option<IlExpr> {
    if let RegionMember::Block(block) = member {
        if let Some(IlStmt::ConditionalJump { condition, .. }) = block.last_statement() {
            return Some(condition.clone());
        }
    }
    None
}

/// Walks the loop body from `region.head()`, following only edges within
/// `loop_nodes` (or back to head, which ends the walk), emitting a
/// `Break`/`ConditionalBreak` wherever control would otherwise leave the
/// loop (§4.5).
fn build_loop_body(
    region: &RegionNode,
    loop_nodes: &HashSet<NodeIndex>,
) -> Result<SequenceNode, StructureError> {
    let mut children = Vec::new();
    let mut current = region.head();
    let mut visited = HashSet::new();

    loop {
        if !visited.insert(current) {
            break;
        }
        let member = &region.graph[current];
        let out_edges: Vec<_> = region.graph.edges(current).collect();

        match out_edges.as_slice() {
            [] => {
                children.push(node_to_ast(member));
                break;
            }
            [only] => {
                let target = only.target();
                children.push(node_to_ast(member));
                if target == region.head() {
                    break;
                }
                if !loop_nodes.contains(&target) {
                    let addr = region.graph[target].addr_no_forest().unwrap_or_default();
                    children.push(AstNode::Break(BreakNode {
                        addr,
                        target_addr: addr,
                    }));
                    break;
                }
                current = target;
            }
            [a, b] => {
                let header_addr = member.addr_no_forest().unwrap_or_default();
                let true_edge = [a, b]
                    .into_iter()
                    .find(|e| matches!(e.weight(), ControlFlowEdgeType::Branch { is_true_branch: true }));
                let false_edge = [a, b]
                    .into_iter()
                    .find(|e| matches!(e.weight(), ControlFlowEdgeType::Branch { is_true_branch: false }));

                let Some(((cond, t), f)) = branch_condition(member)
                    .zip(true_edge)
                    .zip(false_edge)
                else {
                    return Err(StructureError::LoopExitAmbiguous {
                        addr: header_addr,
                        backtrace: std::backtrace::Backtrace::capture(),
                    });
                };

                let header = if let RegionMember::Block(block) = member {
                    AstNode::IlBlock(strip_conditional_jump(block))
                } else {
                    node_to_ast(member)
                };
                children.push(header);

                let t_target = t.target();
                let f_target = f.target();
                let t_in_loop = t_target == region.head() || loop_nodes.contains(&t_target);
                let f_in_loop = f_target == region.head() || loop_nodes.contains(&f_target);

                match (t_in_loop, f_in_loop) {
                    (true, false) => {
                        let exit_addr = region.graph[f_target].addr_no_forest().unwrap_or_default();
                        children.push(AstNode::ConditionalBreak(ConditionalBreakNode {
                            addr: header_addr,
                            cond: Cond::Il(cond.negate()),
                            target_addr: exit_addr,
                        }));
                        if t_target == region.head() {
                            break;
                        }
                        current = t_target;
                    }
                    (false, true) => {
                        let exit_addr = region.graph[t_target].addr_no_forest().unwrap_or_default();
                        children.push(AstNode::ConditionalBreak(ConditionalBreakNode {
                            addr: header_addr,
                            cond: Cond::Il(cond.clone()),
                            target_addr: exit_addr,
                        }));
                        if f_target == region.head() {
                            break;
                        }
                        current = f_target;
                    }
                    (false, false) => {
                        let t_addr = region.graph[t_target].addr_no_forest().unwrap_or_default();
                        let f_addr = region.graph[f_target].addr_no_forest().unwrap_or_default();
                        children.push(AstNode::Condition(ConditionNode {
                            addr: header_addr,
                            cond: Cond::Il(cond),
                            true_child: Box::new(AstNode::Break(BreakNode {
                                addr: t_addr,
                                target_addr: t_addr,
                            })),
                            false_child: Some(Box::new(AstNode::Break(BreakNode {
                                addr: f_addr,
                                target_addr: f_addr,
                            }))),
                        }));
                        break;
                    }
                    (true, true) => break,
                }
            }
            _ => {
                let addr = member.addr_no_forest().unwrap_or_default();
                return Err(StructureError::LoopExitAmbiguous {
                    addr,
                    backtrace: std::backtrace::Backtrace::capture(),
                });
            }
        }
    }

    children.retain(|n| !n.is_empty_node());
    Ok(SequenceNode::new(children))
}

/// Scans every `IlBlock` reachable from `body` for a `Jump` statement
/// still targeting `head_addr` -- the back edge the walk above is
/// supposed to have already elided by simply not emitting it (§4.5's
/// final paragraph). A survivor here means the body was assembled
/// incorrectly rather than that a legitimate back edge exists.
fn ensure_no_stray_back_edge(body: &SequenceNode, head_addr: crate::il::Addr) -> Result<(), StructureError> {
    for child in &body.children {
        if let AstNode::IlBlock(block) = child {
            if let Some(IlStmt::Jump { target }) = block.last_statement() {
                if *target == head_addr {
                    return Err(StructureError::StrayBackEdge {
                        head: head_addr,
                        backtrace: std::backtrace::Backtrace::capture(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Lifts a leading or trailing `ConditionalBreak` into the loop's own
/// condition: a body that starts with `ConditionalBreak{c}` is `while
/// (¬c) { rest }`; one that ends with `ConditionalBreak{c}` is `do { rest
/// } while (¬c)`. Anything else is an endless loop whose exits remain as
/// `Break`/`ConditionalBreak` nodes inside the body.
fn refine_loop_shape(mut body: SequenceNode) -> (LoopKind, Option<Cond>, SequenceNode) {
    if let Some(AstNode::ConditionalBreak(cb)) = body.children.first() {
        let negated = negate_cond(&cb.cond);
        body.children.remove(0);
        return (LoopKind::While, Some(negated), body);
    }
    if let Some(AstNode::ConditionalBreak(cb)) = body.children.last() {
        let negated = negate_cond(&cb.cond);
        body.children.pop();
        return (LoopKind::DoWhile, Some(negated), body);
    }
    (LoopKind::While, None, body)
}

fn negate_cond(cond: &Cond) -> Cond {
    match cond {
        Cond::Bool(id) => Cond::Bool(*id),
        Cond::Il(expr) => Cond::Il(expr.negate()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{BinaryOp, IlBlock, IlExpr};
    use crate::region::RegionForest;
    use petgraph::graph::DiGraph;

    #[test]
    fn test_leading_conditional_break_becomes_while() {
        // H: if (x == 0) break to 0x20; else continue -> back to H.
        let mut graph = DiGraph::new();
        let mut h = IlBlock::new(0x10);
        h.append_statement(IlStmt::ConditionalJump {
            condition: IlExpr::BinaryOp {
                op: BinaryOp::Eq,
                lhs: Box::new(IlExpr::Register("x".into())),
                rhs: Box::new(IlExpr::Const(0)),
            },
            target: 0x20,
        });
        let h_idx = graph.add_node(RegionMember::Block(h));
        let exit = graph.add_node(RegionMember::Block(IlBlock::new(0x20)));
        graph.add_edge(h_idx, exit, ControlFlowEdgeType::Branch { is_true_branch: true });
        graph.add_edge(h_idx, h_idx, ControlFlowEdgeType::Branch { is_true_branch: false });

        let mut forest = RegionForest::new();
        let id = forest.add_region(graph, h_idx, vec![0x20]);
        let region = forest.get(id).unwrap();

        let mut cache = BoolCache::new();
        let tables = JumpTables::new();
        let config = StructureConfig::default();
        let ast = structure_cyclic(region, &mut cache, &tables, &config).unwrap();
        let AstNode::Loop(loop_node) = ast else {
            panic!("expected a loop node")
        };
        assert_eq!(loop_node.kind, LoopKind::While);
        assert!(loop_node.cond.is_some());
        assert!(loop_node.body.children.is_empty());
    }

    #[test]
    fn test_no_exit_is_malformed() {
        let mut graph = DiGraph::new();
        let h_idx = graph.add_node(RegionMember::Block(IlBlock::new(0x10)));
        graph.add_edge(h_idx, h_idx, ControlFlowEdgeType::Fallthrough);

        let mut forest = RegionForest::new();
        let id = forest.add_region(graph, h_idx, vec![]);
        let region = forest.get(id).unwrap();

        let mut cache = BoolCache::new();
        let tables = JumpTables::new();
        let config = StructureConfig::default();
        let result = structure_cyclic(region, &mut cache, &tables, &config);
        assert!(matches!(result, Err(StructureError::MalformedRegion { .. })));
    }

    #[test]
    fn test_real_content_outside_loop_body_is_rejected() {
        // H: if (x == 0) -> exit (carries real content); else -> back to H.
        // A correctly-formed input keeps exit content in the parent region
        // (see `s6_break_from_inside_an_if_becomes_loop_condition`); a
        // cyclic region whose own graph mixes the two is malformed.
        let mut graph = DiGraph::new();
        let mut h = IlBlock::new(0x10);
        h.append_statement(IlStmt::ConditionalJump {
            condition: IlExpr::BinaryOp {
                op: BinaryOp::Eq,
                lhs: Box::new(IlExpr::Register("x".into())),
                rhs: Box::new(IlExpr::Const(0)),
            },
            target: 0x20,
        });
        let h_idx = graph.add_node(RegionMember::Block(h));
        let mut exit = IlBlock::new(0x20);
        exit.append_statement(IlStmt::Other("after loop".into()));
        let exit_idx = graph.add_node(RegionMember::Block(exit));
        graph.add_edge(h_idx, exit_idx, ControlFlowEdgeType::Branch { is_true_branch: true });
        graph.add_edge(h_idx, h_idx, ControlFlowEdgeType::Branch { is_true_branch: false });

        let mut forest = RegionForest::new();
        let id = forest.add_region(graph, h_idx, vec![0x20]);
        let region = forest.get(id).unwrap();

        let mut cache = BoolCache::new();
        let tables = JumpTables::new();
        let config = StructureConfig::default();
        let result = structure_cyclic(region, &mut cache, &tables, &config);
        assert!(matches!(
            result,
            Err(StructureError::StrayLoopSuccessorContent { .. })
        ));
    }
}
