#![deny(missing_docs)]
//! The acyclic structuring pipeline (§4.6): turns a DAG region into a
//! sequence of nested conditionals by repeatedly rewriting a flat list of
//! reaching-condition-tagged nodes until no rewrite applies.

use std::collections::HashSet;

use petgraph::graph::NodeIndex;

use crate::ast::{
    AstNode, CodeNode, Cond, ConditionNode, ConditionalBreakNode, SequenceNode,
};
use crate::bool_ast::{BoolCache, BoolId};
use crate::error::StructureError;
use crate::jump_table::JumpTables;
use crate::region::{RegionMember, RegionNode};
use crate::structuring::reaching_condition::reaching_conditions;
use crate::structuring::switch::recognize_switches;
use crate::structuring::StructureConfig;

/// Structures an acyclic region into a single [`AstNode`].
pub fn structure_acyclic(
    region: &RegionNode,
    cache: &mut BoolCache,
    jump_tables: &JumpTables,
    config: &StructureConfig,
) -> Result<AstNode, StructureError> {
    let rc = reaching_conditions(region, cache)?;
    let order = petgraph::algo::toposort(&region.graph, None)
        .map_err(|_| StructureError::other("acyclic structurer invoked on a cyclic region"))?;

    let mut seq: Vec<AstNode> = Vec::with_capacity(order.len());
    for node in order {
        seq.push(AstNode::Code(member_to_code(region, node, &rc, cache)?));
    }

    let seq = structure_sequence(seq, cache, jump_tables, config)?;
    let seq = remove_conditional_jumps_and_empties(seq);
    let seq = promote_conditions(seq, cache);
    let seq = merge_adjacent_conditional_breaks(seq, cache);
    let seq = remove_empty_nodes(seq);
    let seq = unwrap_trivial_code(seq);

    let mut node = AstNode::Sequence(SequenceNode::new(seq));
    node = flatten_nested_conditionals(node, cache);
    crate::structuring::lower_conditions(&mut node, cache);
    Ok(node)
}

/// `Code{inner, rc: None}` carries no information beyond `inner` itself --
/// strip it at the top level so a run of same-conditioned nodes merged by
/// `merge_same_conditioned` settles back into a flat `Sequence` (via
/// `SequenceNode::new`'s flatten-on-construct) instead of staying nested
/// one level deeper than every other sibling.
fn unwrap_trivial_code(seq: Vec<AstNode>) -> Vec<AstNode> {
    seq.into_iter()
        .map(|node| match node {
            AstNode::Code(CodeNode { inner, reaching_condition: None }) => *inner,
            other => other,
        })
        .collect()
}

fn member_to_code(
    region: &RegionNode,
    node: NodeIndex,
    rc: &std::collections::HashMap<NodeIndex, BoolId>,
    cache: &BoolCache,
) -> Result<CodeNode, StructureError> {
    let inner = match &region.graph[node] {
        RegionMember::Block(block) => AstNode::IlBlock(block.clone()),
        RegionMember::Structured(ast) => ast.clone(),
        RegionMember::SubRegion(id) => {
            return Err(StructureError::other(format!(
                "acyclic structurer reached an unsubstituted sub-region {id}"
            )))
        }
    };
    let rc_id = rc.get(&node).copied();
    Ok(inner.into_code_with_rc(rc_id, |id| cache.is_true(id)))
}

/// Runs the worklist of local rewrites (§4.6 step 3) to a fixed point.
fn structure_sequence(
    mut seq: Vec<AstNode>,
    cache: &mut BoolCache,
    jump_tables: &JumpTables,
    config: &StructureConfig,
) -> Result<Vec<AstNode>, StructureError> {
    let mut iterations = 0;
    loop {
        let mut changed = false;

        let (next, switch_changed) = recognize_switches(seq, jump_tables);
        seq = next;
        changed |= switch_changed;

        strip_conditional_jump_statements(&mut seq);

        let merged = merge_same_conditioned(seq, cache);
        seq = merged.0;
        changed |= merged.1;

        if let Some(next) = common_subexpression_guard_once(&seq, cache) {
            seq = next;
            changed = true;
        }

        if let Some(next) = if_else_pairing_once(&seq, cache) {
            seq = next;
            changed = true;
        }

        if !changed {
            return Ok(seq);
        }
        iterations += 1;
        if iterations > config.max_iterations {
            return Err(StructureError::MaxIterationsReached {
                limit: config.max_iterations,
                backtrace: std::backtrace::Backtrace::capture(),
            });
        }
    }
}

fn rc_of(code: &CodeNode) -> Option<BoolId> {
    code.reaching_condition.as_ref().and_then(Cond::as_bool_id)
}

fn code_rc(node: &AstNode) -> Option<BoolId> {
    if let AstNode::Code(code) = node {
        rc_of(code)
    } else {
        None
    }
}

fn strip_code_rc(node: &AstNode) -> AstNode {
    if let AstNode::Code(code) = node {
        (*code.inner).clone()
    } else {
        node.clone()
    }
}

fn strip_conditional_jump_statements(seq: &mut [AstNode]) {
    for node in seq.iter_mut() {
        strip_one(node);
    }
}

fn strip_one(node: &mut AstNode) {
    match node {
        AstNode::Code(code) => strip_one(&mut code.inner),
        AstNode::IlBlock(block) => {
            if matches!(
                block.last_statement(),
                Some(crate::il::IlStmt::ConditionalJump { .. })
            ) {
                block.remove_last_statement();
            }
        }
        AstNode::MultiBlock(mb) => {
            if let Some(last) = mb.blocks.last_mut() {
                if matches!(
                    last.last_statement(),
                    Some(crate::il::IlStmt::ConditionalJump { .. })
                ) {
                    last.remove_last_statement();
                }
            }
        }
        _ => {}
    }
}

/// Fuses consecutive `Code` nodes whose reaching conditions are SAT-
/// equivalent into a single `Code` wrapping their concatenation.
fn merge_same_conditioned(seq: Vec<AstNode>, cache: &BoolCache) -> (Vec<AstNode>, bool) {
    let mut out: Vec<AstNode> = Vec::with_capacity(seq.len());
    let mut changed = false;
    for node in seq {
        let mut merged_into_prev = false;
        if let AstNode::Code(cur) = &node {
            let cur_rc = rc_of(cur);
            if let Some(AstNode::Code(prev)) = out.last() {
                let prev_rc = rc_of(prev);
                let equivalent = match (prev_rc, cur_rc) {
                    (None, None) => true,
                    (Some(a), Some(b)) => cache.equivalent(a, b),
                    _ => false,
                };
                if equivalent {
                    merged_into_prev = true;
                }
            }
        }
        if merged_into_prev {
            if let (Some(AstNode::Code(prev)), AstNode::Code(cur)) = (out.last_mut(), &node) {
                let prev_inner = std::mem::replace(
                    &mut prev.inner,
                    Box::new(AstNode::Sequence(SequenceNode::default())),
                );
                let merged = SequenceNode::new(vec![*prev_inner, (*cur.inner).clone()]);
                prev.inner = Box::new(AstNode::Sequence(merged));
            }
            changed = true;
            continue;
        }
        out.push(node);
    }
    (out, changed)
}

/// Common-subexpression guarding (§4.6 step 3): if a reaching condition is
/// a conjunction and some later node shares one of its conjuncts, group
/// every node sharing that conjunct under a single guard.
fn common_subexpression_guard_once(seq: &[AstNode], cache: &mut BoolCache) -> Option<Vec<AstNode>> {
    for i in 0..seq.len() {
        let rc_i = code_rc(&seq[i])?;
        let conjuncts = cache.conjuncts(rc_i);
        if conjuncts.len() < 2 {
            continue;
        }
        for &a in &conjuncts {
            let mut group: Vec<usize> = vec![i];
            for (j, node) in seq.iter().enumerate().skip(i + 1) {
                if let Some(rc_j) = code_rc(node) {
                    if cache.conjuncts(rc_j).contains(&a) {
                        group.push(j);
                    }
                }
            }
            if group.len() < 2 {
                continue;
            }

            let group_set: HashSet<usize> = group.iter().copied().collect();
            let mut group_children = Vec::with_capacity(group.len());
            for &k in &group {
                let rc_k = code_rc(&seq[k]);
                let stripped: Vec<BoolId> = rc_k
                    .map(|id| cache.conjuncts(id))
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|c| *c != a)
                    .collect();
                let new_rc = if stripped.is_empty() {
                    None
                } else {
                    Some(cache.mk_and(&stripped))
                };
                let inner = strip_code_rc(&seq[k]);
                let rc = new_rc.filter(|id| !cache.is_true(*id)).map(Cond::Bool);
                group_children.push(AstNode::Code(CodeNode {
                    inner: Box::new(inner),
                    reaching_condition: rc,
                }));
            }

            let grouped = AstNode::Code(CodeNode {
                inner: Box::new(AstNode::Sequence(SequenceNode::new(group_children))),
                reaching_condition: Some(a).filter(|id| !cache.is_true(*id)).map(Cond::Bool),
            });

            let mut out = Vec::with_capacity(seq.len() - group.len() + 1);
            let mut inserted = false;
            for (k, node) in seq.iter().enumerate() {
                if group_set.contains(&k) {
                    if !inserted {
                        out.push(grouped.clone());
                        inserted = true;
                    }
                    continue;
                }
                out.push(node.clone());
            }
            return Some(out);
        }
    }
    None
}

/// If/else pairing (§4.6 step 3): a pair of nodes whose reaching
/// conditions are mutual negations become the two arms of a `Condition`.
fn if_else_pairing_once(seq: &[AstNode], cache: &mut BoolCache) -> Option<Vec<AstNode>> {
    for i in 0..seq.len() {
        let Some(rc_i) = code_rc(&seq[i]) else {
            continue;
        };
        for j in (i + 1)..seq.len() {
            let Some(rc_j) = code_rc(&seq[j]) else {
                continue;
            };
            let not_rc_i = cache.mk_not(rc_i);
            if !cache.equivalent(not_rc_i, rc_j) {
                continue;
            }

            let true_indices: Vec<usize> = seq
                .iter()
                .enumerate()
                .filter_map(|(k, n)| code_rc(n).filter(|&rc| cache.equivalent(rc, rc_i)).map(|_| k))
                .collect();
            let false_indices: Vec<usize> = seq
                .iter()
                .enumerate()
                .filter_map(|(k, n)| code_rc(n).filter(|&rc| cache.equivalent(rc, rc_j)).map(|_| k))
                .collect();

            let true_body: Vec<AstNode> = true_indices.iter().map(|&k| strip_code_rc(&seq[k])).collect();
            let false_body: Vec<AstNode> = false_indices.iter().map(|&k| strip_code_rc(&seq[k])).collect();

            let addr = seq[i].addr().unwrap_or_default();
            let cond_node = AstNode::Condition(ConditionNode {
                addr,
                cond: Cond::Bool(rc_i),
                true_child: Box::new(AstNode::Sequence(SequenceNode::new(true_body))),
                false_child: Some(Box::new(AstNode::Sequence(SequenceNode::new(false_body)))),
            });

            let consumed: HashSet<usize> = true_indices.into_iter().chain(false_indices).collect();
            let insert_at = *consumed.iter().max().unwrap_or(&j);

            let mut out = Vec::with_capacity(seq.len());
            let mut inserted = false;
            for (k, node) in seq.iter().enumerate() {
                if consumed.contains(&k) {
                    if k == insert_at {
                        out.push(cond_node.clone());
                        inserted = true;
                    }
                    continue;
                }
                out.push(node.clone());
            }
            if !inserted {
                out.push(cond_node);
            }
            return Some(out);
        }
    }
    None
}

/// Steps 4 and 5: drop any remaining `ConditionalJump` terminators and
/// empty nodes left behind anywhere in the sequence, then promote every
/// surviving `Code{rc ≠ true}` to a `Condition`, collapsing into a
/// `ConditionalBreak` when its inner node already is one.
fn remove_conditional_jumps_and_empties(seq: Vec<AstNode>) -> Vec<AstNode> {
    seq.into_iter()
        .map(|mut n| {
            strip_one(&mut n);
            n
        })
        .filter(|n| !n.is_empty_node())
        .collect()
}

fn promote_conditions(seq: Vec<AstNode>, cache: &mut BoolCache) -> Vec<AstNode> {
    seq.into_iter().map(|node| promote_one(node, cache)).collect()
}

fn promote_one(node: AstNode, cache: &mut BoolCache) -> AstNode {
    let AstNode::Code(code) = node else {
        return node;
    };
    let CodeNode { inner, reaching_condition } = code;
    let Some(rc) = reaching_condition.as_ref().and_then(Cond::as_bool_id) else {
        return AstNode::Code(CodeNode { inner, reaching_condition });
    };
    if matches!(inner.as_ref(), AstNode::ConditionalBreak(_)) {
        let AstNode::ConditionalBreak(cb) = *inner else {
            unreachable!()
        };
        let cb_cond = cb.cond.as_bool_id().unwrap_or(rc);
        let combined = cache.mk_and(&[rc, cb_cond]);
        return AstNode::ConditionalBreak(ConditionalBreakNode {
            addr: cb.addr,
            cond: Cond::Bool(combined),
            target_addr: cb.target_addr,
        });
    }
    let addr = inner.addr().unwrap_or_default();
    AstNode::Condition(ConditionNode {
        addr,
        cond: Cond::Bool(rc),
        true_child: inner,
        false_child: None,
    })
}

fn merge_adjacent_conditional_breaks(seq: Vec<AstNode>, cache: &mut BoolCache) -> Vec<AstNode> {
    let mut out: Vec<AstNode> = Vec::with_capacity(seq.len());
    for node in seq {
        let mut merged = false;
        if let AstNode::ConditionalBreak(cur) = &node {
            if let Some(AstNode::ConditionalBreak(prev)) = out.last() {
                if prev.target_addr == cur.target_addr {
                    if let (Some(a), Some(b)) = (prev.cond.as_bool_id(), cur.cond.as_bool_id()) {
                        let combined = cache.mk_or(&[a, b]);
                        let simplified = cache.simplify(combined);
                        let addr = prev.addr;
                        let target = prev.target_addr;
                        out.pop();
                        out.push(AstNode::ConditionalBreak(ConditionalBreakNode {
                            addr,
                            cond: Cond::Bool(simplified),
                            target_addr: target,
                        }));
                        merged = true;
                    }
                }
            }
        }
        if !merged {
            out.push(node);
        }
    }
    out
}

fn remove_empty_nodes(seq: Vec<AstNode>) -> Vec<AstNode> {
    seq.into_iter().filter(|n| !n.is_empty_node()).collect()
}

/// Step 7: `Condition{a, Condition{b, X}}` (with no `false_child` on
/// either) collapses to `Condition{a ∧ b, X}`; likewise `Condition{a,
/// ConditionalBreak{b}}` collapses to `ConditionalBreak{a ∧ b}`.
fn flatten_nested_conditionals(node: AstNode, cache: &mut BoolCache) -> AstNode {
    match node {
        AstNode::Sequence(seq) => {
            let children = seq
                .children
                .into_iter()
                .map(|c| flatten_nested_conditionals(c, cache))
                .collect();
            AstNode::Sequence(SequenceNode::new(children))
        }
        AstNode::Code(code) => AstNode::Code(CodeNode {
            inner: Box::new(flatten_nested_conditionals(*code.inner, cache)),
            reaching_condition: code.reaching_condition,
        }),
        AstNode::Loop(mut l) => {
            l.body.children = l
                .body
                .children
                .into_iter()
                .map(|c| flatten_nested_conditionals(c, cache))
                .collect();
            AstNode::Loop(l)
        }
        AstNode::SwitchCase(mut sc) => {
            sc.cases = std::mem::take(&mut sc.cases)
                .into_iter()
                .map(|(k, v)| (k, flatten_nested_conditionals(v, cache)))
                .collect();
            sc.default = sc.default.map(|d| Box::new(flatten_nested_conditionals(*d, cache)));
            AstNode::SwitchCase(sc)
        }
        AstNode::Condition(cond) => {
            let true_child = flatten_nested_conditionals(*cond.true_child, cache);
            let false_child = cond.false_child.map(|c| flatten_nested_conditionals(*c, cache));
            try_flatten_condition(cond.addr, cond.cond, true_child, false_child, cache)
        }
        other => other,
    }
}

fn unwrap_single(node: &AstNode) -> &AstNode {
    match node {
        AstNode::Sequence(seq) if seq.children.len() == 1 => unwrap_single(&seq.children[0]),
        AstNode::Code(code) if code.reaching_condition.is_none() => unwrap_single(&code.inner),
        other => other,
    }
}

fn try_flatten_condition(
    addr: crate::il::Addr,
    cond: Cond,
    true_child: AstNode,
    false_child: Option<AstNode>,
    cache: &mut BoolCache,
) -> AstNode {
    if false_child.is_none() {
        if let Some(a) = cond.as_bool_id() {
            match unwrap_single(&true_child) {
                AstNode::Condition(inner) if inner.false_child.is_none() => {
                    if let Some(b) = inner.cond.as_bool_id() {
                        let combined = cache.mk_and(&[a, b]);
                        return AstNode::Condition(ConditionNode {
                            addr,
                            cond: Cond::Bool(combined),
                            true_child: inner.true_child.clone(),
                            false_child: None,
                        });
                    }
                }
                AstNode::ConditionalBreak(cb) => {
                    if let Some(b) = cb.cond.as_bool_id() {
                        let combined = cache.mk_and(&[a, b]);
                        return AstNode::ConditionalBreak(ConditionalBreakNode {
                            addr: cb.addr,
                            cond: Cond::Bool(combined),
                            target_addr: cb.target_addr,
                        });
                    }
                }
                _ => {}
            }
        }
    }
    AstNode::Condition(ConditionNode {
        addr,
        cond,
        true_child: Box::new(true_child),
        false_child: false_child.map(Box::new),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{BinaryOp, IlBlock, IlExpr, IlStmt};
    use crate::region::{ControlFlowEdgeType, RegionForest};
    use crate::structuring::StructureConfig;
    use petgraph::graph::DiGraph;

    #[test]
    fn test_straight_line_produces_flat_sequence() {
        let mut graph = DiGraph::new();
        let b0 = graph.add_node(RegionMember::Block(IlBlock::new(0x10)));
        let b1 = graph.add_node(RegionMember::Block(IlBlock::new(0x20)));
        graph.add_edge(b0, b1, ControlFlowEdgeType::Fallthrough);

        let mut forest = RegionForest::new();
        let id = forest.add_region(graph, b0, vec![]);
        let region = forest.get(id).unwrap();

        let mut cache = BoolCache::new();
        let tables = JumpTables::new();
        let config = StructureConfig::default();
        let ast = structure_acyclic(region, &mut cache, &tables, &config).unwrap();
        let AstNode::Sequence(seq) = ast else {
            panic!("expected a sequence")
        };
        assert_eq!(seq.children.len(), 2);
    }

    #[test]
    fn test_diamond_produces_condition_node() {
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
        let a = graph.add_node(RegionMember::Block(IlBlock::new(0x20)));
        let b = graph.add_node(RegionMember::Block(IlBlock::new(0x30)));
        let m = graph.add_node(RegionMember::Block(IlBlock::new(0x40)));
        graph.add_edge(h_idx, a, ControlFlowEdgeType::Branch { is_true_branch: true });
        graph.add_edge(h_idx, b, ControlFlowEdgeType::Branch { is_true_branch: false });
        graph.add_edge(a, m, ControlFlowEdgeType::Fallthrough);
        graph.add_edge(b, m, ControlFlowEdgeType::Fallthrough);

        let mut forest = RegionForest::new();
        let id = forest.add_region(graph, h_idx, vec![]);
        let region = forest.get(id).unwrap();

        let mut cache = BoolCache::new();
        let tables = JumpTables::new();
        let config = StructureConfig::default();
        let ast = structure_acyclic(region, &mut cache, &tables, &config).unwrap();
        let AstNode::Sequence(seq) = &ast else {
            panic!("expected a sequence")
        };
        assert!(seq
            .children
            .iter()
            .any(|n| matches!(n, AstNode::Condition(_))));
        // No leftover BoolAst leaves anywhere in the tree.
        crate::ast::walk(&ast, &mut |n| {
            if let AstNode::Condition(c) = n {
                assert!(c.cond.as_bool_id().is_none());
            }
        });
    }
}
