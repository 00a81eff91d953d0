#![deny(missing_docs)]
//! Switch/case recognition (§4.7): recovers a `SwitchCase` node from a
//! comparison-bounded `ConditionalJump` whose taken branch reads a jump
//! table.
//!
//! This implementation covers the common, single-block-per-case shape
//! (§8 scenario S5): it does not implement the original's sequence-node
//! unpacking for a case whose entry has already been restructured into a
//! multi-block body, nor the common-subexpression expansion of a case
//! body across several trailing sequence nodes (§4.7 step 3's "expand").
//! Both are documented simplifications -- see `DESIGN.md`.

use std::collections::BTreeMap;

use crate::ast::{AstNode, BreakNode, CodeNode, SequenceNode, SwitchCaseNode};
use crate::il::{Addr, BinaryOp, IlExpr, IlStmt, UnaryOp};
use crate::jump_table::JumpTables;

/// Attempts one switch recognition rewrite against `seq`. Returns the
/// rewritten sequence and whether a rewrite was applied; callers loop
/// until `false` to reach a fixed point (new switch headers can appear
/// after earlier passes collapse surrounding nodes).
pub fn recognize_switches(
    seq: Vec<AstNode>,
    jump_tables: &JumpTables,
) -> (Vec<AstNode>, bool) {
    for i in 0..seq.len() {
        if let Some(rewrite) = try_recognize_at(&seq, i, jump_tables) {
            return (rewrite, true);
        }
    }
    (seq, false)
}

fn header_conditional_jump(node: &AstNode) -> Option<(&IlExpr, Addr)> {
    let AstNode::Code(code) = node else { return None };
    let AstNode::IlBlock(block) = code.inner.as_ref() else {
        return None;
    };
    match block.last_statement() {
        Some(IlStmt::ConditionalJump { condition, target }) => Some((condition, *target)),
        _ => None,
    }
}

fn try_recognize_at(seq: &[AstNode], i: usize, jump_tables: &JumpTables) -> Option<Vec<AstNode>> {
    let (condition, target) = header_conditional_jump(&seq[i])?;
    let fallthrough_addr = seq.get(i + 1)?.addr()?;

    let (addr_a, addr_b, cond_for_a) = if jump_tables.get(target).is_some() {
        (target, fallthrough_addr, condition.clone())
    } else if jump_tables.get(fallthrough_addr).is_some() {
        (fallthrough_addr, target, condition.negate())
    } else {
        return None;
    };

    let (cmp_expr, cmp_lb, _cmp_ub) = extract_bounds(&cond_for_a)?;
    let table = jump_tables.get(addr_a)?;

    // node_A must be the very next node (single-block case, see module docs).
    let a_index = seq.iter().position(|n| n.addr() == Some(addr_a))?;

    let mut case_entries: Vec<(i64, usize)> = Vec::new();
    for (j, &entry_addr) in table.entries.iter().enumerate() {
        if entry_addr == addr_b {
            continue;
        }
        let idx = seq.iter().position(|n| n.addr() == Some(entry_addr))?;
        case_entries.push((cmp_lb + j as i64, idx));
    }
    if case_entries.is_empty() {
        return None;
    }

    // Determine the switch-end address: the most common jump target among
    // case bodies, breaking ties by the smallest address for determinism.
    let mut target_votes: BTreeMap<Addr, usize> = BTreeMap::new();
    for &(_, idx) in &case_entries {
        if let AstNode::Code(code) = &seq[idx] {
            if let AstNode::IlBlock(block) = code.inner.as_ref() {
                if let Some(IlStmt::Jump { target }) = block.last_statement() {
                    *target_votes.entry(*target).or_default() += 1;
                }
            }
        }
    }
    let switch_end = target_votes
        .iter()
        .max_by_key(|&(_, count)| *count)
        .map(|(&addr, _)| addr);

    // No default exists only when every case already jumps straight to
    // node_B's own address -- i.e. node_B carries no body of its own to
    // fall into, not merely that the cases happen to share some other
    // common join point.
    let no_default = case_entries.iter().all(|&(_, idx)| {
        matches!(
            &seq[idx],
            AstNode::Code(code)
                if matches!(
                    code.inner.as_ref(),
                    AstNode::IlBlock(b) if b.last_statement() == Some(&IlStmt::Jump { target: addr_b })
                )
        )
    });

    let default_index = if no_default {
        None
    } else {
        seq.iter().position(|n| n.addr() == Some(addr_b))
    };

    let mut cases = std::collections::BTreeMap::new();
    for &(key, idx) in &case_entries {
        let inner = code_inner(&seq[idx]);
        let rewritten = switch_end
            .map(|end| rewrite_goto_to_break(inner.clone(), end))
            .unwrap_or(inner);
        cases.insert(key, rewritten);
    }

    let default = default_index.map(|idx| {
        let inner = code_inner(&seq[idx]);
        Box::new(
            switch_end
                .map(|end| rewrite_goto_to_break(inner.clone(), end))
                .unwrap_or(inner),
        )
    });

    let header_rc = if let AstNode::Code(code) = &seq[i] {
        code.reaching_condition.clone()
    } else {
        None
    };

    let switch_node = AstNode::SwitchCase(SwitchCaseNode {
        expr_symbol: cmp_expr,
        cases,
        default,
    });
    let wrapped = AstNode::Code(CodeNode {
        inner: Box::new(switch_node),
        reaching_condition: header_rc,
    });

    let mut consumed: Vec<usize> = case_entries.iter().map(|&(_, idx)| idx).collect();
    consumed.push(a_index);
    if let Some(idx) = default_index {
        consumed.push(idx);
    }

    let header_without_cj = strip_header_terminator(&seq[i]);

    let mut out = Vec::with_capacity(seq.len());
    for (k, node) in seq.iter().enumerate() {
        if k == i {
            if !header_without_cj.is_empty_node() {
                out.push(header_without_cj.clone());
            }
            out.push(wrapped.clone());
            continue;
        }
        if consumed.contains(&k) {
            continue;
        }
        out.push(node.clone());
    }
    Some(out)
}

fn code_inner(node: &AstNode) -> AstNode {
    if let AstNode::Code(code) = node {
        (*code.inner).clone()
    } else {
        node.clone()
    }
}

fn strip_header_terminator(node: &AstNode) -> AstNode {
    if let AstNode::Code(code) = node {
        if let AstNode::IlBlock(block) = code.inner.as_ref() {
            let mut block = block.clone();
            if matches!(block.last_statement(), Some(IlStmt::ConditionalJump { .. })) {
                block.remove_last_statement();
            }
            return AstNode::Code(CodeNode {
                inner: Box::new(AstNode::IlBlock(block)),
                reaching_condition: code.reaching_condition.clone(),
            });
        }
    }
    node.clone()
}

fn rewrite_goto_to_break(inner: AstNode, switch_end: Addr) -> AstNode {
    if let AstNode::IlBlock(block) = &inner {
        if let Some(IlStmt::Jump { target }) = block.last_statement() {
            if *target == switch_end {
                let mut stripped = block.clone();
                stripped.remove_last_statement();
                let break_node = AstNode::Break(BreakNode {
                    addr: stripped.addr,
                    target_addr: switch_end,
                });
                return AstNode::Sequence(SequenceNode::new(vec![
                    AstNode::IlBlock(stripped),
                    break_node,
                ]));
            }
        }
    }
    inner
}

/// Recognises `cond == CmpLE(lhs, ub)` where `lhs` is either `x` or
/// `Sub(x, k)`; yields `(cmp_expr, cmp_lb)` (§4.7 step 1).
///
/// Also looks through a single `UnaryOp::Not` wrapper: the header's
/// condition is negated in place (see `IlExpr::negate`) when the jump
/// table sits on the fall-through side of the `ConditionalJump`, and
/// since `LeU`/`LeS` have no complementary ordering operator in this
/// enum, `negate` leaves the comparison itself untouched and wraps it in
/// `Not` rather than flip it to a different (wrong) operator. Only
/// `cmp_expr`/`cmp_lb` come out of this function -- which operand is
/// being compared and by how much the jump-table index is offset -- so
/// unwrapping the `Not` here is sound regardless of which side held true.
fn extract_bounds(cond: &IlExpr) -> Option<(IlExpr, i64)> {
    let cond = match cond {
        IlExpr::UnaryOp {
            op: UnaryOp::Not,
            operand,
        } => operand.as_ref(),
        other => other,
    };
    let IlExpr::BinaryOp { op, lhs, rhs } = cond else {
        return None;
    };
    if !matches!(op, BinaryOp::LeU | BinaryOp::LeS) {
        return None;
    }
    let IlExpr::Const(_ub) = rhs.as_ref() else {
        return None;
    };
    match lhs.as_ref() {
        IlExpr::BinaryOp {
            op: BinaryOp::Sub,
            lhs: x,
            rhs: k,
        } => {
            if let IlExpr::Const(kk) = k.as_ref() {
                Some(((**x).clone(), *kk))
            } else {
                None
            }
        }
        other => Some((other.clone(), 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::IlBlock;
    use crate::jump_table::JumpTable;

    fn code_block(addr: Addr, stmts: Vec<IlStmt>) -> AstNode {
        let mut block = IlBlock::new(addr);
        for s in stmts {
            block.append_statement(s);
        }
        AstNode::Code(CodeNode {
            inner: Box::new(AstNode::IlBlock(block)),
            reaching_condition: None,
        })
    }

    #[test]
    fn test_recognize_three_entry_switch_with_default() {
        // H: x <= 2 -> A, else D
        let x = IlExpr::Register("x".into());
        let cond = IlExpr::BinaryOp {
            op: BinaryOp::LeU,
            lhs: Box::new(x.clone()),
            rhs: Box::new(IlExpr::Const(2)),
        };
        let h = code_block(0x0, vec![IlStmt::ConditionalJump { condition: cond, target: 0x10 }]);
        let a = code_block(0x10, vec![]); // indirect jump stand-in; terminator opaque.
        let e0 = code_block(0x20, vec![IlStmt::Jump { target: 0x60 }]);
        let e1 = code_block(0x30, vec![IlStmt::Jump { target: 0x60 }]);
        let e2 = code_block(0x40, vec![IlStmt::Jump { target: 0x60 }]);
        let d = code_block(0x50, vec![IlStmt::Jump { target: 0x60 }]);

        let seq = vec![h, a, e0, e1, e2, d];
        let mut tables = JumpTables::new();
        tables.insert(0x10, JumpTable::new(vec![0x20, 0x30, 0x40]));

        let (rewritten, changed) = recognize_switches(seq, &tables);
        assert!(changed);

        let switch = rewritten.iter().find_map(|n| {
            if let AstNode::Code(c) = n {
                if let AstNode::SwitchCase(sc) = c.inner.as_ref() {
                    return Some(sc.clone());
                }
            }
            None
        });
        let switch = switch.expect("switch case node should be recognized");
        assert_eq!(switch.cases.len(), 3);
        assert!(switch.cases.contains_key(&0));
        assert!(switch.cases.contains_key(&1));
        assert!(switch.cases.contains_key(&2));
        // D ends in Jump{M} same as the cases, so it IS the default
        // (switch_end is the majority target 0x60, and D also jumps
        // there -- default is only None when no node remains at addr_b).
        assert!(switch.default.is_some());
    }

    #[test]
    fn test_recognize_four_entry_switch_with_no_default() {
        // H: x <= 3 -> A, else falls straight through to M (no separate
        // default block at all -- every case already jumps to node_B's
        // own address).
        let x = IlExpr::Register("x".into());
        let cond = IlExpr::BinaryOp {
            op: BinaryOp::LeU,
            lhs: Box::new(x.clone()),
            rhs: Box::new(IlExpr::Const(3)),
        };
        let h = code_block(0x0, vec![IlStmt::ConditionalJump { condition: cond, target: 0x10 }]);
        let m = code_block(0x50, vec![IlStmt::Other("nop".into())]);
        let a = code_block(0x10, vec![]);
        let e0 = code_block(0x20, vec![IlStmt::Jump { target: 0x50 }]);
        let e1 = code_block(0x30, vec![IlStmt::Jump { target: 0x50 }]);
        let e2 = code_block(0x40, vec![IlStmt::Jump { target: 0x50 }]);
        let e3 = code_block(0x45, vec![IlStmt::Jump { target: 0x50 }]);

        // node_B is M itself -- the header's fallthrough slot -- not a
        // separate default block.
        let seq = vec![h, m, a, e0, e1, e2, e3];
        let mut tables = JumpTables::new();
        tables.insert(0x10, JumpTable::new(vec![0x20, 0x30, 0x40, 0x45]));

        let (rewritten, changed) = recognize_switches(seq, &tables);
        assert!(changed);

        let switch = rewritten.iter().find_map(|n| {
            if let AstNode::Code(c) = n {
                if let AstNode::SwitchCase(sc) = c.inner.as_ref() {
                    return Some(sc.clone());
                }
            }
            None
        });
        let switch = switch.expect("switch case node should be recognized");
        assert_eq!(switch.cases.len(), 4);
        for key in 0..4 {
            assert!(switch.cases.contains_key(&key));
        }
    }

    #[test]
    fn test_recognize_switch_with_jump_table_on_fallthrough_side() {
        // H: x <= 2 -> D (taken branch), else falls straight through to A
        // (the jump table). The header's condition negates to `Not(x <=
        // 2)` rather than a flipped-operator comparison (no `Ge` in this
        // enum) -- `extract_bounds` must still see through that wrapper.
        let x = IlExpr::Register("x".into());
        let cond = IlExpr::BinaryOp {
            op: BinaryOp::LeU,
            lhs: Box::new(x.clone()),
            rhs: Box::new(IlExpr::Const(2)),
        };
        let h = code_block(0x0, vec![IlStmt::ConditionalJump { condition: cond, target: 0x50 }]);
        let a = code_block(0x10, vec![]); // indirect jump stand-in; terminator opaque.
        let e0 = code_block(0x20, vec![IlStmt::Jump { target: 0x60 }]);
        let e1 = code_block(0x30, vec![IlStmt::Jump { target: 0x60 }]);
        let e2 = code_block(0x40, vec![IlStmt::Jump { target: 0x60 }]);
        let d = code_block(0x50, vec![IlStmt::Jump { target: 0x60 }]);

        let seq = vec![h, a, e0, e1, e2, d];
        let mut tables = JumpTables::new();
        tables.insert(0x10, JumpTable::new(vec![0x20, 0x30, 0x40]));

        let (rewritten, changed) = recognize_switches(seq, &tables);
        assert!(changed, "switch should be recognized when the jump table sits on the fall-through side");

        let switch = rewritten.iter().find_map(|n| {
            if let AstNode::Code(c) = n {
                if let AstNode::SwitchCase(sc) = c.inner.as_ref() {
                    return Some(sc.clone());
                }
            }
            None
        });
        let switch = switch.expect("switch case node should be recognized");
        assert_eq!(switch.cases.len(), 3);
        assert!(switch.cases.contains_key(&0));
        assert!(switch.cases.contains_key(&1));
        assert!(switch.cases.contains_key(&2));
        // D ends in Jump{M}, same as the cases, and D's own address (0x50)
        // is not the shared jump target (0x60) -- so D IS the default.
        assert!(switch.default.is_some());
    }
}
