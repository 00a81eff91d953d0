#![deny(missing_docs)]
//! The generic pre-order walker used by the lowering and invariant-check
//! passes.
//!
//! Passes that need `(parent, index)` context to mutate a sequence in
//! place -- merge-same-conditioned-nodes, if/else pairing, switch
//! unpacking -- operate directly on a [`super::SequenceNode`]'s `children`
//! vector instead of going through this walker; those rewrites are about
//! restructuring sibling lists, which a single-node-at-a-time visitor
//! cannot express. This walker is for passes that only need to *visit*
//! every node reachable from the root: boolean-to-IL lowering, the
//! leaf-absence invariant check, and debug rendering.

use super::AstNode;

/// Visits `node` and every structural descendant, in pre-order, calling
/// `f` on each.
pub fn walk<'a>(node: &'a AstNode, f: &mut dyn FnMut(&'a AstNode)) {
    f(node);
    match node {
        AstNode::Code(code) => walk(&code.inner, f),
        AstNode::Sequence(seq) => {
            for child in &seq.children {
                walk(child, f);
            }
        }
        AstNode::Condition(cond) => {
            walk(&cond.true_child, f);
            if let Some(false_child) = &cond.false_child {
                walk(false_child, f);
            }
        }
        AstNode::Loop(loop_node) => {
            for child in &loop_node.body.children {
                walk(child, f);
            }
        }
        AstNode::SwitchCase(switch) => {
            for case in switch.cases.values() {
                walk(case, f);
            }
            if let Some(default) = &switch.default {
                walk(default, f);
            }
        }
        AstNode::Break(_)
        | AstNode::ConditionalBreak(_)
        | AstNode::MultiBlock(_)
        | AstNode::IlBlock(_) => {}
    }
}

/// The mutable counterpart of [`walk`].
pub fn walk_mut(node: &mut AstNode, f: &mut dyn FnMut(&mut AstNode)) {
    f(node);
    match node {
        AstNode::Code(code) => walk_mut(&mut code.inner, f),
        AstNode::Sequence(seq) => {
            for child in &mut seq.children {
                walk_mut(child, f);
            }
        }
        AstNode::Condition(cond) => {
            walk_mut(&mut cond.true_child, f);
            if let Some(false_child) = &mut cond.false_child {
                walk_mut(false_child, f);
            }
        }
        AstNode::Loop(loop_node) => {
            for child in &mut loop_node.body.children {
                walk_mut(child, f);
            }
        }
        AstNode::SwitchCase(switch) => {
            for case in switch.cases.values_mut() {
                walk_mut(case, f);
            }
            if let Some(default) = &mut switch.default {
                walk_mut(default, f);
            }
        }
        AstNode::Break(_)
        | AstNode::ConditionalBreak(_)
        | AstNode::MultiBlock(_)
        | AstNode::IlBlock(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CodeNode, SequenceNode};
    use crate::il::IlBlock;

    #[test]
    fn test_walk_visits_sequence_children() {
        let seq = AstNode::Sequence(SequenceNode::new(vec![
            AstNode::IlBlock(IlBlock::new(0x10)),
            AstNode::IlBlock(IlBlock::new(0x20)),
        ]));
        let mut addrs = Vec::new();
        walk(&seq, &mut |n| {
            if let AstNode::IlBlock(b) = n {
                addrs.push(b.addr);
            }
        });
        assert_eq!(addrs, vec![0x10, 0x20]);
    }

    #[test]
    fn test_walk_mut_descends_into_code() {
        let mut node = AstNode::Code(CodeNode {
            inner: Box::new(AstNode::IlBlock(IlBlock::new(0x42))),
            reaching_condition: None,
        });
        let mut visited = 0;
        walk_mut(&mut node, &mut |_| visited += 1);
        assert_eq!(visited, 2); // the Code wrapper, then the IlBlock.
    }
}
