#![deny(missing_docs)]
//! The dyn-dispatch visitor over [`AstNode`] variants, in the style the
//! rest of this codebase uses for tagged unions: one method per variant,
//! an associated `Output` type, and a `dispatch` free function instead of
//! a method on the enum itself (keeping `AstNode` free of visitor wiring).

use super::{
    AstNode, BreakNode, CodeNode, ConditionNode, ConditionalBreakNode, LoopNode, MultiBlockNode,
    SequenceNode, SwitchCaseNode,
};
use crate::il::IlBlock;

/// A visitor over [`AstNode`] variants.
pub trait AstVisitor {
    /// The result type produced by each visit method.
    type Output;

    /// Visits a [`AstNode::Code`].
    fn visit_code(&mut self, node: &CodeNode) -> Self::Output;
    /// Visits a [`AstNode::Sequence`].
    fn visit_sequence(&mut self, node: &SequenceNode) -> Self::Output;
    /// Visits a [`AstNode::Condition`].
    fn visit_condition(&mut self, node: &ConditionNode) -> Self::Output;
    /// Visits a [`AstNode::Loop`].
    fn visit_loop(&mut self, node: &LoopNode) -> Self::Output;
    /// Visits a [`AstNode::SwitchCase`].
    fn visit_switch_case(&mut self, node: &SwitchCaseNode) -> Self::Output;
    /// Visits a [`AstNode::Break`].
    fn visit_break(&mut self, node: &BreakNode) -> Self::Output;
    /// Visits a [`AstNode::ConditionalBreak`].
    fn visit_conditional_break(&mut self, node: &ConditionalBreakNode) -> Self::Output;
    /// Visits a [`AstNode::MultiBlock`].
    fn visit_multi_block(&mut self, node: &MultiBlockNode) -> Self::Output;
    /// Visits a [`AstNode::IlBlock`].
    fn visit_il_block(&mut self, node: &IlBlock) -> Self::Output;
}

/// Dispatches `node` to the matching method of `visitor`.
pub fn dispatch<V: AstVisitor>(node: &AstNode, visitor: &mut V) -> V::Output {
    match node {
        AstNode::Code(n) => visitor.visit_code(n),
        AstNode::Sequence(n) => visitor.visit_sequence(n),
        AstNode::Condition(n) => visitor.visit_condition(n),
        AstNode::Loop(n) => visitor.visit_loop(n),
        AstNode::SwitchCase(n) => visitor.visit_switch_case(n),
        AstNode::Break(n) => visitor.visit_break(n),
        AstNode::ConditionalBreak(n) => visitor.visit_conditional_break(n),
        AstNode::MultiBlock(n) => visitor.visit_multi_block(n),
        AstNode::IlBlock(n) => visitor.visit_il_block(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SequenceNode;

    struct NodeCounter {
        count: usize,
    }

    impl AstVisitor for NodeCounter {
        type Output = ();

        fn visit_code(&mut self, node: &CodeNode) {
            self.count += 1;
            dispatch(&node.inner, self);
        }
        fn visit_sequence(&mut self, node: &SequenceNode) {
            self.count += 1;
            for child in &node.children {
                dispatch(child, self);
            }
        }
        fn visit_condition(&mut self, _node: &ConditionNode) {
            self.count += 1;
        }
        fn visit_loop(&mut self, _node: &LoopNode) {
            self.count += 1;
        }
        fn visit_switch_case(&mut self, _node: &SwitchCaseNode) {
            self.count += 1;
        }
        fn visit_break(&mut self, _node: &BreakNode) {
            self.count += 1;
        }
        fn visit_conditional_break(&mut self, _node: &ConditionalBreakNode) {
            self.count += 1;
        }
        fn visit_multi_block(&mut self, _node: &MultiBlockNode) {
            self.count += 1;
        }
        fn visit_il_block(&mut self, _node: &IlBlock) {
            self.count += 1;
        }
    }

    #[test]
    fn test_dispatch_counts_every_node() {
        let seq = AstNode::Sequence(SequenceNode::new(vec![
            AstNode::IlBlock(IlBlock::new(0x10)),
            AstNode::IlBlock(IlBlock::new(0x20)),
        ]));
        let mut counter = NodeCounter { count: 0 };
        dispatch(&seq, &mut counter);
        assert_eq!(counter.count, 3);
    }
}
