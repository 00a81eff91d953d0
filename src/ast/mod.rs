#![deny(missing_docs)]
//! The structured AST produced by the structuring engine: sequences,
//! conditionals, loops, switch/case, and the leaf wrappers around IL
//! blocks they are built from.

use serde::{Deserialize, Serialize};

use crate::bool_ast::BoolId;
use crate::il::{Addr, IlBlock, IlExpr};

pub use visitor::AstVisitor;
pub use walk::{walk, walk_mut};

/// The reusable pre-order walker (§4.8): generic traversal over structural
/// children, parameterised by a caller-supplied closure.
pub mod walk;
/// The read-only dispatch visitor used for queries and debug rendering.
pub mod visitor;

/// A condition attached to a `Code`, `Condition`, `Loop`, or
/// `ConditionalBreak` node. Every condition starts life as a `BoolAst`
/// formula (built and simplified against the structuring engine's
/// per-instance [`crate::bool_ast::BoolCache`]) and is lowered to its IL
/// form in the final pass of the acyclic and cyclic pipelines; per the
/// engine's own invariant, no `Cond::Bool` survives in the AST handed
/// back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cond {
    /// A formula not yet lowered to IL.
    Bool(BoolId),
    /// A condition already expressed in IL, ready for pretty-printing.
    Il(IlExpr),
}

impl Cond {
    /// The `BoolId` this condition wraps, if it has not yet been lowered.
    pub fn as_bool_id(&self) -> Option<BoolId> {
        match self {
            Cond::Bool(id) => Some(*id),
            Cond::Il(_) => None,
        }
    }
}

/// A tagged union over every shape the structuring engine can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AstNode {
    /// A single structured node reached under `reaching_condition`, or
    /// unconditionally when `reaching_condition` is `None` (the canonical
    /// form for `rc ≡ true`).
    Code(CodeNode),
    /// An ordered list of children. Never directly nests another
    /// `Sequence` at the top level once flattened.
    Sequence(SequenceNode),
    /// An if/else: `true_child` always present, `false_child` optional.
    Condition(ConditionNode),
    /// A `while` or `do-while` loop.
    Loop(LoopNode),
    /// A jump-table-driven switch/case.
    SwitchCase(SwitchCaseNode),
    /// An unconditional jump out of an enclosing loop.
    Break(BreakNode),
    /// A conditional jump out of an enclosing loop.
    ConditionalBreak(ConditionalBreakNode),
    /// A run of IL blocks treated atomically (no internal branching).
    MultiBlock(MultiBlockNode),
    /// A leaf wrapper over a single IL block.
    IlBlock(IlBlock),
}

impl AstNode {
    /// Wraps `self` in a [`CodeNode`] with no reaching condition (i.e. the
    /// canonical "unconditionally reached" form).
    pub fn into_code(self) -> CodeNode {
        CodeNode {
            inner: Box::new(self),
            reaching_condition: None,
        }
    }

    /// Wraps `self` in a [`CodeNode`] under `rc`, canonicalizing `rc ≡
    /// true` to `None` per the engine's invariant.
    pub fn into_code_with_rc(self, rc: Option<BoolId>, is_true: impl Fn(BoolId) -> bool) -> CodeNode {
        let rc = rc.filter(|id| !is_true(*id)).map(Cond::Bool);
        CodeNode {
            inner: Box::new(self),
            reaching_condition: rc,
        }
    }

    /// True if this node is an empty [`Sequence`]/[`MultiBlock`]/`IlBlock`
    /// with no statements -- a candidate for the "empty node removal" pass.
    pub fn is_empty_node(&self) -> bool {
        match self {
            AstNode::Sequence(seq) => seq.children.is_empty(),
            AstNode::MultiBlock(mb) => mb.blocks.iter().all(IlBlock::is_empty),
            AstNode::IlBlock(block) => block.is_empty(),
            AstNode::Code(code) => code.inner.is_empty_node(),
            _ => false,
        }
    }

    /// Returns the node's address, if it has one directly (leaves and
    /// headers do; pure structural nodes like `Sequence` do not).
    pub fn addr(&self) -> Option<Addr> {
        match self {
            AstNode::IlBlock(block) => Some(block.addr),
            AstNode::Condition(cond) => Some(cond.addr),
            AstNode::Break(b) => Some(b.addr),
            AstNode::ConditionalBreak(cb) => Some(cb.addr),
            AstNode::MultiBlock(mb) => mb.blocks.first().map(|b| b.addr),
            AstNode::Code(code) => code.inner.addr(),
            _ => None,
        }
    }
}

/// See [`AstNode::Code`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeNode {
    /// The wrapped node.
    pub inner: Box<AstNode>,
    /// The reaching condition, or `None` when unconditionally reached.
    pub reaching_condition: Option<Cond>,
}

/// See [`AstNode::Sequence`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceNode {
    /// The children, in execution order.
    pub children: Vec<AstNode>,
}

impl SequenceNode {
    /// Builds a sequence, flattening any directly-nested `Sequence`
    /// children so the top-level invariant holds on construction.
    pub fn new(children: Vec<AstNode>) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                AstNode::Sequence(inner) => flat.extend(inner.children),
                other => flat.push(other),
            }
        }
        Self { children: flat }
    }
}

/// See [`AstNode::Condition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionNode {
    /// The address of the node that produced this condition (the header
    /// block, for a freshly-promoted `Code`, or the first diverging
    /// header for an if/else pairing).
    pub addr: Addr,
    /// The branch condition.
    pub cond: Cond,
    /// The branch taken when `cond` holds.
    pub true_child: Box<AstNode>,
    /// The branch taken when `cond` does not hold, if any.
    pub false_child: Option<Box<AstNode>>,
}

/// Distinguishes `while (cond) { body }` from `do { body } while (cond)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopKind {
    /// Condition checked before the body executes.
    While,
    /// Condition checked after the body executes.
    DoWhile,
}

/// See [`AstNode::Loop`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopNode {
    /// Whether this is a `while` or `do-while` loop.
    pub kind: LoopKind,
    /// The loop condition. `None` denotes an endless loop whose exits are
    /// expressed entirely as `Break`/`ConditionalBreak` inside the body.
    pub cond: Option<Cond>,
    /// The loop body.
    pub body: SequenceNode,
}

/// See [`AstNode::SwitchCase`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCaseNode {
    /// The switched-on expression, as a `BoolAst` leaf wrapping the
    /// underlying IL expression (kept opaque to this engine).
    pub expr_symbol: crate::il::IlExpr,
    /// Case bodies keyed by `cmp_lb + entry_index` (§3 invariant: keys are
    /// contiguous only by coincidence).
    pub cases: std::collections::BTreeMap<i64, AstNode>,
    /// The default body, if the jump table's fallthrough target is not
    /// already covered by every case ending in a jump to it.
    pub default: Option<Box<AstNode>>,
}

/// See [`AstNode::Break`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakNode {
    /// The address of the block the `Break` replaced.
    pub addr: Addr,
    /// The address `Break` exits to.
    pub target_addr: Addr,
}

/// See [`AstNode::ConditionalBreak`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBreakNode {
    /// The address of the block the `ConditionalBreak` replaced.
    pub addr: Addr,
    /// The condition under which control exits to `target_addr`.
    pub cond: Cond,
    /// The address control exits to when `cond` holds.
    pub target_addr: Addr,
}

/// See [`AstNode::MultiBlock`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiBlockNode {
    /// The run of blocks, in execution order.
    pub blocks: Vec<IlBlock>,
}
