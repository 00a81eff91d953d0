#![deny(missing_docs)]
//! A minimal intermediate-language adapter.
//!
//! The structuring engine does not interpret expressions or statements; it
//! only needs to recognize a handful of shapes (conditional jumps, plain
//! jumps, comparisons feeding a jump table) and to manipulate a block's last
//! statement. This module is a narrow stand-in for a real IL -- a real
//! embedding would replace it with its own expression and statement types,
//! wired through the same [`IlBlock`] adapter operations this crate calls.

use serde::{Deserialize, Serialize};

use crate::cfg_dot::RenderableNode;
use crate::utils::{escape_string, truncate_operand};

/// The address of a single IL statement or block.
pub type Addr = u64;

/// A unary operator recognized when simplifying or negating conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Logical / bitwise negation.
    Not,
    /// Arithmetic negation.
    Neg,
}

/// A binary operator recognized when simplifying or negating conditions,
/// and when extracting comparison bounds for switch recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<` (unsigned)
    LtU,
    /// `<=` (unsigned)
    LeU,
    /// `<` (signed)
    LtS,
    /// `<=` (signed)
    LeS,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// Logical and.
    And,
    /// Logical or.
    Or,
}

/// An IL expression. This engine treats most expression shapes as opaque
/// data to be carried into the produced AST unmodified; it only needs to
/// pattern-match on a handful of shapes when recovering conditions and
/// switch bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IlExpr {
    /// A constant integer.
    Const(i64),
    /// A named register or variable.
    Register(String),
    /// A temporary, identified by its index.
    Tmp(usize),
    /// A memory load.
    Load(Box<IlExpr>),
    /// A width or signedness conversion.
    Convert {
        /// The value being converted.
        inner: Box<IlExpr>,
        /// The resulting bit width.
        to_bits: u8,
    },
    /// A unary operation.
    UnaryOp {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<IlExpr>,
    },
    /// A binary operation.
    BinaryOp {
        /// The operator.
        op: BinaryOp,
        /// The left operand.
        lhs: Box<IlExpr>,
        /// The right operand.
        rhs: Box<IlExpr>,
    },
    /// A side-effecting or otherwise uninterpreted expression this engine
    /// does not need to look inside. Carried opaquely.
    DirtyExpression(String),
}

impl IlExpr {
    /// Negates a condition expression, preferring the negated comparison
    /// operator over a double wrap in `UnaryOp::Not` when one is available.
    pub fn negate(&self) -> IlExpr {
        match self {
            IlExpr::UnaryOp {
                op: UnaryOp::Not,
                operand,
            } => (**operand).clone(),
            IlExpr::BinaryOp { op, lhs, rhs } => {
                if let Some(negated) = negate_binop(*op) {
                    IlExpr::BinaryOp {
                        op: negated,
                        lhs: lhs.clone(),
                        rhs: rhs.clone(),
                    }
                } else {
                    IlExpr::UnaryOp {
                        op: UnaryOp::Not,
                        operand: Box::new(self.clone()),
                    }
                }
            }
            _ => IlExpr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(self.clone()),
            },
        }
    }
}

fn negate_binop(op: BinaryOp) -> Option<BinaryOp> {
    match op {
        BinaryOp::Eq => Some(BinaryOp::Ne),
        BinaryOp::Ne => Some(BinaryOp::Eq),
        // `LtU`/`LeU`/`LtS`/`LeS` have no complementary variant in this
        // enum (no `Ge`/`Gt`): `!(a < b)` is `a >= b`, not `a <= b`, and
        // `!(a <= b)` is `a > b`, not `a < b`. Fall back to `UnaryOp::Not`
        // rather than emit a semantically wrong comparison.
        _ => None,
    }
}

/// A single IL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IlStmt {
    /// `dst = src`.
    Assign {
        /// The assigned variable or register name.
        dst: String,
        /// The value assigned.
        src: IlExpr,
    },
    /// An unconditional jump to `target`.
    Jump {
        /// The jump target address.
        target: Addr,
    },
    /// A conditional jump: if `condition` holds, control transfers to
    /// `target`; otherwise it falls through to the next statement/block.
    ConditionalJump {
        /// The branch condition.
        condition: IlExpr,
        /// The taken-branch target address.
        target: Addr,
    },
    /// An uninterpreted statement (e.g. a call, a store) this engine does
    /// not need to look inside. Carried opaquely.
    Other(String),
}

/// A straight-line block of IL statements at a fixed address, with the
/// adapter operations the structuring pipeline needs: reading, appending,
/// and popping the last statement (used when absorbing a terminator jump
/// into a sequence, or when re-appending a synthesized `break`/`goto`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IlBlock {
    /// The address of the block's first statement.
    pub addr: Addr,
    /// The statements, in execution order.
    pub stmts: Vec<IlStmt>,
}

impl IlBlock {
    /// Creates a new, empty block at `addr`.
    pub fn new(addr: Addr) -> Self {
        Self {
            addr,
            stmts: Vec::new(),
        }
    }

    /// Returns the block's last statement, if any.
    pub fn last_statement(&self) -> Option<&IlStmt> {
        self.stmts.last()
    }

    /// Removes and returns the block's last statement, if any.
    pub fn remove_last_statement(&mut self) -> Option<IlStmt> {
        self.stmts.pop()
    }

    /// Appends a statement to the end of the block.
    pub fn append_statement(&mut self, stmt: IlStmt) {
        self.stmts.push(stmt);
    }

    /// Returns true if the block carries no statements at all. An empty
    /// block left behind by a rewrite is a candidate for removal by the
    /// "empty node removal" pass.
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

impl RenderableNode for IlBlock {
    fn render_node(&self, padding: usize) -> String {
        let pad = " ".repeat(padding);
        let mut rows = String::new();
        rows.push_str(&format!(
            "{pad}<tr><td align=\"left\"><b>0x{:x}</b></td></tr>\n",
            self.addr
        ));
        for stmt in &self.stmts {
            rows.push_str(&format!(
                "{pad}<tr><td align=\"left\">{}</td></tr>\n",
                escape_string(truncate_operand(&format!("{stmt:?}")))
            ));
        }
        format!("{pad}<table border=\"0\" cellborder=\"0\" cellspacing=\"0\">\n{rows}{pad}</table>\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negate_comparison_flips_operator() {
        let cond = IlExpr::BinaryOp {
            op: BinaryOp::Eq,
            lhs: Box::new(IlExpr::Register("r0".into())),
            rhs: Box::new(IlExpr::Const(0)),
        };
        let negated = cond.negate();
        assert_eq!(
            negated,
            IlExpr::BinaryOp {
                op: BinaryOp::Ne,
                lhs: Box::new(IlExpr::Register("r0".into())),
                rhs: Box::new(IlExpr::Const(0)),
            }
        );
    }

    #[test]
    fn test_negate_ordering_comparison_wraps_instead_of_flipping() {
        // `LtU`/`LeU`/`LtS`/`LeS` have no complementary variant in this
        // enum (no `Ge`/`Gt`), so negating one must wrap in `UnaryOp::Not`
        // rather than substitute a different, semantically wrong operator.
        let cond = IlExpr::BinaryOp {
            op: BinaryOp::LeU,
            lhs: Box::new(IlExpr::Register("r0".into())),
            rhs: Box::new(IlExpr::Const(4)),
        };
        let negated = cond.negate();
        assert_eq!(
            negated,
            IlExpr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(cond),
            }
        );
    }

    #[test]
    fn test_negate_not_unwraps() {
        let inner = IlExpr::Register("flag".into());
        let wrapped = IlExpr::UnaryOp {
            op: UnaryOp::Not,
            operand: Box::new(inner.clone()),
        };
        assert_eq!(wrapped.negate(), inner);
    }

    #[test]
    fn test_block_last_statement_roundtrip() {
        let mut block = IlBlock::new(0x100);
        block.append_statement(IlStmt::Jump { target: 0x200 });
        assert_eq!(
            block.last_statement(),
            Some(&IlStmt::Jump { target: 0x200 })
        );
        let removed = block.remove_last_statement();
        assert_eq!(removed, Some(IlStmt::Jump { target: 0x200 }));
        assert!(block.is_empty());
    }
}
