#![deny(missing_docs)]
//! A hash-consed boolean-formula algebra over typed IL leaves.
//!
//! Reaching conditions, switch bounds, and loop-refinement predicates are
//! all represented as [`BoolId`] handles into a [`BoolCache`]. Two
//! structurally equal formulas always intern to the same id, which makes
//! `==` on [`BoolId`] a sound (if incomplete) equivalence check and keeps
//! the common "is this the same condition we already saw" queries cheap;
//! full semantic equivalence falls back to brute-force truth-table
//! enumeration in [`BoolCache::equivalent`], since the formulas this
//! engine builds rarely carry more than a handful of distinct leaves.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::il::{BinaryOp, IlExpr, UnaryOp};

/// A handle into a [`BoolCache`]'s node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BoolId(u32);

/// The interned id for the constant `true`.
pub const TRUE: BoolId = BoolId(0);
/// The interned id for the constant `false`.
pub const FALSE: BoolId = BoolId(1);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BoolNode {
    True,
    False,
    /// An opaque leaf, indexing into the cache's symbol table.
    Var(u32),
    Not(BoolId),
    /// Sorted, deduplicated, at least two children.
    And(Vec<BoolId>),
    /// Sorted, deduplicated, at least two children.
    Or(Vec<BoolId>),
}

/// A hash-consed boolean expression cache, holding both the formula arena
/// and the condition mapping (`symbol → IL-expression`) used to lower a
/// [`BoolId`] back to an [`IlExpr`] once structuring has converged.
///
/// Owned per structuring engine instance -- never a process-wide global --
/// so that independent procedures may be structured concurrently without
/// contention.
#[derive(Debug, Default)]
pub struct BoolCache {
    nodes: Vec<BoolNode>,
    intern: HashMap<BoolNode, BoolId>,
    symbols: Vec<IlExpr>,
    symbol_lookup: HashMap<IlExpr, u32>,
}

impl BoolCache {
    /// Creates a new cache with just `true` and `false` interned.
    pub fn new() -> Self {
        let mut cache = Self {
            nodes: Vec::new(),
            intern: HashMap::new(),
            symbols: Vec::new(),
            symbol_lookup: HashMap::new(),
        };
        let t = cache.intern_node(BoolNode::True);
        let f = cache.intern_node(BoolNode::False);
        debug_assert_eq!(t, TRUE);
        debug_assert_eq!(f, FALSE);
        cache
    }

    fn intern_node(&mut self, node: BoolNode) -> BoolId {
        if let Some(id) = self.intern.get(&node) {
            return *id;
        }
        let id = BoolId(self.nodes.len() as u32);
        self.intern.insert(node.clone(), id);
        self.nodes.push(node);
        id
    }

    fn node(&self, id: BoolId) -> &BoolNode {
        &self.nodes[id.0 as usize]
    }

    /// Interns an opaque leaf for `expr`, reusing the id if `expr` was
    /// already seen.
    pub fn mk_var(&mut self, expr: IlExpr) -> BoolId {
        if let Some(sym) = self.symbol_lookup.get(&expr) {
            return self.intern_node(BoolNode::Var(*sym));
        }
        let sym = self.symbols.len() as u32;
        self.symbol_lookup.insert(expr.clone(), sym);
        self.symbols.push(expr);
        self.intern_node(BoolNode::Var(sym))
    }

    /// Smart-constructs `¬id`, collapsing double negation and constants.
    pub fn mk_not(&mut self, id: BoolId) -> BoolId {
        match self.node(id) {
            BoolNode::True => FALSE,
            BoolNode::False => TRUE,
            BoolNode::Not(inner) => *inner,
            _ => self.intern_node(BoolNode::Not(id)),
        }
    }

    /// Smart-constructs a conjunction, flattening nested `And`s, removing
    /// duplicates and `true` operands, short-circuiting to `false` on a
    /// `false` operand or a complementary pair.
    pub fn mk_and(&mut self, operands: &[BoolId]) -> BoolId {
        self.mk_assoc(operands, true)
    }

    /// Smart-constructs a disjunction, the dual of [`BoolCache::mk_and`].
    pub fn mk_or(&mut self, operands: &[BoolId]) -> BoolId {
        self.mk_assoc(operands, false)
    }

    fn mk_assoc(&mut self, operands: &[BoolId], is_and: bool) -> BoolId {
        let absorbing = if is_and { FALSE } else { TRUE };
        let identity = if is_and { TRUE } else { FALSE };

        let mut flat: Vec<BoolId> = Vec::new();
        let mut stack: Vec<BoolId> = operands.to_vec();
        while let Some(id) = stack.pop() {
            match self.node(id) {
                BoolNode::And(children) if is_and => stack.extend(children.clone()),
                BoolNode::Or(children) if !is_and => stack.extend(children.clone()),
                _ => flat.push(id),
            }
        }

        flat.retain(|id| *id != identity);
        if flat.iter().any(|id| *id == absorbing) {
            return absorbing;
        }
        flat.sort_unstable();
        flat.dedup();

        if flat.is_empty() {
            return identity;
        }
        if flat.len() == 1 {
            return flat[0];
        }

        // Complementary pair: A ∧ ¬A ⇒ false (dually A ∨ ¬A ⇒ true).
        for &a in &flat {
            let not_a = self.mk_not(a);
            if flat.contains(&not_a) {
                return absorbing;
            }
        }

        if is_and {
            self.intern_node(BoolNode::And(flat))
        } else {
            self.intern_node(BoolNode::Or(flat))
        }
    }

    /// Applies the formula algebra's canonicalization (already performed
    /// incrementally by the smart constructors) plus the one additional
    /// rewrite the reaching-condition solver needs: short-circuit
    /// reversal, `¬A ∨ (A ∧ ¬B) ⇒ ¬(A ∧ B)`.
    pub fn simplify(&mut self, id: BoolId) -> BoolId {
        if let BoolNode::Or(children) = self.node(id).clone() {
            if children.len() == 2 {
                for (i, &x) in children.iter().enumerate() {
                    let y = children[1 - i];
                    // x should be ¬A for some A; y should be And(A, ...).
                    if let BoolNode::Not(a) = self.node(x) {
                        let a = *a;
                        if let BoolNode::And(and_children) = self.node(y).clone() {
                            if and_children.contains(&a) {
                                let rest: Vec<BoolId> =
                                    and_children.into_iter().filter(|c| *c != a).collect();
                                let b = self.mk_and(&rest);
                                let candidate = self.mk_not(self.mk_and(&[a, b]));
                                if self.equivalent(candidate, id) {
                                    return candidate;
                                }
                            }
                        }
                    }
                }
            }
        }
        id
    }

    /// Collects the distinct leaf symbols a formula depends on.
    fn free_vars(&self, id: BoolId, out: &mut Vec<u32>) {
        match self.node(id) {
            BoolNode::True | BoolNode::False => {}
            BoolNode::Var(sym) => {
                if !out.contains(sym) {
                    out.push(*sym);
                }
            }
            BoolNode::Not(inner) => self.free_vars(*inner, out),
            BoolNode::And(children) | BoolNode::Or(children) => {
                for c in children.clone() {
                    self.free_vars(c, out);
                }
            }
        }
    }

    fn eval(&self, id: BoolId, assignment: &HashMap<u32, bool>) -> bool {
        match self.node(id) {
            BoolNode::True => true,
            BoolNode::False => false,
            BoolNode::Var(sym) => *assignment.get(sym).unwrap_or(&false),
            BoolNode::Not(inner) => !self.eval(*inner, assignment),
            BoolNode::And(children) => children.iter().all(|c| self.eval(*c, assignment)),
            BoolNode::Or(children) => children.iter().any(|c| self.eval(*c, assignment)),
        }
    }

    /// Brute-force truth-table check: true iff `id` evaluates to `true`
    /// under every assignment of its free variables.
    pub fn is_true(&self, id: BoolId) -> bool {
        if id == TRUE {
            return true;
        }
        if id == FALSE {
            return false;
        }
        let mut vars = Vec::new();
        self.free_vars(id, &mut vars);
        self.for_all_assignments(&vars, |assignment| self.eval(id, assignment))
    }

    /// Brute-force truth-table check: true iff `id` evaluates to `false`
    /// under every assignment of its free variables.
    pub fn is_false(&self, id: BoolId) -> bool {
        if id == FALSE {
            return true;
        }
        if id == TRUE {
            return false;
        }
        let mut vars = Vec::new();
        self.free_vars(id, &mut vars);
        self.for_all_assignments(&vars, |assignment| !self.eval(id, assignment))
    }

    /// True iff there is some assignment making `id` true.
    pub fn check_sat(&self, id: BoolId) -> bool {
        !self.is_false(id)
    }

    /// SAT-equivalence: true iff `a` and `b` agree on every assignment of
    /// their combined free variables.
    pub fn equivalent(&self, a: BoolId, b: BoolId) -> bool {
        if a == b {
            return true;
        }
        let mut vars = Vec::new();
        self.free_vars(a, &mut vars);
        self.free_vars(b, &mut vars);
        self.for_all_assignments(&vars, |assignment| {
            self.eval(a, assignment) == self.eval(b, assignment)
        })
    }

    fn for_all_assignments(&self, vars: &[u32], mut pred: impl FnMut(&HashMap<u32, bool>) -> bool) -> bool {
        let n = vars.len();
        if n > 20 {
            // Formulas this large should not occur in practice (see design
            // notes); fail closed rather than spend minutes enumerating.
            return false;
        }
        let mut assignment = HashMap::new();
        for bits in 0..(1u32 << n) {
            for (i, v) in vars.iter().enumerate() {
                assignment.insert(*v, (bits >> i) & 1 == 1);
            }
            if !pred(&assignment) {
                return false;
            }
        }
        true
    }

    /// Lifts an IL expression into the boolean algebra, recognizing
    /// `Not`/`And`/`Or` shapes structurally and interning anything else
    /// as an opaque leaf.
    pub fn ail_to_bool(&mut self, expr: &IlExpr) -> BoolId {
        match expr {
            IlExpr::Const(0) => FALSE,
            IlExpr::Const(_) => TRUE,
            IlExpr::UnaryOp {
                op: UnaryOp::Not,
                operand,
            } => {
                let inner = self.ail_to_bool(operand);
                self.mk_not(inner)
            }
            IlExpr::BinaryOp {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                let l = self.ail_to_bool(lhs);
                let r = self.ail_to_bool(rhs);
                self.mk_and(&[l, r])
            }
            IlExpr::BinaryOp {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => {
                let l = self.ail_to_bool(lhs);
                let r = self.ail_to_bool(rhs);
                self.mk_or(&[l, r])
            }
            other => self.mk_var(other.clone()),
        }
    }

    /// Lowers a formula back to an IL expression via the condition
    /// mapping, synthesizing `Not`/`And`/`Or` IL nodes for compound
    /// formulas that have no registered leaf.
    pub fn bool_to_ail(&self, id: BoolId) -> IlExpr {
        match self.node(id) {
            BoolNode::True => IlExpr::Const(1),
            BoolNode::False => IlExpr::Const(0),
            BoolNode::Var(sym) => self.symbols[*sym as usize].clone(),
            BoolNode::Not(inner) => IlExpr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(self.bool_to_ail(*inner)),
            },
            BoolNode::And(children) => self.fold_binop(children, BinaryOp::And),
            BoolNode::Or(children) => self.fold_binop(children, BinaryOp::Or),
        }
    }

    fn fold_binop(&self, children: &[BoolId], op: BinaryOp) -> IlExpr {
        let mut iter = children.iter();
        let first = iter
            .next()
            .map(|c| self.bool_to_ail(*c))
            .unwrap_or(IlExpr::Const(1));
        iter.fold(first, |acc, c| IlExpr::BinaryOp {
            op,
            lhs: Box::new(acc),
            rhs: Box::new(self.bool_to_ail(*c)),
        })
    }

    /// The top-level conjuncts of `id`: its `And` children if it is one,
    /// or the single-element list `[id]` otherwise. Used by
    /// common-subexpression guarding (§4.6 step 3), which needs to peel
    /// one conjunct at a time off a reaching condition.
    pub fn conjuncts(&self, id: BoolId) -> Vec<BoolId> {
        match self.node(id) {
            BoolNode::And(children) => children.clone(),
            _ => vec![id],
        }
    }

    /// True if no `BoolAst` leaves remain reachable -- used by the final
    /// invariant check once lowering has completed for a subtree. Always
    /// true for this cache's own ids since lowering happens eagerly; kept
    /// for symmetry with the engine's other leaf-absence checks.
    pub fn is_leafless(&self, id: BoolId) -> bool {
        matches!(self.node(id), BoolNode::True | BoolNode::False)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(cache: &mut BoolCache, name: &str) -> BoolId {
        cache.mk_var(IlExpr::Register(name.to_string()))
    }

    #[test]
    fn test_double_negation_collapses() {
        let mut cache = BoolCache::new();
        let a = leaf(&mut cache, "a");
        let not_a = cache.mk_not(a);
        let not_not_a = cache.mk_not(not_a);
        assert_eq!(not_not_a, a);
    }

    #[test]
    fn test_and_with_false_is_false() {
        let mut cache = BoolCache::new();
        let a = leaf(&mut cache, "a");
        let conj = cache.mk_and(&[a, FALSE]);
        assert_eq!(conj, FALSE);
    }

    #[test]
    fn test_or_identity_and_dedup() {
        let mut cache = BoolCache::new();
        let a = leaf(&mut cache, "a");
        let disj = cache.mk_or(&[a, FALSE, a]);
        assert_eq!(disj, a);
    }

    #[test]
    fn test_complementary_and_is_false() {
        let mut cache = BoolCache::new();
        let a = leaf(&mut cache, "a");
        let not_a = cache.mk_not(a);
        let conj = cache.mk_and(&[a, not_a]);
        assert_eq!(conj, FALSE);
    }

    #[test]
    fn test_equivalent_by_truth_table() {
        let mut cache = BoolCache::new();
        let a = leaf(&mut cache, "a");
        let b = leaf(&mut cache, "b");
        let not_a = cache.mk_not(a);
        let not_b = cache.mk_not(b);
        // ¬(a ∧ b) ≡ ¬a ∨ ¬b
        let lhs = cache.mk_not(cache.mk_and(&[a, b]));
        let rhs = cache.mk_or(&[not_a, not_b]);
        assert!(cache.equivalent(lhs, rhs));
    }

    #[test]
    fn test_short_circuit_reversal() {
        let mut cache = BoolCache::new();
        let a = leaf(&mut cache, "a");
        let b = leaf(&mut cache, "b");
        let not_a = cache.mk_not(a);
        let not_b = cache.mk_not(b);
        let and_a_not_b = cache.mk_and(&[a, not_b]);
        let formula = cache.mk_or(&[not_a, and_a_not_b]);
        let simplified = cache.simplify(formula);
        let expected = cache.mk_not(cache.mk_and(&[a, b]));
        assert!(cache.equivalent(simplified, expected));
    }

    #[test]
    fn test_roundtrip_ail_to_bool_to_ail() {
        let mut cache = BoolCache::new();
        let reg = IlExpr::Register("flag".to_string());
        let id = cache.ail_to_bool(&reg);
        assert_eq!(cache.bool_to_ail(id), reg);
    }
}
