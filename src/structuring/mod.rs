#![deny(missing_docs)]
//! The structuring engine's driver (§4.1-§4.2): walks a [`RegionForest`]
//! bottom-up, structuring every region with the acyclic or cyclic pipeline
//! depending on whether its graph contains a cycle, and splicing each
//! result back into its parent before the parent itself is structured.
//!
//! The walk uses an explicit stack and a `parent_map`, never recursion,
//! so a deeply nested region tree cannot blow the call stack.

use std::collections::{HashMap, HashSet};

use crate::ast::{AstNode, Cond};
use crate::bool_ast::BoolCache;
use crate::error::StructureError;
use crate::jump_table::JumpTables;
use crate::region::{RegionForest, RegionId, RegionMember};

mod acyclic;
mod cyclic;
mod reaching_condition;
mod switch;

/// Tunables for the structuring engine, mirroring how deeply this crate's
/// other configuration structs (see `utils`) expose knobs with defaults
/// suitable for direct use.
#[derive(Debug, Clone, Copy)]
pub struct StructureConfig {
    /// The number of local-rewrite iterations the acyclic pipeline may
    /// take on a single sequence before giving up. The original algorithm
    /// this engine is modeled on iterates until a fixed point with no
    /// bound; an unconditionally-growing rewrite loop on malformed input
    /// would otherwise hang forever, so this engine turns that into a
    /// reported error instead.
    pub max_iterations: usize,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self { max_iterations: 1000 }
    }
}

/// Structures every region in `forest`, starting from `root`, into a
/// single [`AstNode`] (§4.1-§4.2).
pub fn structure(
    mut forest: RegionForest,
    root: RegionId,
    jump_tables: &JumpTables,
    config: &StructureConfig,
) -> Result<AstNode, StructureError> {
    let mut cache = BoolCache::new();

    let mut parent_map: HashMap<RegionId, RegionId> = HashMap::new();
    let mut preorder: Vec<RegionId> = Vec::new();
    let mut seen: HashSet<RegionId> = HashSet::new();
    let mut stack = vec![root];
    while let Some(rid) = stack.pop() {
        if !seen.insert(rid) {
            continue;
        }
        preorder.push(rid);
        let region = forest.get(rid)?;
        for node in region.graph.node_indices() {
            if let RegionMember::SubRegion(child) = region.graph[node] {
                parent_map.insert(child, rid);
                stack.push(child);
            }
        }
    }

    // Every node in a tree appears before its descendants in any preorder
    // traversal; reversing the sequence therefore guarantees every region
    // is structured only after all of its children have been.
    for rid in preorder.into_iter().rev() {
        let region = forest.get(rid)?;
        let ast = if region.is_cyclic() {
            cyclic::structure_cyclic(region, &mut cache, jump_tables, config)?
        } else {
            acyclic::structure_acyclic(region, &mut cache, jump_tables, config)?
        };
        debug_assert!(
            no_bool_leaves_remain(&ast),
            "structuring must lower every Cond::Bool before returning"
        );

        match parent_map.get(&rid) {
            Some(&parent) => {
                let node = forest.find_sub_region_node(parent, rid)?.ok_or_else(|| {
                    StructureError::other("driver lost track of a sub-region's position in its parent")
                })?;
                forest.substitute(parent, node, ast)?;
            }
            None => return Ok(ast),
        }
    }

    Err(StructureError::EntryRegionNotFound {
        backtrace: std::backtrace::Backtrace::capture(),
    })
}

/// Lowers every `Cond::Bool` reachable from `node` to `Cond::Il`, in
/// place -- the final step of both pipelines (§4.6 step 8, §4.5), applied
/// once rewriting for that region has converged.
pub(crate) fn lower_conditions(node: &mut AstNode, cache: &BoolCache) {
    match node {
        AstNode::Code(code) => {
            if let Some(Cond::Bool(id)) = &code.reaching_condition {
                code.reaching_condition = Some(Cond::Il(cache.bool_to_ail(*id)));
            }
            lower_conditions(&mut code.inner, cache);
        }
        AstNode::Sequence(seq) => {
            for c in &mut seq.children {
                lower_conditions(c, cache);
            }
        }
        AstNode::Condition(cond) => {
            if let Cond::Bool(id) = &cond.cond {
                cond.cond = Cond::Il(cache.bool_to_ail(*id));
            }
            lower_conditions(&mut cond.true_child, cache);
            if let Some(fc) = &mut cond.false_child {
                lower_conditions(fc, cache);
            }
        }
        AstNode::Loop(l) => {
            if let Some(Cond::Bool(id)) = &l.cond {
                l.cond = Some(Cond::Il(cache.bool_to_ail(*id)));
            }
            for c in &mut l.body.children {
                lower_conditions(c, cache);
            }
        }
        AstNode::SwitchCase(sc) => {
            for v in sc.cases.values_mut() {
                lower_conditions(v, cache);
            }
            if let Some(d) = &mut sc.default {
                lower_conditions(d, cache);
            }
        }
        AstNode::ConditionalBreak(cb) => {
            if let Cond::Bool(id) = &cb.cond {
                cb.cond = Cond::Il(cache.bool_to_ail(*id));
            }
        }
        AstNode::Break(_) | AstNode::MultiBlock(_) | AstNode::IlBlock(_) => {}
    }
}

fn no_bool_leaves_remain(node: &AstNode) -> bool {
    let mut ok = true;
    crate::ast::walk(node, &mut |n| {
        let has_bool = match n {
            AstNode::Code(c) => matches!(c.reaching_condition, Some(Cond::Bool(_))),
            AstNode::Condition(c) => matches!(c.cond, Cond::Bool(_)),
            AstNode::Loop(l) => matches!(l.cond, Some(Cond::Bool(_))),
            AstNode::ConditionalBreak(cb) => matches!(cb.cond, Cond::Bool(_)),
            _ => false,
        };
        if has_bool {
            ok = false;
        }
    });
    ok
}
