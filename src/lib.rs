#![deny(missing_docs)]

//! Recovers structured control flow -- sequences, conditionals, loops,
//! and switch/case -- from a region-decomposed control-flow graph.
//!
//! The input is a [`region::RegionForest`]: a flat arena of nested
//! regions, each a small graph of basic blocks and sub-region
//! references, produced by an upstream region-identification pass this
//! crate does not itself implement. The output is a single
//! [`ast::AstNode`] tree with no remaining gotos, jump-table reads, or
//! boolean reaching-condition leaves -- every condition is expressed in
//! the caller's own intermediate language.
//!
//! ```
//! use structurer_core::ast::AstNode;
//! use structurer_core::il::IlBlock;
//! use structurer_core::jump_table::JumpTables;
//! use structurer_core::region::{ControlFlowEdgeType, RegionForest, RegionMember};
//! use structurer_core::{structure, StructureConfig};
//!
//! let mut graph = petgraph::graph::DiGraph::new();
//! let a = graph.add_node(RegionMember::Block(IlBlock::new(0x10)));
//! let b = graph.add_node(RegionMember::Block(IlBlock::new(0x20)));
//! graph.add_edge(a, b, ControlFlowEdgeType::Fallthrough);
//!
//! let mut forest = RegionForest::new();
//! let root = forest.add_region(graph, a, vec![]);
//!
//! let ast = structure(forest, root, &JumpTables::new(), &StructureConfig::default()).unwrap();
//! assert!(matches!(ast, AstNode::Sequence(_)));
//! ```

/// The structured AST this crate produces.
pub mod ast;
/// The hash-consed boolean-formula algebra reaching conditions are built
/// from.
pub mod bool_ast;
/// Graphviz DOT rendering for debug visualization of a region graph.
pub mod cfg_dot;
/// Error types produced by the structuring pipeline.
pub mod error;
/// A minimal intermediate-language adapter.
pub mod il;
/// A minimal stand-in for the CFG subsystem's jump-table analysis.
pub mod jump_table;
/// The input region tree, rendered as a flat, index-addressed forest.
pub mod region;
/// The structuring engine's driver and rewrite pipelines.
pub mod structuring;
/// Utility functions and types shared across the crate.
pub mod utils;

pub use error::StructureError;
pub use structuring::{structure, StructureConfig};
