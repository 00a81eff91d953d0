#![deny(missing_docs)]
//! Error types produced by the structuring pipeline.

use std::backtrace::Backtrace;

use serde::Serialize;
use thiserror::Error;

use crate::il::Addr;
use crate::region::RegionId;

/// Fatal error type for the structuring engine.
///
/// Every fallible entry point in this crate returns one of these. Per the
/// engine's own failure contract, structuring a sub-region always either
/// succeeds or returns one of these variants -- it never panics on
/// malformed input.
#[derive(Debug, Error, Serialize)]
pub enum StructureError {
    /// A region referenced by id does not exist in the forest.
    #[error("region not found: {:?}", region_id)]
    RegionNotFound {
        /// The region id that was not found.
        region_id: RegionId,

        /// The error backtrace.
        #[serde(skip)]
        backtrace: Backtrace,
    },

    /// The forest has no entry region, or the requested root is not a valid
    /// entry point.
    #[error("entry region not found")]
    EntryRegionNotFound {
        /// The error backtrace.
        #[serde(skip)]
        backtrace: Backtrace,
    },

    /// The acyclic rewrite pipeline exceeded its configured iteration bound
    /// without reaching a fixed point.
    #[error("maximum number of structuring iterations reached: {limit}")]
    MaxIterationsReached {
        /// The configured limit that was hit.
        limit: usize,

        /// The error backtrace.
        #[serde(skip)]
        backtrace: Backtrace,
    },

    /// A rewrite expected a `Condition` node with a particular shape
    /// (e.g. a single branch) but found something else.
    #[error("expected condition node not found")]
    ExpectedConditionNotFound {
        /// The error backtrace.
        #[serde(skip)]
        backtrace: Backtrace,
    },

    /// Loop successor recovery could not find a successor for a `break`
    /// target anywhere in the region or its ancestors.
    #[error("malformed region: loop at {head:?} has no resolvable successor")]
    MalformedRegion {
        /// The address of the loop head whose successor could not be found.
        head: Addr,

        /// The error backtrace.
        #[serde(skip)]
        backtrace: Backtrace,
    },

    /// A branch node inside a loop body has neither side clearly inside
    /// the loop nor clearly a recognized exit, or has more than the two
    /// outgoing edges a `ConditionalJump` can produce.
    #[error("loop body branch at {addr:?} has an ambiguous exit")]
    LoopExitAmbiguous {
        /// The address of the ambiguous branch node.
        addr: Addr,

        /// The error backtrace.
        #[serde(skip)]
        backtrace: Backtrace,
    },

    /// A structured loop body still contains a statement jumping straight
    /// back to its own head after the walk that strips natural back edges
    /// has already run -- a sign the body was assembled incorrectly.
    #[error("loop body at {head:?} retained a stray back edge to itself")]
    StrayBackEdge {
        /// The address of the loop head the stray edge targets.
        head: Addr,

        /// The error backtrace.
        #[serde(skip)]
        backtrace: Backtrace,
    },

    /// A cyclic region's own graph carries a node outside the loop body
    /// that is not an empty sink placeholder -- i.e. it holds real
    /// content instead of merely marking where a break edge lands. The
    /// upstream region identifier is expected to keep loop successor
    /// content in the *parent* region (spliced in after the `Loop` node by
    /// that parent's own acyclic pipeline); a cyclic region whose graph
    /// mixes the two would otherwise have its successor content silently
    /// dropped, since the cyclic pipeline only walks the loop body.
    #[error(
        "loop at {head:?} has non-sink content at {addr:?} outside its own body; \
         move it to the parent region"
    )]
    StrayLoopSuccessorContent {
        /// The address of the loop head.
        head: Addr,

        /// The address of the offending out-of-body node.
        addr: Addr,

        /// The error backtrace.
        #[serde(skip)]
        backtrace: Backtrace,
    },

    /// A jump table referenced by a comparison chain was not present in the
    /// jump table map supplied to the engine.
    #[error("jump table not found at {addr:?}")]
    JumpTableNotFound {
        /// The address the jump table was expected at.
        addr: Addr,

        /// The error backtrace.
        #[serde(skip)]
        backtrace: Backtrace,
    },

    /// Catch-all for conditions not covered by a dedicated variant above.
    #[error("a structuring error occurred: {message}")]
    Other {
        /// The error message.
        message: String,

        /// The error backtrace.
        #[serde(skip)]
        backtrace: Backtrace,
    },
}

impl StructureError {
    /// Builds an [`StructureError::Other`] from a message.
    pub fn other<S: Into<String>>(message: S) -> Self {
        StructureError::Other {
            message: message.into(),
            backtrace: Backtrace::capture(),
        }
    }
}

/// A narrow, locally-recovered signal distinct from [`StructureError`]:
/// raised when a rewrite walks into a block that turned out to be empty
/// after a prior rewrite removed its only statement. Callers catch this one
/// internally and retry or skip; it never escapes the crate's public API.
#[derive(Debug, Error)]
#[error("encountered an empty block while rewriting")]
pub struct EmptyBlockSignal;
