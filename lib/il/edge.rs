//! An `Edge` is a typed, directed edge between `Block`s in a `ReilGraph`.
//!
//! REIL edges carry a closed `EdgeType` instead of a guard expression;
//! downstream traversals distinguish taken from not-taken control flow by
//! the type alone. To create a new edge, call `ReilGraph::link`, which
//! updates the adjacency of both endpoints in the same operation.

use crate::graph;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of control flow an `Edge` represents.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum EdgeType {
    /// An always-taken jump.
    JumpUnconditional,
    /// The taken side of a conditional jump.
    JumpConditionalTrue,
    /// The not-taken side of a conditional jump.
    JumpConditionalFalse,
    /// Control enters an inlined function.
    EnterInlinedFunction,
    /// Control returns from an inlined function.
    LeaveInlinedFunction,
    /// Linear flow into the next block.
    Fallthrough,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            EdgeType::JumpUnconditional => "jump",
            EdgeType::JumpConditionalTrue => "true",
            EdgeType::JumpConditionalFalse => "false",
            EdgeType::EnterInlinedFunction => "enter-inlined",
            EdgeType::LeaveInlinedFunction => "leave-inlined",
            EdgeType::Fallthrough => "fallthrough",
        };
        write!(f, "{}", s)
    }
}

/// Edge between REIL blocks.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Edge {
    head: u64,
    tail: u64,
    type_: EdgeType,
}

impl Edge {
    pub(crate) fn new(head: u64, tail: u64, type_: EdgeType) -> Edge {
        Edge { head, tail, type_ }
    }

    /// The address of the block this `Edge` leaves.
    pub fn head(&self) -> u64 {
        self.head
    }

    /// The address of the block this `Edge` enters.
    pub fn tail(&self) -> u64 {
        self.tail
    }

    /// The type of this `Edge`.
    pub fn type_(&self) -> EdgeType {
        self.type_
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(0x{:x} -> 0x{:x}) {}", self.head, self.tail, self.type_)
    }
}

impl graph::Edge for Edge {
    fn head(&self) -> u64 {
        self.head
    }
    fn tail(&self) -> u64 {
        self.tail
    }
    fn dot_label(&self) -> String {
        self.type_.to_string()
    }
    fn dot_fill_color(&self) -> String {
        match self.type_ {
            EdgeType::JumpConditionalTrue => "#00aa00".to_string(),
            EdgeType::JumpConditionalFalse => "#aa0000".to_string(),
            _ => "#000000".to_string(),
        }
    }
}
