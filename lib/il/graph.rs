//! A `ReilGraph` is a directed `Graph` of `Block` and `Edge`, keyed by
//! REIL address.

use crate::il::*;
use crate::{graph, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A directed graph of REIL blocks and typed edges.
///
/// Every edge's endpoints must be blocks of the graph; `link` enforces
/// this and is the only way to create an edge. Linking updates the
/// adjacency of both endpoints in the same operation, so a graph can
/// never hold an edge only one of its endpoints knows about.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ReilGraph {
    graph: graph::Graph<Block, Edge>,
}

impl ReilGraph {
    pub fn new() -> ReilGraph {
        ReilGraph {
            graph: graph::Graph::new(),
        }
    }

    /// Returns the underlying graph.
    pub fn graph(&self) -> &graph::Graph<Block, Edge> {
        &self.graph
    }

    /// Add a block to this graph.
    /// # Errors
    /// Error if a block with the same address already exists.
    pub fn add_block(&mut self, block: Block) -> Result<(), Error> {
        self.graph.insert_vertex(block)
    }

    /// Link two blocks with a typed edge, updating the adjacency of both
    /// endpoints.
    /// # Errors
    /// `Error::GraphVertexNotFound` if either endpoint is not a block of
    /// this graph.
    pub fn link(&mut self, head: u64, tail: u64, type_: EdgeType) -> Result<(), Error> {
        self.graph.insert_edge(Edge::new(head, tail, type_))
    }

    /// Get a `Block` by its address.
    pub fn block(&self, address: u64) -> Result<&Block, Error> {
        self.graph.vertex(address)
    }

    /// Get a mutable reference to a `Block` by its address.
    pub fn block_mut(&mut self, address: u64) -> Result<&mut Block, Error> {
        self.graph.vertex_mut(address)
    }

    /// Returns true if a block with the given address exists.
    pub fn has_block(&self, address: u64) -> bool {
        self.graph.has_vertex(address)
    }

    /// Get every `Block` in this graph, in address order.
    pub fn blocks(&self) -> Vec<&Block> {
        self.graph.vertices()
    }

    /// Get an `Edge` by its head and tail block addresses.
    pub fn edge(&self, head: u64, tail: u64) -> Result<&Edge, Error> {
        self.graph.edge(head, tail)
    }

    /// Get every `Edge` in this graph.
    pub fn edges(&self) -> Vec<&Edge> {
        self.graph.edges()
    }

    /// Get every edge out of the block at the given address.
    pub fn edges_out(&self, address: u64) -> Result<Vec<&Edge>, Error> {
        self.graph.edges_out(address)
    }

    /// Get every edge into the block at the given address.
    pub fn edges_in(&self, address: u64) -> Result<Vec<&Edge>, Error> {
        self.graph.edges_in(address)
    }

    /// Get the addresses of the blocks the given block links to.
    pub fn children(&self, address: u64) -> Result<Vec<u64>, Error> {
        self.graph.successor_indices(address)
    }

    /// Get the addresses of the blocks which link to the given block.
    pub fn parents(&self, address: u64) -> Result<Vec<u64>, Error> {
        self.graph.predecessor_indices(address)
    }

    pub fn num_blocks(&self) -> usize {
        self.graph.num_vertices()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.num_edges()
    }

    /// Get every instruction in this graph, in address order.
    pub fn instructions(&self) -> Vec<&Instruction> {
        self.blocks()
            .into_iter()
            .flat_map(|block| block.instructions().iter())
            .collect()
    }
}

impl Default for ReilGraph {
    fn default() -> ReilGraph {
        ReilGraph::new()
    }
}

impl fmt::Display for ReilGraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for block in self.blocks() {
            writeln!(f, "{}", block)?;
        }
        for edge in self.edges() {
            writeln!(f, "edge {}", edge)?;
        }
        Ok(())
    }
}
