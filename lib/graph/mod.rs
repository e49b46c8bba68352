//! Implements a directed graph.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::Error;

pub trait Vertex: Clone + Sync {
    // The index of this vertex.
    fn index(&self) -> u64;
    // A string to display in dot graphviz format.
    fn dot_label(&self) -> String;
    // Fill color in dot graphviz format.
    fn dot_fill_color(&self) -> String {
        "#ffddcc".to_string()
    }
    // Font color in dot graphviz format.
    fn dot_font_color(&self) -> String {
        "#000000".to_string()
    }
}

pub trait Edge: Clone + Sync {
    /// The index of the head vertex.
    fn head(&self) -> u64;
    /// The index of the tail vertex.
    fn tail(&self) -> u64;
    /// A string to display in dot graphviz format.
    fn dot_label(&self) -> String;
    // Style in dot graphviz format.
    fn dot_style(&self) -> String {
        "solid".to_string()
    }
    // Fill color in dot graphviz format.
    fn dot_fill_color(&self) -> String {
        "#000000".to_string()
    }
    // Font color in dot graphviz format.
    fn dot_font_color(&self) -> String {
        "#000000".to_string()
    }
}

/// A directed graph.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Graph<V: Vertex, E: Edge> {
    vertices: BTreeMap<u64, V>,
    edges: BTreeMap<(u64, u64), E>,
    successors: BTreeMap<u64, BTreeSet<u64>>,
    predecessors: BTreeMap<u64, BTreeSet<u64>>,
}

impl<V, E> Graph<V, E>
where
    V: Vertex,
    E: Edge,
{
    pub fn new() -> Graph<V, E> {
        Graph {
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            successors: BTreeMap::new(),
            predecessors: BTreeMap::new(),
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if the vertex with the given index exists in this graph
    pub fn has_vertex(&self, index: u64) -> bool {
        self.vertices.contains_key(&index)
    }

    /// Returns true if the edge with the given head and tail index exists in this graph
    pub fn has_edge(&self, head: u64, tail: u64) -> bool {
        self.edges.contains_key(&(head, tail))
    }

    /// Removes a vertex, and all edges associated with that vertex.
    pub fn remove_vertex(&mut self, index: u64) -> Result<(), Error> {
        if !self.has_vertex(index) {
            return Err(Error::GraphVertexNotFound(index));
        }

        self.vertices.remove(&index);

        // find all edges that deal with this vertex
        let mut edges = FxHashSet::default();
        if let Some(successors) = self.successors.get(&index) {
            for successor in successors {
                edges.insert((index, *successor));
            }
        };
        if let Some(predecessors) = self.predecessors.get(&index) {
            for predecessor in predecessors {
                edges.insert((*predecessor, index));
            }
        };

        for edge in edges {
            self.remove_edge(edge.0, edge.1)?;
        }

        self.predecessors.remove(&index);
        self.successors.remove(&index);

        Ok(())
    }

    /// Removes an edge
    pub fn remove_edge(&mut self, head: u64, tail: u64) -> Result<(), Error> {
        if !self.has_edge(head, tail) {
            return Err(Error::GraphEdgeNotFound(head, tail));
        }

        self.edges.remove(&(head, tail));

        self.predecessors.get_mut(&tail).unwrap().remove(&head);

        self.successors.get_mut(&head).unwrap().remove(&tail);

        Ok(())
    }

    /// Inserts a vertex into the graph.
    /// # Errors
    /// Error if the vertex already exists by index.
    pub fn insert_vertex(&mut self, v: V) -> Result<(), Error> {
        if self.vertices.contains_key(&v.index()) {
            return Err("duplicate vertex index".into());
        }
        self.successors.insert(v.index(), BTreeSet::new());
        self.predecessors.insert(v.index(), BTreeSet::new());
        self.vertices.insert(v.index(), v);
        Ok(())
    }

    /// Inserts an edge into the graph, updating the adjacency of both
    /// endpoints.
    /// # Errors
    /// Error if the edge already exists by indices, or if either endpoint
    /// is not a vertex in this graph.
    pub fn insert_edge(&mut self, edge: E) -> Result<(), Error> {
        if self.edges.contains_key(&(edge.head(), edge.tail())) {
            return Err("duplicate edge".into());
        }
        if !self.vertices.contains_key(&edge.head()) {
            return Err(Error::GraphVertexNotFound(edge.head()));
        }
        if !self.vertices.contains_key(&edge.tail()) {
            return Err(Error::GraphVertexNotFound(edge.tail()));
        }

        self.successors
            .get_mut(&edge.head())
            .unwrap()
            .insert(edge.tail());
        self.predecessors
            .get_mut(&edge.tail())
            .unwrap()
            .insert(edge.head());
        self.edges.insert((edge.head(), edge.tail()), edge);

        Ok(())
    }

    /// Returns all immediate successors of a vertex from the graph.
    pub fn successors(&self, index: u64) -> Result<Vec<&V>, Error> {
        if !self.vertices.contains_key(&index) {
            return Err(Error::GraphVertexNotFound(index));
        }

        Ok(self.successors[&index]
            .iter()
            .map(|index| self.vertices.get(index).unwrap())
            .collect())
    }

    /// Returns all immediate predecessors of a vertex from the graph.
    pub fn predecessors(&self, index: u64) -> Result<Vec<&V>, Error> {
        if !self.vertices.contains_key(&index) {
            return Err(Error::GraphVertexNotFound(index));
        }

        Ok(self.predecessors[&index]
            .iter()
            .map(|index| self.vertices.get(index).unwrap())
            .collect())
    }

    /// Returns the indices of all immediate successors of a vertex from the graph.
    pub fn successor_indices(&self, index: u64) -> Result<Vec<u64>, Error> {
        if !self.vertices.contains_key(&index) {
            return Err(Error::GraphVertexNotFound(index));
        }

        Ok(self.successors[&index].iter().cloned().collect())
    }

    /// Returns the indices of all immediate predecessors of a vertex from the graph.
    pub fn predecessor_indices(&self, index: u64) -> Result<Vec<u64>, Error> {
        if !self.vertices.contains_key(&index) {
            return Err(Error::GraphVertexNotFound(index));
        }

        Ok(self.predecessors[&index].iter().cloned().collect())
    }

    /// Computes the set of vertices reachable from the given index.
    pub fn reachable_vertices(&self, index: u64) -> Result<FxHashSet<u64>, Error> {
        if !self.has_vertex(index) {
            return Err(Error::GraphVertexNotFound(index));
        }

        let mut reachable_vertices: FxHashSet<u64> = FxHashSet::default();
        let mut queue: Vec<u64> = vec![index];

        reachable_vertices.insert(index);

        while let Some(vertex) = queue.pop() {
            self.successors
                .get(&vertex)
                .unwrap()
                .iter()
                .for_each(|&succ| {
                    if reachable_vertices.insert(succ) {
                        queue.push(succ)
                    }
                });
        }

        Ok(reachable_vertices)
    }

    /// Compute the pre order of all vertices in the graph
    pub fn compute_pre_order(&self, root: u64) -> Result<Vec<u64>, Error> {
        if !self.has_vertex(root) {
            return Err(Error::GraphVertexNotFound(root));
        }

        let mut visited: FxHashSet<u64> = FxHashSet::default();
        let mut stack: Vec<u64> = Vec::new();
        let mut order: Vec<u64> = Vec::new();

        stack.push(root);

        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }

            order.push(node);

            for &successor in &self.successors[&node] {
                stack.push(successor);
            }
        }

        Ok(order)
    }

    /// Returns all edges into the vertex with the given index.
    pub fn edges_in(&self, index: u64) -> Result<Vec<&E>, Error> {
        if !self.vertices.contains_key(&index) {
            return Err(Error::GraphVertexNotFound(index));
        }

        Ok(self.predecessors[&index]
            .iter()
            .map(|predecessor| &self.edges[&(*predecessor, index)])
            .collect())
    }

    /// Returns all edges out of the vertex with the given index.
    pub fn edges_out(&self, index: u64) -> Result<Vec<&E>, Error> {
        if !self.vertices.contains_key(&index) {
            return Err(Error::GraphVertexNotFound(index));
        }

        Ok(self.successors[&index]
            .iter()
            .map(|successor| &self.edges[&(index, *successor)])
            .collect())
    }

    /// Get a reference to the vertex with the given index.
    pub fn vertex(&self, index: u64) -> Result<&V, Error> {
        self.vertices
            .get(&index)
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Get a mutable reference to the vertex with the given index.
    pub fn vertex_mut(&mut self, index: u64) -> Result<&mut V, Error> {
        self.vertices
            .get_mut(&index)
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Get a reference to the edge with the given head and tail indices.
    pub fn edge(&self, head: u64, tail: u64) -> Result<&E, Error> {
        self.edges
            .get(&(head, tail))
            .ok_or(Error::GraphEdgeNotFound(head, tail))
    }

    /// Get a mutable reference to the edge with the given head and tail
    /// indices.
    pub fn edge_mut(&mut self, head: u64, tail: u64) -> Result<&mut E, Error> {
        self.edges
            .get_mut(&(head, tail))
            .ok_or(Error::GraphEdgeNotFound(head, tail))
    }

    /// Get a reference to every vertex in this graph.
    pub fn vertices(&self) -> Vec<&V> {
        self.vertices.values().collect()
    }

    /// Get a mutable reference to every vertex in this graph.
    pub fn vertices_mut(&mut self) -> Vec<&mut V> {
        self.vertices.values_mut().collect()
    }

    /// Get a reference to every edge in this graph.
    pub fn edges(&self) -> Vec<&E> {
        self.edges.values().collect()
    }

    /// Get a mutable reference to every edge in this graph.
    pub fn edges_mut(&mut self) -> Vec<&mut E> {
        self.edges.values_mut().collect()
    }

    /// Returns a string in the graphviz format
    pub fn dot_graph(&self) -> String {
        let vertices = self
            .vertices
            .iter()
            .map(|v| {
                let label = v.1.dot_label().replace('\n', "\\l");
                format!(
                    "{} [shape=\"box\", label=\"{}\", style=\"filled\", \
                     fillcolor=\"{}\", fontcolor=\"{}\"];",
                    v.1.index(),
                    label,
                    v.1.dot_fill_color(),
                    v.1.dot_font_color()
                )
            })
            .collect::<Vec<String>>();

        let edges = self
            .edges
            .iter()
            .map(|e| {
                let label = e.1.dot_label().replace('\n', "\\l");
                format!(
                    "{} -> {} [label=\"{}\", style=\"{}\", color=\"{}\", fontcolor=\"{}\"];",
                    e.1.head(),
                    e.1.tail(),
                    label,
                    e.1.dot_style(),
                    e.1.dot_fill_color(),
                    e.1.dot_font_color()
                )
            })
            .collect::<Vec<String>>();

        format!(
            "digraph G {{\noverlap=false\n{}\n{}\n}}",
            vertices.join("\n"),
            edges.join("\n")
        )
    }
}

impl<V: Vertex, E: Edge> Default for Graph<V, E> {
    fn default() -> Graph<V, E> {
        Graph::new()
    }
}

impl<V: Vertex + fmt::Debug, E: Edge> fmt::Display for Graph<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for vertex in self.vertices.values() {
            writeln!(f, "{:?}", vertex)?;
        }
        for edge in self.edges.keys() {
            writeln!(f, "0x{:x} -> 0x{:x}", edge.0, edge.1)?;
        }
        Ok(())
    }
}
