//! Bipartite compound–patent graph.
//!
//! The full graph is an undirected `petgraph` graph with two disjoint vertex
//! classes laid out contiguously:
//!
//! - compound vertices at indices `[0, num_compounds)`
//! - patent vertices at indices `[num_compounds, num_compounds + num_patents)`
//!
//! Edges only ever join a compound to a patent. [`BipartiteGraph`] checks this
//! on construction and on load, and the extractor relies on it.
//!
//! - [`extract`]: per-checkpoint induced subgraphs
//! - [`stats`]: degree, component and clustering statistics

pub mod extract;
pub mod stats;

use std::ops::Range;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// A vertex of the bipartite graph, carrying its external identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vertex {
    /// A chemical compound, labelled with its stable external identifier.
    Compound(String),
    /// A patent document.
    Patent(String),
}

impl Vertex {
    /// The external identifier of this vertex.
    pub fn identifier(&self) -> &str {
        match self {
            Vertex::Compound(id) | Vertex::Patent(id) => id,
        }
    }

    /// Whether this is a compound vertex.
    pub fn is_compound(&self) -> bool {
        matches!(self, Vertex::Compound(_))
    }
}

/// Undirected compound–patent graph with the contiguous two-class layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BipartiteGraph {
    graph: UnGraph<Vertex, ()>,
    num_compounds: usize,
    num_patents: usize,
}

impl BipartiteGraph {
    /// Build a graph from compound identifiers, patent identifiers, and edges
    /// given as `(compound_index, patent_index)` pairs in full-graph indexing
    /// (patent indices already offset by the compound count).
    ///
    /// Rejects edges that do not join a compound to a patent.
    pub fn from_edges(
        compounds: Vec<String>,
        patents: Vec<String>,
        edges: &[(usize, usize)],
    ) -> GraphResult<Self> {
        let num_compounds = compounds.len();
        let num_patents = patents.len();
        let vertex_count = num_compounds + num_patents;

        let mut graph = UnGraph::with_capacity(vertex_count, edges.len());
        for id in compounds {
            graph.add_node(Vertex::Compound(id));
        }
        for id in patents {
            graph.add_node(Vertex::Patent(id));
        }

        for &(a, b) in edges {
            for index in [a, b] {
                if index >= vertex_count {
                    return Err(GraphError::VertexOutOfRange {
                        index,
                        vertex_count,
                    });
                }
            }
            if (a < num_compounds) == (b < num_compounds) {
                return Err(GraphError::NotBipartite { a, b });
            }
            graph.add_edge(NodeIndex::new(a), NodeIndex::new(b), ());
        }

        Ok(Self {
            graph,
            num_compounds,
            num_patents,
        })
    }

    /// Wrap an existing petgraph graph, checking the layout and class separation.
    pub fn from_petgraph(
        graph: UnGraph<Vertex, ()>,
        num_compounds: usize,
        num_patents: usize,
    ) -> GraphResult<Self> {
        let bipartite = Self {
            graph,
            num_compounds,
            num_patents,
        };
        bipartite.validate()?;
        Ok(bipartite)
    }

    /// Check the vertex layout and that every edge crosses the two classes.
    pub fn validate(&self) -> GraphResult<()> {
        let vertex_count = self.graph.node_count();
        if self.num_compounds + self.num_patents != vertex_count {
            return Err(GraphError::LayoutMismatch {
                num_compounds: self.num_compounds,
                num_patents: self.num_patents,
                vertex_count,
            });
        }
        let misplaced = self
            .graph
            .node_indices()
            .any(|idx| self.graph[idx].is_compound() != (idx.index() < self.num_compounds));
        if misplaced {
            return Err(GraphError::LayoutMismatch {
                num_compounds: self.num_compounds,
                num_patents: self.num_patents,
                vertex_count,
            });
        }
        for edge in self.graph.edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            if self.is_compound(a) == self.is_compound(b) {
                return Err(GraphError::NotBipartite { a, b });
            }
        }
        Ok(())
    }

    /// Number of compound vertices, which occupy the leading indices.
    pub fn num_compounds(&self) -> usize {
        self.num_compounds
    }

    /// Number of patent vertices, which follow the compounds.
    pub fn num_patents(&self) -> usize {
        self.num_patents
    }

    /// Total vertex count, compounds and patents together.
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of compound–patent edges, counting parallel edges separately.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Index range of compound vertices.
    pub fn compound_range(&self) -> Range<usize> {
        0..self.num_compounds
    }

    /// Index range of patent vertices.
    pub fn patent_range(&self) -> Range<usize> {
        self.num_compounds..self.num_compounds + self.num_patents
    }

    /// Whether `index` falls in the compound range.
    pub fn is_compound(&self, index: usize) -> bool {
        index < self.num_compounds
    }

    /// The vertex at `index`, if in range.
    pub fn vertex(&self, index: usize) -> Option<&Vertex> {
        self.graph.node_weight(NodeIndex::new(index))
    }

    /// Iterate `(index, identifier)` over compound vertices.
    pub fn compounds(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.compound_range()
            .filter_map(|i| self.vertex(i).map(|v| (i, v.identifier())))
    }

    /// Iterate edges as `(a, b)` vertex index pairs.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index()))
    }

    /// Borrow the underlying petgraph graph.
    pub fn petgraph(&self) -> &UnGraph<Vertex, ()> {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn layout_places_compounds_first() {
        let g = BipartiteGraph::from_edges(ids("C", 3), ids("P", 2), &[(0, 3), (1, 4)]).unwrap();
        assert_eq!(g.vertex_count(), 5);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.compound_range(), 0..3);
        assert_eq!(g.patent_range(), 3..5);
        assert_eq!(g.vertex(0), Some(&Vertex::Compound("C0".into())));
        assert_eq!(g.vertex(4), Some(&Vertex::Patent("P1".into())));
        assert!(g.validate().is_ok());
    }

    #[test]
    fn same_class_edges_are_rejected() {
        let err = BipartiteGraph::from_edges(ids("C", 2), ids("P", 2), &[(0, 1)]).unwrap_err();
        assert!(matches!(err, GraphError::NotBipartite { a: 0, b: 1 }));

        let err = BipartiteGraph::from_edges(ids("C", 2), ids("P", 2), &[(2, 3)]).unwrap_err();
        assert!(matches!(err, GraphError::NotBipartite { .. }));
    }

    #[test]
    fn out_of_range_edges_are_rejected() {
        let err = BipartiteGraph::from_edges(ids("C", 1), ids("P", 1), &[(0, 7)]).unwrap_err();
        assert!(matches!(
            err,
            GraphError::VertexOutOfRange {
                index: 7,
                vertex_count: 2
            }
        ));
    }

    #[test]
    fn from_petgraph_detects_layout_mismatch() {
        let mut graph = UnGraph::new_undirected();
        graph.add_node(Vertex::Patent("P0".into()));
        graph.add_node(Vertex::Compound("C0".into()));
        let err = BipartiteGraph::from_petgraph(graph, 1, 1).unwrap_err();
        assert!(matches!(err, GraphError::LayoutMismatch { .. }));
    }

    #[test]
    fn compounds_iterates_identifiers() {
        let g = BipartiteGraph::from_edges(ids("C", 2), ids("P", 1), &[]).unwrap();
        let compounds: Vec<_> = g.compounds().collect();
        assert_eq!(compounds, vec![(0, "C0"), (1, "C1")]);
    }
}
