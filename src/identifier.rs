//! Identifier index: compound external identifier ↔ full-graph vertex position.
//!
//! Identifiers that appear in the novelty feeds but not in the full graph are an
//! expected, bounded condition. [`IdentifierIndex::resolve`] returns `None` for
//! them and callers filter those out; it is never an error.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::graph::{BipartiteGraph, GraphResult};

/// Position of a vertex in the full bipartite graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct VertexIndex(u32);

impl VertexIndex {
    /// Create a vertex index. Returns `None` if it does not fit the graph's
    /// 32-bit index type.
    pub fn new(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(VertexIndex)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The tabular form used in exports: the index, or `-1` when unresolved.
    pub fn or_sentinel(vertex: Option<VertexIndex>) -> i64 {
        vertex.map_or(-1, |v| i64::from(v.0))
    }
}

impl fmt::Display for VertexIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Bidirectional mapping between compound identifiers and vertex positions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "IndexEntries", into = "IndexEntries")]
pub struct IdentifierIndex {
    forward: HashMap<String, VertexIndex>,
    reverse: HashMap<VertexIndex, String>,
}

/// On-disk form: a flat list of `(identifier, vertex)` pairs.
#[derive(Serialize, Deserialize)]
struct IndexEntries(Vec<(String, VertexIndex)>);

impl From<IndexEntries> for IdentifierIndex {
    fn from(entries: IndexEntries) -> Self {
        let mut index = IdentifierIndex::default();
        for (id, vertex) in entries.0 {
            index.reverse.insert(vertex, id.clone());
            index.forward.insert(id, vertex);
        }
        index
    }
}

impl From<IdentifierIndex> for IndexEntries {
    fn from(index: IdentifierIndex) -> Self {
        let mut entries: Vec<_> = index.forward.into_iter().collect();
        entries.sort_by_key(|(_, v)| *v);
        IndexEntries(entries)
    }
}

impl IdentifierIndex {
    /// Build from precomputed `(identifier, vertex)` pairs.
    ///
    /// Each identifier may map to one vertex only, and each vertex carries at
    /// most one identifier.
    pub fn from_pairs<I, S>(pairs: I) -> GraphResult<Self>
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        let mut index = IdentifierIndex::default();
        for (id, position) in pairs {
            let id = id.into();
            let vertex = VertexIndex::new(position).ok_or(GraphError::VertexOutOfRange {
                index: position,
                vertex_count: u32::MAX as usize,
            })?;
            if index.forward.contains_key(&id) {
                return Err(GraphError::DuplicateIdentifier { identifier: id });
            }
            if let Some(first) = index.reverse.get(&vertex) {
                return Err(GraphError::DuplicateVertex {
                    vertex: position,
                    first: first.clone(),
                    second: id,
                });
            }
            index.reverse.insert(vertex, id.clone());
            index.forward.insert(id, vertex);
        }
        Ok(index)
    }

    /// Derive the index from the identifier attribute of the graph's compound vertices.
    pub fn from_graph(graph: &BipartiteGraph) -> GraphResult<Self> {
        Self::from_pairs(graph.compounds().map(|(position, id)| (id, position)))
    }

    /// Resolve an identifier to its vertex. `None` means the compound is
    /// absent from the full graph.
    pub fn resolve(&self, identifier: &str) -> Option<VertexIndex> {
        self.forward.get(identifier).copied()
    }

    /// The identifier at a vertex position, if that vertex is a known compound.
    pub fn identifier(&self, vertex: VertexIndex) -> Option<&str> {
        self.reverse.get(&vertex).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
