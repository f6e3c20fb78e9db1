//! Network statistics for extracted subgraphs.
//!
//! Everything here is exact: degree sequence, largest connected component, and
//! global clustering coefficient (transitivity). Degree statistics cover every
//! vertex, compounds and patents together.
//!
//! The loops that scale with graph size poll a [`CancelToken`] so a long run on
//! a very large checkpoint can be interrupted.

use std::collections::HashMap;
use std::time::Instant;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::StatsError;

use super::BipartiteGraph;

/// Result type for statistics computations.
pub type StatsResult<T> = std::result::Result<T, StatsError>;

/// How many edges union-find processes between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 1 << 16;

/// One row of the accumulated statistics table.
///
/// Serialized field names are the table's column headers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    #[serde(rename = "Nodes")]
    pub nodes: usize,
    #[serde(rename = "Edges")]
    pub edges: usize,
    #[serde(rename = "Avg Degree")]
    pub avg_degree: f64,
    #[serde(rename = "Max Degree")]
    pub max_degree: usize,
    #[serde(rename = "LCC Size")]
    pub lcc_size: usize,
    #[serde(rename = "Clustering coefficient")]
    pub clustering: f64,
}

/// Compute the statistics record for a bipartite subgraph.
pub fn compute(graph: &BipartiteGraph, cancel: &CancelToken) -> StatsResult<NetworkStats> {
    compute_undirected(graph.petgraph(), cancel)
}

/// Compute the statistics record for any undirected graph.
///
/// Fails with [`StatsError::EmptyGraph`] when there are no vertices, since the
/// mean degree is undefined there.
pub fn compute_undirected<N: Sync, E: Sync>(
    graph: &UnGraph<N, E>,
    cancel: &CancelToken,
) -> StatsResult<NetworkStats> {
    if graph.node_count() == 0 {
        return Err(StatsError::EmptyGraph);
    }

    let started = Instant::now();
    let degree_seq = degrees(graph);
    let total: usize = degree_seq.iter().sum();
    let avg_degree = total as f64 / degree_seq.len() as f64;
    let max_degree = degree_seq.iter().copied().max().unwrap_or(0);
    tracing::debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "degree statistics done"
    );

    if cancel.is_cancelled() {
        return Err(StatsError::Cancelled);
    }
    let lcc_size = largest_component_size(graph, cancel)?;
    let clustering = transitivity(graph, cancel)?;

    tracing::debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "network statistics done"
    );

    Ok(NetworkStats {
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        avg_degree,
        max_degree,
        lcc_size,
        clustering,
    })
}

/// Degree of every vertex, in vertex index order. Parallel edges count separately.
pub fn degrees<N: Sync, E: Sync>(graph: &UnGraph<N, E>) -> Vec<usize> {
    (0..graph.node_count())
        .into_par_iter()
        .map(|i| graph.edges(NodeIndex::new(i)).count())
        .collect()
}

/// Compound identifier → degree, for compound vertices only.
pub fn identifier_degrees(graph: &BipartiteGraph) -> HashMap<String, usize> {
    let g = graph.petgraph();
    graph
        .compounds()
        .map(|(i, id)| (id.to_string(), g.edges(NodeIndex::new(i)).count()))
        .collect()
}

fn uf_find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Union by size.
fn uf_union(parent: &mut [usize], size: &mut [usize], x: usize, y: usize) {
    let px = uf_find(parent, x);
    let py = uf_find(parent, y);
    if px == py {
        return;
    }
    let (big, small) = if size[px] >= size[py] { (px, py) } else { (py, px) };
    parent[small] = big;
    size[big] += size[small];
}

/// Vertex count of the largest connected component. Isolated vertices are
/// singleton components; an empty graph yields 0.
pub fn largest_component_size<N, E>(
    graph: &UnGraph<N, E>,
    cancel: &CancelToken,
) -> StatsResult<usize> {
    let n = graph.node_count();
    if n == 0 {
        return Ok(0);
    }

    let mut parent: Vec<usize> = (0..n).collect();
    let mut size: Vec<usize> = vec![1; n];

    for (processed, edge) in graph.edge_references().enumerate() {
        if processed % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(StatsError::Cancelled);
        }
        uf_union(
            &mut parent,
            &mut size,
            edge.source().index(),
            edge.target().index(),
        );
    }

    Ok((0..n)
        .filter(|&i| parent[i] == i)
        .map(|i| size[i])
        .max()
        .unwrap_or(0))
}

/// Sorted, deduplicated neighbour lists with self-loops removed.
fn simple_adjacency<N: Sync, E: Sync>(graph: &UnGraph<N, E>) -> Vec<Vec<u32>> {
    (0..graph.node_count())
        .into_par_iter()
        .map(|u| {
            let mut nbrs: Vec<u32> = graph
                .neighbors(NodeIndex::new(u))
                .map(|v| v.index())
                .filter(|&v| v != u)
                .map(|v| v as u32)
                .collect();
            nbrs.sort_unstable();
            nbrs.dedup();
            nbrs
        })
        .collect()
}

fn sorted_intersection_len(a: &[u32], b: &[u32]) -> u64 {
    let (mut i, mut j, mut count) = (0, 0, 0u64);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}

/// Global clustering coefficient: `3 * triangles / connected triples`, over
/// the simple graph underlying `graph`.
///
/// Defined as 0.0 when there are no connected triples.
pub fn transitivity<N: Sync, E: Sync>(
    graph: &UnGraph<N, E>,
    cancel: &CancelToken,
) -> StatsResult<f64> {
    let adjacency = simple_adjacency(graph);
    if cancel.is_cancelled() {
        return Err(StatsError::Cancelled);
    }

    let triples: u64 = adjacency
        .iter()
        .map(|nbrs| {
            let d = nbrs.len() as u64;
            d * d.saturating_sub(1) / 2
        })
        .sum();
    if triples == 0 {
        return Ok(0.0);
    }

    // Orient every edge from lower to higher (degree, index) rank so each
    // triangle is counted exactly once, at its lowest-ranked vertex.
    let rank = |v: usize| (adjacency[v].len(), v);
    let forward: Vec<Vec<u32>> = adjacency
        .par_iter()
        .enumerate()
        .map(|(u, nbrs)| {
            nbrs.iter()
                .copied()
                .filter(|&v| rank(v as usize) > rank(u))
                .collect()
        })
        .collect();
    drop(adjacency);

    let triangles: u64 = forward
        .par_iter()
        .map(|out_u| {
            if cancel.is_cancelled() {
                return 0;
            }
            out_u
                .iter()
                .map(|&v| sorted_intersection_len(out_u, &forward[v as usize]))
                .sum::<u64>()
        })
        .sum();
    if cancel.is_cancelled() {
        return Err(StatsError::Cancelled);
    }

    Ok(3.0 * triangles as f64 / triples as f64)
}
