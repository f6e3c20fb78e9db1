//! Per-checkpoint subgraph extraction.
//!
//! For a checkpoint, the vertex set is every resolved compound first seen at or
//! before that month, unioned with the *entire* patent range. Patents are never
//! filtered: a patent whose only compound edges are future-dated is still part
//! of the network at this checkpoint, it just has degree zero for now.
//!
//! The induced subgraph keeps the relative order of the kept vertices, so the
//! surviving compounds stay in front of the patents and the result is itself a
//! [`BipartiteGraph`] with the same patent count as the full graph.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::artifact::{self, ArtifactResult};
use crate::checkpoint::Checkpoint;
use crate::error::GraphError;
use crate::identifier::VertexIndex;
use crate::membership::MembershipTable;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use super::{BipartiteGraph, GraphResult};

/// The network as it existed through one checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subgraph {
    /// Checkpoint this snapshot was taken at.
    pub checkpoint: Checkpoint,
    /// Induced subgraph, compounds first then all patents.
    pub graph: BipartiteGraph,
}

impl Subgraph {
    /// Write to `dir` as `cpd_patent_<YYYY-MM>.bin`, returning the path.
    pub fn save_to_dir(&self, dir: &Path) -> ArtifactResult<PathBuf> {
        let path = dir.join(artifact::subgraph_file_name(self.checkpoint));
        artifact::write(&path, self)?;
        Ok(path)
    }

    /// Load a subgraph artifact.
    pub fn load(path: &Path) -> ArtifactResult<Self> {
        artifact::read(path)
    }
}

/// Full-graph vertex indices kept at `checkpoint`: eligible compounds in
/// ascending order, followed by the whole patent range.
pub fn vertex_set(
    full: &BipartiteGraph,
    checkpoint: Checkpoint,
    membership: &MembershipTable,
) -> GraphResult<Vec<usize>> {
    let mut compounds: Vec<usize> = membership
        .members_at_or_before(checkpoint)
        .into_iter()
        .map(VertexIndex::index)
        .collect();

    if let Some(&bad) = compounds.iter().find(|&&i| !full.is_compound(i)) {
        return Err(GraphError::VertexOutOfRange {
            index: bad,
            vertex_count: full.num_compounds(),
        });
    }
    compounds.sort_unstable();
    compounds.dedup();

    compounds.extend(full.patent_range());
    Ok(compounds)
}

/// Induce the subgraph of `full` for `checkpoint`.
pub fn extract(
    full: &BipartiteGraph,
    checkpoint: Checkpoint,
    membership: &MembershipTable,
) -> GraphResult<Subgraph> {
    let kept = vertex_set(full, checkpoint, membership)?;
    let num_compounds = kept.len() - full.num_patents();

    let mut keep = vec![false; full.vertex_count()];
    for &i in &kept {
        keep[i] = true;
    }

    let induced = full.petgraph().filter_map(
        |idx, vertex| keep[idx.index()].then(|| vertex.clone()),
        |_, edge| Some(*edge),
    );

    let graph = BipartiteGraph {
        graph: induced,
        num_compounds,
        num_patents: full.num_patents(),
    };

    tracing::debug!(
        checkpoint = %checkpoint,
        compounds = graph.num_compounds(),
        patents = graph.num_patents(),
        edges = graph.edge_count(),
        "extracted subgraph"
    );

    Ok(Subgraph { checkpoint, graph })
}

/// Extracts a run of chronologically increasing checkpoints without
/// rescanning the whole graph each time.
///
/// The kept-compound mask persists between calls. Advancing from one checkpoint
/// to a later one only adds the compounds first seen in between, and the
/// induced subgraph is assembled from the kept compounds' own edges, so the cost
/// of each step is proportional to the subgraph produced rather than to the
/// full graph. Asking for an earlier checkpoint than the previous call rebuilds
/// the mask from scratch.
pub struct IncrementalExtractor<'a> {
    full: &'a BipartiteGraph,
    membership: &'a MembershipTable,
    keep: Vec<bool>,
    kept_count: usize,
    last: Option<Checkpoint>,
}

impl<'a> IncrementalExtractor<'a> {
    pub fn new(full: &'a BipartiteGraph, membership: &'a MembershipTable) -> Self {
        Self {
            full,
            membership,
            keep: vec![false; full.num_compounds()],
            kept_count: 0,
            last: None,
        }
    }

    fn admit(&mut self, members: Vec<VertexIndex>) -> GraphResult<()> {
        for vertex in members {
            let i = vertex.index();
            if !self.full.is_compound(i) {
                return Err(GraphError::VertexOutOfRange {
                    index: i,
                    vertex_count: self.full.num_compounds(),
                });
            }
            if !self.keep[i] {
                self.keep[i] = true;
                self.kept_count += 1;
            }
        }
        Ok(())
    }

    /// The subgraph for `checkpoint`.
    pub fn advance(&mut self, checkpoint: Checkpoint) -> GraphResult<Subgraph> {
        let growth = match self.last {
            Some(last) if last <= checkpoint => self.membership.members_between(last, checkpoint),
            _ => {
                self.keep.iter_mut().for_each(|k| *k = false);
                self.kept_count = 0;
                self.membership.members_at_or_before(checkpoint)
            }
        };
        self.admit(growth)?;
        self.last = Some(checkpoint);

        let full = self.full.petgraph();
        let patent_offset = self.full.num_compounds();
        let mut graph = UnGraph::with_capacity(self.kept_count + self.full.num_patents(), 0);

        let kept: Vec<usize> = (0..self.keep.len()).filter(|&i| self.keep[i]).collect();
        for &i in &kept {
            graph.add_node(full[NodeIndex::new(i)].clone());
        }
        for p in self.full.patent_range() {
            graph.add_node(full[NodeIndex::new(p)].clone());
        }
        for (new_idx, &i) in kept.iter().enumerate() {
            for edge in full.edges(NodeIndex::new(i)) {
                let other = if edge.source().index() == i {
                    edge.target().index()
                } else {
                    edge.source().index()
                };
                let patent = self.kept_count + (other - patent_offset);
                graph.add_edge(NodeIndex::new(new_idx), NodeIndex::new(patent), ());
            }
        }

        let graph = BipartiteGraph {
            graph,
            num_compounds: self.kept_count,
            num_patents: self.full.num_patents(),
        };
        tracing::debug!(
            checkpoint = %checkpoint,
            compounds = graph.num_compounds(),
            edges = graph.edge_count(),
            "advanced incremental extraction"
        );
        Ok(Subgraph { checkpoint, graph })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Vertex;
    use crate::identifier::IdentifierIndex;
    use crate::membership::MembershipRow;

    fn cp(label: &str) -> Checkpoint {
        label.parse().unwrap()
    }

    /// Three compounds first seen Jan/Feb/Mar 2000; two patents, each linked to
    /// compounds 1 and 2 (vertices 0 and 1).
    fn toy() -> (BipartiteGraph, MembershipTable) {
        let full = BipartiteGraph::from_edges(
            vec!["C1".into(), "C2".into(), "C3".into()],
            vec!["P1".into(), "P2".into()],
            &[(0, 3), (1, 3), (0, 4), (1, 4)],
        )
        .unwrap();
        let index = IdentifierIndex::from_graph(&full).unwrap();
        let rows = [("C1", "2000-01"), ("C2", "2000-02"), ("C3", "2000-03")]
            .into_iter()
            .map(|(id, month)| MembershipRow {
                identifier: id.into(),
                first_seen: cp(month),
                vertex: index.resolve(id),
            })
            .collect();
        (full, MembershipTable::from_rows(rows))
    }

    #[test]
    fn february_keeps_two_compounds_and_all_edges() {
        let (full, table) = toy();
        let sub = extract(&full, cp("2000-02"), &table).unwrap();
        assert_eq!(sub.graph.num_compounds(), 2);
        assert_eq!(sub.graph.num_patents(), 2);
        assert_eq!(sub.graph.edge_count(), 4);
    }

    #[test]
    fn january_keeps_only_compound_one_edges() {
        let (full, table) = toy();
        let sub = extract(&full, cp("2000-01"), &table).unwrap();
        assert_eq!(sub.graph.num_compounds(), 1);
        assert_eq!(sub.graph.num_patents(), 2);
        assert_eq!(sub.graph.edge_count(), 2);
        assert_eq!(sub.graph.vertex(0), Some(&Vertex::Compound("C1".into())));
        for (a, b) in sub.graph.edges() {
            assert!(a == 0 || b == 0);
        }
    }

    #[test]
    fn patents_survive_before_any_compound() {
        let (full, table) = toy();
        let sub = extract(&full, cp("1999-12"), &table).unwrap();
        assert_eq!(sub.graph.num_compounds(), 0);
        assert_eq!(sub.graph.num_patents(), full.num_patents());
        assert_eq!(sub.graph.edge_count(), 0);
    }

    #[test]
    fn extracted_edges_stay_bipartite_and_within_full_graph() {
        let (full, table) = toy();
        let full_edges: Vec<(String, String)> = full
            .edges()
            .map(|(a, b)| {
                (
                    full.vertex(a).unwrap().identifier().to_string(),
                    full.vertex(b).unwrap().identifier().to_string(),
                )
            })
            .collect();

        for month in ["2000-01", "2000-02", "2000-03"] {
            let sub = extract(&full, cp(month), &table).unwrap();
            assert!(sub.graph.validate().is_ok());
            for (a, b) in sub.graph.edges() {
                let pair = (
                    sub.graph.vertex(a).unwrap().identifier().to_string(),
                    sub.graph.vertex(b).unwrap().identifier().to_string(),
                );
                assert!(full_edges.contains(&pair));
            }
        }
    }

    #[test]
    fn vertex_set_rejects_patent_indices_from_membership() {
        let (full, _) = toy();
        let table = MembershipTable::from_rows(vec![MembershipRow {
            identifier: "BROKEN".into(),
            first_seen: cp("2000-01"),
            vertex: VertexIndex::new(3),
        }]);
        let err = vertex_set(&full, cp("2000-01"), &table).unwrap_err();
        assert!(matches!(err, GraphError::VertexOutOfRange { index: 3, .. }));
    }

    #[test]
    fn subgraph_artifact_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let (full, table) = toy();
        let sub = extract(&full, cp("2000-02"), &table).unwrap();
        let path = sub.save_to_dir(dir.path()).unwrap();
        assert!(path.ends_with("cpd_patent_2000-02.bin"));

        let back = Subgraph::load(&path).unwrap();
        assert_eq!(back.checkpoint, cp("2000-02"));
        assert_eq!(back.graph.edge_count(), 4);
        assert!(back.graph.validate().is_ok());
    }

    fn edge_names(graph: &BipartiteGraph) -> Vec<(String, String)> {
        let mut names: Vec<_> = graph
            .edges()
            .map(|(a, b)| {
                let (a, b) = if a < b { (a, b) } else { (b, a) };
                (
                    graph.vertex(a).unwrap().identifier().to_string(),
                    graph.vertex(b).unwrap().identifier().to_string(),
                )
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn incremental_matches_direct_extraction() {
        let (full, table) = toy();
        let mut inc = IncrementalExtractor::new(&full, &table);
        for month in ["1999-12", "2000-01", "2000-02", "2000-03", "2000-04"] {
            let direct = extract(&full, cp(month), &table).unwrap();
            let stepped = inc.advance(cp(month)).unwrap();
            assert_eq!(stepped.graph.num_compounds(), direct.graph.num_compounds());
            assert_eq!(stepped.graph.num_patents(), direct.graph.num_patents());
            assert_eq!(edge_names(&stepped.graph), edge_names(&direct.graph));
            assert!(stepped.graph.validate().is_ok());
        }
    }

    #[test]
    fn incremental_rewinds_on_earlier_checkpoint() {
        let (full, table) = toy();
        let mut inc = IncrementalExtractor::new(&full, &table);
        inc.advance(cp("2000-03")).unwrap();
        let back = inc.advance(cp("2000-01")).unwrap();
        assert_eq!(back.graph.num_compounds(), 1);
        assert_eq!(back.graph.edge_count(), 2);
    }
}
