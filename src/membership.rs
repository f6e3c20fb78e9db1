//! Temporal membership table: first-seen month and vertex for every compound.
//!
//! Built once from the monthly novelty feeds, processed in chronological order
//! so that the earliest sighting of an identifier wins and later sightings are
//! no-ops. The table is then enriched by resolving every identifier through the
//! [`IdentifierIndex`].
//!
//! Rows are kept sorted by `(first_seen, identifier)`, which turns
//! [`MembershipTable::members_at_or_before`] into a prefix scan and lets
//! [`MembershipTable::members_between`] enumerate just the growth between two
//! checkpoints.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::{self, ArtifactResult};
use crate::checkpoint::Checkpoint;
use crate::error::LedgerError;
use crate::feed::{FeedResult, NoveltyFeed};
use crate::identifier::{IdentifierIndex, VertexIndex};

/// One compound's temporal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRow {
    /// Stable external identifier.
    pub identifier: String,
    /// Earliest month in which the compound appeared.
    pub first_seen: Checkpoint,
    /// Resolved full-graph vertex, `None` if absent from the graph.
    pub vertex: Option<VertexIndex>,
}

/// How many compounds resolved to a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub total: usize,
    pub unresolved: usize,
}

impl Coverage {
    /// Fraction of compounds with no vertex in the full graph.
    pub fn miss_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.unresolved as f64 / self.total as f64
        }
    }
}

/// Compound → (first-seen month, vertex) table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "TableRows")]
pub struct MembershipTable {
    rows: Vec<MembershipRow>,
    #[serde(skip)]
    lookup: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct TableRows {
    rows: Vec<MembershipRow>,
}

impl From<TableRows> for MembershipTable {
    fn from(raw: TableRows) -> Self {
        MembershipTable::from_rows(raw.rows)
    }
}

impl MembershipTable {
    /// Build the table from the feeds for `checkpoints`, then resolve every
    /// identifier through `index`.
    ///
    /// `checkpoints` are processed in chronological order regardless of the
    /// order given.
    pub fn build<F: NoveltyFeed + ?Sized>(
        feed: &F,
        checkpoints: &[Checkpoint],
        index: &IdentifierIndex,
    ) -> FeedResult<Self> {
        let first_seen = collect_first_seen(feed, checkpoints)?;
        let table = Self::from_rows(
            first_seen
                .into_iter()
                .map(|(identifier, first_seen)| MembershipRow {
                    vertex: index.resolve(&identifier),
                    identifier,
                    first_seen,
                })
                .collect(),
        );

        let coverage = table.coverage();
        tracing::info!(
            compounds = coverage.total,
            unresolved = coverage.unresolved,
            miss_ratio = format!("{:.4}", coverage.miss_ratio()),
            "membership table built"
        );
        Ok(table)
    }

    /// Build from explicit rows. If an identifier repeats, its earliest row wins.
    pub fn from_rows(rows: Vec<MembershipRow>) -> Self {
        let mut earliest: HashMap<String, MembershipRow> = HashMap::with_capacity(rows.len());
        for row in rows {
            match earliest.entry(row.identifier.clone()) {
                Entry::Occupied(mut e) => {
                    if row.first_seen < e.get().first_seen {
                        e.insert(row);
                    }
                }
                Entry::Vacant(e) => {
                    e.insert(row);
                }
            }
        }

        let mut rows: Vec<MembershipRow> = earliest.into_values().collect();
        rows.sort_by(|a, b| {
            a.first_seen
                .cmp(&b.first_seen)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        let lookup = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.identifier.clone(), i))
            .collect();
        Self { rows, lookup }
    }

    /// Vertices of all resolved compounds first seen at or before `checkpoint`.
    ///
    /// Unresolved compounds are dropped. Results are in first-seen order.
    pub fn members_at_or_before(&self, checkpoint: Checkpoint) -> Vec<VertexIndex> {
        let end = self.rows.partition_point(|r| r.first_seen <= checkpoint);
        self.rows[..end].iter().filter_map(|r| r.vertex).collect()
    }

    /// Vertices of resolved compounds first seen strictly after `after` and at
    /// or before `upto`.
    pub fn members_between(&self, after: Checkpoint, upto: Checkpoint) -> Vec<VertexIndex> {
        let start = self.rows.partition_point(|r| r.first_seen <= after);
        let end = self.rows.partition_point(|r| r.first_seen <= upto);
        if start >= end {
            return Vec::new();
        }
        self.rows[start..end].iter().filter_map(|r| r.vertex).collect()
    }

    /// The record for an identifier.
    pub fn get(&self, identifier: &str) -> Option<&MembershipRow> {
        self.lookup.get(identifier).map(|&i| &self.rows[i])
    }

    pub fn first_seen(&self, identifier: &str) -> Option<Checkpoint> {
        self.get(identifier).map(|r| r.first_seen)
    }

    /// All rows in `(first_seen, identifier)` order.
    pub fn rows(&self) -> &[MembershipRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn coverage(&self) -> Coverage {
        Coverage {
            total: self.rows.len(),
            unresolved: self.rows.iter().filter(|r| r.vertex.is_none()).count(),
        }
    }

    /// Persist as a binary artifact.
    pub fn save(&self, path: &Path) -> ArtifactResult<()> {
        artifact::write(path, self)
    }

    /// Load a persisted table.
    pub fn load(path: &Path) -> ArtifactResult<Self> {
        artifact::read(path)
    }

    /// Export as CSV with columns `Cpd,Month,Index` (`-1` for unresolved).
    pub fn export_csv(&self, path: &Path) -> Result<(), LedgerError> {
        let export_err = |message: String| LedgerError::Export {
            path: path.display().to_string(),
            message,
        };
        let mut writer = csv::Writer::from_path(path).map_err(|e| export_err(e.to_string()))?;
        writer
            .write_record(["Cpd", "Month", "Index"])
            .map_err(|e| export_err(e.to_string()))?;
        for row in &self.rows {
            let month = row.first_seen.label();
            let index = VertexIndex::or_sentinel(row.vertex).to_string();
            writer
                .write_record([row.identifier.as_str(), month.as_str(), index.as_str()])
                .map_err(|e| export_err(e.to_string()))?;
        }
        writer.flush().map_err(|e| export_err(e.to_string()))
    }
}

/// First-seen month per identifier, scanning feeds in chronological order.
fn collect_first_seen<F: NoveltyFeed + ?Sized>(
    feed: &F,
    checkpoints: &[Checkpoint],
) -> FeedResult<HashMap<String, Checkpoint>> {
    let mut ordered = checkpoints.to_vec();
    ordered.sort();
    ordered.dedup();

    let mut first_seen: HashMap<String, Checkpoint> = HashMap::new();
    for checkpoint in ordered {
        let novel = feed.novel_compounds(checkpoint)?;
        let before = first_seen.len();
        for identifier in novel {
            first_seen.entry(identifier).or_insert(checkpoint);
        }
        tracing::debug!(
            checkpoint = %checkpoint,
            new = first_seen.len() - before,
            total = first_seen.len(),
            "processed novelty feed"
        );
    }
    Ok(first_seen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::build_month_list;
    use crate::feed::MemoryFeed;

    fn cp(label: &str) -> Checkpoint {
        label.parse().unwrap()
    }

    fn vertices(v: &[VertexIndex]) -> Vec<usize> {
        v.iter().map(|x| x.index()).collect()
    }

    fn sample() -> (MemoryFeed, IdentifierIndex) {
        let mut feed = MemoryFeed::new();
        feed.insert(cp("2000-01"), ["A", "MISSING"]);
        feed.insert(cp("2000-02"), ["B", "A"]);
        feed.insert(cp("2000-03"), ["C", "B"]);
        let index = IdentifierIndex::from_pairs([("A", 0), ("B", 1), ("C", 2)]).unwrap();
        (feed, index)
    }

    #[test]
    fn earliest_month_wins_regardless_of_input_order() {
        let (feed, index) = sample();
        let shuffled = [cp("2000-03"), cp("2000-01"), cp("2000-02")];
        let table = MembershipTable::build(&feed, &shuffled, &index).unwrap();

        assert_eq!(table.first_seen("A"), Some(cp("2000-01")));
        assert_eq!(table.first_seen("B"), Some(cp("2000-02")));
        assert_eq!(table.first_seen("C"), Some(cp("2000-03")));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn unresolved_compounds_are_excluded_from_members() {
        let (feed, index) = sample();
        let months = build_month_list(2000, 2000).unwrap();
        let table = MembershipTable::build(&feed, &months, &index).unwrap();

        assert_eq!(table.get("MISSING").unwrap().vertex, None);
        assert_eq!(vertices(&table.members_at_or_before(cp("2000-01"))), vec![0]);
        assert_eq!(
            table.coverage(),
            Coverage {
                total: 4,
                unresolved: 1
            }
        );
        assert!((table.coverage().miss_ratio() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn members_grow_monotonically() {
        let (feed, index) = sample();
        let months = build_month_list(1999, 2001).unwrap();
        let table = MembershipTable::build(&feed, &months, &index).unwrap();

        let mut previous: Vec<usize> = Vec::new();
        for month in months {
            let mut current = vertices(&table.members_at_or_before(month));
            current.sort();
            assert!(previous.iter().all(|v| current.contains(v)));
            previous = current;
        }
        assert_eq!(previous, vec![0, 1, 2]);
        assert!(table.members_at_or_before(cp("1999-12")).is_empty());
    }

    #[test]
    fn members_between_is_the_growth() {
        let (feed, index) = sample();
        let months = build_month_list(2000, 2000).unwrap();
        let table = MembershipTable::build(&feed, &months, &index).unwrap();

        assert_eq!(
            vertices(&table.members_between(cp("2000-01"), cp("2000-03"))),
            vec![1, 2]
        );
        assert!(table.members_between(cp("2000-03"), cp("2000-01")).is_empty());
    }

    #[test]
    fn from_rows_keeps_earliest_duplicate() {
        let row = |id: &str, month: &str| MembershipRow {
            identifier: id.into(),
            first_seen: cp(month),
            vertex: None,
        };
        let table = MembershipTable::from_rows(vec![row("X", "2003-05"), row("X", "2002-11")]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.first_seen("X"), Some(cp("2002-11")));
    }

    #[test]
    fn serde_round_trip_rebuilds_lookup() {
        let (feed, index) = sample();
        let months = build_month_list(2000, 2000).unwrap();
        let table = MembershipTable::build(&feed, &months, &index).unwrap();

        let bytes = bincode::serialize(&table).unwrap();
        let back: MembershipTable = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.rows(), table.rows());
        assert_eq!(back.first_seen("C"), Some(cp("2000-03")));
    }

    #[test]
    fn export_csv_uses_sentinel() {
        let dir = tempfile::TempDir::new().unwrap();
        let (feed, index) = sample();
        let months = build_month_list(2000, 2000).unwrap();
        let table = MembershipTable::build(&feed, &months, &index).unwrap();

        let path = dir.path().join("members.csv");
        table.export_csv(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Cpd,Month,Index\n"));
        assert!(content.contains("MISSING,2000-01,-1"));
        assert!(content.contains("C,2000-03,2"));
    }
}
