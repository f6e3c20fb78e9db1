//! Monthly novelty feeds: which compounds were newly observed in a month.
//!
//! The on-disk feed is one JSON object per month, named
//! `cpd_date_dict_<YYYY-MM>.json`, mapping compound identifier to the month it
//! was observed. Only the keys matter for first-seen bookkeeping.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::checkpoint::Checkpoint;
use crate::error::FeedError;

/// Result type for feed operations.
pub type FeedResult<T> = std::result::Result<T, FeedError>;

/// Source of "compounds newly seen this month" sets.
pub trait NoveltyFeed {
    /// Identifiers of compounds observed in `checkpoint`, in a stable order.
    fn novel_compounds(&self, checkpoint: Checkpoint) -> FeedResult<Vec<String>>;
}

/// Feed backed by a directory of per-month JSON files.
#[derive(Debug, Clone)]
pub struct JsonDirFeed {
    dir: PathBuf,
}

impl JsonDirFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File name for a month's feed.
    pub fn file_name(checkpoint: Checkpoint) -> String {
        format!("cpd_date_dict_{checkpoint}.json")
    }

    /// Full path of a month's feed file.
    pub fn path_for(&self, checkpoint: Checkpoint) -> PathBuf {
        self.dir.join(Self::file_name(checkpoint))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl NoveltyFeed for JsonDirFeed {
    fn novel_compounds(&self, checkpoint: Checkpoint) -> FeedResult<Vec<String>> {
        let path = self.path_for(checkpoint);
        if !path.exists() {
            return Err(FeedError::Missing {
                checkpoint: checkpoint.label(),
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(&path).map_err(|e| FeedError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let entries: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&content).map_err(|e| FeedError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(checkpoint = %checkpoint, count = entries.len(), "read novelty feed");
        Ok(entries.into_keys().collect())
    }
}

/// In-memory feed, keyed by month.
#[derive(Debug, Clone, Default)]
pub struct MemoryFeed {
    months: BTreeMap<Checkpoint, Vec<String>>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add identifiers to a month's set.
    pub fn insert<I, S>(&mut self, checkpoint: Checkpoint, identifiers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.months
            .entry(checkpoint)
            .or_default()
            .extend(identifiers.into_iter().map(Into::into));
    }
}

impl NoveltyFeed for MemoryFeed {
    fn novel_compounds(&self, checkpoint: Checkpoint) -> FeedResult<Vec<String>> {
        Ok(self.months.get(&checkpoint).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cp(label: &str) -> Checkpoint {
        label.parse().unwrap()
    }

    #[test]
    fn json_feed_reads_keys() {
        let dir = TempDir::new().unwrap();
        let feed = JsonDirFeed::new(dir.path());
        std::fs::write(
            feed.path_for(cp("2001-03")),
            r#"{"SCHEMBL9": "2001-03", "SCHEMBL1": "2001-03"}"#,
        )
        .unwrap();

        let ids = feed.novel_compounds(cp("2001-03")).unwrap();
        assert_eq!(ids, vec!["SCHEMBL1".to_string(), "SCHEMBL9".to_string()]);
    }

    #[test]
    fn json_feed_missing_month_is_an_error() {
        let dir = TempDir::new().unwrap();
        let feed = JsonDirFeed::new(dir.path());
        let err = feed.novel_compounds(cp("2001-04")).unwrap_err();
        assert!(matches!(err, FeedError::Missing { .. }));
    }

    #[test]
    fn json_feed_rejects_non_object() {
        let dir = TempDir::new().unwrap();
        let feed = JsonDirFeed::new(dir.path());
        std::fs::write(feed.path_for(cp("2001-05")), "[1, 2, 3]").unwrap();
        let err = feed.novel_compounds(cp("2001-05")).unwrap_err();
        assert!(matches!(err, FeedError::Parse { .. }));
    }

    #[test]
    fn memory_feed_defaults_to_empty_month() {
        let mut feed = MemoryFeed::new();
        feed.insert(cp("2000-01"), ["A", "B"]);
        assert_eq!(feed.novel_compounds(cp("2000-01")).unwrap().len(), 2);
        assert!(feed.novel_compounds(cp("2000-02")).unwrap().is_empty());
    }
}
