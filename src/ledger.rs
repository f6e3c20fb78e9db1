//! Accumulated statistics table.
//!
//! The durable copy is a redb database holding one row per checkpoint
//! (`"YYYY-MM"` → bincode [`NetworkStats`]). Each row is written in its own
//! transaction, so a crash mid-checkpoint never leaves a partial row behind,
//! and a restarted run can see which checkpoints are already done.
//!
//! The tabular output is a CSV with exactly the columns in [`TABLE_COLUMNS`],
//! rows in chronological order, regenerated atomically from the ledger for
//! the checkpoints a run asked for.
//!
//! A row is only valid for the artifact it was computed from. Re-extracting a
//! checkpoint removes its row so the next statistics run recomputes it.

use std::fs;
use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};

use crate::checkpoint::Checkpoint;
use crate::error::LedgerError;
use crate::graph::stats::NetworkStats;

/// Result type for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Checkpoint label → encoded statistics row.
const STATS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("network_stats");

/// Column headers of the statistics table, in order.
pub const TABLE_COLUMNS: [&str; 6] = [
    "Nodes",
    "Edges",
    "Avg Degree",
    "Max Degree",
    "LCC Size",
    "Clustering coefficient",
];

fn redb_err<E: std::fmt::Display>(op: &'static str) -> impl FnOnce(E) -> LedgerError {
    move |e| LedgerError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

/// Durable, append-ordered store of per-checkpoint statistics.
pub struct StatsLedger {
    db: Database,
    path: PathBuf,
}

impl StatsLedger {
    /// Open or create the ledger at `path`.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LedgerError::Redb {
                message: format!("failed to create {}: {e}", parent.display()),
            })?;
        }
        let db = Database::create(path).map_err(|e| LedgerError::Redb {
            message: format!("failed to open redb at {}: {e}", path.display()),
        })?;

        // Make sure the table exists so read transactions can open it.
        let txn = db.begin_write().map_err(redb_err("begin_write"))?;
        txn.open_table(STATS_TABLE).map_err(redb_err("open_table"))?;
        txn.commit().map_err(redb_err("commit"))?;

        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Record the row for `checkpoint` in a single commit, replacing any
    /// earlier row for the same checkpoint.
    pub fn record(&self, checkpoint: Checkpoint, stats: &NetworkStats) -> LedgerResult<()> {
        let encoded = bincode::serialize(stats).map_err(|e| LedgerError::Serialization {
            message: format!("failed to encode row for {checkpoint}: {e}"),
        })?;
        let label = checkpoint.label();

        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        {
            let mut table = txn.open_table(STATS_TABLE).map_err(redb_err("open_table"))?;
            table
                .insert(label.as_str(), encoded.as_slice())
                .map_err(redb_err("insert"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;
        Ok(())
    }

    /// The row for `checkpoint`, if recorded.
    pub fn get(&self, checkpoint: Checkpoint) -> LedgerResult<Option<NetworkStats>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(STATS_TABLE).map_err(redb_err("open_table"))?;
        let label = checkpoint.label();
        let guard = table.get(label.as_str()).map_err(redb_err("get"))?;
        guard.map(|g| decode(&label, g.value())).transpose()
    }

    /// Drop the row for `checkpoint`. Returns whether a row was present.
    pub fn remove(&self, checkpoint: Checkpoint) -> LedgerResult<bool> {
        let label = checkpoint.label();
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        let removed = {
            let mut table = txn.open_table(STATS_TABLE).map_err(redb_err("open_table"))?;
            let old = table.remove(label.as_str()).map_err(redb_err("remove"))?;
            old.is_some()
        };
        txn.commit().map_err(redb_err("commit"))?;
        Ok(removed)
    }

    pub fn contains(&self, checkpoint: Checkpoint) -> LedgerResult<bool> {
        self.get(checkpoint).map(|row| row.is_some())
    }

    /// All rows in chronological order.
    ///
    /// Keys are fixed-width `"YYYY-MM"` labels, so the table's byte order is
    /// the calendar order.
    pub fn rows(&self) -> LedgerResult<Vec<(Checkpoint, NetworkStats)>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(STATS_TABLE).map_err(redb_err("open_table"))?;
        let mut rows = Vec::new();
        for entry in table.iter().map_err(redb_err("iter"))? {
            let (key, value) = entry.map_err(redb_err("iter"))?;
            let label = key.value();
            let checkpoint: Checkpoint =
                label.parse().map_err(|_| LedgerError::Serialization {
                    message: format!("invalid checkpoint key {label:?}"),
                })?;
            rows.push((checkpoint, decode(label, value.value())?));
        }
        Ok(rows)
    }

    /// Write the CSV table for the recorded rows among `checkpoints`.
    /// Rows for other checkpoints stay in the ledger but are left out.
    /// Returns the number of data rows written.
    pub fn export_csv(&self, path: &Path, checkpoints: &[Checkpoint]) -> LedgerResult<usize> {
        let rows: Vec<NetworkStats> = self
            .rows()?
            .into_iter()
            .filter(|(checkpoint, _)| checkpoints.contains(checkpoint))
            .map(|(_, stats)| stats)
            .collect();
        write_table(path, &rows)?;
        Ok(rows.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for StatsLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsLedger")
            .field("path", &self.path)
            .finish()
    }
}

fn decode(label: &str, bytes: &[u8]) -> LedgerResult<NetworkStats> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Serialization {
        message: format!("failed to decode row for {label}: {e}"),
    })
}

/// Write statistics rows as CSV to `path`, atomically.
pub fn write_table<'a, I>(path: &Path, rows: I) -> LedgerResult<()>
where
    I: IntoIterator<Item = &'a NetworkStats>,
{
    let export_err = |message: String| LedgerError::Export {
        path: path.display().to_string(),
        message,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| export_err(e.to_string()))?;
    }
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".partial");
    let tmp = path.with_file_name(tmp_name);

    let result = (|| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)
            .map_err(|e| export_err(e.to_string()))?;
        writer
            .write_record(TABLE_COLUMNS)
            .map_err(|e| export_err(e.to_string()))?;
        for stats in rows {
            writer
                .serialize(stats)
                .map_err(|e| export_err(e.to_string()))?;
        }
        writer.flush().map_err(|e| export_err(e.to_string()))?;
        drop(writer);
        fs::rename(&tmp, path).map_err(|e| export_err(e.to_string()))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
