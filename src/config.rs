//! Pipeline configuration, persisted as TOML.
//!
//! Every path a component touches is listed here and handed to that component
//! at construction. Nothing reads a global location.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::checkpoint::{Checkpoint, MAX_YEAR, build_month_list};
use crate::error::{CheckpointError, ConfigError};
use crate::transfer::{ArtifactTransfer, CommandTransfer, CopyTransfer};

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// How staged artifacts are fetched from bulk storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferConfig {
    /// Copy from `artifact_dir` on a mounted filesystem.
    #[default]
    Copy,
    /// Run an external program. Arguments may use `{remote}`, `{local}` and
    /// `{checkpoint}` placeholders.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        remote_prefix: String,
    },
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Full compound–patent graph artifact.
    pub full_graph: PathBuf,
    /// Temporal membership table artifact.
    pub membership_table: PathBuf,
    /// Identifier → vertex index artifact. When absent, the index is derived
    /// from the full graph's compound identifiers.
    #[serde(default)]
    pub identifier_index: Option<PathBuf>,
    /// Directory of `cpd_date_dict_<YYYY-MM>.json` novelty feeds.
    pub novelty_dir: PathBuf,
    /// Bulk storage directory holding per-checkpoint subgraph artifacts.
    pub artifact_dir: PathBuf,
    /// Fast local storage for the one staged subgraph.
    pub scratch_dir: PathBuf,
    /// Statistics table (CSV).
    pub output_table: PathBuf,
    /// Durable statistics ledger (redb).
    pub ledger: PathBuf,
    /// First year of checkpoints.
    #[serde(default = "default_start_year")]
    pub start_year: i64,
    /// Last year of checkpoints (inclusive).
    #[serde(default = "default_end_year")]
    pub end_year: i64,
    #[serde(default)]
    pub transfer: TransferConfig,
}

fn default_start_year() -> i64 {
    1999
}
fn default_end_year() -> i64 {
    2020
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_root("data")
    }
}

impl PipelineConfig {
    /// Conventional layout under a single root directory.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            full_graph: root.join("cpd_patent_G.bin"),
            membership_table: root.join("Cpd_Data").join("master_cpd_date_index.bin"),
            identifier_index: None,
            novelty_dir: root.join("CpdPatentIdsDates"),
            artifact_dir: root.join("Graphs"),
            scratch_dir: root.join("scratch"),
            output_table: root.join("NetworkStats").join("network_stats.csv"),
            ledger: root.join("NetworkStats").join("network_stats.redb"),
            start_year: default_start_year(),
            end_year: default_end_year(),
            transfer: TransferConfig::Copy,
        }
    }

    /// Check the year range and transfer settings.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.start_year > self.end_year
            || self.start_year < 0
            || self.end_year > i64::from(MAX_YEAR)
        {
            return Err(ConfigError::Invalid {
                message: format!(
                    "year range {}..={} is empty or outside 0..={MAX_YEAR}",
                    self.start_year, self.end_year
                ),
            });
        }
        if let TransferConfig::Command { program, .. } = &self.transfer {
            if program.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: "transfer.program must not be empty".into(),
                });
            }
        }
        Ok(())
    }

    /// Monthly checkpoints for the configured year range.
    pub fn checkpoints(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        build_month_list(self.start_year, self.end_year)
    }

    /// Build the configured transfer strategy.
    pub fn build_transfer(&self) -> Box<dyn ArtifactTransfer> {
        match &self.transfer {
            TransferConfig::Copy => Box::new(CopyTransfer::new(&self.artifact_dir)),
            TransferConfig::Command {
                program,
                args,
                remote_prefix,
            } => Box::new(CommandTransfer::new(
                program.clone(),
                args.clone(),
                remote_prefix.clone(),
            )),
        }
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.checkpoints().unwrap().len(), 22 * 12);
    }

    #[test]
    fn reversed_years_are_rejected() {
        let config = PipelineConfig {
            start_year: 2010,
            end_year: 2009,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn minimal_toml_gets_defaults() {
        let toml_str = r#"
            full_graph = "/d/full.bin"
            membership_table = "/d/members.bin"
            novelty_dir = "/d/feeds"
            artifact_dir = "/d/graphs"
            scratch_dir = "/tmp/scratch"
            output_table = "/d/stats.csv"
            ledger = "/d/stats.redb"

            [transfer]
            kind = "command"
            program = "rclone"
            args = ["copy", "{remote}", "{local}"]
            remote_prefix = "bulk:Graphs"
        "#;
        let config: PipelineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.start_year, 1999);
        assert_eq!(config.end_year, 2020);
        assert_eq!(config.identifier_index, None);
        assert!(matches!(config.transfer, TransferConfig::Command { .. }));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("pipeline.toml");
        let config = PipelineConfig {
            start_year: 2001,
            end_year: 2003,
            ..PipelineConfig::with_root(dir.path())
        };
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "full_graph = [").unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
