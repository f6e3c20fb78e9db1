//! Checkpoint pipeline driver.
//!
//! Runs the three stages over a chronological list of monthly checkpoints:
//!
//! 1. **Membership**: scan novelty feeds into the temporal membership table.
//! 2. **Extraction**: load the full graph once and write one subgraph artifact
//!    per checkpoint.
//! 3. **Statistics**: for each checkpoint, stage its artifact into scratch,
//!    compute the network statistics, append the row to the ledger, refresh
//!    the CSV table, and remove the staged copy.
//!
//! Only one staged artifact and one loaded subgraph exist at any time. A
//! checkpoint whose artifact cannot be staged, loaded, or measured is skipped
//! and reported; the rest of the run continues. A failure to persist a row
//! aborts the run, because later rows could not be trusted to land either.

use std::path::PathBuf;

use crate::artifact;
use crate::cancel::CancelToken;
use crate::checkpoint::Checkpoint;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult, StatsError};
use crate::feed::NoveltyFeed;
use crate::graph::BipartiteGraph;
use crate::graph::extract::{IncrementalExtractor, Subgraph};
use crate::graph::stats::{self, NetworkStats};
use crate::identifier::IdentifierIndex;
use crate::ledger::StatsLedger;
use crate::membership::MembershipTable;
use crate::transfer::{ArtifactTransfer, StagedArtifact};

// ── Per-checkpoint lifecycle ────────────────────────────────────────────

/// How far a checkpoint got through its lifecycle.
///
/// `Pending → Staged → Loaded → Computed → Recorded → Cleaned`. A checkpoint
/// that fails stops at the phase it had reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckpointPhase {
    Pending,
    Staged,
    Loaded,
    Computed,
    Recorded,
    Cleaned,
}

impl std::fmt::Display for CheckpointPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Staged => "staged",
            Self::Loaded => "loaded",
            Self::Computed => "computed",
            Self::Recorded => "recorded",
            Self::Cleaned => "cleaned",
        };
        f.write_str(name)
    }
}

/// What happened to one checkpoint during a statistics run.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointOutcome {
    /// Row appended to the ledger. `cleaned` is false when the staged copy
    /// could not be removed afterwards.
    Recorded { stats: NetworkStats, cleaned: bool },
    /// The ledger already held a row from an earlier run.
    AlreadyRecorded,
    /// No row was produced. `phase` is the last phase reached.
    Skipped {
        phase: CheckpointPhase,
        reason: String,
    },
}

/// Summary of a statistics run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Outcome per attempted checkpoint, in chronological order.
    pub outcomes: Vec<(Checkpoint, CheckpointOutcome)>,
    /// First checkpoint left unprocessed because the run was cancelled.
    pub interrupted_at: Option<Checkpoint>,
}

impl RunReport {
    /// Checkpoints that got a new row in this run.
    pub fn recorded(&self) -> impl Iterator<Item = (Checkpoint, &NetworkStats)> + '_ {
        self.outcomes.iter().filter_map(|(cp, outcome)| match outcome {
            CheckpointOutcome::Recorded { stats, .. } => Some((*cp, stats)),
            _ => None,
        })
    }

    /// Checkpoints skipped, with the phase reached and the reason.
    pub fn skipped(&self) -> impl Iterator<Item = (Checkpoint, CheckpointPhase, &str)> + '_ {
        self.outcomes.iter().filter_map(|(cp, outcome)| match outcome {
            CheckpointOutcome::Skipped { phase, reason } => Some((*cp, *phase, reason.as_str())),
            _ => None,
        })
    }

    pub fn recorded_count(&self) -> usize {
        self.recorded().count()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped().count()
    }

    /// True when every requested checkpoint was attempted.
    pub fn is_complete(&self) -> bool {
        self.interrupted_at.is_none()
    }
}

/// Result of a single checkpoint, including the run-stopping case.
enum Step {
    Done(CheckpointOutcome),
    Interrupted,
}

fn skip(checkpoint: Checkpoint, phase: CheckpointPhase, reason: String) -> Step {
    tracing::warn!(checkpoint = %checkpoint, %phase, %reason, "skipping checkpoint");
    Step::Done(CheckpointOutcome::Skipped { phase, reason })
}

// ── Driver ──────────────────────────────────────────────────────────────

/// Drives membership building, extraction and statistics over checkpoints.
pub struct Pipeline<T: ArtifactTransfer = Box<dyn ArtifactTransfer>> {
    config: PipelineConfig,
    transfer: T,
    cancel: CancelToken,
}

impl Pipeline {
    /// Pipeline using the transfer strategy named in `config`.
    pub fn from_config(config: PipelineConfig, cancel: CancelToken) -> Self {
        let transfer = config.build_transfer();
        Self::new(config, transfer, cancel)
    }
}

impl<T: ArtifactTransfer> Pipeline<T> {
    pub fn new(config: PipelineConfig, transfer: T, cancel: CancelToken) -> Self {
        Self {
            config,
            transfer,
            cancel,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn transfer(&self) -> &T {
        &self.transfer
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Load and validate the full compound–patent graph.
    pub fn load_full_graph(&self) -> PipelineResult<BipartiteGraph> {
        let path = &self.config.full_graph;
        let graph: BipartiteGraph = artifact::read(path)
            .map_err(|e| PipelineError::precondition(format!("full graph {}", path.display()), e))?;
        graph
            .validate()
            .map_err(|e| PipelineError::precondition(format!("full graph {}", path.display()), e))?;
        tracing::info!(
            path = %path.display(),
            compounds = graph.num_compounds(),
            patents = graph.num_patents(),
            edges = graph.edge_count(),
            "loaded full graph"
        );
        Ok(graph)
    }

    /// Load the persisted membership table.
    pub fn load_membership(&self) -> PipelineResult<MembershipTable> {
        let path = &self.config.membership_table;
        let table = MembershipTable::load(path).map_err(|e| {
            PipelineError::precondition(format!("membership table {}", path.display()), e)
        })?;
        tracing::info!(path = %path.display(), rows = table.len(), "loaded membership table");
        Ok(table)
    }

    /// The identifier index: the configured artifact if there is one,
    /// otherwise derived from the full graph.
    pub fn load_identifier_index(&self) -> PipelineResult<IdentifierIndex> {
        match &self.config.identifier_index {
            Some(path) => artifact::read(path).map_err(|e| {
                PipelineError::precondition(format!("identifier index {}", path.display()), e)
            }),
            None => {
                let graph = self.load_full_graph()?;
                Ok(IdentifierIndex::from_graph(&graph)?)
            }
        }
    }

    // ── Stage 1: membership ─────────────────────────────────────────────

    /// Build the membership table from `feed` and persist it.
    pub fn build_membership<F: NoveltyFeed + ?Sized>(
        &self,
        feed: &F,
        checkpoints: &[Checkpoint],
    ) -> PipelineResult<MembershipTable> {
        let index = self.load_identifier_index()?;
        let table = MembershipTable::build(feed, checkpoints, &index)?;
        table.save(&self.config.membership_table)?;
        tracing::info!(
            path = %self.config.membership_table.display(),
            rows = table.len(),
            "saved membership table"
        );
        Ok(table)
    }

    // ── Stage 2: extraction ─────────────────────────────────────────────

    /// Write one subgraph artifact per checkpoint into `artifact_dir`.
    ///
    /// The full graph and membership table are loaded once. Checkpoints are
    /// processed in chronological order so each step only adds the compounds
    /// that became eligible since the previous one.
    ///
    /// Any ledger row for a checkpoint is removed before its artifact is
    /// rewritten, so the next statistics run measures the new artifact.
    pub fn run_extraction(&self, checkpoints: &[Checkpoint]) -> PipelineResult<Vec<PathBuf>> {
        let full = self.load_full_graph()?;
        let membership = self.load_membership()?;
        let ledger = self.open_ledger()?;
        let checkpoints = chronological(checkpoints);

        let mut extractor = IncrementalExtractor::new(&full, &membership);
        let mut written = Vec::with_capacity(checkpoints.len());
        for checkpoint in checkpoints {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    checkpoint: checkpoint.label(),
                });
            }
            let subgraph = extractor.advance(checkpoint)?;
            if ledger.remove(checkpoint)? {
                tracing::info!(checkpoint = %checkpoint, "invalidated recorded statistics");
            }
            let path = subgraph.save_to_dir(&self.config.artifact_dir)?;
            tracing::info!(
                checkpoint = %checkpoint,
                compounds = subgraph.graph.num_compounds(),
                edges = subgraph.graph.edge_count(),
                path = %path.display(),
                "wrote subgraph artifact"
            );
            written.push(path);
        }
        Ok(written)
    }

    // ── Stage 3: statistics ─────────────────────────────────────────────

    /// Compute and record statistics for each checkpoint.
    ///
    /// Checkpoints already in the ledger are not recomputed. After every new
    /// row the CSV table is rewritten from the ledger, so it always holds
    /// exactly the requested checkpoints completed so far.
    pub fn run_statistics(&self, checkpoints: &[Checkpoint]) -> PipelineResult<RunReport> {
        let ledger = self.open_ledger()?;
        let checkpoints = chronological(checkpoints);
        tracing::info!(
            checkpoints = checkpoints.len(),
            ledger = %ledger.path().display(),
            "starting statistics run"
        );

        let mut report = RunReport::default();
        for &checkpoint in &checkpoints {
            if self.cancel.is_cancelled() {
                report.interrupted_at = Some(checkpoint);
                break;
            }
            match self.process_checkpoint(&ledger, checkpoint, &checkpoints)? {
                Step::Done(outcome) => report.outcomes.push((checkpoint, outcome)),
                Step::Interrupted => {
                    report.interrupted_at = Some(checkpoint);
                    break;
                }
            }
        }

        // A fully resumed run records nothing, but the table must still match
        // the requested checkpoints.
        let resumed = report
            .outcomes
            .iter()
            .any(|(_, outcome)| *outcome == CheckpointOutcome::AlreadyRecorded);
        if resumed && report.recorded_count() == 0 {
            ledger.export_csv(&self.config.output_table, &checkpoints)?;
        }

        match report.interrupted_at {
            Some(checkpoint) => tracing::warn!(
                checkpoint = %checkpoint,
                recorded = report.recorded_count(),
                "statistics run interrupted"
            ),
            None => tracing::info!(
                recorded = report.recorded_count(),
                skipped = report.skipped_count(),
                "statistics run finished"
            ),
        }
        Ok(report)
    }

    /// Extraction followed by statistics over the same checkpoints.
    pub fn run(&self, checkpoints: &[Checkpoint]) -> PipelineResult<RunReport> {
        self.run_extraction(checkpoints)?;
        self.run_statistics(checkpoints)
    }

    fn open_ledger(&self) -> PipelineResult<StatsLedger> {
        let path = &self.config.ledger;
        StatsLedger::open(path)
            .map_err(|e| PipelineError::precondition(format!("statistics ledger {}", path.display()), e))
    }

    fn process_checkpoint(
        &self,
        ledger: &StatsLedger,
        checkpoint: Checkpoint,
        requested: &[Checkpoint],
    ) -> PipelineResult<Step> {
        if ledger.contains(checkpoint)? {
            tracing::debug!(checkpoint = %checkpoint, "already recorded");
            return Ok(Step::Done(CheckpointOutcome::AlreadyRecorded));
        }

        let staged = match StagedArtifact::stage(&self.transfer, checkpoint, &self.config.scratch_dir) {
            Ok(staged) => staged,
            Err(e) => return Ok(skip(checkpoint, CheckpointPhase::Pending, e.to_string())),
        };
        tracing::debug!(checkpoint = %checkpoint, path = %staged.path().display(), "staged");

        // The subgraph is dropped at the end of this block, before the staged
        // copy is released.
        let stats = {
            let subgraph = match Subgraph::load(staged.path()) {
                Ok(subgraph) => subgraph,
                Err(e) => return Ok(skip(checkpoint, CheckpointPhase::Staged, e.to_string())),
            };
            if subgraph.checkpoint != checkpoint {
                let reason = format!("artifact holds checkpoint {}", subgraph.checkpoint);
                return Ok(skip(checkpoint, CheckpointPhase::Staged, reason));
            }
            match stats::compute(&subgraph.graph, &self.cancel) {
                Ok(stats) => stats,
                Err(StatsError::Cancelled) => return Ok(Step::Interrupted),
                Err(e) => return Ok(skip(checkpoint, CheckpointPhase::Loaded, e.to_string())),
            }
        };

        ledger.record(checkpoint, &stats)?;
        let rows = ledger.export_csv(&self.config.output_table, requested)?;
        tracing::info!(
            checkpoint = %checkpoint,
            nodes = stats.nodes,
            edges = stats.edges,
            avg_degree = stats.avg_degree,
            max_degree = stats.max_degree,
            lcc_size = stats.lcc_size,
            clustering = stats.clustering,
            rows,
            "recorded statistics"
        );

        let cleaned = match staged.release() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(checkpoint = %checkpoint, error = %e, "failed to clean up staged artifact");
                false
            }
        };
        Ok(Step::Done(CheckpointOutcome::Recorded { stats, cleaned }))
    }
}

fn chronological(checkpoints: &[Checkpoint]) -> Vec<Checkpoint> {
    let mut sorted = checkpoints.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}
