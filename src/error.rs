//! Rich diagnostic error types for the time-slicing pipeline.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so operators know exactly
//! which artifact or checkpoint failed and what to do about it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the pipeline.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("precondition failed: {what}")]
    #[diagnostic(
        code(cpd::pipeline::precondition),
        help(
            "The run was aborted before any checkpoint was processed. \
             Build or copy the named artifact into place and start the run again."
        )
    )]
    Precondition {
        what: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("run cancelled before checkpoint {checkpoint}")]
    #[diagnostic(
        code(cpd::pipeline::cancelled),
        help(
            "The run was interrupted. Rows recorded so far are kept in the ledger; \
             restarting resumes at the first unrecorded checkpoint."
        )
    )]
    Cancelled { checkpoint: String },
}

impl PipelineError {
    /// Wrap an error as a fatal precondition failure naming what was missing.
    pub fn precondition(what: impl Into<String>, source: impl Into<PipelineError>) -> Self {
        PipelineError::Precondition {
            what: what.into(),
            source: Box::new(source.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Checkpoint errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("malformed checkpoint label: \"{label}\"")]
    #[diagnostic(
        code(cpd::checkpoint::malformed),
        help(
            "Checkpoint labels are zero-padded \"YYYY-MM\" strings, e.g. \"1999-01\". \
             Months run from 01 to 12."
        )
    )]
    Malformed { label: String },

    #[error("invalid year range: {start}..={end}")]
    #[diagnostic(
        code(cpd::checkpoint::invalid_range),
        help("The start year must not be after the end year, and both must be in 0..=9999.")
    )]
    InvalidRange { start: i64, end: i64 },
}

// ---------------------------------------------------------------------------
// Artifact errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ArtifactError {
    #[error("artifact not found: {path}")]
    #[diagnostic(
        code(cpd::artifact::missing),
        help("Check the path in the pipeline configuration, or build the artifact first.")
    )]
    Missing { path: String },

    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(cpd::artifact::io),
        help(
            "A filesystem operation failed. Check that the directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error on {path}: {message}")]
    #[diagnostic(
        code(cpd::artifact::serde),
        help(
            "The artifact could not be encoded or decoded. It may be truncated, \
             or it was written by an incompatible version. Rebuild it."
        )
    )]
    Serialization { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("edge ({a}, {b}) does not connect a compound to a patent")]
    #[diagnostic(
        code(cpd::graph::not_bipartite),
        help(
            "Edges may only join a compound vertex (index < num_compounds) \
             to a patent vertex. Drop compound-compound and patent-patent edges from the input."
        )
    )]
    NotBipartite { a: usize, b: usize },

    #[error("vertex {index} out of range for a graph with {vertex_count} vertices")]
    #[diagnostic(
        code(cpd::graph::out_of_range),
        help("Vertex indices must be contiguous: compounds first, then patents.")
    )]
    VertexOutOfRange { index: usize, vertex_count: usize },

    #[error("duplicate compound identifier: {identifier}")]
    #[diagnostic(
        code(cpd::graph::duplicate_identifier),
        help("Compound identifiers are globally unique; each may label one vertex only.")
    )]
    DuplicateIdentifier { identifier: String },

    #[error("vertex {vertex} is labelled both \"{first}\" and \"{second}\"")]
    #[diagnostic(
        code(cpd::graph::duplicate_vertex),
        help("Each compound vertex carries exactly one identifier. Fix the identifier index artifact.")
    )]
    DuplicateVertex {
        vertex: usize,
        first: String,
        second: String,
    },

    #[error(
        "vertex layout mismatch: {num_compounds} compounds + {num_patents} patents != {vertex_count} vertices"
    )]
    #[diagnostic(
        code(cpd::graph::layout),
        help("The graph artifact is inconsistent. Rebuild it from the source edge data.")
    )]
    LayoutMismatch {
        num_compounds: usize,
        num_patents: usize,
        vertex_count: usize,
    },
}

// ---------------------------------------------------------------------------
// Feed errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum FeedError {
    #[error("novelty feed for {checkpoint} not found at {path}")]
    #[diagnostic(
        code(cpd::feed::missing),
        help(
            "Every checkpoint in the range needs a feed file named \
             cpd_date_dict_<YYYY-MM>.json in the novelty directory."
        )
    )]
    Missing { checkpoint: String, path: String },

    #[error("failed to read novelty feed {path}")]
    #[diagnostic(
        code(cpd::feed::read),
        help("Ensure the file is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse novelty feed {path}: {message}")]
    #[diagnostic(
        code(cpd::feed::parse),
        help("Feed files are JSON objects mapping compound identifier to \"YYYY-MM\".")
    )]
    Parse { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Statistics errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StatsError {
    #[error("cannot compute statistics on a graph with zero vertices")]
    #[diagnostic(
        code(cpd::stats::empty_graph),
        help(
            "The extracted subgraph has no vertices, so mean and max degree are undefined. \
             The checkpoint is skipped; check the membership table and patent count."
        )
    )]
    EmptyGraph,

    #[error("statistics computation cancelled")]
    #[diagnostic(
        code(cpd::stats::cancelled),
        help("A cancellation was requested while the statistics were being computed.")
    )]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Transfer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TransferError {
    #[error("failed to stage {checkpoint}: {message}")]
    #[diagnostic(
        code(cpd::transfer::stage),
        help(
            "The subgraph artifact could not be fetched into scratch storage. \
             Check that it exists in bulk storage and that the transfer tool works."
        )
    )]
    Stage { checkpoint: String, message: String },

    #[error("failed to clean up {path}: {message}")]
    #[diagnostic(
        code(cpd::transfer::cleanup),
        help("Remove the staged file by hand to reclaim scratch space.")
    )]
    Cleanup { path: String, message: String },

    #[error("transfer command `{program}` failed to start")]
    #[diagnostic(
        code(cpd::transfer::spawn),
        help("Ensure the transfer program is installed and on PATH.")
    )]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Ledger errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LedgerError {
    #[error("redb error: {message}")]
    #[diagnostic(
        code(cpd::ledger::redb),
        help(
            "The statistics ledger encountered a database error. \
             If the file is damaged, move it aside; rows can be recomputed."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(cpd::ledger::serde),
        help("A stored statistics row could not be decoded. The ledger may be from an older version.")
    )]
    Serialization { message: String },

    #[error("failed to write table {path}: {message}")]
    #[diagnostic(
        code(cpd::ledger::export),
        help("Ensure the output directory exists and is writable.")
    )]
    Export { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(cpd::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(cpd::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(cpd::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(cpd::config::invalid), help("Check the pipeline configuration. {message}"))]
    Invalid { message: String },
}

/// Convenience alias for functions returning pipeline results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
