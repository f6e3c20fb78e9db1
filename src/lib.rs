// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # cpd-timeslice
//!
//! Time-sliced analysis of a compound–patent bipartite network.
//!
//! A large bipartite graph links chemical compounds to the patents that cite
//! them. Given monthly feeds of newly appearing compounds, this crate rebuilds
//! the network as it existed at each month-end checkpoint and records how its
//! structure evolved: size, degree distribution, largest connected component
//! and global clustering.
//!
//! ## Architecture
//!
//! - **Checkpoints** (`checkpoint`): ordered `YYYY-MM` month labels
//! - **Membership** (`feed`, `identifier`, `membership`): first-seen month of
//!   every compound, resolved to vertex indices
//! - **Graph** (`graph`): petgraph-backed bipartite graph, per-checkpoint
//!   extraction and exact network statistics
//! - **Storage** (`artifact`, `transfer`, `ledger`): atomic bincode artifacts,
//!   scratch staging, redb-backed statistics ledger with CSV export
//! - **Driver** (`pipeline`): runs the stages over a checkpoint range
//!
//! ## Library usage
//!
//! ```no_run
//! use cpd_timeslice::cancel::CancelToken;
//! use cpd_timeslice::config::PipelineConfig;
//! use cpd_timeslice::pipeline::Pipeline;
//!
//! let config = PipelineConfig::load("pipeline.toml".as_ref()).unwrap();
//! let checkpoints = config.checkpoints().unwrap();
//! let pipeline = Pipeline::from_config(config, CancelToken::new());
//! let report = pipeline.run(&checkpoints).unwrap();
//! println!("recorded {} checkpoints", report.recorded_count());
//! ```

pub mod artifact;
pub mod cancel;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod feed;
pub mod graph;
pub mod identifier;
pub mod ledger;
pub mod membership;
pub mod pipeline;
pub mod transfer;
