//! cpd-timeslice CLI: time-sliced compound–patent network statistics.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use cpd_timeslice::cancel::CancelToken;
use cpd_timeslice::checkpoint::{Checkpoint, parse_checkpoints};
use cpd_timeslice::config::PipelineConfig;
use cpd_timeslice::error::PipelineError;
use cpd_timeslice::feed::JsonDirFeed;
use cpd_timeslice::graph::extract::Subgraph;
use cpd_timeslice::graph::stats;
use cpd_timeslice::pipeline::{Pipeline, RunReport};

#[derive(Parser)]
#[command(
    name = "cpd-timeslice",
    version,
    about = "Time-sliced compound-patent network statistics"
)]
struct Cli {
    /// Pipeline configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the conventional layout under this directory instead of a config file.
    #[arg(long, global = true, conflicts_with = "config")]
    root: Option<PathBuf>,

    /// Override the first checkpoint year.
    #[arg(long, global = true)]
    start_year: Option<i64>,

    /// Override the last checkpoint year (inclusive).
    #[arg(long, global = true)]
    end_year: Option<i64>,

    /// Restrict the run to these checkpoints (`YYYY-MM`, repeatable).
    #[arg(long = "checkpoint", global = true)]
    checkpoints: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration file with the conventional layout.
    InitConfig {
        /// Where to write the configuration.
        #[arg(long, default_value = "pipeline.toml")]
        output: PathBuf,
    },

    /// List the checkpoints that a run would process.
    Months,

    /// Scan the novelty feeds and build the membership table.
    BuildMembership,

    /// Report how many compounds resolved to a graph vertex.
    Coverage {
        /// Also export the table as CSV (`Cpd,Month,Index`).
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Write per-checkpoint subgraph artifacts.
    Extract,

    /// Compute and record statistics for each checkpoint.
    Stats,

    /// Extract, then compute statistics.
    Run,

    /// Show the highest-degree compounds of a staged subgraph artifact.
    Degrees {
        /// Subgraph artifact to inspect.
        artifact: PathBuf,

        /// Number of compounds to list.
        #[arg(long, default_value = "10")]
        top_k: usize,
    },
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match (&cli.config, &cli.root) {
        (Some(path), _) => PipelineConfig::load(path)?,
        (None, Some(root)) => PipelineConfig::with_root(root),
        (None, None) => PipelineConfig::default(),
    };
    if let Some(year) = cli.start_year {
        config.start_year = year;
    }
    if let Some(year) = cli.end_year {
        config.end_year = year;
    }
    config.validate()?;
    Ok(config)
}

fn select_checkpoints(cli: &Cli, config: &PipelineConfig) -> Result<Vec<Checkpoint>> {
    let checkpoints = if cli.checkpoints.is_empty() {
        config.checkpoints()
    } else {
        parse_checkpoints(&cli.checkpoints)
    };
    checkpoints
        .map_err(|e| PipelineError::precondition("checkpoint list", e))
        .map_err(Into::into)
}

fn print_report(report: &RunReport) -> Result<()> {
    for (checkpoint, phase, reason) in report.skipped() {
        println!("skipped {checkpoint} at {phase}: {reason}");
    }
    println!(
        "recorded {} checkpoint(s), skipped {}",
        report.recorded_count(),
        report.skipped_count()
    );
    match report.interrupted_at {
        Some(checkpoint) => Err(PipelineError::Cancelled {
            checkpoint: checkpoint.label(),
        }
        .into()),
        None => Ok(()),
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Config and signal handling are only set up for commands that need them.
    // SIGINT/SIGTERM flip the token; long computations poll it and the driver
    // stops between checkpoints.
    let setup = || -> Result<(PipelineConfig, CancelToken)> {
        let config = load_config(&cli)?;
        let cancel = CancelToken::new();
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            signal_hook::flag::register(signal, cancel.flag()).into_diagnostic()?;
        }
        Ok((config, cancel))
    };

    match &cli.command {
        Commands::InitConfig { output } => {
            let config = match &cli.root {
                Some(root) => PipelineConfig::with_root(root),
                None => PipelineConfig::default(),
            };
            config.save(output)?;
            println!("Wrote configuration to {}", output.display());
        }

        Commands::Months => {
            let config = load_config(&cli)?;
            for checkpoint in select_checkpoints(&cli, &config)? {
                println!("{checkpoint}");
            }
        }

        Commands::BuildMembership => {
            let (config, cancel) = setup()?;
            let checkpoints = select_checkpoints(&cli, &config)?;
            let feed = JsonDirFeed::new(&config.novelty_dir);
            let pipeline = Pipeline::from_config(config, cancel);
            let table = pipeline.build_membership(&feed, &checkpoints)?;
            let coverage = table.coverage();
            println!(
                "Membership table: {} compounds, {} unresolved ({:.2}%)",
                coverage.total,
                coverage.unresolved,
                coverage.miss_ratio() * 100.0
            );
        }

        Commands::Coverage { csv } => {
            let (config, cancel) = setup()?;
            let pipeline = Pipeline::from_config(config, cancel);
            let table = pipeline.load_membership()?;
            let coverage = table.coverage();
            println!("Compounds:   {}", coverage.total);
            println!("Unresolved:  {}", coverage.unresolved);
            println!("Miss ratio:  {:.4}", coverage.miss_ratio());
            if let Some(path) = csv {
                table.export_csv(path)?;
                println!("Exported table to {}", path.display());
            }
        }

        Commands::Extract => {
            let (config, cancel) = setup()?;
            let checkpoints = select_checkpoints(&cli, &config)?;
            let pipeline = Pipeline::from_config(config, cancel);
            let written = pipeline.run_extraction(&checkpoints)?;
            println!("Wrote {} subgraph artifact(s)", written.len());
        }

        Commands::Stats => {
            let (config, cancel) = setup()?;
            let checkpoints = select_checkpoints(&cli, &config)?;
            let pipeline = Pipeline::from_config(config, cancel);
            let report = pipeline.run_statistics(&checkpoints)?;
            print_report(&report)?;
        }

        Commands::Run => {
            let (config, cancel) = setup()?;
            let checkpoints = select_checkpoints(&cli, &config)?;
            let pipeline = Pipeline::from_config(config, cancel);
            let report = pipeline.run(&checkpoints)?;
            print_report(&report)?;
        }

        Commands::Degrees { artifact, top_k } => {
            let subgraph = Subgraph::load(artifact)?;
            let mut degrees: Vec<(String, usize)> =
                stats::identifier_degrees(&subgraph.graph).into_iter().collect();
            degrees.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            println!("Checkpoint {}:", subgraph.checkpoint);
            for (identifier, degree) in degrees.into_iter().take(*top_k) {
                println!("  {identifier:<24} {degree}");
            }
        }
    }

    Ok(())
}
