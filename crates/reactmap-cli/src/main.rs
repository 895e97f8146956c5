//! reactmap - cluster the emoji reactions of a chat archive.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use reactmap_cli::{config, logging};
use reactmap_core::features::FeatureCombiner;
use reactmap_core::{
    algorithm_from_name, run_clustering, Embedder, HashedEmbedder, PipelineOptions,
    ReactionStore, ReportFile,
};
use reactmap_types::{cluster_label, ClusterReport, DensityParams, DistanceMetric, PartitionParams};
use std::collections::BTreeMap;
use std::path::PathBuf;

use config::{Config, EmbedderKind};
use logging::{LogFormat, Verbosity};

/// reactmap - group reaction emoji by the messages they land on and who uses them.
#[derive(Parser, Debug)]
#[command(name = "reactmap")]
#[command(about = "Cluster reaction emoji by message meaning and usage patterns")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (INFO level for every stage)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long, global = true)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "cluster=debug" or "ort=info")
    /// Can be specified multiple times. Targets are prefixed with "reactmap::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL", global = true)]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the reaction context table from messages and reactions
    BuildContexts {
        /// Database path (overrides config and REACTMAP_DB_PATH)
        #[arg(long, value_name = "PATH")]
        db_path: Option<PathBuf>,
    },

    /// Cluster reaction emoji and write a JSON report
    Cluster(ClusterArgs),

    /// Show the latest stored clustering run
    Show {
        /// Database path (overrides config and REACTMAP_DB_PATH)
        #[arg(long, value_name = "PATH")]
        db_path: Option<PathBuf>,

        /// Also export the run as a JSON report
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct ClusterArgs {
    /// Database path (overrides config and REACTMAP_DB_PATH)
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Weight of the message-text features
    #[arg(long)]
    text_weight: Option<f64>,

    /// Weight of the usage-pattern features
    #[arg(long)]
    behavior_weight: Option<f64>,

    /// Clustering algorithm (hdbscan or kmeans)
    #[arg(long)]
    algorithm: Option<String>,

    /// Smallest cluster (hdbscan)
    #[arg(long)]
    min_cluster_size: Option<usize>,

    /// Core distance neighbourhood, counting the point itself (hdbscan)
    #[arg(long)]
    min_samples: Option<usize>,

    /// Cluster selection epsilon (hdbscan)
    #[arg(long)]
    epsilon: Option<f64>,

    /// Distance metric (hdbscan): euclidean, manhattan or cosine
    #[arg(long)]
    metric: Option<DistanceMetric>,

    /// Number of clusters (kmeans)
    #[arg(long)]
    n_clusters: Option<usize>,

    /// RNG seed (kmeans)
    #[arg(long)]
    seed: Option<u64>,

    /// Output JSON file
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Embedding backend (fastembed or hashed)
    #[arg(long)]
    embedder: Option<EmbedderKind>,

    /// Do not read or write the embedding cache
    #[arg(long)]
    no_cache: bool,

    /// Rebuild the context table before clustering
    #[arg(long)]
    rebuild_contexts: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(
        Verbosity::from_flags(cli.verbose, cli.debug, cli.trace, cli.quiet),
        cli.log_format,
        &cli.log_overrides,
    );

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env();

    match cli.command {
        Command::BuildContexts { db_path } => {
            if let Some(path) = db_path {
                config.db_path = path;
            }
            build_contexts(&config)
        }
        Command::Cluster(args) => cluster(config, args),
        Command::Show { db_path, output } => {
            if let Some(path) = db_path {
                config.db_path = path;
            }
            show(&config, output)
        }
    }
}

fn open_store(config: &Config) -> Result<ReactionStore> {
    tracing::info!(target: "reactmap::startup", "Opening database {}", config.db_path.display());
    Ok(ReactionStore::open(&config.db_path)?)
}

fn build_contexts(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let count = store.build_reaction_contexts()?;
    let unique = store.unique_reactions()?;
    let totals = store.base_counts()?;

    println!("Built {} reaction contexts", count);
    println!("Unique reactions: {}", unique.len());
    println!("DB totals: messages={}, reactions={}", totals.messages, totals.reactions);
    Ok(())
}

/// Fold command-line flags into the loaded configuration.
fn apply_cluster_args(config: &mut Config, args: &ClusterArgs) {
    let clustering = &mut config.clustering;
    if let Some(path) = &args.db_path {
        config.db_path = path.clone();
    }
    if let Some(w) = args.text_weight {
        clustering.text_weight = w;
    }
    if let Some(w) = args.behavior_weight {
        clustering.behavior_weight = w;
    }
    if let Some(name) = &args.algorithm {
        clustering.algorithm = name.clone();
    }
    if let Some(n) = args.min_cluster_size {
        clustering.min_cluster_size = n;
    }
    if let Some(n) = args.min_samples {
        clustering.min_samples = n;
    }
    if let Some(eps) = args.epsilon {
        clustering.cluster_selection_epsilon = eps;
    }
    if let Some(metric) = args.metric {
        clustering.metric = metric;
    }
    if let Some(k) = args.n_clusters {
        clustering.n_clusters = k;
    }
    if args.seed.is_some() {
        clustering.seed = args.seed;
    }
    if let Some(path) = &args.output {
        clustering.output = path.clone();
    }
    if let Some(kind) = args.embedder {
        config.embedder = kind;
    }
}

fn pipeline_options(config: &Config, args: &ClusterArgs) -> Result<PipelineOptions> {
    let c = &config.clustering;
    FeatureCombiner::new(c.text_weight, c.behavior_weight)?;

    let algorithm = algorithm_from_name(
        &c.algorithm,
        DensityParams {
            min_cluster_size: c.min_cluster_size,
            min_samples: c.min_samples,
            cluster_selection_epsilon: c.cluster_selection_epsilon,
            metric: c.metric,
        },
        PartitionParams {
            n_clusters: c.n_clusters,
            seed: c.seed,
        },
    )?;

    Ok(PipelineOptions {
        text_weight: c.text_weight,
        behavior_weight: c.behavior_weight,
        algorithm,
        use_cache: !args.no_cache,
        rebuild_contexts: args.rebuild_contexts,
    })
}

fn build_embedder(config: &Config) -> Result<Box<dyn Embedder>> {
    match config.embedder {
        EmbedderKind::Fastembed => fastembed_embedder(config),
        EmbedderKind::Hashed => {
            tracing::warn!(
                target: "reactmap::startup",
                "Using hashed embeddings: message text carries no semantic signal"
            );
            Ok(Box::new(HashedEmbedder::new(config.hashed_dimension)))
        }
    }
}

#[cfg(feature = "fastembed")]
fn fastembed_embedder(config: &Config) -> Result<Box<dyn Embedder>> {
    let embedder = reactmap_core::FastEmbedder::new(Some(config.models_dir.clone()))?;
    Ok(Box::new(embedder))
}

#[cfg(not(feature = "fastembed"))]
fn fastembed_embedder(_config: &Config) -> Result<Box<dyn Embedder>> {
    bail!("reactmap was built without the `fastembed` feature; use --embedder hashed")
}

fn cluster(mut config: Config, args: ClusterArgs) -> Result<()> {
    apply_cluster_args(&mut config, &args);
    config.validate()?;
    let options = pipeline_options(&config, &args)?;
    tracing::info!(
        target: "reactmap::startup",
        "Clustering with {} (text weight {}, behavior weight {})",
        options.algorithm.kind(),
        options.text_weight,
        options.behavior_weight
    );

    let embedder = build_embedder(&config)?;
    let store = open_store(&config)?;

    println!("Running clustering...");
    let result = run_clustering(&store, embedder.as_ref(), &options)?;

    let output = &config.clustering.output;
    result.to_report().save(output)?;

    println!();
    println!("Clustering complete!");
    println!("  Algorithm: {}", result.algorithm);
    println!("  Clusters found: {}", result.cluster_count);
    if let Some(score) = result.quality_score {
        println!("  Silhouette score: {:.3}", score);
    }
    println!("  Results saved to: {}", output.display());

    println!();
    println!("Cluster summary:");
    print_clusters(&result.clusters_summary());
    Ok(())
}

fn show(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let store = open_store(config)?;
    let Some(run) = store.latest_run()? else {
        bail!("No clustering results found. Run 'cluster' first.");
    };

    println!("Run ID: {}", run.run_id);
    println!("Algorithm: {}", run.algorithm);
    println!("Created: {}", run.created_at.to_rfc3339());
    println!(
        "Text weight: {}, Behavior weight: {}",
        run.text_weight, run.behavior_weight
    );
    println!("Clusters: {}", run.cluster_count);
    if let Some(score) = run.quality_score {
        println!("Silhouette score: {:.3}", score);
    }

    println!();
    println!("Assignments:");
    print_clusters(&run.clusters_summary());

    if let Some(path) = output {
        ClusterReport::from(&run).save(&path)?;
        println!();
        println!("Report written to: {}", path.display());
    }
    Ok(())
}

fn print_clusters(clusters: &BTreeMap<i32, Vec<String>>) {
    for (cluster_id, members) in clusters {
        println!("  {}: {}", cluster_label(*cluster_id), members.join(", "));
    }
}
