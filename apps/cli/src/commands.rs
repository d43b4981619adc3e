//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use ddxbuilder_core::pipeline::{
    CaseIngest, CorpusIngest, HierarchyIngest, ProgressReporter, TreeIngest,
};
use ddxbuilder_core::service::DiagnosisService;
use ddxbuilder_shared::{
    AppConfig, CrawlConfig, DiagnosisRequest, SegmentOptions, TraversalOptions, init_config,
    load_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ddxbuilder — build and query a differential-diagnosis knowledge base.
#[derive(Parser)]
#[command(
    name = "ddxbuilder",
    version,
    about = "Ingest classification, corpus, and decision-tree sources and run diagnosis traversals.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Override the knowledge database path.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ingest a knowledge source into the database.
    Ingest {
        /// Ingest subcommand.
        #[command(subcommand)]
        source: IngestSource,
    },

    /// Run one diagnosis request against the stored corpus.
    Diagnose {
        /// Candidate text: a case description or an initial diagnosis,
        /// possibly containing a classification code.
        candidate: String,

        /// Prior answer in dialogue order ("yes"/"no"); repeatable.
        #[arg(short, long = "answer")]
        answers: Vec<String>,

        /// Override the similarity threshold for the similar-case lookup.
        #[arg(long)]
        similarity_threshold: Option<f64>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Knowledge sources for `ingest`.
#[derive(Subcommand)]
pub(crate) enum IngestSource {
    /// Crawl the remote classification hierarchy into entities.
    Hierarchy {
        /// Override the hierarchy root URI.
        #[arg(long)]
        root_uri: Option<String>,
    },

    /// Segment the diagnostic text corpus and fuse it with the entities.
    Corpus {
        /// Form-feed-paginated corpus text file.
        file: PathBuf,

        /// Override the first page of the extraction window.
        #[arg(long)]
        start_page: Option<u32>,

        /// Override the last page of the extraction window.
        #[arg(long)]
        end_page: Option<u32>,
    },

    /// Flatten decision-tree JSON documents into traversal nodes.
    Trees {
        /// Directory of decision-tree JSON files.
        dir: PathBuf,
    },

    /// Split a clinical-cases text into reference cases.
    Cases {
        /// Clinical-cases text file.
        file: PathBuf,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "ddxbuilder=info",
        1 => "ddxbuilder=debug",
        _ => "ddxbuilder=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;
    let db_path = resolve_db_path(&config, cli.db.as_deref())?;

    match cli.command {
        Command::Ingest { source } => match source {
            IngestSource::Hierarchy { root_uri } => {
                cmd_ingest_hierarchy(&config, db_path, root_uri).await
            }
            IngestSource::Corpus {
                file,
                start_page,
                end_page,
            } => cmd_ingest_corpus(&config, db_path, file, start_page, end_page).await,
            IngestSource::Trees { dir } => cmd_ingest_trees(db_path, dir).await,
            IngestSource::Cases { file } => cmd_ingest_cases(db_path, file).await,
        },
        Command::Diagnose {
            candidate,
            answers,
            similarity_threshold,
        } => cmd_diagnose(&config, db_path, candidate, answers, similarity_threshold).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

/// Resolve the database path: CLI flag, then config, with `~` expansion.
fn resolve_db_path(config: &AppConfig, flag: Option<&std::path::Path>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path.to_path_buf());
    }

    let configured = &config.defaults.db_path;
    if let Some(rest) = configured.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| eyre!("cannot determine home directory"))?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(configured))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest_hierarchy(
    config: &AppConfig,
    db_path: PathBuf,
    root_uri: Option<String>,
) -> Result<()> {
    let mut crawl = CrawlConfig::from(config);
    if let Some(root_uri) = root_uri {
        crawl.root_uri = root_uri;
    }

    info!(root_uri = %crawl.root_uri, "ingesting classification hierarchy");

    let reporter = CliProgress::new();
    let result = ddxbuilder_core::pipeline::ingest_hierarchy(
        &HierarchyIngest { db_path, crawl },
        &reporter,
    )
    .await?;
    reporter.finish();

    println!();
    println!("  Hierarchy ingested!");
    println!("  Job:       {}", result.job_id);
    println!("  Visited:   {}", result.summary.nodes_visited);
    println!("  Failed:    {}", result.summary.nodes_failed);
    println!("  Leaves:    {}", result.summary.leaves_emitted);
    println!("  Inserted:  {}", result.stats.inserted);
    println!("  Updated:   {}", result.stats.updated);
    println!("  Unchanged: {}", result.stats.unchanged);
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_ingest_corpus(
    config: &AppConfig,
    db_path: PathBuf,
    file: PathBuf,
    start_page: Option<u32>,
    end_page: Option<u32>,
) -> Result<()> {
    let ingest = CorpusIngest {
        db_path,
        corpus_file: file,
        anchor_pattern: config.corpus.anchor_pattern.clone(),
        start_page: start_page.unwrap_or(config.corpus.start_page),
        end_page: end_page.unwrap_or(config.corpus.end_page),
        options: SegmentOptions::from(config),
    };

    info!(
        corpus_file = %ingest.corpus_file.display(),
        start_page = ingest.start_page,
        end_page = ingest.end_page,
        "ingesting text corpus"
    );

    let reporter = CliProgress::new();
    let result = ddxbuilder_core::pipeline::ingest_corpus(&ingest, &reporter).await?;
    reporter.finish();

    println!();
    println!("  Corpus ingested!");
    println!("  Job:       {}", result.job_id);
    println!("  Pages:     {}", result.pages);
    println!("  Segments:  {}", result.segments);
    println!("  Inserted:  {}", result.fused.inserted);
    println!("  Updated:   {}", result.fused.updated);
    println!("  Unchanged: {}", result.fused.unchanged);
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_ingest_trees(db_path: PathBuf, dir: PathBuf) -> Result<()> {
    info!(trees_dir = %dir.display(), "ingesting decision trees");

    let reporter = CliProgress::new();
    let result = ddxbuilder_core::pipeline::ingest_trees(
        &TreeIngest {
            db_path,
            trees_dir: dir,
        },
        &reporter,
    )
    .await?;
    reporter.finish();

    println!();
    println!("  Decision trees ingested!");
    println!("  Job:   {}", result.job_id);
    println!("  Nodes: {}", result.nodes);
    println!("  Time:  {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_ingest_cases(db_path: PathBuf, file: PathBuf) -> Result<()> {
    info!(cases_file = %file.display(), "ingesting reference cases");

    let reporter = CliProgress::new();
    let result = ddxbuilder_core::pipeline::ingest_cases(
        &CaseIngest {
            db_path,
            cases_file: file,
        },
        &reporter,
    )
    .await?;
    reporter.finish();

    println!();
    println!("  Reference cases ingested!");
    println!("  Job:       {}", result.job_id);
    println!("  Cases:     {}", result.cases);
    println!("  Inserted:  {}", result.stats.inserted);
    println!("  Updated:   {}", result.stats.updated);
    println!("  Unchanged: {}", result.stats.unchanged);
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_diagnose(
    config: &AppConfig,
    db_path: PathBuf,
    candidate: String,
    answers: Vec<String>,
    similarity_threshold: Option<f64>,
) -> Result<()> {
    let mut options = TraversalOptions::from(config);
    if let Some(threshold) = similarity_threshold {
        options.similarity_threshold = threshold;
    }

    let service = DiagnosisService::load(&db_path, options).await?;
    let response = service.diagnose(&DiagnosisRequest {
        candidate_text: candidate,
        previous_answers: answers,
    });

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config file created at {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_processed(&self, detail: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Storing [{current}/{total}] {detail}"));
    }
}
