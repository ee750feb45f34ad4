//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use artmatch_core::{MatchConfig, MatchInput, MatchRun, PipelineProgress, discover_attributes};
use artmatch_gateway::{GatewayStats, LanguageModel, ModelGateway};
use artmatch_shared::{AppConfig, GatewaySettings, init_config, load_config, load_config_from};
use artmatch_tabular::{enriched_table, read_table, recommendation_table, write_table};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// artmatch: match artworks to buyers with a language model.
#[derive(Parser)]
#[command(
    name = "artmatch",
    version,
    about = "Enrich artworks with buyer attributes and recommend the best-matching buyers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.artmatch/artmatch.toml).
    #[arg(long, global = true, env = "ARTMATCH_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Run the full pipeline: discover, enrich, and recommend.
    Run {
        /// Candidate (buyer) table.
        #[arg(long)]
        candidates: PathBuf,

        /// Item (artwork) table.
        #[arg(long)]
        items: PathBuf,

        /// Where to write the enriched item table.
        #[arg(long, default_value = "enriched_art_data.csv")]
        enriched_out: PathBuf,

        /// Where to write the recommendation table.
        #[arg(long, default_value = "recommendations.csv")]
        recommendations_out: PathBuf,

        /// Candidates kept per item (overrides config).
        #[arg(long)]
        top_k: Option<usize>,

        /// Items enriched concurrently (overrides config).
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the attributes the model considers relevant.
    Discover {
        /// Candidate (buyer) table.
        #[arg(long)]
        candidates: PathBuf,
    },

    /// Re-rank an already enriched item table without calling the model.
    Recommend {
        /// Candidate (buyer) table.
        #[arg(long)]
        candidates: PathBuf,

        /// Enriched item table.
        #[arg(long)]
        enriched: PathBuf,

        /// Relevant attributes (comma-separated).
        #[arg(long, value_delimiter = ',', required = true)]
        attributes: Vec<String>,

        /// Candidates kept per item (overrides config).
        #[arg(long)]
        top_k: Option<usize>,

        /// Where to write the recommendation table.
        #[arg(long, default_value = "recommendations.csv")]
        out: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
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

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = ["artmatch", "artmatch_core", "artmatch_gateway", "artmatch_tabular", "artmatch_shared"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run {
            candidates,
            items,
            enriched_out,
            recommendations_out,
            top_k,
            concurrency,
        } => {
            let mut config = resolve_config(config_path.as_deref())?;
            if let Some(k) = top_k {
                config.defaults.top_k = k;
            }
            if let Some(n) = concurrency {
                config.defaults.concurrency = n;
            }
            let paths = RunPaths {
                candidates,
                items,
                enriched_out,
                recommendations_out,
            };
            cmd_run(&config, &paths).await
        }
        Command::Discover { candidates } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_discover(&config, &candidates).await
        }
        Command::Recommend {
            candidates,
            enriched,
            attributes,
            top_k,
            out,
        } => {
            let mut config = resolve_config(config_path.as_deref())?;
            if let Some(k) = top_k {
                config.defaults.top_k = k;
            }
            cmd_recommend(&config, &candidates, &enriched, &attributes, &out)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Input and output locations of a full run.
pub(crate) struct RunPaths {
    pub candidates: PathBuf,
    pub items: PathBuf,
    pub enriched_out: PathBuf,
    pub recommendations_out: PathBuf,
}

async fn cmd_run(config: &AppConfig, paths: &RunPaths) -> Result<()> {
    info!(
        candidates = %paths.candidates.display(),
        items = %paths.items.display(),
        "starting run"
    );

    let reporter = CliProgress::new();
    let (run, stats) = execute_run(config, paths, &reporter).await?;

    println!();
    println!("  Matching run complete!");
    println!("  Run:             {}", run.run_id);
    println!("  Started:         {}", run.started_at.to_rfc3339());
    println!("  Attributes:      {}", run.attributes.join(", "));
    println!("  Items:           {}", run.enriched.len());
    println!("  Degraded items:  {}", run.summary.degraded_items);
    println!("  Out-of-catalog:  {}", run.summary.out_of_catalog_values);
    println!("  Invocations:     {}", stats.invocations);
    println!("  Cache hits:      {}", stats.cache_hits);
    println!("  Enriched:        {}", paths.enriched_out.display());
    println!("  Recommendations: {}", paths.recommendations_out.display());
    println!("  Time:            {:.1}s", run.elapsed.as_secs_f64());
    println!();

    Ok(())
}

/// Read both tables, run the pipeline, and write both output tables.
pub(crate) async fn execute_run(
    config: &AppConfig,
    paths: &RunPaths,
    progress: &dyn PipelineProgress,
) -> Result<(MatchRun, GatewayStats)> {
    let gateway = Arc::new(ModelGateway::new(GatewaySettings::from_config(config)?)?);

    let candidates = read_table(&paths.candidates)?;
    let items = read_table(&paths.items)?;
    let item_headers = items.headers.clone();

    let input = MatchInput {
        candidate_columns: candidates.headers,
        candidates: candidates.rows,
        item_columns: items.headers,
        items: items.rows,
    };

    let model: Arc<dyn LanguageModel> = gateway.clone();
    let run = artmatch_core::run_matching(&MatchConfig::from(config), model, input, progress).await?;

    write_table(
        &paths.enriched_out,
        &enriched_table(&item_headers, &run.attributes, &run.enriched),
    )?;
    write_table(
        &paths.recommendations_out,
        &recommendation_table(&config.columns, &run.recommendations),
    )?;

    let stats = gateway.stats();
    info!(
        run_id = %run.run_id,
        invocations = stats.invocations,
        cache_hits = stats.cache_hits,
        "model gateway totals"
    );

    Ok((run, stats))
}

// ---------------------------------------------------------------------------
// discover / recommend
// ---------------------------------------------------------------------------

async fn cmd_discover(config: &AppConfig, candidates: &Path) -> Result<()> {
    let table = read_table(candidates)?;
    let gateway = ModelGateway::new(GatewaySettings::from_config(config)?)?;

    let attributes = discover_attributes(
        &gateway,
        &table.headers,
        &config.discovery.fallback_attributes,
    )
    .await?;

    if attributes.is_empty() {
        println!("No relevant attributes.");
    }
    for attr in &attributes {
        println!("{attr}");
    }
    Ok(())
}

fn cmd_recommend(
    config: &AppConfig,
    candidates: &Path,
    enriched: &Path,
    attributes: &[String],
    out: &Path,
) -> Result<()> {
    let attributes: Vec<String> = attributes
        .iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    if attributes.is_empty() {
        return Err(eyre!("--attributes must name at least one attribute"));
    }

    let candidates = read_table(candidates)?;
    let enriched = read_table(enriched)?;

    let recommendations = artmatch_core::rerank(
        &MatchConfig::from(config),
        &candidates.headers,
        candidates.rows,
        enriched.rows,
        &attributes,
    )?;
    write_table(out, &recommendation_table(&config.columns, &recommendations))?;

    println!(
        "Wrote {} recommendations for {} items to {}",
        recommendations.iter().map(|r| r.matches.len()).sum::<usize>(),
        recommendations.len(),
        out.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl PipelineProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_enriched(&self, current: usize, total: usize, item_id: &str) {
        self.spinner
            .set_message(format!("Enriching [{current}/{total}] {item_id}"));
    }

    fn done(&self, _run: &MatchRun) {
        self.spinner.finish_and_clear();
    }
}

// Clears the spinner when a run aborts before `done`.
impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}
