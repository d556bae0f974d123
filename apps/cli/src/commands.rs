//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use leadflow_core::{ProgressEvent, ProgressSink, Waterfall, ingest_records};
use leadflow_enrich::build_registry;
use leadflow_identity::resolve_duplicates;
use leadflow_shared::{
    AppConfig, RawLead, config_file_path, init_config, load_config, resolve_db_path,
};
use leadflow_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LeadFlow — dedupe and enrich scraped contact records.
#[derive(Parser)]
#[command(
    name = "leadflow",
    version,
    about = "Ingest scraped leads, resolve identities, and enrich them through a provider waterfall.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path (overrides the config file).
    #[arg(long, global = true)]
    pub db: Option<String>,

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
    /// Ingest a JSON Lines file of scraped lead records.
    Ingest {
        /// Path to the .jsonl file.
        file: String,

        /// Source name applied to records that don't carry one.
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Run the enrichment waterfall over leads missing tracked fields.
    Enrich {
        /// Maximum number of leads in the batch (defaults from config).
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Find and merge duplicate leads.
    Dedupe {
        /// Scan and report without mutating the store.
        #[arg(long)]
        dry_run: bool,
    },

    /// Recompute every lead's quality score from the current rule set.
    Rescore,

    /// List leads in the store.
    List {
        /// Only show leads at or above this score.
        #[arg(long)]
        min_score: Option<u8>,
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

    let filter = match cli.verbose {
        0 => "leadflow=info",
        1 => "leadflow=debug",
        _ => "leadflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;

    match cli.command {
        Command::Ingest { file, source } => {
            cmd_ingest(&config, cli.db.as_deref(), &file, source.as_deref()).await
        }
        Command::Enrich { limit } => cmd_enrich(&config, cli.db.as_deref(), limit).await,
        Command::Dedupe { dry_run } => cmd_dedupe(&config, cli.db.as_deref(), dry_run).await,
        Command::Rescore => cmd_rescore(&config, cli.db.as_deref()).await,
        Command::List { min_score } => cmd_list(&config, cli.db.as_deref(), min_score).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

/// Open the store at the configured (or overridden) path.
async fn open_storage(config: &AppConfig, db_override: Option<&str>) -> Result<Storage> {
    let path = match db_override {
        Some(p) => PathBuf::from(p),
        None => resolve_db_path(config)?,
    };
    Ok(Storage::open(&path).await?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    config: &AppConfig,
    db: Option<&str>,
    file: &str,
    default_source: Option<&str>,
) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let rules = leadflow_scoring::effective_rules(&config.scoring.rules);

    let content = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read {file}: {e}"))?;

    let mut records: Vec<RawLead> = Vec::new();
    let mut rejected = 0usize;
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawLead>(line) {
            Ok(mut record) => {
                if record.source.trim().is_empty() {
                    if let Some(source) = default_source {
                        record.source = source.to_string();
                    }
                }
                records.push(record);
            }
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "rejected record");
                rejected += 1;
            }
        }
    }

    let stats = ingest_records(&storage, &rules, &records).await?;
    println!(
        "Ingested {} records: {} new, {} merged, {} unchanged, {} rejected",
        records.len(),
        stats.inserted,
        stats.merged,
        stats.unchanged,
        rejected
    );
    Ok(())
}

async fn cmd_enrich(config: &AppConfig, db: Option<&str>, limit: Option<usize>) -> Result<()> {
    let storage = Arc::new(open_storage(config, db).await?);
    let registry = Arc::new(build_registry(config)?);
    let rules = leadflow_scoring::effective_rules(&config.scoring.rules);
    let limit = limit.unwrap_or(config.defaults.batch_limit);

    let waterfall = Waterfall::new(storage, registry, rules, &config.waterfall);

    // Ctrl-C cancels cooperatively; the current step stops after the lead in
    // flight and completed work is kept.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current lead");
            signal_token.cancel();
        }
    });

    let progress = BarProgress::new();
    let stats = waterfall.run(limit, &cancel, &progress).await?;
    progress.bar.finish_and_clear();

    println!("Waterfall complete:");
    println!("  profiles fetched:   {}", stats.profiles_fetched);
    println!("  cross-ref matches:  {}", stats.cross_ref_matches);
    println!("  name lookups run:   {}", stats.name_lookups_run);
    println!("  emails crawled:     {}", stats.emails_crawled);
    println!("  adapter errors:     {}", stats.adapter_errors);
    for (step, filled) in &stats.fields_filled {
        println!("  {step}: {filled} fields filled");
    }
    println!(
        "  total: {} fields across {} leads",
        stats.total_fields_filled, stats.records_touched
    );
    if cancel.is_cancelled() {
        println!("  (run cancelled early; completed work was kept)");
    }
    Ok(())
}

async fn cmd_dedupe(config: &AppConfig, db: Option<&str>, dry_run: bool) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let rules = leadflow_scoring::effective_rules(&config.scoring.rules);

    let report = resolve_duplicates(&storage, &rules, dry_run).await?;
    if dry_run {
        println!(
            "Dry run: {} duplicate groups; would merge {} leads and recover {} fields",
            report.groups, report.merged, report.fields_recovered
        );
    } else {
        println!(
            "Merged {} leads across {} groups, recovered {} fields",
            report.merged, report.groups, report.fields_recovered
        );
    }
    Ok(())
}

async fn cmd_rescore(config: &AppConfig, db: Option<&str>) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let rules = leadflow_scoring::effective_rules(&config.scoring.rules);

    let leads = storage.list_leads(None).await?;
    let mut changed = 0usize;
    for lead in &leads {
        let score = leadflow_scoring::score(lead, &rules);
        if score != lead.lead_score {
            storage.update_score(&lead.id, score).await?;
            changed += 1;
        }
    }
    println!("Rescored {} leads, {} changed", leads.len(), changed);
    Ok(())
}

async fn cmd_list(config: &AppConfig, db: Option<&str>, min_score: Option<u8>) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let leads = storage.list_leads(min_score).await?;

    for lead in &leads {
        println!(
            "{:>3}  {:<24} {:<28} {:<16} {}, {}",
            lead.lead_score,
            lead.display_name(),
            lead.email,
            lead.phone,
            lead.city,
            lead.state
        );
    }
    println!("{} leads", leads.len());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let path = config_file_path()?;
    println!("# {}", path.display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress bar
// ---------------------------------------------------------------------------

/// Renders waterfall progress events on an indicatif bar.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
                .expect("valid progress template"),
        );
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn waterfall_progress(&self, event: ProgressEvent) {
        if self.bar.length() != Some(event.total as u64) {
            self.bar.set_length(event.total as u64);
        }
        self.bar.set_position(event.current as u64);
        self.bar.set_message(format!("{}: {}", event.step, event.detail));
    }
}
