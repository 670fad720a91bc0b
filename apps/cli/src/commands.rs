//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use stormtrack_core::{
    BackfillOptions, BackfillResult, ProgressReporter, UpdateResult, collect_notices,
    run_backfill, run_update,
};
use stormtrack_feed::GdacsClient;
use stormtrack_shared::{AppConfig, expand_home, init_config, load_config};
use stormtrack_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// stormtrack — mirror cyclone advisories into a local store.
#[derive(Parser)]
#[command(
    name = "stormtrack",
    version,
    about = "Ingest GDACS tropical-cyclone advisories into a local queryable store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Ingest every event the feed currently lists.
    Backfill {
        /// Concurrent events processed (defaults to config value).
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Process at most this many events (0 = all).
        #[arg(short, long)]
        limit: Option<usize>,

        /// Database file path (overrides config).
        #[arg(long)]
        db: Option<String>,

        /// Feed base URL (overrides config).
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Reconcile events whose newest episode is ahead of the stored cursor.
    Update {
        /// Database file path (overrides config).
        #[arg(long)]
        db: Option<String>,

        /// Feed base URL (overrides config).
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Show stored events, or one event's nodes and shapes.
    Status {
        /// Event id to inspect; omit for the event listing.
        event: Option<i64>,

        /// Database file path (overrides config).
        #[arg(long)]
        db: Option<String>,
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
        0 => "stormtrack=info",
        1 => "stormtrack=debug",
        _ => "stormtrack=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
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
    match cli.command {
        Command::Backfill {
            concurrency,
            limit,
            db,
            base_url,
        } => cmd_backfill(concurrency, limit, db.as_deref(), base_url.as_deref()).await,
        Command::Update { db, base_url } => cmd_update(db.as_deref(), base_url.as_deref()).await,
        Command::Status { event, db } => cmd_status(event, db.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

fn build_feed(config: &AppConfig, base_url: Option<&str>) -> Result<GdacsClient> {
    let base_url = base_url.unwrap_or(&config.feed.base_url);
    GdacsClient::new(base_url, config.feed.timeout_secs)
        .map_err(|e| eyre!("cannot build feed client: {e}"))
}

async fn open_storage(config: &AppConfig, db: Option<&str>) -> Result<Storage> {
    let path = expand_home(db.unwrap_or(&config.storage.db_path));
    Storage::open(&path)
        .await
        .map_err(|e| eyre!("cannot open database {}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_backfill(
    concurrency: Option<usize>,
    limit: Option<usize>,
    db: Option<&str>,
    base_url: Option<&str>,
) -> Result<()> {
    let config = load_config()?;
    let feed = Arc::new(build_feed(&config, base_url)?);
    let storage = open_storage(&config, db).await?;

    let options = BackfillOptions {
        concurrency: concurrency.unwrap_or(config.ingest.concurrency as usize),
        event_limit: limit.unwrap_or(config.ingest.event_limit as usize),
    };

    info!(
        concurrency = options.concurrency,
        event_limit = options.event_limit,
        "starting backfill"
    );

    let run_id = storage.insert_ingest_run("backfill").await?;
    let reporter = CliProgress::new();
    let result = run_backfill(feed, &storage, &options, &reporter).await?;
    storage
        .finish_ingest_run(&run_id, &backfill_stats(&result))
        .await?;

    println!();
    println!("  Backfill complete.");
    println!("  Persisted: {}", result.events_persisted);
    println!("  Discarded: {}", result.events_discarded);
    println!("  Errors:    {}", result.errors.len());
    println!("  Time:      {:.1}s", result.duration.as_secs_f64());
    println!();
    print_errors(result.errors.iter().map(|(who, what)| (who.as_str(), what.as_str())));

    Ok(())
}

async fn cmd_update(db: Option<&str>, base_url: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let feed = build_feed(&config, base_url)?;
    let storage = open_storage(&config, db).await?;

    let run_id = storage.insert_ingest_run("update").await?;
    let notices = collect_notices(&feed).await?;
    info!(notices = notices.len(), "starting update");

    let reporter = CliProgress::new();
    let result = run_update(&feed, &storage, &notices, &reporter).await;
    storage
        .finish_ingest_run(&run_id, &update_stats(&result))
        .await?;

    println!();
    println!("  Update complete.");
    println!("  Replaced:  {}", result.replaced);
    println!("  Skipped:   {}", result.skipped);
    println!("  Discarded: {}", result.discarded);
    println!("  Errors:    {}", result.errors.len());
    println!();
    let rendered: Vec<(String, String)> = result
        .errors
        .iter()
        .map(|(id, msg)| (id.to_string(), msg.clone()))
        .collect();
    print_errors(rendered.iter().map(|(who, what)| (who.as_str(), what.as_str())));

    Ok(())
}

async fn cmd_status(event: Option<i64>, db: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config, db).await?;

    match event {
        None => {
            let events = storage.list_events().await?;
            if events.is_empty() {
                println!("No events stored. Run `stormtrack backfill` first.");
                return Ok(());
            }
            println!("{:>10}  {:>8}  name", "event", "episode");
            for (event_id, name, episode_id) in events {
                println!("{event_id:>10}  {episode_id:>8}  {name}");
            }
        }
        Some(event_id) => {
            let nodes = storage.list_nodes(event_id).await?;
            if nodes.is_empty() {
                return Err(eyre!("event {event_id} is not in the store"));
            }
            println!("Event {event_id} — {}", nodes[0].event_name);
            println!("  Episode: {}", nodes[0].episode_id);
            println!("  Nodes:   {}", nodes.len());
            for node in &nodes {
                println!(
                    "    {}  wind {:>5.1}  {}",
                    node.timestamp.to_rfc3339(),
                    node.wind_speed,
                    node.position.to_wkt()
                );
            }
            if let Some(wkt) = storage.track_wkt(event_id).await? {
                println!("  Track:   {wkt}");
            }
            let buffers = storage.list_buffers(event_id).await?;
            if !buffers.is_empty() {
                println!("  Buffers:");
                for (severity, label) in buffers {
                    println!("    [{severity}] {label}");
                }
            }
        }
    }

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn backfill_stats(result: &BackfillResult) -> String {
    serde_json::json!({
        "persisted": result.events_persisted,
        "discarded": result.events_discarded,
        "errors": result.errors.len(),
        "elapsed_ms": result.duration.as_millis() as u64,
    })
    .to_string()
}

fn update_stats(result: &UpdateResult) -> String {
    serde_json::json!({
        "replaced": result.replaced,
        "skipped": result.skipped,
        "discarded": result.discarded,
        "errors": result.errors.len(),
    })
    .to_string()
}

fn print_errors<'a>(errors: impl Iterator<Item = (&'a str, &'a str)>) {
    for (who, what) in errors {
        eprintln!("  error: {who}: {what}");
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Event-count progress bar for ingest runs.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template("{bar:30.cyan/dim} {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=> "),
        );
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn begin(&self, total_events: usize) {
        self.bar.set_length(total_events as u64);
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    }

    fn event_done(&self, event_path: &str) {
        self.bar.set_message(event_path.to_string());
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
