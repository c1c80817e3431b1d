use anyhow::Result;
use cardpulse::cli::harvest::HarvestArgs;
use cardpulse::core::log::init_logging;
use cardpulse::harvest::{
    DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_FRESHNESS_DAYS,
};
use cardpulse::providers::pricing_endpoint::DEFAULT_TIMEOUT;
use clap::{Args, CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy current prices into the history tables
    Snapshot,
    /// Fetch listing prices for cards through the pricing service
    Harvest(HarvestCli),
    /// Serve the price history read API
    Serve {
        /// Address to bind, overrides LISTEN_ADDR
        #[arg(long)]
        listen: Option<String>,
    },
}

#[derive(Args)]
struct HarvestCli {
    /// Harvest every card, including those with a fresh listing price
    #[arg(long, conflicts_with = "only_missing_ebay")]
    all: bool,

    /// Only harvest cards without a fresh listing price (default)
    #[arg(long)]
    only_missing_ebay: bool,

    /// Freshness window in days for --only-missing-ebay
    #[arg(long, default_value_t = DEFAULT_FRESHNESS_DAYS)]
    days: i64,

    /// Stop after this many cards, 0 is unlimited
    #[arg(long, default_value_t = 0)]
    limit: usize,

    /// Ids per batch (minimum 50)
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch: usize,

    /// Lookups in flight per batch (1 to 8)
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Start after this id, ignoring the saved cursor
    #[arg(long = "startAfter", alias = "start-after")]
    start_after: Option<String>,

    /// Log the batches without calling the pricing service or saving the cursor
    #[arg(long)]
    dry_run: bool,

    /// Pricing service base URL, overrides PRICING_BASE_URL
    #[arg(long)]
    base: Option<String>,

    /// Pause between batches in milliseconds
    #[arg(long, default_value_t = DEFAULT_BATCH_DELAY.as_millis() as u64)]
    delay_ms: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,
}

impl From<HarvestCli> for HarvestArgs {
    fn from(cli: HarvestCli) -> Self {
        HarvestArgs {
            all: cli.all && !cli.only_missing_ebay,
            freshness_days: cli.days,
            limit: cli.limit,
            batch: cli.batch,
            concurrency: cli.concurrency,
            start_after: cli.start_after,
            dry_run: cli.dry_run,
            base: cli.base,
            delay_ms: cli.delay_ms,
            timeout_secs: cli.timeout_secs,
        }
    }
}

impl From<Commands> for cardpulse::AppCommand {
    fn from(cmd: Commands) -> cardpulse::AppCommand {
        match cmd {
            Commands::Snapshot => cardpulse::AppCommand::Snapshot,
            Commands::Harvest(args) => cardpulse::AppCommand::Harvest(args.into()),
            Commands::Serve { listen } => cardpulse::AppCommand::Serve { listen },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // a missing .env is not an error
    dotenvy::dotenv().ok();
    init_logging(cli.verbose);

    let result = match cli.command {
        Some(cmd) => cardpulse::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
