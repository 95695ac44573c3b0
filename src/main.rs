use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand};
use fxtally::core::aggregation::{StatisticsQuery, SummaryQuery};
use fxtally::core::currency::Currency;
use fxtally::core::ledger::{DateRange, UserId};
use fxtally::core::log::init_logging;
use std::path::PathBuf;

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

/// Record selection shared by the reporting commands.
#[derive(Args)]
struct RangeArgs {
    /// User whose records are reported
    #[arg(short, long)]
    user: UserId,

    /// First date to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last date to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl RangeArgs {
    fn range(&self) -> Result<DateRange> {
        Ok(DateRange::new(self.from, self.to)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch and store the latest rates for every base currency
    Refresh,
    /// Refresh rates periodically until interrupted
    Watch,
    /// Display per-category statistics in the user's currency
    Stats {
        #[command(flatten)]
        range: RangeArgs,
        /// Only include these payment methods
        #[arg(long = "payment-method")]
        payment_methods: Vec<u64>,
        /// Case-insensitive text matched against category, description or amount
        #[arg(long)]
        search: Option<String>,
    },
    /// Display the signed balance in the user's currency
    Summary {
        #[command(flatten)]
        range: RangeArgs,
        /// Only include these payment methods
        #[arg(long = "payment-method")]
        payment_methods: Vec<u64>,
        /// Only include this category
        #[arg(long)]
        category: Option<u64>,
        /// Case-insensitive text matched against description or category
        #[arg(long)]
        search: Option<String>,
    },
    /// Export records as CSV
    Export {
        #[command(flatten)]
        range: RangeArgs,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the resolved rate and stored snapshots for a pair
    Rates {
        #[arg(long)]
        from: Currency,
        #[arg(long)]
        to: Currency,
        /// Date to resolve for; today when omitted
        #[arg(long)]
        on: Option<NaiveDate>,
    },
}

impl TryFrom<Commands> for fxtally::AppCommand {
    type Error = anyhow::Error;

    fn try_from(cmd: Commands) -> Result<fxtally::AppCommand> {
        Ok(match cmd {
            Commands::Refresh => fxtally::AppCommand::Refresh,
            Commands::Watch => fxtally::AppCommand::Watch,
            Commands::Stats {
                range,
                payment_methods,
                search,
            } => fxtally::AppCommand::Stats {
                user_id: range.user,
                query: StatisticsQuery {
                    range: range.range()?,
                    payment_method_ids: payment_methods,
                    search,
                },
            },
            Commands::Summary {
                range,
                payment_methods,
                category,
                search,
            } => fxtally::AppCommand::Summary {
                user_id: range.user,
                query: SummaryQuery {
                    range: range.range()?,
                    payment_method_ids: payment_methods,
                    category_id: category,
                    search,
                },
            },
            Commands::Export { range, output } => fxtally::AppCommand::Export {
                user_id: range.user,
                range: range.range()?,
                output,
            },
            Commands::Rates { from, to, on } => fxtally::AppCommand::Rates {
                from,
                to,
                on: on.unwrap_or_else(|| Utc::now().date_naive()),
            },
            Commands::Setup => anyhow::bail!("Setup command should be handled separately"),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => fxtally::cli::setup::setup_at_path(path),
            None => fxtally::cli::setup::setup(),
        },
        Some(cmd) => match fxtally::AppCommand::try_from(cmd) {
            Ok(command) => fxtally::run_command(command, cli.config_path.as_deref()).await,
            Err(e) => Err(e),
        },
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
