mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    account::AccountSubcommand,
    config::ConfigSubcommand,
    serve::ServeArgs,
    tier::{OverrideSubcommand, TierSubcommand},
    usage::UsageSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tierline",
    about = "Subscription tiers, entitlements and daily usage limits for a coaching app",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .tierline/)
    #[arg(long, global = true, env = "TIERLINE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file and store in the project root
    Init,

    /// Run the HTTP API
    Serve(ServeArgs),

    /// Manage accounts
    Account {
        #[command(subcommand)]
        subcommand: AccountSubcommand,
    },

    /// Read or set an account's tier
    Tier {
        #[command(subcommand)]
        subcommand: TierSubcommand,
    },

    /// Grant or revoke per-feature overrides
    Override {
        #[command(subcommand)]
        subcommand: OverrideSubcommand,
    },

    /// Check whether an account may use a feature
    Check { user_id: String, feature: String },

    /// Inspect or charge daily usage
    Usage {
        #[command(subcommand)]
        subcommand: UsageSubcommand,
    },

    /// Show an account's subscription history
    History { user_id: String },

    /// Show daily revenue totals
    Revenue {
        /// UTC day as YYYY-MM-DD (default: every recorded day)
        #[arg(long)]
        day: Option<String>,
    },

    /// Apply a saved checkout completion event without a signature
    Reconcile {
        /// Path to the event JSON
        event_file: PathBuf,
        /// Attribute the payment to this account
        #[arg(long = "user")]
        user_id: Option<String>,
    },

    /// Show or validate config
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Serve(args) => cmd::serve::run(&root, args),
        Commands::Account { subcommand } => cmd::account::run(&root, subcommand, cli.json),
        Commands::Tier { subcommand } => cmd::tier::run(&root, subcommand, cli.json),
        Commands::Override { subcommand } => cmd::tier::run_override(&root, subcommand, cli.json),
        Commands::Check { user_id, feature } => {
            cmd::check::run(&root, &user_id, &feature, cli.json)
        }
        Commands::Usage { subcommand } => cmd::usage::run(&root, subcommand, cli.json),
        Commands::History { user_id } => cmd::history::run(&root, &user_id, cli.json),
        Commands::Revenue { day } => cmd::history::run_revenue(&root, day.as_deref(), cli.json),
        Commands::Reconcile {
            event_file,
            user_id,
        } => cmd::reconcile::run(&root, &event_file, user_id.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
