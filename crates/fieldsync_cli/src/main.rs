//! fieldsync CLI
//!
//! Drives the sync engine against JSON snapshot files, one file for the
//! device's local state and one for the remote document store.
//!
//! # Commands
//!
//! - `pull` - Pull remote changes into the local snapshot
//! - `push` - Deliver queued mutations and changed records
//! - `sync` - Push then pull in one cycle
//! - `status` - Show watermarks, queue health and the background-sync decision
//! - `queue` - List or purge queued mutations
//! - `reset` - Forget the watermarks of one entity kind

mod commands;

use clap::{Parser, Subcommand};
use commands::{SessionArgs, Workspace};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// fieldsync command-line sync driver.
#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Local snapshot file (records, sync metadata and mutation queue)
    #[arg(global = true, short, long, default_value = "local.json")]
    local: PathBuf,

    /// Remote snapshot file (documents by collection path)
    #[arg(global = true, short, long, default_value = "remote.json")]
    remote: PathBuf,

    /// Tenant the session belongs to
    #[arg(global = true, short, long, default_value = "default")]
    tenant: String,

    /// Signed-in user id
    #[arg(global = true, short, long, default_value = "1")]
    user: String,

    /// Grant access to every route
    #[arg(global = true, long)]
    admin: bool,

    /// Accessible route ids, comma separated
    #[arg(global = true, long, value_delimiter = ',')]
    routes: Vec<i64>,

    /// Treat the network as unavailable
    #[arg(global = true, long)]
    offline: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull remote changes into the local snapshot
    Pull {
        /// Ignore stored watermarks and fetch everything
        #[arg(short, long)]
        full: bool,
    },

    /// Deliver queued mutations, then push changed records
    Push,

    /// Push then pull in one cycle
    Sync {
        /// Retry the cycle with backoff on failure
        #[arg(long)]
        retry: bool,
    },

    /// Show watermarks, queue health and the background-sync decision
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List queued mutations
    Queue {
        /// Remove completed mutations
        #[arg(short, long)]
        purge: bool,
    },

    /// Forget the pull and push watermarks of an entity kind
    Reset {
        /// Entity kind, singular or collection name
        kind: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("fieldsync CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("fieldsync engine v{}", fieldsync_engine::VERSION);
        return Ok(());
    }

    let command = cli.command;
    let session = SessionArgs {
        tenant: cli.tenant,
        user: cli.user,
        admin: cli.admin,
        routes: cli.routes,
        online: !cli.offline,
    };
    let workspace = Workspace::open(&cli.local, &cli.remote, &session)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    // Snapshots are written even when a cycle fails: records applied before
    // the failure stay applied.
    let outcome = runtime.block_on(async {
        match command {
            Commands::Pull { full } => commands::pull::run(&workspace, full).await,
            Commands::Push => commands::push::run(&workspace).await,
            Commands::Sync { retry } => commands::sync::run(&workspace, retry).await,
            Commands::Status { format } => commands::status::run(&workspace, &format),
            Commands::Queue { purge } => commands::queue::run(&workspace, purge),
            Commands::Reset { kind } => commands::reset::run(&workspace, &kind),
            Commands::Version => Ok(()),
        }
    });
    workspace.save()?;
    outcome
}
