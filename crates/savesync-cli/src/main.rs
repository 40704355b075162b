mod commands;
mod console;
mod context;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "savesync")]
#[command(about = "Game save synchronization with cloud storage revisions")]
#[command(version)]
struct Cli {
    /// Path to the SaveSync config directory (default: ~/.savesync)
    #[arg(long, global = true, env = "SAVESYNC_HOME")]
    config_dir: Option<PathBuf>,

    /// Fail instead of prompting when a provider needs an interactive login
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the default configuration
    Init,

    /// Show configuration, selection and provider status
    Status,

    /// List revisions stored on a provider (default: the restore source)
    List {
        /// Provider id (dropbox, google-drive, local-folder, null)
        provider: Option<String>,
    },

    /// Upload a new revision to every store target and prune old ones
    Store,

    /// Back up local save data, then restore the newest revision
    Restore,

    /// Change the restore source and store targets
    Select {
        /// Provider to restore from
        #[arg(long)]
        restore: Option<String>,
        /// Provider to add to the store targets (repeatable)
        #[arg(long = "store")]
        store: Vec<String>,
        /// Provider to remove from the store targets (repeatable)
        #[arg(long = "no-store")]
        no_store: Vec<String>,
    },

    /// Toggle automatic restore before and store after a game session
    Auto {
        #[arg(long)]
        store: Option<bool>,
        #[arg(long)]
        restore: Option<bool>,
    },

    /// Set how many revisions each store target keeps
    Keep { count: u32 },

    /// List local backups taken before restores
    Backups,

    /// Authorize a provider
    Login { provider: String },

    /// Launch the game, restoring before and storing after when enabled
    Run,

    /// Print the version, optionally copying it to the clipboard
    Version {
        #[arg(long)]
        copy: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("savesync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let base_dir = match cli.config_dir {
        Some(ref dir) => dir.clone(),
        None => savesync_core::config::SaveSyncConfig::default_base_dir()?,
    };
    let interactive = !cli.non_interactive;

    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Init => commands::init::run(&base_dir),
        Commands::Status => rt.block_on(commands::status::run(&base_dir)),
        Commands::List { ref provider } => {
            rt.block_on(commands::list::run(&base_dir, provider.as_deref(), interactive))
        }
        Commands::Store => rt.block_on(commands::store::run(&base_dir, interactive)),
        Commands::Restore => rt.block_on(commands::restore::run(&base_dir, interactive)),
        Commands::Select {
            ref restore,
            ref store,
            ref no_store,
        } => rt.block_on(commands::select::run(
            &base_dir,
            restore.as_deref(),
            store,
            no_store,
            interactive,
        )),
        Commands::Auto { store, restore } => commands::settings::auto(&base_dir, store, restore),
        Commands::Keep { count } => commands::settings::keep(&base_dir, count),
        Commands::Backups => commands::backups::run(&base_dir),
        Commands::Login { ref provider } => rt.block_on(commands::login::run(&base_dir, provider)),
        Commands::Run => rt.block_on(commands::run::run(&base_dir, interactive)),
        Commands::Version { copy } => rt.block_on(commands::version::run(&base_dir, copy)),
    }
}
