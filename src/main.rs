use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

use episode_archive::cli::{archive, list, resolve, show, stats, OutputFormat};
use episode_archive::config::Config;
use episode_archive::error::ArchiveError;
use episode_archive::resolution::Status;
use episode_archive::store::EpisodeStore;

#[derive(Parser)]
#[command(name = "episode-archive")]
#[command(about = "Durable archive of conversational episodes with resolution tracking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (must exist when given)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Database path (overrides the config file)
    #[arg(long, env = "EPISODE_ARCHIVE_DB", global = true)]
    db: Option<PathBuf>,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive a transcript file (`-` reads stdin)
    Archive {
        /// Path to a JSON or JSONL transcript
        path: PathBuf,

        /// Session ID (defaults to the transcript's own id or file name)
        #[arg(short, long)]
        session_id: Option<String>,
    },

    /// List episodes still awaiting resolution, oldest first
    ListUnresolved,

    /// Mark an episode resolved
    Resolve {
        /// Session ID
        session_id: String,
    },

    /// Show an archived episode
    Show {
        /// Session ID
        session_id: String,
    },

    /// List all episodes
    List {
        /// Filter by status (unresolved, resolved)
        #[arg(short, long)]
        status: Option<Status>,
    },

    /// Show statistics
    Stats,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match run(cli, format) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err, format),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "episode_archive=warn",
        1 => "episode_archive=info",
        _ => "episode_archive=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli, format: OutputFormat) -> Result<()> {
    // Load config
    let config = Config::load(cli.config.as_deref())?;

    // A rejected payload never opens (or creates) the database
    let prepared = match cli.command {
        Commands::Archive {
            ref path,
            ref session_id,
        } => Some(archive::prepare(&config.archive, path, session_id.clone())?),
        _ => None,
    };

    let db_path = cli.db.unwrap_or_else(|| config.database_path());
    debug!(path = %db_path.display(), "opening episode store");

    // One store handle per invocation, closed before exit
    let store = EpisodeStore::open_with(&db_path, &config.store_options())?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Archive { .. } => {
            if let Some(prepared) = &prepared {
                archive::record(&store, prepared, format, &mut out)?;
            }
        }
        Commands::ListUnresolved => {
            list::unresolved(&store, format, &mut out)?;
        }
        Commands::Resolve { session_id } => {
            resolve::run(&store, &session_id, format, &mut out)?;
        }
        Commands::Show { session_id } => {
            show::run(&store, &session_id, format, &mut out)?;
        }
        Commands::List { status } => {
            list::run(&store, status, format, &mut out)?;
        }
        Commands::Stats => {
            stats::run(&store, format, &mut out)?;
        }
    }

    out.flush()?;
    store.close()?;
    Ok(())
}

/// Print the error with its kind and pick the exit status
fn report(err: &anyhow::Error, format: OutputFormat) -> ExitCode {
    let (kind, code) = match err.downcast_ref::<ArchiveError>() {
        Some(archive_err) => (archive_err.kind(), archive_err.exit_code()),
        None => ("internal", 1),
    };
    let message = format!("{:#}", err);

    match format {
        OutputFormat::Json => {
            let body = serde_json::json!({ "error": { "kind": kind, "message": message } });
            println!("{}", body);
        }
        OutputFormat::Human => {
            eprintln!("error[{}]: {}", kind, message);
        }
    }

    ExitCode::from(code as u8)
}
